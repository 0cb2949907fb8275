use crate::error::Result;
use crate::models::ClassOption;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// 优先级文件中的一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub raw_value: String,
}

/// 优先级文件
///
/// ```toml
/// [[class]]
/// raw_value = "IF4101|A|2023|IF"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityFile {
    #[serde(default, rename = "class")]
    pub classes: Vec<PriorityEntry>,
}

/// 读取优先级文件，文件不存在时返回 None
pub async fn load_priority_file(path: &Path) -> Result<Option<PriorityFile>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }

    let content = fs::read_to_string(path).await?;
    let file: PriorityFile = toml::from_str(&content)?;
    tracing::info!(
        "正在加载优先级文件: {} ({} 条)",
        path.display(),
        file.classes.len()
    );

    Ok(Some(file))
}

/// 用当前解析到的班级补全优先级条目
///
/// 返回 (按文件顺序排列的候选, 页面上找不到的 rawValue)
pub fn resolve_priority(
    file: &PriorityFile,
    classes: &[ClassOption],
) -> (Vec<ClassOption>, Vec<String>) {
    let mut resolved: Vec<ClassOption> = Vec::new();
    let mut unknown = Vec::new();

    for entry in &file.classes {
        if resolved.iter().any(|c| c.raw_value == entry.raw_value) {
            continue;
        }
        match classes.iter().find(|c| c.raw_value == entry.raw_value) {
            Some(class) => resolved.push(class.clone()),
            None => unknown.push(entry.raw_value.clone()),
        }
    }

    (resolved, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn parses_class_tables_and_skips_unknown() {
        let file: PriorityFile = toml::from_str(
            r#"
            [[class]]
            raw_value = "B|2|2023|IF"

            [[class]]
            raw_value = "ZZ|9|2023|IF"

            [[class]]
            raw_value = "A|1|2023|IF"

            [[class]]
            raw_value = "B|2|2023|IF"
            "#,
        )
        .unwrap();

        let classes = vec![
            ClassOption::from_raw(Category::Major, "A|1|2023|IF"),
            ClassOption::from_raw(Category::Major, "B|2|2023|IF"),
        ];
        let (resolved, unknown) = resolve_priority(&file, &classes);

        let order: Vec<&str> = resolved.iter().map(|c| c.raw_value.as_str()).collect();
        assert_eq!(order, vec!["B|2|2023|IF", "A|1|2023|IF"]);
        assert_eq!(unknown, vec!["ZZ|9|2023|IF".to_string()]);
    }
}
