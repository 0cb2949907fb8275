use serde::{Deserialize, Serialize};
use std::fmt;

/// 开课类别（对应页面上不同的 `<select>`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// 本系课程
    #[serde(rename = "jur")]
    Major,
    /// 外系课程
    #[serde(rename = "jurlain")]
    OtherDepartment,
    /// 公共基础（TPB）
    #[serde(rename = "tpb")]
    FirstYear,
    /// 拓展课程
    #[serde(rename = "pengayaan")]
    Enrichment,
    /// MBKM 课程
    #[serde(rename = "mbkm")]
    Mbkm,
}

impl Category {
    /// 解析顺序与页面上的分组顺序一致
    pub const ALL: [Category; 5] = [
        Category::Major,
        Category::OtherDepartment,
        Category::FirstYear,
        Category::Enrichment,
        Category::Mbkm,
    ];

    /// 页面使用的类别键
    pub fn key(self) -> &'static str {
        match self {
            Category::Major => "jur",
            Category::OtherDepartment => "jurlain",
            Category::FirstYear => "tpb",
            Category::Enrichment => "pengayaan",
            Category::Mbkm => "mbkm",
        }
    }

    /// 包含该类别选项的 CSS 选择器
    pub fn selector(self) -> &'static str {
        match self {
            Category::Major => "#kelasjur",
            Category::OtherDepartment => {
                "#kelasjur2, #kelasjurlain, #kelas_dep_lain, #kelasjur_lain, #kelasjur-lain"
            }
            Category::FirstYear => "#kelastpb",
            Category::Enrichment => "#kelaspengayaan",
            Category::Mbkm => "#kelasmbkm",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 班级容量：已选人数 / 总名额，页面没有给出时为 None
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub filled: Option<u32>,
    pub quota: Option<u32>,
}

impl Capacity {
    pub fn new(filled: u32, quota: u32) -> Self {
        Self {
            filled: Some(filled),
            quota: Some(quota),
        }
    }

    /// 两个数值都已知，并且名额为 0 或已选满
    pub fn is_full(&self) -> bool {
        match (self.filled, self.quota) {
            (Some(filled), Some(quota)) => quota == 0 || filled >= quota,
            _ => false,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.filled, self.quota) {
            (Some(filled), Some(quota)) => write!(f, "{}/{}", filled, quota),
            _ => f.write_str("?/?"),
        }
    }
}

/// `rawValue` 的组成部分：`code|section|curriculumYear|department`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawValueParts {
    pub code: String,
    pub section: String,
    pub curriculum_year: String,
    pub department: String,
}

impl RawValueParts {
    /// 缺失的字段视为空字符串，第四个之后的字段忽略
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split('|');
        let mut next = || parts.next().unwrap_or_default().to_string();
        Self {
            code: next(),
            section: next(),
            curriculum_year: next(),
            department: next(),
        }
    }
}

/// 一个可选的班级
///
/// 每次解析页面都会生成全新的列表，不会原地修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassOption {
    /// 页面上唯一的选项值
    pub raw_value: String,
    pub value_code: String,
    #[serde(default)]
    pub display_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub credits: Option<u32>,
    pub section: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub curriculum_year: String,
    pub category: Category,
    #[serde(default)]
    pub capacity: Capacity,
}

impl ClassOption {
    /// 只根据选项值构建，展示信息留空
    pub fn from_raw(category: Category, raw_value: impl Into<String>) -> Self {
        let raw_value = raw_value.into();
        let parts = RawValueParts::parse(&raw_value);
        Self {
            raw_value,
            value_code: parts.code,
            display_code: String::new(),
            name: String::new(),
            credits: None,
            section: parts.section,
            department: parts.department,
            curriculum_year: parts.curriculum_year,
            category,
            capacity: Capacity::default(),
        }
    }

    /// 用于显示的课程代码，页面文本里没有时退回选项值里的代码
    pub fn label(&self) -> &str {
        if self.display_code.is_empty() {
            &self.value_code
        } else {
            &self.display_code
        }
    }
}

impl fmt::Display for ClassOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {}",
            self.label(),
            self.name,
            self.section,
            self.capacity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_value_decomposes_into_its_parts() {
        let parts = RawValueParts {
            code: "IF4101".to_string(),
            section: "A".to_string(),
            curriculum_year: "2023".to_string(),
            department: "51100".to_string(),
        };
        let raw = [
            parts.code.as_str(),
            parts.section.as_str(),
            parts.curriculum_year.as_str(),
            parts.department.as_str(),
        ]
        .join("|");

        let class = ClassOption::from_raw(Category::Mbkm, raw);
        assert_eq!(RawValueParts::parse(&class.raw_value), parts);
        assert_eq!(class.value_code, parts.code);
        assert_eq!(class.section, parts.section);
        assert_eq!(class.curriculum_year, parts.curriculum_year);
        assert_eq!(class.department, parts.department);
    }

    #[test]
    fn extra_raw_value_fields_are_ignored() {
        let class = ClassOption::from_raw(Category::Major, "IF4101|A|2023|IF|EXTRA");
        // 选项值原样保留，只有前四个字段参与拆分
        assert_eq!(class.raw_value, "IF4101|A|2023|IF|EXTRA");
        assert_eq!(class.value_code, "IF4101");
        assert_eq!(class.section, "A");
        assert_eq!(class.curriculum_year, "2023");
        assert_eq!(class.department, "IF");
    }

    #[test]
    fn short_raw_value_leaves_fields_empty() {
        let parts = RawValueParts::parse("IF4101|B");
        assert_eq!(parts.code, "IF4101");
        assert_eq!(parts.section, "B");
        assert!(parts.curriculum_year.is_empty());
        assert!(parts.department.is_empty());
    }
}
