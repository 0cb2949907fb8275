#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use frs_auto_taker::error::{AppError, Result};
use frs_auto_taker::infrastructure::{Event, EventSink, Store};
use frs_auto_taker::models::{Capacity, Category, ClassOption, ExtendedItem};
use frs_auto_taker::services::{
    CaptchaImage, CaptchaRelay, CaptureSource, Notifier, PageActions, PageReader,
};
use frs_auto_taker::workflow::{HuntSettings, HuntingEngine};
use tokio::sync::broadcast;

pub const CAPTCHA_URL: &str = "https://akademik.its.ac.id/securimage/securimage_show.php";

/// 合成页面的可变部分
#[derive(Default)]
pub struct PageState {
    pub classes: Vec<ClassOption>,
    /// 结果表格中的 (课程代码, 班级)
    pub acquired: Vec<(String, String)>,
    pub form_missing: bool,
    /// 提交时浏览器连接出错（不是页面结构问题）
    pub submit_fails: bool,
    pub prepared: Vec<String>,
    pub submitted: Vec<String>,
    pub captures: usize,
    pub reloads: usize,
    pub alerts: Vec<String>,
    pub overlays: Vec<Vec<ExtendedItem>>,
    pub overlay_removed: usize,
}

/// 供测试注入的页面
#[derive(Default)]
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn with_classes(classes: Vec<ClassOption>) -> Self {
        let page = Self::default();
        page.set_classes(classes);
        page
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_classes(&self, classes: Vec<ClassOption>) {
        self.with(|s| s.classes = classes);
    }

    pub fn mark_acquired(&self, class: &ClassOption) {
        let row = (class.label().to_string(), class.section.clone());
        self.with(|s| s.acquired.push(row));
    }

    pub fn break_form(&self) {
        self.with(|s| s.form_missing = true);
    }

    pub fn prepared(&self) -> Vec<String> {
        self.with(|s| s.prepared.clone())
    }

    pub fn submitted(&self) -> Vec<String> {
        self.with(|s| s.submitted.clone())
    }
}

impl PageReader for FakePage {
    async fn parse_options(&self) -> Result<Vec<ClassOption>> {
        Ok(self.with(|s| s.classes.clone()))
    }

    async fn is_acquired(&self, code: &str, section: &str) -> Result<bool> {
        Ok(self.with(|s| s.acquired.iter().any(|(c, k)| c == code && k == section)))
    }
}

impl PageActions for FakePage {
    async fn ensure_form(&self) -> Result<()> {
        if self.with(|s| s.form_missing) {
            return Err(AppError::missing("#sipform, #act, #key, #captcha_key"));
        }
        Ok(())
    }

    async fn prepare_claim(&self, raw_value: &str) -> Result<()> {
        self.with(|s| s.prepared.push(raw_value.to_string()));
        Ok(())
    }

    async fn capture_captcha(&self) -> Result<CaptchaImage> {
        self.with(|s| s.captures += 1);
        Ok(CaptchaImage {
            image_url: CAPTCHA_URL.to_string(),
            data_url: "data:image/png;base64,iVBORw0KGgo=".to_string(),
            via: CaptureSource::InPlace,
        })
    }

    async fn refresh_captcha(&self) -> Result<Option<CaptchaImage>> {
        Ok(Some(CaptchaImage {
            image_url: format!("{}?_=42", CAPTCHA_URL),
            data_url: "data:image/png;base64,R0lGODlh".to_string(),
            via: CaptureSource::Load,
        }))
    }

    async fn submit_captcha(&self, value: &str) -> Result<()> {
        self.ensure_form().await?;
        if self.with(|s| s.submit_fails) {
            return Err(AppError::Script("等待页面加载超时 (30 秒)".to_string()));
        }
        self.with(|s| s.submitted.push(value.to_string()));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.with(|s| s.reloads += 1);
        Ok(())
    }

    async fn show_increase_overlay(&self, items: &[ExtendedItem]) -> Result<()> {
        self.with(|s| s.overlays.push(items.to_vec()));
        Ok(())
    }

    async fn remove_overlay(&self) -> Result<()> {
        self.with(|s| s.overlay_removed += 1);
        Ok(())
    }

    async fn alert(&self, message: &str) -> Result<()> {
        self.with(|s| s.alerts.push(message.to_string()));
        Ok(())
    }

    fn context_id(&self) -> String {
        "fake-tab".to_string()
    }
}

pub fn raw(code: &str, section: &str) -> String {
    format!("{}|{}|2023|51100", code, section)
}

/// 有名额数字的班级
pub fn class(code: &str, section: &str, filled: u32, quota: u32) -> ClassOption {
    let mut c = unnumbered(code, section);
    c.capacity = Capacity::new(filled, quota);
    c
}

/// 页面上没有名额数字的班级
pub fn unnumbered(code: &str, section: &str) -> ClassOption {
    let mut c = ClassOption::from_raw(Category::Major, raw(code, section));
    c.display_code = code.to_string();
    c.name = format!("Mata Kuliah {}", code);
    c
}

pub fn engine(store: &Store, page: &Arc<FakePage>, events: &EventSink) -> HuntingEngine<FakePage> {
    engine_with_max(store, page, events, 8)
}

pub fn engine_with_max(
    store: &Store,
    page: &Arc<FakePage>,
    events: &EventSink,
    max_captcha_attempts: u32,
) -> HuntingEngine<FakePage> {
    HuntingEngine::new(
        store.clone(),
        page.clone(),
        CaptchaRelay::new(store.clone(), events.clone()),
        Notifier::new(events.clone()),
        HuntSettings {
            max_captcha_attempts,
            backoff: Duration::ZERO,
        },
    )
}

/// 取出目前收到的所有事件
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn notify_titles(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Notify { title, .. } => Some(title.clone()),
            _ => None,
        })
        .collect()
}
