pub mod captcha_relay;
pub mod frs_page;
pub mod notifier;
pub mod option_text;
pub mod page;

pub use captcha_relay::CaptchaRelay;
pub use frs_page::FrsPage;
pub use notifier::Notifier;
pub use page::{CaptchaImage, CaptureSource, PageActions, PageReader};
