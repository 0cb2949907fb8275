use tracing::info;

use crate::infrastructure::{Event, EventSink};

/// 操作员通知
#[derive(Clone)]
pub struct Notifier {
    events: EventSink,
}

impl Notifier {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }

    pub fn notify(&self, title: &str, message: &str) {
        info!("🔔 {}: {}", title, message);
        self.events.emit(Event::Notify {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
