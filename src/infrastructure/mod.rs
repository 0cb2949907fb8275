pub mod bus;
pub mod js_executor;
pub mod store;

pub use bus::{Bus, Command, Event, EventSink, StatusReport};
pub use js_executor::JsExecutor;
pub use store::{StateKey, StateSnapshot, Store};
