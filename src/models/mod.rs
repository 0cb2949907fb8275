pub mod class_option;
pub mod loaders;
pub mod state;

pub use class_option::{Capacity, Category, ClassOption, RawValueParts};
pub use loaders::{load_priority_file, resolve_priority, PriorityFile};
pub use state::{
    BaselineEntry, CachedClasses, CaptchaMeta, CaptchaSnapshot, ExtendedItem, PendingAttempt,
    QuotaBaseline, RunMode, UserOptions, WatchStatus,
};
