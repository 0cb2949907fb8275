pub mod toml_loader;

pub use toml_loader::{load_priority_file, resolve_priority, PriorityEntry, PriorityFile};
