pub mod json_file;
pub mod memory;
pub mod models;
pub mod store;

pub use json_file::{default_store_path, JsonFileStore};
pub use memory::MemoryStore;
pub use models::{DailyTiming, SessionTiming, WeeklyTiming};
pub use store::{Store, StoreChange, StoreError, StoreExt, StoreKey};
