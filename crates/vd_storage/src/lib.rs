pub mod document;
pub mod store;

pub use document::{from_json, to_document, to_json, StorageError};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, PersistenceError};
