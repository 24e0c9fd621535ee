pub mod identifier;
pub mod model;
pub mod printer;
pub mod serialization;
pub mod storage;

pub use identifier::Identifier;
pub use model::{HttpRecord, StoredRecord};
pub use storage::{HistoryRepository, JsonFileRepository, RawParts, StorageKind, create};
