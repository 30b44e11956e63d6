pub mod key;
pub mod path;
pub mod store;

pub use key::CacheKey;
pub use path::default_store_path;
pub use store::{FileStore, ImplementationStore, MemoryStore, StoreDocument, StoreError};
