pub use self::error::DatabaseError;
pub use self::files::LocalFileStore;
pub use self::manager::DatabaseManager;
pub use self::memory::{MemoryFileStore, MemoryTableStore};
pub use self::properties::ConfigProperties;
pub use self::stores::{FileStore, PropertySource, Row, TableStore};

pub mod error;
pub mod files;
pub mod manager;
pub mod memory;
pub mod properties;
pub mod stores;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
