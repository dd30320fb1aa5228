pub mod error;
pub mod memory;
pub mod postgres_store;
pub mod record;
pub mod redb_store;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres_store::PostgresStore;
pub use record::{ConnectionRecord, JobKind, JobRecord, JobState, JobTrigger, Notification, ResultRecord};
pub use redb_store::RedbStore;
pub use store::{ConnectionStore, JobStore};
