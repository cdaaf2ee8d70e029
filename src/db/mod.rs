pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod procedures;
pub mod scope;
mod sql;
pub mod store;
pub mod types;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use store::{Store, TxId, TxScope};
pub use types::{DbOperation, DbValue, WhereClause};
