mod pool;
mod schema;
mod store;

pub use pool::Database;
pub use schema::{migrate, SCHEMA_SQL};
pub use store::PgNodeStore;
