pub mod schema;
pub mod store;

pub use schema::{SqliteSchema, packages_schema, schema_exists};
pub use store::SqliteStore;
