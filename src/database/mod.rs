pub mod connection;
pub mod migrations;
pub mod schema;
pub mod session_repo;

pub use connection::DatabaseManager;
pub use migrations::{Migration, MigrationManager};
pub use schema::{create_schema, SCHEMA_VERSION};
pub use session_repo::SessionRepository;
