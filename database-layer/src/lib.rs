//! Database layer for the CarePoint platform
//!
//! Provides the PostgreSQL connection pool shared by the platform services
//! and the embedded billing schema migrations. Concurrency control lives in
//! the database: mutating services open one transaction per call and take
//! row-level locks on the rows they touch.

pub mod connection;
pub mod error;
pub mod migrations;

pub use connection::DatabasePool;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::run_migrations;
