//! Database layer
//!
//! Database abstraction for the Picnest photo album. Supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The driver is selected by configuration; repositories dispatch on the
//! pool variant and carry SQL for both backends. Embedded code-based
//! migrations run at startup.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, Db, DbPool};
