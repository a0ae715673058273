//! SQLite store and job repository for the vidslim pipeline.
//!
//! One store file, many independent worker connections: WAL journaling
//! with a busy timeout lets readers proceed while a single writer at a
//! time serializes through SQLite itself. The repository layers the job
//! state machine on top and is the only module that touches SQL.

pub mod error;
pub mod models;
pub mod pool;
pub mod repo;
pub mod schema;

pub use error::{DbError, Result};
pub use models::{StatusCount, VideoJob, VideoStatus};
pub use pool::{open_memory_pool, open_pool, DbSettings};
pub use repo::{JobRepo, JobStats};
pub use schema::ensure_schema;
