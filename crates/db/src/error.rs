//! Errors surfaced by the repository functions.

use sqlx::migrate::MigrateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The lookup or update matched no row in the named table.
    #[error("no matching row in `{0}`")]
    NotFound(&'static str),

    #[error("migrations failed: {0}")]
    Migration(#[from] MigrateError),
}
