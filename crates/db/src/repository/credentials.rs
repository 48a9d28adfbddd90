//! Encrypted credential storage.

use chrono::Utc;
use sqlx::PgPool;

use crate::{models::CredentialRow, DbError};

const COLUMNS: &str = "id, user_id, name, type, encrypted_value, created_at";

pub async fn create_credential(
    pool: &PgPool,
    id: &str,
    user_id: &str,
    name: &str,
    kind: &str,
    encrypted_value: &str,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(&format!(
        "INSERT INTO credentials (id, user_id, name, type, encrypted_value, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(user_id)
    .bind(name)
    .bind(kind)
    .bind(encrypted_value)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a credential owned by `user_id`.
///
/// A credential that exists under another owner is reported as
/// `DbError::NotFound`.
pub async fn get_credential(
    pool: &PgPool,
    id: &str,
    user_id: &str,
) -> Result<CredentialRow, DbError> {
    sqlx::query_as::<_, CredentialRow>(&format!(
        "SELECT {COLUMNS} FROM credentials WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound("credentials"))
}
