//! Account owner repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use tally_core::{Error, Result, UserRepository};

/// PostgreSQL implementation of UserRepository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert(&self, id: Uuid, email: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email, updated_at = EXCLUDED.updated_at
                WHERE users.email IS DISTINCT FROM EXCLUDED.email
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
