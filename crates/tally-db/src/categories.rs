//! Category repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use tally_core::{Category, CategoryRepository, CreateCategoryRequest, Error, Result};

/// PostgreSQL implementation of CategoryRepository.
#[derive(Clone)]
pub struct PgCategoryRepository {
    pool: Pool<Postgres>,
}

impl PgCategoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn category_from_row(row: &PgRow) -> Result<Category> {
    let kind: String = row.get("type");
    Ok(Category {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        kind: kind.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn list(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, type, created_at, updated_at
             FROM categories WHERE user_id = $1 ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(category_from_row).collect()
    }

    async fn create(&self, user_id: Uuid, req: CreateCategoryRequest) -> Result<Category> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO categories (id, user_id, name, type, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id, user_id, name, type, created_at, updated_at",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(req.name.trim())
        .bind(req.kind.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        category_from_row(&row)
    }

    async fn fetch_name(&self, id: Uuid) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(name)
    }

    async fn belongs_to(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(exists)
    }
}
