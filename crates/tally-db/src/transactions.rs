//! Transaction repository implementation.
//!
//! Every user-facing query filters on both `id` and `user_id`. The
//! `sheet_row_id` column is only written through [`set_sheet_row_id`].
//!
//! [`set_sheet_row_id`]: TransactionRepository::set_sheet_row_id

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use tally_core::{
    Error, NewTransaction, ReconcileEntry, Result, RowLocator, Transaction, TransactionChanges,
    TransactionRepository, TransactionWithCategory,
};

const COLUMNS: &str = "t.id, t.user_id, t.category_id, t.type, t.amount, t.currency, t.date, \
                       t.merchant, t.notes, t.attachment_url, t.sheet_row_id, t.created_at, \
                       t.updated_at";

/// PostgreSQL implementation of TransactionRepository.
#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: Pool<Postgres>,
}

impl PgTransactionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.get("type");
    let sheet_row_id: Option<String> = row.get("sheet_row_id");
    Ok(Transaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        category_id: row.get("category_id"),
        kind: kind.parse()?,
        amount: row.get("amount"),
        currency: row.get("currency"),
        date: row.get("date"),
        merchant: row.get("merchant"),
        notes: row.get("notes"),
        attachment_url: row.get("attachment_url"),
        sheet_row_id: sheet_row_id.as_deref().map(str::parse).transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Split a tri-state change into a "touch this column" flag and its value.
fn tri<T>(change: Option<Option<T>>) -> (bool, Option<T>) {
    match change {
        Some(value) => (true, value),
        None => (false, None),
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn insert(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO transactions AS t
                (id, user_id, category_id, type, amount, currency, date,
                 merchant, notes, attachment_url, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(tx.category_id)
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.date)
        .bind(&tx.merchant)
        .bind(&tx.notes)
        .bind(&tx.attachment_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        transaction_from_row(&row)
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: TransactionChanges,
    ) -> Result<Option<Transaction>> {
        let (set_category, category_id) = tri(changes.category_id);
        let (set_merchant, merchant) = tri(changes.merchant);
        let (set_notes, notes) = tri(changes.notes);
        let (set_attachment, attachment_url) = tri(changes.attachment_url);

        let row = sqlx::query(&format!(
            "UPDATE transactions AS t SET
                category_id    = CASE WHEN $3 THEN $4::uuid ELSE t.category_id END,
                type           = COALESCE($5::text, t.type),
                amount         = COALESCE($6::numeric, t.amount),
                currency       = COALESCE($7::text, t.currency),
                date           = COALESCE($8::date, t.date),
                merchant       = CASE WHEN $9 THEN $10::text ELSE t.merchant END,
                notes          = CASE WHEN $11 THEN $12::text ELSE t.notes END,
                attachment_url = CASE WHEN $13 THEN $14::text ELSE t.attachment_url END,
                updated_at     = $15
             WHERE t.id = $1 AND t.user_id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(set_category)
        .bind(category_id)
        .bind(changes.kind.map(|k| k.as_str()))
        .bind(changes.amount)
        .bind(changes.currency)
        .bind(changes.date)
        .bind(set_merchant)
        .bind(merchant)
        .bind(set_notes)
        .bind(notes)
        .bind(set_attachment)
        .bind(attachment_url)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn fetch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transactions t WHERE t.id = $1 AND t.user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_sheet_row_id(&self, id: Uuid, locator: Option<RowLocator>) -> Result<()> {
        // updated_at is left alone so the mirror row written with it stays current.
        let result = sqlx::query("UPDATE transactions SET sheet_row_id = $2 WHERE id = $1")
            .bind(id)
            .bind(locator.map(|l| l.to_string()))
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::TransactionNotFound(id));
        }
        debug!(
            subsystem = "db",
            component = "transactions",
            op = "set_sheet_row_id",
            transaction_id = %id,
            row_locator = ?locator.map(|l| l.row()),
            "Row locator persisted"
        );
        Ok(())
    }

    async fn shift_sheet_rows_after(&self, deleted: RowLocator) -> Result<u64> {
        // Non-numeric locators are skipped rather than failing the cast.
        let result = sqlx::query(
            "UPDATE transactions
             SET sheet_row_id = (sheet_row_id::bigint - 1)::text
             WHERE CASE WHEN sheet_row_id ~ '^[0-9]{1,18}$'
                        THEN sheet_row_id::bigint > $1
                        ELSE false END",
        )
        .bind(i64::from(deleted.row()))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "transactions",
            op = "shift_sheet_rows_after",
            row_locator = deleted.row(),
            row_count = result.rows_affected(),
            "Row locators shifted after mirror delete"
        );
        Ok(result.rows_affected())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionWithCategory>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS}, c.name AS category_name
             FROM transactions t
             LEFT JOIN categories c ON c.id = t.category_id
             WHERE t.user_id = $1
             ORDER BY t.date DESC, t.created_at DESC
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(TransactionWithCategory {
                    transaction: transaction_from_row(row)?,
                    category_name: row.get("category_name"),
                })
            })
            .collect()
    }

    async fn list_for_reconcile(&self) -> Result<Vec<ReconcileEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS}, c.name AS category_name, u.email AS owner_email
             FROM transactions t
             JOIN users u ON u.id = t.user_id
             LEFT JOIN categories c ON c.id = t.category_id
             ORDER BY t.created_at ASC, t.id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(ReconcileEntry {
                    transaction: transaction_from_row(row)?,
                    category_name: row.get("category_name"),
                    owner_email: row.get("owner_email"),
                })
            })
            .collect()
    }
}
