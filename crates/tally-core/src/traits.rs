//! Core traits for tally abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::row::SheetRow;

// =============================================================================
// PRIMARY STORE
// =============================================================================

/// Repository for account owners.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert the user, or refresh the email of an existing one.
    async fn upsert(&self, id: Uuid, email: &str) -> Result<()>;
}

/// Repository for category reference data.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// List a user's categories ordered by name.
    async fn list(&self, user_id: Uuid) -> Result<Vec<Category>>;

    /// Create a category owned by `user_id`.
    async fn create(&self, user_id: Uuid, req: CreateCategoryRequest) -> Result<Category>;

    /// Display name of a category, or `None` if it does not exist.
    async fn fetch_name(&self, id: Uuid) -> Result<Option<String>>;

    /// Whether the category exists and is owned by `user_id`.
    async fn belongs_to(&self, id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// Repository for transaction records. Every user-facing query is scoped by owner.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a transaction and return the stored record.
    async fn insert(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction>;

    /// Apply changes to a transaction owned by `user_id`.
    ///
    /// Returns `None` when no row matches both `id` and `user_id`.
    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: TransactionChanges,
    ) -> Result<Option<Transaction>>;

    /// Fetch a transaction owned by `user_id`.
    async fn fetch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Transaction>>;

    /// Delete a transaction owned by `user_id`. Returns whether a row was removed.
    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Record (or clear) the mirror row locator of a transaction.
    async fn set_sheet_row_id(&self, id: Uuid, locator: Option<RowLocator>) -> Result<()>;

    /// Move every locator below `deleted` up by one row, matching the mirror
    /// after that row was removed. Returns the number of records adjusted.
    async fn shift_sheet_rows_after(&self, deleted: RowLocator) -> Result<u64>;

    /// Newest-first listing enriched with category names.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionWithCategory>>;

    /// Every transaction with its owner email and category name.
    async fn list_for_reconcile(&self) -> Result<Vec<ReconcileEntry>>;
}

// =============================================================================
// SPREADSHEET MIRROR
// =============================================================================

/// Secondary, human-readable copy of transaction rows.
#[async_trait]
pub trait SheetMirror: Send + Sync {
    /// Append a row. Returns the row's locator when the response reveals it.
    async fn append(&self, row: &SheetRow) -> Result<Option<RowLocator>>;

    /// Overwrite the row at `locator`.
    async fn update(&self, locator: RowLocator, row: &SheetRow) -> Result<()>;

    /// Remove the row at `locator`, shifting later rows up.
    async fn delete(&self, locator: RowLocator) -> Result<()>;

    /// Read every row of the tab with its locator.
    async fn read_all(&self) -> Result<Vec<(RowLocator, SheetRow)>>;

    /// Whether writes actually reach a spreadsheet.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Mirror used when no spreadsheet is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMirror;

#[async_trait]
impl SheetMirror for DisabledMirror {
    async fn append(&self, _row: &SheetRow) -> Result<Option<RowLocator>> {
        Ok(None)
    }

    async fn update(&self, _locator: RowLocator, _row: &SheetRow) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _locator: RowLocator) -> Result<()> {
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<(RowLocator, SheetRow)>> {
        Ok(Vec::new())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
