//! Transaction sync orchestrator.
//!
//! Composes each primary-store mutation with the matching mirror call and
//! owns the `sheet_row_id` field. The primary store is authoritative:
//!
//! | Operation | Store failure | Mirror failure |
//! |-----------|---------------|----------------|
//! | create | abort, no mirror call | logged and swallowed |
//! | update | abort, no mirror call | `MirrorDesync` |
//! | delete | abort, no mirror call | `MirrorDesync` |

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::{
    to_row, CategoryRepository, Error, MirrorOp, NewTransaction, Result, SheetMirror,
    Transaction, TransactionChanges, TransactionRepository, UserRepository,
};

/// Coordinates the primary store and the spreadsheet mirror.
#[derive(Clone)]
pub struct TransactionSync {
    users: Arc<dyn UserRepository>,
    categories: Arc<dyn CategoryRepository>,
    transactions: Arc<dyn TransactionRepository>,
    mirror: Arc<dyn SheetMirror>,
}

impl TransactionSync {
    pub fn new(
        users: Arc<dyn UserRepository>,
        categories: Arc<dyn CategoryRepository>,
        transactions: Arc<dyn TransactionRepository>,
        mirror: Arc<dyn SheetMirror>,
    ) -> Self {
        Self {
            users,
            categories,
            transactions,
            mirror,
        }
    }

    pub fn mirror(&self) -> &Arc<dyn SheetMirror> {
        &self.mirror
    }

    /// Reject categories owned by someone else before any side effect.
    async fn check_category(&self, category_id: Option<Uuid>, user_id: Uuid) -> Result<()> {
        if let Some(id) = category_id {
            if !self.categories.belongs_to(id, user_id).await? {
                return Err(Error::InvalidInput(format!(
                    "category_id {} does not belong to this user",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Best-effort category name: a lookup failure yields no name.
    async fn category_name(&self, tx: &Transaction) -> Option<String> {
        let id = tx.category_id?;
        match self.categories.fetch_name(id).await {
            Ok(name) => name,
            Err(e) => {
                warn!(
                    subsystem = "sync",
                    component = "orchestrator",
                    transaction_id = %tx.id,
                    error = %e,
                    "Category name lookup failed, mirroring without it"
                );
                None
            }
        }
    }

    /// Insert a transaction and append its mirror row.
    ///
    /// The mirror is best-effort: append failures are logged and the stored
    /// transaction is returned without a locator. If the locator cannot be
    /// persisted, the returned record also carries none, matching the store.
    pub async fn create(
        &self,
        user_id: Uuid,
        user_email: &str,
        new: NewTransaction,
    ) -> Result<Transaction> {
        self.check_category(new.category_id, user_id).await?;
        self.users.upsert(user_id, user_email).await?;
        let mut tx = self.transactions.insert(user_id, new).await?;

        let category = self.category_name(&tx).await;
        let row = to_row(&tx, category.as_deref(), user_email);

        match self.mirror.append(&row).await {
            Ok(Some(locator)) => {
                match self.transactions.set_sheet_row_id(tx.id, Some(locator)).await {
                    Ok(()) => {
                        tx.sheet_row_id = Some(locator);
                        debug!(
                            subsystem = "sync",
                            component = "orchestrator",
                            op = "create",
                            transaction_id = %tx.id,
                            row_locator = locator.row(),
                            "Transaction mirrored"
                        );
                    }
                    Err(e) => warn!(
                        subsystem = "sync",
                        component = "orchestrator",
                        op = "create",
                        transaction_id = %tx.id,
                        row_locator = locator.row(),
                        error = %e,
                        "Mirror row appended but locator not persisted; tracking lost until reconciled"
                    ),
                }
            }
            Ok(None) => debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "create",
                transaction_id = %tx.id,
                "Mirror append returned no locator"
            ),
            Err(e) => warn!(
                subsystem = "sync",
                component = "orchestrator",
                op = "create",
                transaction_id = %tx.id,
                error = %e,
                "Mirror append failed; transaction stored without mirror row"
            ),
        }

        Ok(tx)
    }

    /// Apply changes and rewrite the tracked mirror row.
    ///
    /// Untracked transactions are not mirrored (no retroactive append).
    pub async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        user_email: &str,
        changes: TransactionChanges,
    ) -> Result<Transaction> {
        if let Some(category_id) = changes.category_id {
            self.check_category(category_id, user_id).await?;
        }

        let tx = self
            .transactions
            .update(id, user_id, changes)
            .await?
            .ok_or(Error::TransactionNotFound(id))?;

        let Some(locator) = tx.sheet_row_id else {
            debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "update",
                transaction_id = %id,
                "No mirror row tracked, skipping mirror update"
            );
            return Ok(tx);
        };

        let category = self.category_name(&tx).await;
        let row = to_row(&tx, category.as_deref(), user_email);
        self.mirror.update(locator, &row).await.map_err(|e| {
            warn!(
                subsystem = "sync",
                component = "orchestrator",
                op = "update",
                transaction_id = %id,
                row_locator = locator.row(),
                error = %e,
                "Mirror update failed after primary update committed"
            );
            Error::desync(MirrorOp::Update, id, e)
        })?;

        Ok(tx)
    }

    /// Delete a transaction and its tracked mirror row.
    ///
    /// Deleting a record that does not exist (or belongs to someone else)
    /// succeeds without touching the mirror.
    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        // Read the locator first; it is gone once the row is deleted.
        let locator = self
            .transactions
            .fetch(id, user_id)
            .await?
            .and_then(|tx| tx.sheet_row_id);

        if !self.transactions.delete(id, user_id).await? {
            debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "delete",
                transaction_id = %id,
                "Nothing to delete"
            );
            return Ok(());
        }

        let Some(locator) = locator else {
            return Ok(());
        };

        self.mirror.delete(locator).await.map_err(|e| {
            warn!(
                subsystem = "sync",
                component = "orchestrator",
                op = "delete",
                transaction_id = %id,
                row_locator = locator.row(),
                error = %e,
                "Mirror delete failed after primary delete committed"
            );
            Error::desync(MirrorOp::Delete, id, e)
        })?;

        // The mirror moved every later row up by one; follow it.
        let shifted = self
            .transactions
            .shift_sheet_rows_after(locator)
            .await
            .map_err(|e| {
                warn!(
                    subsystem = "sync",
                    component = "orchestrator",
                    op = "delete",
                    transaction_id = %id,
                    row_locator = locator.row(),
                    error = %e,
                    "Row locators not shifted after mirror delete, tracking stale until reconciled"
                );
                Error::desync(MirrorOp::Delete, id, e)
            })?;

        info!(
            subsystem = "sync",
            component = "orchestrator",
            op = "delete",
            transaction_id = %id,
            row_locator = locator.row(),
            row_count = shifted,
            "Transaction and mirror row deleted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreOp};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tally_core::{
        normalize_category_id, Cell, CreateTransactionRequest, EntryType, RowLocator, SheetRow,
        UpdateTransactionRequest,
    };
    use tally_sheets::mock::{MockOp, MockSheetMirror};

    const EMAIL: &str = "owner@example.com";

    fn setup(mirror: MockSheetMirror) -> (TransactionSync, MemoryStore, MockSheetMirror) {
        let store = MemoryStore::new();
        let sync = TransactionSync::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(mirror.clone()),
        );
        (sync, store, mirror)
    }

    fn new_tx() -> NewTransaction {
        NewTransaction {
            category_id: None,
            kind: EntryType::Expense,
            amount: Decimal::new(1250, 2),
            currency: "USD".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            merchant: Some("Cafe".to_string()),
            notes: None,
            attachment_url: None,
        }
    }

    /// A mirror whose next append lands on row 42.
    fn mirror_at_row_42() -> MockSheetMirror {
        let mirror = MockSheetMirror::new();
        for row in 1..=41u32 {
            mirror.set_row(
                RowLocator::new(row).unwrap(),
                SheetRow::from_cells(vec![Cell::text(format!("other-{}", row))]),
            );
        }
        mirror
    }

    // -------------------------------------------------------------------------
    // create
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_persists_returned_locator() {
        let (sync, store, _mirror) = setup(mirror_at_row_42());
        let user = Uuid::new_v4();

        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();

        let expected = RowLocator::new(42).unwrap();
        assert_eq!(tx.sheet_row_id, Some(expected));
        assert_eq!(store.get(tx.id).unwrap().sheet_row_id, Some(expected));
    }

    #[tokio::test]
    async fn test_create_appends_mapped_row() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let groceries = store.add_category(user, "Groceries", EntryType::Expense);

        let tx = sync
            .create(
                user,
                EMAIL,
                NewTransaction {
                    category_id: Some(groceries.id),
                    ..new_tx()
                },
            )
            .await
            .unwrap();

        let calls = mirror.calls();
        assert_eq!(calls.len(), 1);
        let row = calls[0].row.as_ref().unwrap();
        assert_eq!(row.id(), tx.id.to_string());
        assert_eq!(row.cells()[1], Cell::text(EMAIL));
        assert_eq!(row.cells()[4], Cell::text("Groceries"));
        assert_eq!(store.user_email(user).as_deref(), Some(EMAIL));
    }

    #[tokio::test]
    async fn test_create_survives_mirror_failure() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        mirror.fail(MockOp::Append);

        let tx = sync.create(Uuid::new_v4(), EMAIL, new_tx()).await.unwrap();

        assert_eq!(tx.sheet_row_id, None);
        assert!(store.get(tx.id).is_some());
        assert_eq!(mirror.call_count(MockOp::Append), 1);
    }

    #[tokio::test]
    async fn test_create_without_locator_leaves_tracking_empty() {
        let (sync, store, _mirror) = setup(MockSheetMirror::new().without_locators());
        let tx = sync.create(Uuid::new_v4(), EMAIL, new_tx()).await.unwrap();
        assert_eq!(tx.sheet_row_id, None);
        assert_eq!(store.get(tx.id).unwrap().sheet_row_id, None);
    }

    #[tokio::test]
    async fn test_create_tolerates_lost_locator() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        store.fail(StoreOp::SetSheetRowId);

        let tx = sync.create(Uuid::new_v4(), EMAIL, new_tx()).await.unwrap();

        assert_eq!(tx.sheet_row_id, None);
        assert_eq!(store.get(tx.id).unwrap().sheet_row_id, None);
        assert_eq!(mirror.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_create_store_failure_skips_mirror() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        store.fail(StoreOp::Insert);

        assert!(sync.create(Uuid::new_v4(), EMAIL, new_tx()).await.is_err());
        assert_eq!(mirror.write_count(), 0);
    }

    #[tokio::test]
    async fn test_create_category_lookup_failure_uses_empty_name() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let cat = store.add_category(user, "Rent", EntryType::Expense);
        store.fail(StoreOp::CategoryName);

        let tx = sync
            .create(
                user,
                EMAIL,
                NewTransaction {
                    category_id: Some(cat.id),
                    ..new_tx()
                },
            )
            .await
            .unwrap();

        assert!(tx.sheet_row_id.is_some());
        assert_eq!(mirror.rows()[0].cells()[4], Cell::text(""));
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_category_before_side_effects() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let someone_else = store.add_category(Uuid::new_v4(), "Theirs", EntryType::Expense);

        let err = sync
            .create(
                Uuid::new_v4(),
                EMAIL,
                NewTransaction {
                    category_id: Some(someone_else.id),
                    ..new_tx()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.transactions().is_empty());
        assert_eq!(mirror.write_count(), 0);
    }

    #[tokio::test]
    async fn test_create_twice_is_not_deduplicated() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();

        let a = sync.create(user, EMAIL, new_tx()).await.unwrap();
        let b = sync.create(user, EMAIL, new_tx()).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.transactions().len(), 2);
        assert_eq!(mirror.call_count(MockOp::Append), 2);
    }

    #[tokio::test]
    async fn test_empty_category_in_payload_reaches_store_as_null() {
        let (sync, store, _mirror) = setup(MockSheetMirror::new());
        let req: CreateTransactionRequest = serde_json::from_value(serde_json::json!({
            "category_id": "",
            "type": "expense",
            "amount": 3,
            "date": "2026-06-02"
        }))
        .unwrap();

        let tx = sync
            .create(Uuid::new_v4(), EMAIL, req.into_new().unwrap())
            .await
            .unwrap();
        assert_eq!(store.get(tx.id).unwrap().category_id, None);
        assert_eq!(normalize_category_id(Some("")).unwrap(), None);
    }

    // -------------------------------------------------------------------------
    // update
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_untracked_never_calls_mirror() {
        let (sync, _store, mirror) = setup(MockSheetMirror::new());
        mirror.fail(MockOp::Append);
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        mirror.clear_calls();

        let changes = TransactionChanges {
            notes: Some(Some("edited".to_string())),
            ..Default::default()
        };
        let updated = sync.update(tx.id, user, EMAIL, changes).await.unwrap();

        assert_eq!(updated.notes.as_deref(), Some("edited"));
        assert!(mirror.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_tracked_rewrites_row_at_locator() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        let seven = RowLocator::new(7).unwrap();
        store.set_sheet_row_id(tx.id, Some(seven)).await.unwrap();
        mirror.clear_calls();

        sync.update(
            tx.id,
            user,
            EMAIL,
            TransactionChanges {
                amount: Some(Decimal::new(99, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let calls = mirror.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, MockOp::Update);
        assert_eq!(calls[0].locator, Some(seven));
        assert_eq!(calls[0].row.as_ref().unwrap().id(), tx.id.to_string());
        assert_eq!(calls[0].row.as_ref().unwrap().cells()[5], Cell::Number(99.0));
    }

    #[tokio::test]
    async fn test_update_mirror_failure_is_desync_after_commit() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        mirror.fail(MockOp::Update);

        let err = sync
            .update(
                tx.id,
                user,
                EMAIL,
                TransactionChanges {
                    merchant: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::MirrorDesync { op: MirrorOp::Update, transaction_id, .. } if transaction_id == tx.id
        ));
        assert_eq!(store.get(tx.id).unwrap().merchant, None);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (sync, _store, mirror) = setup(MockSheetMirror::new());
        let id = Uuid::new_v4();
        let err = sync
            .update(id, Uuid::new_v4(), EMAIL, TransactionChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransactionNotFound(x) if x == id));
        assert!(mirror.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_other_owner_is_not_found() {
        let (sync, store, _mirror) = setup(MockSheetMirror::new());
        let owner = Uuid::new_v4();
        let tx = sync.create(owner, EMAIL, new_tx()).await.unwrap();

        let err = sync
            .update(
                tx.id,
                Uuid::new_v4(),
                EMAIL,
                TransactionChanges {
                    notes: Some(Some("hijack".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransactionNotFound(_)));
        assert_eq!(store.get(tx.id).unwrap().notes, None);
    }

    #[tokio::test]
    async fn test_update_empty_category_clears_it() {
        let (sync, store, _mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let cat = store.add_category(user, "Fun", EntryType::Expense);
        let tx = sync
            .create(
                user,
                EMAIL,
                NewTransaction {
                    category_id: Some(cat.id),
                    ..new_tx()
                },
            )
            .await
            .unwrap();

        let req: UpdateTransactionRequest =
            serde_json::from_value(serde_json::json!({ "category_id": "" })).unwrap();
        sync.update(tx.id, user, EMAIL, req.into_changes().unwrap())
            .await
            .unwrap();

        assert_eq!(store.get(tx.id).unwrap().category_id, None);
    }

    // -------------------------------------------------------------------------
    // delete
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_delete_tracked_removes_mirror_row() {
        let (sync, store, mirror) = setup(MockSheetMirror::new().with_header());
        let user = Uuid::new_v4();
        sync.create(user, EMAIL, new_tx()).await.unwrap();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        assert_eq!(tx.sheet_row_id, RowLocator::new(3).ok());
        mirror.clear_calls();

        sync.delete(tx.id, user).await.unwrap();

        assert!(store.get(tx.id).is_none());
        let calls = mirror.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, MockOp::Delete);
        assert_eq!(calls[0].locator, RowLocator::new(3).ok());
    }

    #[tokio::test]
    async fn test_delete_shifts_later_locators_so_updates_hit_their_own_row() {
        let (sync, store, mirror) = setup(MockSheetMirror::new().with_header());
        let user = Uuid::new_v4();
        let a = sync.create(user, EMAIL, new_tx()).await.unwrap();
        let b = sync.create(user, EMAIL, new_tx()).await.unwrap();
        let c = sync.create(Uuid::new_v4(), "other@example.com", new_tx()).await.unwrap();
        assert_eq!(c.sheet_row_id, RowLocator::new(4).ok());

        sync.delete(a.id, user).await.unwrap();

        assert_eq!(store.get(b.id).unwrap().sheet_row_id, RowLocator::new(2).ok());
        assert_eq!(store.get(c.id).unwrap().sheet_row_id, RowLocator::new(3).ok());

        sync.update(
            b.id,
            user,
            EMAIL,
            TransactionChanges {
                notes: Some(Some("split".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let ids: Vec<String> = mirror.rows().iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1], b.id.to_string());
        assert_eq!(ids[2], c.id.to_string());
    }

    #[tokio::test]
    async fn test_delete_shift_failure_is_desync() {
        let (sync, store, mirror) = setup(MockSheetMirror::new().with_header());
        let user = Uuid::new_v4();
        let a = sync.create(user, EMAIL, new_tx()).await.unwrap();
        let b = sync.create(user, EMAIL, new_tx()).await.unwrap();
        store.fail(StoreOp::ShiftSheetRows);

        let err = sync.delete(a.id, user).await.unwrap_err();

        assert!(matches!(err, Error::MirrorDesync { op: MirrorOp::Delete, .. }));
        assert_eq!(mirror.call_count(MockOp::Delete), 1);
        assert_eq!(store.get(b.id).unwrap().sheet_row_id, RowLocator::new(3).ok());
    }

    #[tokio::test]
    async fn test_delete_store_failure_never_calls_mirror() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        mirror.clear_calls();
        store.fail(StoreOp::Delete);

        assert!(sync.delete(tx.id, user).await.is_err());
        assert!(store.get(tx.id).is_some());
        assert_eq!(mirror.call_count(MockOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_delete_mirror_failure_is_desync_after_commit() {
        let (sync, store, mirror) = setup(MockSheetMirror::new());
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        mirror.fail(MockOp::Delete);

        let err = sync.delete(tx.id, user).await.unwrap_err();

        assert!(matches!(err, Error::MirrorDesync { op: MirrorOp::Delete, .. }));
        assert!(store.get(tx.id).is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_succeeds_without_mirror_call() {
        let (sync, _store, mirror) = setup(MockSheetMirror::new());
        sync.delete(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        assert!(mirror.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_untracked_skips_mirror() {
        let (sync, store, mirror) = setup(MockSheetMirror::new().without_locators());
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx()).await.unwrap();
        mirror.clear_calls();

        sync.delete(tx.id, user).await.unwrap();
        assert!(store.get(tx.id).is_none());
        assert!(mirror.calls().is_empty());
    }
}
