//! Reconciliation between the primary store and the mirror.
//!
//! A pass reads the mirror once, then walks every stored transaction and
//! converges its mirror row: missing rows are appended, lost or shifted
//! locators are relinked by id, and rows whose content drifted are
//! rewritten. Rows carrying ids the store does not know are left alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use tally_core::{
    from_row, MirrorRecord, ReconcileEntry, Result, RowLocator, SheetMirror, SheetRow,
    TransactionRepository,
};

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Rows appended for transactions missing from the mirror.
    pub appended: usize,
    /// Transactions whose stored locator was corrected.
    pub relinked: usize,
    /// Rows overwritten because their content drifted.
    pub rewritten: usize,
    /// Transactions already in sync.
    pub unchanged: usize,
    /// Transactions that could not be converged this pass.
    pub failed: usize,
}

impl ReconcileReport {
    /// Number of mirror writes performed.
    pub fn mirror_writes(&self) -> usize {
        self.appended + self.rewritten
    }
}

/// What a pass did to a single transaction.
#[derive(Debug, Default)]
struct Outcome {
    appended: bool,
    relinked: bool,
    rewritten: bool,
}

/// Mirror rows indexed by transaction id.
struct MirrorIndex {
    by_id: HashMap<String, Vec<RowLocator>>,
    rows: HashMap<RowLocator, SheetRow>,
}

impl MirrorIndex {
    fn build(rows: Vec<(RowLocator, SheetRow)>) -> Self {
        let mut by_id: HashMap<String, Vec<RowLocator>> = HashMap::new();
        let mut by_locator = HashMap::with_capacity(rows.len());
        for (locator, row) in rows {
            let id = row.id();
            if !id.is_empty() {
                by_id.entry(id).or_default().push(locator);
            }
            by_locator.insert(locator, row);
        }
        Self {
            by_id,
            rows: by_locator,
        }
    }

    /// Locator of the row carrying `id`, preferring the tracked one.
    fn find(&self, id: &str, tracked: Option<RowLocator>) -> Option<RowLocator> {
        let candidates = self.by_id.get(id)?;
        if let Some(tracked) = tracked.filter(|t| candidates.contains(t)) {
            return Some(tracked);
        }
        if candidates.len() > 1 {
            debug!(
                subsystem = "sync",
                component = "reconciler",
                transaction_id = id,
                copies = candidates.len(),
                "Duplicate mirror rows, using the first"
            );
        }
        candidates.first().copied()
    }

    fn row(&self, locator: RowLocator) -> Option<&SheetRow> {
        self.rows.get(&locator)
    }
}

/// Converges the mirror towards the primary store.
#[derive(Clone)]
pub struct Reconciler {
    transactions: Arc<dyn TransactionRepository>,
    mirror: Arc<dyn SheetMirror>,
}

impl Reconciler {
    pub fn new(transactions: Arc<dyn TransactionRepository>, mirror: Arc<dyn SheetMirror>) -> Self {
        Self {
            transactions,
            mirror,
        }
    }

    /// Run one pass. Idempotent: a second pass with no intervening change
    /// performs no mirror writes.
    ///
    /// Fails only when the store or the mirror cannot be read; per-transaction
    /// failures are counted in the report.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        if !self.mirror.is_enabled() {
            debug!(
                subsystem = "sync",
                component = "reconciler",
                "Mirror disabled, skipping reconciliation"
            );
            return Ok(ReconcileReport::default());
        }

        let start = Instant::now();
        let entries = self.transactions.list_for_reconcile().await?;
        let index = MirrorIndex::build(self.mirror.read_all().await?);

        let mut report = ReconcileReport::default();
        for entry in &entries {
            match self.converge(entry, &index).await {
                Ok(outcome) => {
                    if outcome.appended {
                        report.appended += 1;
                    }
                    if outcome.relinked {
                        report.relinked += 1;
                    }
                    if outcome.rewritten {
                        report.rewritten += 1;
                    }
                    if !(outcome.appended || outcome.relinked || outcome.rewritten) {
                        report.unchanged += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        subsystem = "sync",
                        component = "reconciler",
                        transaction_id = %entry.transaction.id,
                        error = %e,
                        "Failed to reconcile transaction"
                    );
                }
            }
        }

        info!(
            subsystem = "sync",
            component = "reconciler",
            row_count = entries.len(),
            appended = report.appended,
            relinked = report.relinked,
            rewritten = report.rewritten,
            unchanged = report.unchanged,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    async fn converge(&self, entry: &ReconcileEntry, index: &MirrorIndex) -> Result<Outcome> {
        let tx = &entry.transaction;
        let id = tx.id.to_string();
        let expected = MirrorRecord::from_transaction(
            tx,
            entry.category_name.as_deref(),
            &entry.owner_email,
        );
        let mut outcome = Outcome::default();

        let Some(locator) = index.find(&id, tx.sheet_row_id) else {
            let appended = self.mirror.append(&expected.into_row()).await?;
            if appended.is_some() || tx.sheet_row_id.is_some() {
                self.transactions.set_sheet_row_id(tx.id, appended).await?;
            }
            trace!(
                subsystem = "sync",
                component = "reconciler",
                transaction_id = %tx.id,
                row_locator = appended.map(|l| l.row()),
                "Appended missing mirror row"
            );
            outcome.appended = true;
            return Ok(outcome);
        };

        if tx.sheet_row_id != Some(locator) {
            self.transactions
                .set_sheet_row_id(tx.id, Some(locator))
                .await?;
            trace!(
                subsystem = "sync",
                component = "reconciler",
                transaction_id = %tx.id,
                row_locator = locator.row(),
                "Relinked mirror row"
            );
            outcome.relinked = true;
        }

        let in_sync = index
            .row(locator)
            .and_then(|row| from_row(row).ok())
            .is_some_and(|current| current.matches(&expected));
        if !in_sync {
            self.mirror.update(locator, &expected.into_row()).await?;
            trace!(
                subsystem = "sync",
                component = "reconciler",
                transaction_id = %tx.id,
                row_locator = locator.row(),
                "Rewrote drifted mirror row"
            );
            outcome.rewritten = true;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreOp};
    use crate::orchestrator::TransactionSync;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tally_core::{
        Cell, DisabledMirror, EntryType, NewTransaction, Transaction, TransactionChanges,
    };
    use tally_sheets::mock::{MockOp, MockSheetMirror};
    use uuid::Uuid;

    const EMAIL: &str = "owner@example.com";

    struct Fixture {
        sync: TransactionSync,
        reconciler: Reconciler,
        store: MemoryStore,
        mirror: MockSheetMirror,
        user: Uuid,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let mirror = MockSheetMirror::new().with_header();
        let sync = TransactionSync::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(mirror.clone()),
        );
        let reconciler = Reconciler::new(Arc::new(store.clone()), Arc::new(mirror.clone()));
        Fixture {
            sync,
            reconciler,
            store,
            mirror,
            user: Uuid::new_v4(),
        }
    }

    fn new_tx(merchant: &str) -> NewTransaction {
        NewTransaction {
            category_id: None,
            kind: EntryType::Expense,
            amount: Decimal::new(2000, 2),
            currency: "USD".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            merchant: Some(merchant.to_string()),
            notes: None,
            attachment_url: None,
        }
    }

    impl Fixture {
        async fn create(&self, merchant: &str) -> Transaction {
            self.sync.create(self.user, EMAIL, new_tx(merchant)).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_in_sync_store_is_unchanged() {
        let f = fixture();
        f.create("a").await;
        f.create("b").await;
        f.mirror.clear_calls();

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.unchanged, 2);
        assert_eq!(report.mirror_writes(), 0);
        assert_eq!(f.mirror.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_row_is_appended_and_tracked() {
        let f = fixture();
        f.mirror.fail(MockOp::Append);
        let tx = f.create("lost").await;
        assert_eq!(tx.sheet_row_id, None);
        f.mirror.recover(MockOp::Append);

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.appended, 1);
        let locator = f.store.get(tx.id).unwrap().sheet_row_id.unwrap();
        assert_eq!(f.mirror.row(locator).unwrap().id(), tx.id.to_string());
    }

    #[tokio::test]
    async fn test_lost_tracking_is_relinked_without_writes() {
        let f = fixture();
        f.store.fail(StoreOp::SetSheetRowId);
        let tx = f.create("untracked").await;
        f.store.recover(StoreOp::SetSheetRowId);
        f.mirror.clear_calls();

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.relinked, 1);
        assert_eq!(f.mirror.write_count(), 0);
        assert_eq!(f.store.get(tx.id).unwrap().sheet_row_id, RowLocator::new(2).ok());
    }

    #[tokio::test]
    async fn test_rows_shifted_by_delete_are_relinked() {
        let f = fixture();
        let first = f.create("first").await;
        let second = f.create("second").await;
        let third = f.create("third").await;
        assert_eq!(third.sheet_row_id, RowLocator::new(4).ok());

        f.sync.delete(first.id, f.user).await.unwrap();
        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.relinked, 2);
        assert_eq!(f.store.get(second.id).unwrap().sheet_row_id, RowLocator::new(2).ok());
        assert_eq!(f.store.get(third.id).unwrap().sheet_row_id, RowLocator::new(3).ok());
    }

    #[tokio::test]
    async fn test_drifted_row_is_rewritten() {
        let f = fixture();
        let tx = f.create("before").await;
        f.store
            .update(
                tx.id,
                f.user,
                TransactionChanges {
                    merchant: Some(Some("after".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        f.mirror.clear_calls();

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.rewritten, 1);
        let locator = tx.sheet_row_id.unwrap();
        assert_eq!(f.mirror.row(locator).unwrap().cells()[7], Cell::text("after"));
        assert_eq!(f.mirror.call_count(MockOp::Update), 1);
    }

    #[tokio::test]
    async fn test_second_pass_performs_no_writes() {
        let f = fixture();
        f.mirror.fail(MockOp::Append);
        f.create("one").await;
        f.mirror.recover(MockOp::Append);
        let kept = f.create("two").await;
        f.mirror
            .set_row(kept.sheet_row_id.unwrap(), SheetRow::from_cells(vec![Cell::text(kept.id.to_string())]));

        let first = f.reconciler.reconcile().await.unwrap();
        assert_eq!(first.mirror_writes(), 2);

        f.mirror.clear_calls();
        let second = f.reconciler.reconcile().await.unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(f.mirror.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_rows_are_left_alone() {
        let f = fixture();
        let stranger = SheetRow::from_cells(vec![Cell::text("not-a-known-id"), Cell::text("x")]);
        f.mirror.set_row(RowLocator::new(2).unwrap(), stranger.clone());
        f.create("mine").await;
        f.mirror.clear_calls();

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(f.mirror.write_count(), 0);
        assert_eq!(f.mirror.row(RowLocator::new(2).unwrap()), Some(stranger));
    }

    #[tokio::test]
    async fn test_tracked_duplicate_is_preferred() {
        let f = fixture();
        let tx = f.create("dup").await;
        let copy = f.mirror.row(tx.sheet_row_id.unwrap()).unwrap();
        f.mirror.set_row(RowLocator::new(5).unwrap(), copy);
        f.mirror.clear_calls();

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(f.store.get(tx.id).unwrap().sheet_row_id, tx.sheet_row_id);
    }

    #[tokio::test]
    async fn test_per_entry_failures_are_counted() {
        let f = fixture();
        f.mirror.fail(MockOp::Append);
        f.create("a").await;
        f.create("b").await;

        let report = f.reconciler.reconcile().await.unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.appended, 0);
    }

    #[tokio::test]
    async fn test_stale_locator_cleared_when_append_hides_location() {
        let store = MemoryStore::new();
        let mirror = MockSheetMirror::new().without_locators();
        let sync = TransactionSync::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(mirror.clone()),
        );
        let user = Uuid::new_v4();
        let tx = sync.create(user, EMAIL, new_tx("x")).await.unwrap();
        store
            .set_sheet_row_id(tx.id, RowLocator::new(30).ok())
            .await
            .unwrap();
        // Drop the only row so the transaction is missing from the mirror.
        mirror.remove_row(RowLocator::new(1).unwrap());

        let report = Reconciler::new(Arc::new(store.clone()), Arc::new(mirror.clone()))
            .reconcile()
            .await
            .unwrap();

        assert_eq!(report.appended, 1);
        assert_eq!(store.get(tx.id).unwrap().sheet_row_id, None);
    }

    #[tokio::test]
    async fn test_read_failure_fails_the_pass() {
        let f = fixture();
        f.create("a").await;
        f.mirror.fail(MockOp::ReadAll);
        assert!(f.reconciler.reconcile().await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_mirror_is_skipped() {
        let store = MemoryStore::new();
        store.fail(StoreOp::List);
        let reconciler = Reconciler::new(Arc::new(store), Arc::new(DisabledMirror));
        assert_eq!(reconciler.reconcile().await.unwrap(), ReconcileReport::default());
    }
}
