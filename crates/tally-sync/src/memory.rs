//! In-memory primary store for deterministic testing.
//!
//! Implements the user, category, and transaction repositories over shared
//! vectors. Clones share state, and individual operations can be forced to
//! fail to exercise partial-failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use tally_core::{
    Category, CategoryRepository, CreateCategoryRequest, Error, NewTransaction, ReconcileEntry,
    Result, RowLocator, Transaction, TransactionChanges, TransactionRepository,
    TransactionWithCategory, UserRepository,
};

/// Store operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpsertUser,
    Insert,
    Update,
    Fetch,
    Delete,
    SetSheetRowId,
    ShiftSheetRows,
    CategoryName,
    List,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, String>,
    categories: Vec<Category>,
    transactions: Vec<Transaction>,
    failing: HashSet<StoreOp>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.lock().failing.remove(&op);
    }

    /// Stored copy of a transaction regardless of owner.
    pub fn get(&self, id: Uuid) -> Option<Transaction> {
        self.lock().transactions.iter().find(|t| t.id == id).cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    pub fn user_email(&self, id: Uuid) -> Option<String> {
        self.lock().users.get(&id).cloned()
    }

    /// Seed a category directly, bypassing failure injection.
    pub fn add_category(&self, user_id: Uuid, name: &str, kind: tally_core::EntryType) -> Category {
        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            kind,
            created_at: now,
            updated_at: now,
        };
        self.lock().categories.push(category.clone());
        category
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, op: StoreOp) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.failing.contains(&op) {
            return Err(Error::Internal(format!("simulated {:?} failure", op)));
        }
        Ok(state)
    }
}

fn category_name(state: &State, id: Option<Uuid>) -> Option<String> {
    let id = id?;
    state
        .categories
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.name.clone())
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn upsert(&self, id: Uuid, email: &str) -> Result<()> {
        self.check(StoreOp::UpsertUser)?
            .users
            .insert(id, email.to_string());
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn list(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let state = self.check(StoreOp::List)?;
        let mut out: Vec<Category> = state
            .categories
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create(&self, user_id: Uuid, req: CreateCategoryRequest) -> Result<Category> {
        self.check(StoreOp::Insert)?;
        Ok(self.add_category(user_id, req.name.trim(), req.kind))
    }

    async fn fetch_name(&self, id: Uuid) -> Result<Option<String>> {
        let state = self.check(StoreOp::CategoryName)?;
        Ok(category_name(&state, Some(id)))
    }

    async fn belongs_to(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .lock()
            .categories
            .iter()
            .any(|c| c.id == id && c.user_id == user_id))
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn insert(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction> {
        let mut state = self.check(StoreOp::Insert)?;
        let now = Utc::now();
        let stored = Transaction {
            id: Uuid::now_v7(),
            user_id,
            category_id: tx.category_id,
            kind: tx.kind,
            amount: tx.amount.round_dp(2),
            currency: tx.currency,
            date: tx.date,
            merchant: tx.merchant,
            notes: tx.notes,
            attachment_url: tx.attachment_url,
            sheet_row_id: None,
            created_at: now,
            updated_at: now,
        };
        state.transactions.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        changes: TransactionChanges,
    ) -> Result<Option<Transaction>> {
        let mut state = self.check(StoreOp::Update)?;
        let Some(tx) = state
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(category_id) = changes.category_id {
            tx.category_id = category_id;
        }
        if let Some(kind) = changes.kind {
            tx.kind = kind;
        }
        if let Some(amount) = changes.amount {
            tx.amount = amount.round_dp(2);
        }
        if let Some(currency) = changes.currency {
            tx.currency = currency;
        }
        if let Some(date) = changes.date {
            tx.date = date;
        }
        if let Some(merchant) = changes.merchant {
            tx.merchant = merchant;
        }
        if let Some(notes) = changes.notes {
            tx.notes = notes;
        }
        if let Some(attachment_url) = changes.attachment_url {
            tx.attachment_url = attachment_url;
        }
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn fetch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Transaction>> {
        let state = self.check(StoreOp::Fetch)?;
        Ok(state
            .transactions
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut state = self.check(StoreOp::Delete)?;
        let before = state.transactions.len();
        state
            .transactions
            .retain(|t| !(t.id == id && t.user_id == user_id));
        Ok(state.transactions.len() < before)
    }

    async fn set_sheet_row_id(&self, id: Uuid, locator: Option<RowLocator>) -> Result<()> {
        let mut state = self.check(StoreOp::SetSheetRowId)?;
        let tx = state
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::TransactionNotFound(id))?;
        tx.sheet_row_id = locator;
        Ok(())
    }

    async fn shift_sheet_rows_after(&self, deleted: RowLocator) -> Result<u64> {
        let mut state = self.check(StoreOp::ShiftSheetRows)?;
        let mut shifted = 0;
        for tx in state.transactions.iter_mut() {
            if let Some(locator) = tx.sheet_row_id.filter(|l| l.row() > deleted.row()) {
                tx.sheet_row_id = RowLocator::new(locator.row() - 1).ok();
                shifted += 1;
            }
        }
        Ok(shifted)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionWithCategory>> {
        let state = self.check(StoreOp::List)?;
        let mut out: Vec<TransactionWithCategory> = state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| TransactionWithCategory {
                transaction: t.clone(),
                category_name: category_name(&state, t.category_id),
            })
            .collect();
        out.sort_by(|a, b| {
            b.transaction
                .date
                .cmp(&a.transaction.date)
                .then(b.transaction.created_at.cmp(&a.transaction.created_at))
        });
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn list_for_reconcile(&self) -> Result<Vec<ReconcileEntry>> {
        let state = self.check(StoreOp::List)?;
        Ok(state
            .transactions
            .iter()
            .filter_map(|t| {
                let owner_email = state.users.get(&t.user_id)?.clone();
                Some(ReconcileEntry {
                    transaction: t.clone(),
                    category_name: category_name(&state, t.category_id),
                    owner_email,
                })
            })
            .collect())
    }
}
