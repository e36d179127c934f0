//! In-memory spreadsheet mirror for deterministic testing.
//!
//! Behaves like a single tab: appends land after the last row, deletes
//! shift later rows up. Every call is logged and any operation can be
//! forced to fail.
//!
//! ```rust,ignore
//! use tally_sheets::mock::{MockOp, MockSheetMirror};
//!
//! let mirror = MockSheetMirror::new().with_header();
//! mirror.fail(MockOp::Update);
//! assert!(mirror.update(locator, &row).await.is_err());
//! assert_eq!(mirror.call_count(MockOp::Update), 1);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use tally_core::{Cell, Error, Result, RowLocator, SheetMirror, SheetRow};

/// Mirror operation kinds recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Append,
    Update,
    Delete,
    ReadAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub op: MockOp,
    pub locator: Option<RowLocator>,
    pub row: Option<SheetRow>,
}

#[derive(Default)]
struct State {
    rows: Vec<SheetRow>,
    calls: Vec<MockCall>,
    failing: HashSet<MockOp>,
    hide_locators: bool,
}

/// Mock spreadsheet mirror. Clones share state.
#[derive(Clone, Default)]
pub struct MockSheetMirror {
    state: Arc<Mutex<State>>,
}

impl MockSheetMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy row 1 with column titles, as a real ledger tab would.
    pub fn with_header(self) -> Self {
        let header = [
            "id", "email", "date", "type", "category", "amount", "currency", "merchant", "notes",
            "attachment", "created_at", "updated_at",
        ];
        self.lock()
            .rows
            .insert(0, SheetRow::from_cells(header.iter().map(|h| Cell::text(*h)).collect()));
        self
    }

    /// Make `append` succeed without revealing where the row landed.
    pub fn without_locators(self) -> Self {
        self.lock().hide_locators = true;
        self
    }

    /// Force every subsequent `op` call to fail.
    pub fn fail(&self, op: MockOp) {
        self.lock().failing.insert(op);
    }

    /// Stop failing `op` calls.
    pub fn recover(&self, op: MockOp) {
        self.lock().failing.remove(&op);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Number of mutating calls (append, update, delete).
    pub fn write_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op != MockOp::ReadAll)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Snapshot of the tab, row 1 first.
    pub fn rows(&self) -> Vec<SheetRow> {
        self.lock().rows.clone()
    }

    /// Row at `locator`, if the tab is that long.
    pub fn row(&self, locator: RowLocator) -> Option<SheetRow> {
        self.lock().rows.get(locator.zero_based() as usize).cloned()
    }

    /// Overwrite a row directly, bypassing the call log.
    pub fn set_row(&self, locator: RowLocator, row: SheetRow) {
        let mut state = self.lock();
        write_at(&mut state.rows, locator, row);
    }

    /// Remove a row directly, bypassing the call log.
    pub fn remove_row(&self, locator: RowLocator) {
        let mut state = self.lock();
        let idx = locator.zero_based() as usize;
        if idx < state.rows.len() {
            state.rows.remove(idx);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, op: MockOp, locator: Option<RowLocator>, row: Option<&SheetRow>) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall {
            op,
            locator,
            row: row.cloned(),
        });
        if state.failing.contains(&op) {
            return Err(Error::Mirror(format!("simulated {:?} failure", op)));
        }
        Ok(())
    }
}

fn write_at(rows: &mut Vec<SheetRow>, locator: RowLocator, row: SheetRow) {
    let idx = locator.zero_based() as usize;
    while rows.len() <= idx {
        rows.push(SheetRow::from_cells(Vec::new()));
    }
    rows[idx] = row;
}

#[async_trait]
impl SheetMirror for MockSheetMirror {
    async fn append(&self, row: &SheetRow) -> Result<Option<RowLocator>> {
        self.record(MockOp::Append, None, Some(row))?;
        let mut state = self.lock();
        state.rows.push(row.clone());
        if state.hide_locators {
            return Ok(None);
        }
        Ok(Some(RowLocator::new(state.rows.len() as u32)?))
    }

    async fn update(&self, locator: RowLocator, row: &SheetRow) -> Result<()> {
        self.record(MockOp::Update, Some(locator), Some(row))?;
        write_at(&mut self.lock().rows, locator, row.clone());
        Ok(())
    }

    async fn delete(&self, locator: RowLocator) -> Result<()> {
        self.record(MockOp::Delete, Some(locator), None)?;
        self.remove_row(locator);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<(RowLocator, SheetRow)>> {
        self.record(MockOp::ReadAll, None, None)?;
        let state = self.lock();
        let mut out = Vec::with_capacity(state.rows.len());
        for (i, row) in state.rows.iter().enumerate() {
            if row.cells().iter().all(|c| c.as_text().is_empty()) {
                continue;
            }
            out.push((RowLocator::new(i as u32 + 1)?, row.clone()));
        }
        Ok(out)
    }
}
