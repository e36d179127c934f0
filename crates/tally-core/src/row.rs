//! Mapping between transactions and the mirror's fixed-width rows.
//!
//! Column order is a wire contract with the spreadsheet:
//!
//! | # | Column |
//! |---|--------|
//! | 1 | id |
//! | 2 | owner email |
//! | 3 | date (`YYYY-MM-DD`) |
//! | 4 | type |
//! | 5 | category name |
//! | 6 | amount (numeric) |
//! | 7 | currency |
//! | 8 | merchant |
//! | 9 | notes |
//! | 10 | attachment URL |
//! | 11 | created at (RFC 3339) |
//! | 12 | updated at (RFC 3339) |
//!
//! Reordering or resizing requires migrating existing mirror data.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::Transaction;

/// Number of columns in a mirror row.
pub const ROW_WIDTH: usize = 12;

/// Index of the amount column (0-based).
const AMOUNT_COLUMN: usize = 5;

/// A single spreadsheet cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Render the cell as text (numbers use their shortest representation).
    pub fn as_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// One mirror row: exactly [`ROW_WIDTH`] positional cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetRow(Vec<Cell>);

impl SheetRow {
    /// Build a row, padding with empty text or truncating to [`ROW_WIDTH`].
    pub fn from_cells(mut cells: Vec<Cell>) -> Self {
        cells.truncate(ROW_WIDTH);
        while cells.len() < ROW_WIDTH {
            cells.push(Cell::text(""));
        }
        Self(cells)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    /// Field 1: the transaction id, as text.
    pub fn id(&self) -> String {
        self.0.first().map(Cell::as_text).unwrap_or_default()
    }
}

/// Parsed view of a mirror row.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorRecord {
    pub id: String,
    pub owner_email: String,
    pub date: String,
    pub kind: String,
    pub category_name: String,
    pub amount: f64,
    pub currency: String,
    pub merchant: String,
    pub notes: String,
    pub attachment_url: String,
    pub created_at: String,
    pub updated_at: String,
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl MirrorRecord {
    /// Project a transaction onto mirror fields.
    pub fn from_transaction(
        tx: &Transaction,
        category_name: Option<&str>,
        owner_email: &str,
    ) -> Self {
        let currency = if tx.currency.is_empty() {
            defaults::CURRENCY.to_string()
        } else {
            tx.currency.clone()
        };

        Self {
            id: tx.id.to_string(),
            owner_email: owner_email.to_string(),
            date: tx.date.format("%Y-%m-%d").to_string(),
            kind: tx.kind.as_str().to_string(),
            category_name: category_name.unwrap_or_default().to_string(),
            amount: tx.amount.to_f64().unwrap_or_default(),
            currency,
            merchant: tx.merchant.clone().unwrap_or_default(),
            notes: tx.notes.clone().unwrap_or_default(),
            attachment_url: tx.attachment_url.clone().unwrap_or_default(),
            created_at: timestamp(&tx.created_at),
            updated_at: timestamp(&tx.updated_at),
        }
    }

    /// Emit the fields in wire order.
    pub fn into_row(self) -> SheetRow {
        SheetRow(vec![
            Cell::Text(self.id),
            Cell::Text(self.owner_email),
            Cell::Text(self.date),
            Cell::Text(self.kind),
            Cell::Text(self.category_name),
            Cell::Number(self.amount),
            Cell::Text(self.currency),
            Cell::Text(self.merchant),
            Cell::Text(self.notes),
            Cell::Text(self.attachment_url),
            Cell::Text(self.created_at),
            Cell::Text(self.updated_at),
        ])
    }

    /// Field-wise comparison with numeric tolerance on the amount.
    pub fn matches(&self, other: &MirrorRecord) -> bool {
        (self.amount - other.amount).abs() < 1e-9
            && self.id == other.id
            && self.owner_email == other.owner_email
            && self.date == other.date
            && self.kind == other.kind
            && self.category_name == other.category_name
            && self.currency == other.currency
            && self.merchant == other.merchant
            && self.notes == other.notes
            && self.attachment_url == other.attachment_url
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
    }
}

/// Map a transaction to its mirror row.
pub fn to_row(tx: &Transaction, category_name: Option<&str>, owner_email: &str) -> SheetRow {
    MirrorRecord::from_transaction(tx, category_name, owner_email).into_row()
}

/// Parse a mirror row back into its fields.
///
/// Fails only when the amount column holds non-numeric text.
pub fn from_row(row: &SheetRow) -> Result<MirrorRecord> {
    let row = SheetRow::from_cells(row.0.clone());
    let text = |i: usize| row.0[i].as_text();

    let amount = match &row.0[AMOUNT_COLUMN] {
        Cell::Number(n) => *n,
        Cell::Text(s) if s.trim().is_empty() => 0.0,
        Cell::Text(s) => s.trim().replace(',', "").parse::<f64>().map_err(|_| {
            Error::InvalidInput(format!("amount column is not numeric: '{}'", s))
        })?,
    };

    Ok(MirrorRecord {
        id: text(0),
        owner_email: text(1),
        date: text(2),
        kind: text(3),
        category_name: text(4),
        amount,
        currency: text(6),
        merchant: text(7),
        notes: text(8),
        attachment_url: text(9),
        created_at: text(10),
        updated_at: text(11),
    })
}
