//! Domain models for users, categories, and transactions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// ENTRY TYPE
// =============================================================================

/// Direction of money flow, shared by categories and transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Income,
    Expense,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Income => "income",
            EntryType::Expense => "expense",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "income" => Ok(EntryType::Income),
            "expense" => Ok(EntryType::Expense),
            other => Err(Error::InvalidInput(format!(
                "type must be 'income' or 'expense', got '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// ROW LOCATOR
// =============================================================================

/// 1-based row index of a transaction's row in the mirror tab.
///
/// Serialized as a string (the `sheet_row_id` column is text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowLocator(u32);

impl RowLocator {
    /// Create a locator from a 1-based row index. Zero is rejected.
    pub fn new(row: u32) -> Result<Self> {
        if row == 0 {
            return Err(Error::InvalidInput(
                "row locator must be a positive integer".to_string(),
            ));
        }
        Ok(Self(row))
    }

    /// The 1-based row index.
    pub fn row(&self) -> u32 {
        self.0
    }

    /// The 0-based index used by dimension ranges.
    pub fn zero_based(&self) -> u32 {
        self.0 - 1
    }
}

impl fmt::Display for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowLocator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let row = s.trim().parse::<u32>().map_err(|_| {
            Error::InvalidInput(format!("row locator must be a positive integer, got '{}'", s))
        })?;
        Self::new(row)
    }
}

impl Serialize for RowLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RowLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// USERS & CATEGORIES
// =============================================================================

/// Account owner as known to the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// User-defined category for transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A stored income or expense record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    pub attachment_url: Option<String>,
    /// Mirror row locator. Written only by the sync layer.
    pub sheet_row_id: Option<RowLocator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction enriched with its category's display name (listing view).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionWithCategory {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub category_name: Option<String>,
}

/// Transaction joined with everything needed to rebuild its mirror row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileEntry {
    pub transaction: Transaction,
    pub category_name: Option<String>,
    pub owner_email: String,
}

/// Validated insert payload handed to the primary store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub category_id: Option<Uuid>,
    pub kind: EntryType,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    pub attachment_url: Option<String>,
}

/// Validated partial update handed to the primary store.
///
/// Outer `None` leaves a column untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionChanges {
    pub category_id: Option<Option<Uuid>>,
    pub kind: Option<EntryType>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub date: Option<NaiveDate>,
    pub merchant: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub attachment_url: Option<Option<String>>,
}

/// Client payload for creating a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    /// Raw category reference; an empty string means "no category".
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
}

/// Client payload for updating a transaction. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTransactionRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<String>>,
    #[serde(rename = "type", default)]
    pub kind: Option<EntryType>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub merchant: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub attachment_url: Option<Option<String>>,
}

/// Distinguishes an explicit `null` from an absent field.
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Normalize a raw category reference: empty or missing means no category.
pub fn normalize_category_id(raw: Option<&str>) -> Result<Option<Uuid>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("category_id '{}' is not a valid id", s))),
    }
}

fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::InvalidInput("amount must not be negative".to_string()));
    }
    Ok(amount)
}

fn normalize_currency(raw: Option<String>) -> String {
    match raw {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => defaults::CURRENCY.to_string(),
    }
}

impl CreateTransactionRequest {
    /// Validate and normalize into a store payload.
    pub fn into_new(self) -> Result<NewTransaction> {
        Ok(NewTransaction {
            category_id: normalize_category_id(self.category_id.as_deref())?,
            kind: self.kind,
            amount: validate_amount(self.amount)?,
            currency: normalize_currency(self.currency),
            date: self.date,
            merchant: self.merchant,
            notes: self.notes,
            attachment_url: self.attachment_url,
        })
    }
}

impl UpdateTransactionRequest {
    /// Validate and normalize into a store change set.
    pub fn into_changes(self) -> Result<TransactionChanges> {
        let category_id = match self.category_id {
            None => None,
            Some(raw) => Some(normalize_category_id(raw.as_deref())?),
        };
        let amount = self.amount.map(validate_amount).transpose()?;
        let currency = self.currency.map(|c| normalize_currency(Some(c)));

        Ok(TransactionChanges {
            category_id,
            kind: self.kind,
            amount,
            currency,
            date: self.date,
            merchant: self.merchant,
            notes: self.notes,
            attachment_url: self.attachment_url,
        })
    }
}
