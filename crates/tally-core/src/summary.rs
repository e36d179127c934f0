//! Dashboard aggregation over a user's transactions.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::defaults;
use crate::models::{EntryType, TransactionWithCategory};

/// Net flow for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyNet {
    /// `YYYY-MM`
    pub month: String,
    pub net: Decimal,
}

/// Expense total for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub name: String,
    pub value: Decimal,
}

/// Totals, monthly trend, and expense breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub income: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
    /// Ascending by month.
    pub trend: Vec<MonthlyNet>,
    /// Expenses only, ascending by category name.
    pub by_category: Vec<CategoryTotal>,
}

pub fn summarize(items: &[TransactionWithCategory]) -> Summary {
    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    let mut by_month: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();

    for item in items {
        let tx = &item.transaction;
        let month = tx.date.format("%Y-%m").to_string();
        let signed = match tx.kind {
            EntryType::Income => {
                income += tx.amount;
                tx.amount
            }
            EntryType::Expense => {
                expense += tx.amount;
                let name = item
                    .category_name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| defaults::UNCATEGORIZED.to_string());
                *by_category.entry(name).or_default() += tx.amount;
                -tx.amount
            }
        };
        *by_month.entry(month).or_default() += signed;
    }

    Summary {
        income,
        expense,
        balance: income - expense,
        trend: by_month
            .into_iter()
            .map(|(month, net)| MonthlyNet { month, net })
            .collect(),
        by_category: by_category
            .into_iter()
            .map(|(name, value)| CategoryTotal { name, value })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transaction;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn item(kind: EntryType, cents: i64, date: &str, category: Option<&str>) -> TransactionWithCategory {
        let now = Utc::now();
        TransactionWithCategory {
            transaction: Transaction {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                category_id: None,
                kind,
                amount: Decimal::new(cents, 2),
                currency: "USD".to_string(),
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                merchant: None,
                notes: None,
                attachment_url: None,
                sheet_row_id: None,
                created_at: now,
                updated_at: now,
            },
            category_name: category.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_summary() {
        let s = summarize(&[]);
        assert_eq!(s.income, Decimal::ZERO);
        assert_eq!(s.balance, Decimal::ZERO);
        assert!(s.trend.is_empty());
        assert!(s.by_category.is_empty());
    }

    #[test]
    fn test_totals_and_balance() {
        let s = summarize(&[
            item(EntryType::Income, 300000, "2026-01-31", Some("Salary")),
            item(EntryType::Expense, 4550, "2026-01-03", Some("Groceries")),
            item(EntryType::Expense, 1000, "2026-02-10", None),
        ]);
        assert_eq!(s.income, Decimal::new(300000, 2));
        assert_eq!(s.expense, Decimal::new(5550, 2));
        assert_eq!(s.balance, Decimal::new(294450, 2));
    }

    #[test]
    fn test_trend_is_sorted_by_month() {
        let s = summarize(&[
            item(EntryType::Expense, 1000, "2026-03-01", None),
            item(EntryType::Income, 5000, "2026-01-15", None),
            item(EntryType::Expense, 2000, "2026-01-20", None),
        ]);
        let months: Vec<&str> = s.trend.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2026-01", "2026-03"]);
        assert_eq!(s.trend[0].net, Decimal::new(3000, 2));
        assert_eq!(s.trend[1].net, Decimal::new(-1000, 2));
    }

    #[test]
    fn test_category_breakdown_counts_expenses_only() {
        let s = summarize(&[
            item(EntryType::Income, 5000, "2026-01-15", Some("Salary")),
            item(EntryType::Expense, 1000, "2026-01-20", Some("Rent")),
            item(EntryType::Expense, 250, "2026-01-21", None),
            item(EntryType::Expense, 250, "2026-01-22", Some("")),
        ]);
        assert_eq!(
            s.by_category,
            vec![
                CategoryTotal {
                    name: "Rent".to_string(),
                    value: Decimal::new(1000, 2)
                },
                CategoryTotal {
                    name: "Uncategorized".to_string(),
                    value: Decimal::new(500, 2)
                },
            ]
        );
    }
}
