//! PostgreSQL repository tests.
//!
//! Require a migrated database at `DATABASE_URL`; run with
//! `cargo test -p tally-db -- --ignored`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use tally_db::test_fixtures::TestDatabase;
use tally_db::{
    CategoryRepository, CreateCategoryRequest, EntryType, NewTransaction, RowLocator,
    TransactionChanges, TransactionRepository, UserRepository,
};

/// Connect after loading `.env`, so a local `DATABASE_URL` is picked up.
async fn fixture() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await.expect("connect")
}

fn new_tx(day: u32, category_id: Option<Uuid>) -> NewTransaction {
    NewTransaction {
        category_id,
        kind: EntryType::Expense,
        amount: Decimal::new(1999, 2),
        currency: "USD".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 5, day).unwrap(),
        merchant: Some("Bakery".to_string()),
        notes: None,
        attachment_url: None,
    }
}

#[tokio::test]
#[ignore]
async fn test_insert_then_fetch_scoped_by_owner() {
    let fx = fixture().await;
    let tx = fx
        .db
        .transactions
        .insert(fx.user_id, new_tx(3, None))
        .await
        .expect("insert");

    assert_eq!(tx.amount, Decimal::new(1999, 2));
    assert_eq!(tx.sheet_row_id, None);

    let found = fx.db.transactions.fetch(tx.id, fx.user_id).await.unwrap();
    assert_eq!(found, Some(tx.clone()));

    let stranger = fx.db.transactions.fetch(tx.id, Uuid::new_v4()).await.unwrap();
    assert!(stranger.is_none());

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_update_applies_partial_changes() {
    let fx = fixture().await;
    let tx = fx
        .db
        .transactions
        .insert(fx.user_id, new_tx(3, None))
        .await
        .unwrap();

    let changes = TransactionChanges {
        amount: Some(Decimal::new(500, 2)),
        merchant: Some(None),
        notes: Some(Some("split".to_string())),
        ..Default::default()
    };
    let updated = fx
        .db
        .transactions
        .update(tx.id, fx.user_id, changes)
        .await
        .unwrap()
        .expect("row exists");

    assert_eq!(updated.amount, Decimal::new(500, 2));
    assert_eq!(updated.merchant, None);
    assert_eq!(updated.notes.as_deref(), Some("split"));
    assert_eq!(updated.currency, "USD");
    assert!(updated.updated_at >= tx.updated_at);

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_update_other_owner_matches_nothing() {
    let fx = fixture().await;
    let tx = fx
        .db
        .transactions
        .insert(fx.user_id, new_tx(3, None))
        .await
        .unwrap();

    let result = fx
        .db
        .transactions
        .update(tx.id, Uuid::new_v4(), TransactionChanges::default())
        .await
        .unwrap();
    assert!(result.is_none());

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_sheet_row_id_round_trips() {
    let fx = fixture().await;
    let tx = fx
        .db
        .transactions
        .insert(fx.user_id, new_tx(3, None))
        .await
        .unwrap();

    let locator = RowLocator::new(42).unwrap();
    fx.db
        .transactions
        .set_sheet_row_id(tx.id, Some(locator))
        .await
        .unwrap();

    let stored = fx
        .db
        .transactions
        .fetch(tx.id, fx.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sheet_row_id, Some(locator));
    assert_eq!(stored.updated_at, tx.updated_at);

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_delete_reports_whether_row_existed() {
    let fx = fixture().await;
    let tx = fx
        .db
        .transactions
        .insert(fx.user_id, new_tx(3, None))
        .await
        .unwrap();

    assert!(!fx.db.transactions.delete(tx.id, Uuid::new_v4()).await.unwrap());
    assert!(fx.db.transactions.delete(tx.id, fx.user_id).await.unwrap());
    assert!(!fx.db.transactions.delete(tx.id, fx.user_id).await.unwrap());

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_list_is_newest_first_with_category_names() {
    let fx = fixture().await;
    let groceries = fx
        .db
        .categories
        .create(
            fx.user_id,
            CreateCategoryRequest {
                name: "Groceries".to_string(),
                kind: EntryType::Expense,
            },
        )
        .await
        .unwrap();

    fx.db
        .transactions
        .insert(fx.user_id, new_tx(1, None))
        .await
        .unwrap();
    fx.db
        .transactions
        .insert(fx.user_id, new_tx(20, Some(groceries.id)))
        .await
        .unwrap();

    let list = fx.db.transactions.list_for_user(fx.user_id, 5000).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].transaction.date.to_string(), "2026-05-20");
    assert_eq!(list[0].category_name.as_deref(), Some("Groceries"));
    assert_eq!(list[1].category_name, None);

    let limited = fx.db.transactions.list_for_user(fx.user_id, 1).await.unwrap();
    assert_eq!(limited.len(), 1);

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_category_ownership_check() {
    let fx = fixture().await;
    let cat = fx
        .db
        .categories
        .create(
            fx.user_id,
            CreateCategoryRequest {
                name: "Salary".to_string(),
                kind: EntryType::Income,
            },
        )
        .await
        .unwrap();

    assert!(fx.db.categories.belongs_to(cat.id, fx.user_id).await.unwrap());
    assert!(!fx.db.categories.belongs_to(cat.id, Uuid::new_v4()).await.unwrap());
    assert_eq!(
        fx.db.categories.fetch_name(cat.id).await.unwrap().as_deref(),
        Some("Salary")
    );
    assert_eq!(fx.db.categories.fetch_name(Uuid::new_v4()).await.unwrap(), None);

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_user_upsert_refreshes_email() {
    let fx = fixture().await;
    fx.db
        .users
        .upsert(fx.user_id, "renamed@example.com")
        .await
        .unwrap();
    fx.db
        .transactions
        .insert(fx.user_id, new_tx(2, None))
        .await
        .unwrap();

    let entries = fx.db.transactions.list_for_reconcile().await.unwrap();
    let mine: Vec<_> = entries
        .iter()
        .filter(|e| e.transaction.user_id == fx.user_id)
        .collect();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].owner_email, "renamed@example.com");

    fx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_shift_sheet_rows_after_delete() {
    let fx = fixture().await;
    let repo = &fx.db.transactions;
    let below = repo.insert(fx.user_id, new_tx(1, None)).await.unwrap();
    let above = repo.insert(fx.user_id, new_tx(2, None)).await.unwrap();
    repo.set_sheet_row_id(below.id, RowLocator::new(900_001).ok())
        .await
        .unwrap();
    repo.set_sheet_row_id(above.id, RowLocator::new(900_003).ok())
        .await
        .unwrap();

    let shifted = repo
        .shift_sheet_rows_after(RowLocator::new(900_002).unwrap())
        .await
        .unwrap();
    assert!(shifted >= 1);

    let below = repo.fetch(below.id, fx.user_id).await.unwrap().unwrap();
    let above = repo.fetch(above.id, fx.user_id).await.unwrap().unwrap();
    assert_eq!(below.sheet_row_id, RowLocator::new(900_001).ok());
    assert_eq!(above.sheet_row_id, RowLocator::new(900_002).ok());

    fx.cleanup().await.unwrap();
}
