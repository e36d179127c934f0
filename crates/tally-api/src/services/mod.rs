//! Service layer for business logic outside the sync core.

pub mod receipts;

pub use receipts::{sanitize_file_name, sniff_content_type, ReceiptStore, StoredReceipt, UrlSigner};
