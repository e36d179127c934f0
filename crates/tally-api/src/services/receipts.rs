//! Receipt uploads and signed download URLs.
//!
//! Blobs live at `{bucket}/{user_id}/{unix_millis}-{filename}`. Download URLs
//! carry an expiry and an HMAC-SHA256 signature over `{bucket}/{key}:{expires}`.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

use tally_core::{defaults, Error, Result};
use tally_db::StorageBackend;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies blob download URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Config(format!("invalid signing key: {}", e)))?;
        mac.update(format!("{}/{}:{}", bucket, key, expires).as_bytes());
        Ok(mac)
    }

    /// Hex-encoded signature for a blob and expiry (unix seconds).
    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> Result<String> {
        Ok(hex::encode(self.mac(bucket, key, expires)?.finalize().into_bytes()))
    }

    /// Constant-time check that `signature` is valid and not expired at `now`.
    pub fn verify(&self, bucket: &str, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires < now {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        match self.mac(bucket, key, expires) {
            Ok(mac) => mac.verify_slice(&provided).is_ok(),
            Err(_) => false,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReceipt {
    /// Key within the bucket.
    pub path: String,
    /// Signed download URL.
    pub url: String,
}

/// Receipt blob store bound to one bucket.
#[derive(Clone)]
pub struct ReceiptStore {
    backend: Arc<dyn StorageBackend>,
    bucket: String,
    signer: UrlSigner,
    public_base_url: String,
    ttl_secs: i64,
}

impl ReceiptStore {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        bucket: impl Into<String>,
        signer: UrlSigner,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            signer,
            public_base_url: public_base_url.into(),
            ttl_secs: defaults::SIGNED_URL_TTL_SECS,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store an upload for `user_id` and return its key and signed URL.
    pub async fn upload(
        &self,
        user_id: Uuid,
        file_name: &str,
        data: &[u8],
        now_millis: i64,
    ) -> Result<StoredReceipt> {
        let key = format!("{}/{}-{}", user_id, now_millis, sanitize_file_name(file_name));
        self.backend
            .write(&format!("{}/{}", self.bucket, key), data)
            .await?;

        info!(
            subsystem = "storage",
            op = "upload",
            user_id = %user_id,
            storage_path = %key,
            size = data.len(),
            "Receipt stored"
        );

        let url = self.signed_url(&key, now_millis / 1000)?;
        Ok(StoredReceipt { path: key, url })
    }

    /// Download URL for `key`, valid for the configured TTL from `now`.
    pub fn signed_url(&self, key: &str, now: i64) -> Result<String> {
        let expires = now + self.ttl_secs;
        let signature = self.signer.sign(&self.bucket, key, expires)?;
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!(
            "{}/storage/{}/{}?expires={}&signature={}",
            self.public_base_url,
            urlencoding::encode(&self.bucket),
            encoded.join("/"),
            expires,
            signature
        ))
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        self.signer.verify(&self.bucket, key, expires, signature, now)
    }

    /// Read a stored blob.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.backend.read(&format!("{}/{}", self.bucket, key)).await
    }
}

/// Keep ASCII letters, digits, `.`, `-` and `_`; replace everything else.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Content type sniffed from magic bytes.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    infer::get(data)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_db::FilesystemBackend;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn test_sign_and_verify() {
        let signer = UrlSigner::new("secret");
        let sig = signer.sign("receipts", "u/1-a.png", 2_000).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(signer.verify("receipts", "u/1-a.png", 2_000, &sig, 1_000));
    }

    #[test]
    fn test_verify_rejects_tampering_and_expiry() {
        let signer = UrlSigner::new("secret");
        let sig = signer.sign("receipts", "u/1-a.png", 2_000).unwrap();
        assert!(!signer.verify("receipts", "u/1-b.png", 2_000, &sig, 1_000));
        assert!(!signer.verify("receipts", "u/1-a.png", 2_001, &sig, 1_000));
        assert!(!signer.verify("receipts", "u/1-a.png", 2_000, &sig, 2_001));
        assert!(!signer.verify("receipts", "u/1-a.png", 2_000, "not-hex", 1_000));
        assert!(!UrlSigner::new("other").verify("receipts", "u/1-a.png", 2_000, &sig, 1_000));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("receipt 01.png"), "receipt_01.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\café.jpg"), "caf_.jpg");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(PNG), "image/png");
        assert_eq!(sniff_content_type(b"plain"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_layout_and_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReceiptStore::new(
            Arc::new(FilesystemBackend::new(dir.path())),
            "receipts",
            UrlSigner::new("secret"),
            "https://tally.example",
        );
        let user = Uuid::nil();

        let stored = store
            .upload(user, "lunch receipt.png", PNG, 1_700_000_000_123)
            .await
            .unwrap();

        assert_eq!(
            stored.path,
            "00000000-0000-0000-0000-000000000000/1700000000123-lunch_receipt.png"
        );
        let expected_expiry = 1_700_000_000 + defaults::SIGNED_URL_TTL_SECS;
        assert!(stored.url.starts_with(
            "https://tally.example/storage/receipts/00000000-0000-0000-0000-000000000000/1700000000123-lunch_receipt.png?expires="
        ));
        assert!(stored.url.contains(&format!("expires={}", expected_expiry)));
        assert!(dir
            .path()
            .join("receipts")
            .join(&stored.path)
            .exists());
        assert_eq!(store.read(&stored.path).await.unwrap(), PNG);
    }
}
