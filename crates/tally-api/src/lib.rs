//! # tally-api
//!
//! HTTP surface for tally: transaction CRUD through the sync orchestrator,
//! categories, dashboard summary, receipt uploads with signed URLs, and an
//! on-demand reconciliation trigger.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use tally_core::{
    defaults, CategoryRepository, SheetMirror, TransactionRepository, UserRepository,
};
use tally_sync::{Reconciler, TransactionSync};

pub use config::ApiConfig;
pub use error::ApiError;
use handlers::{categories, transactions, uploads};
use middleware::{rate_limit_middleware, GlobalRateLimiter, MakeRequestUuidV7};
use services::ReceiptStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: TransactionSync,
    pub reconciler: Reconciler,
    pub categories: Arc<dyn CategoryRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    /// Receipt storage (None if no signing secret is configured).
    pub receipts: Option<ReceiptStore>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserRepository>,
        categories: Arc<dyn CategoryRepository>,
        transactions: Arc<dyn TransactionRepository>,
        mirror: Arc<dyn SheetMirror>,
    ) -> Self {
        Self {
            sync: TransactionSync::new(
                users,
                categories.clone(),
                transactions.clone(),
                mirror.clone(),
            ),
            reconciler: Reconciler::new(transactions.clone(), mirror),
            categories,
            transactions,
            receipts: None,
            rate_limiter: None,
        }
    }

    pub fn with_receipts(mut self, receipts: ReceiptStore) -> Self {
        self.receipts = Some(receipts);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Option<Arc<GlobalRateLimiter>>) -> Self {
        self.rate_limiter = limiter;
        self
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/transactions",
            get(transactions::list_transactions)
                .post(transactions::create_transaction)
                .put(transactions::update_transaction)
                .delete(transactions::delete_transaction),
        )
        .route("/transactions/summary", get(transactions::transaction_summary))
        .route(
            "/transactions/reconcile",
            post(transactions::reconcile_transactions),
        )
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/upload",
            post(uploads::upload_receipt).layer(DefaultBodyLimit::max(defaults::UPLOAD_MAX_BYTES)),
        )
        .route("/storage/:bucket/*key", get(uploads::download_receipt))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .with_state(state)
}
