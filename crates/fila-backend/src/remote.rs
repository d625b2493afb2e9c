//! # Remote Backend
//!
//! [`QueueBackend`] implementation against the live HTTP service.
//!
//! Only contract conformance matters here: retry/backoff, connection
//! pooling, and timeout tuning are transport concerns owned by the
//! HTTP client. The session token is read from the key-value seam on
//! every request so a re-login is picked up without rebuilding the
//! backend.
//!
//! ## HTTP → Error Mapping
//! ```text
//! 401 / 403          → AuthFailure      (feeds the fallback policy)
//! 404                → NotFound
//! 400 / 409 / 422    → InvalidState
//! anything else      → Transport
//! body decode error  → Transport
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use fila_core::{
    ApprovalStatus, AssetUpload, NewOrder, Order, OrderAsset, OrderDetail, OrderPatch, QueueError,
    QueueResult, SubmitOutcome, Topup, Wallet,
};
use fila_store::keys::SESSION_TOKEN_KEY;
use fila_store::KvStore;

use crate::contract::{BackendKind, QueueBackend};

/// Per-request timeout. Long enough for mobile networks, short enough
/// that a stuck request never outlives a couple of poll cycles.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// Remote Backend
// =============================================================================

/// HTTP client for the work-order queue service.
pub struct RemoteBackend {
    http: Client,
    base: Url,
    storage: Arc<dyn KvStore>,
}

impl RemoteBackend {
    /// Creates a client rooted at `base` (e.g. `https://api.example.com/`).
    pub fn new(mut base: Url, storage: Arc<dyn KvStore>) -> QueueResult<Self> {
        // Url::join drops the last path segment without this.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QueueError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(RemoteBackend {
            http,
            base,
            storage,
        })
    }

    fn endpoint(&self, path: &str) -> QueueResult<Url> {
        self.base
            .join(path)
            .map_err(|e| QueueError::Configuration(format!("Bad endpoint '{}': {}", path, e)))
    }

    /// Builds a request with the current session token attached, if any.
    async fn request(&self, method: Method, path: &str) -> QueueResult<RequestBuilder> {
        let url = self.endpoint(path)?;
        let mut builder = self.http.request(method, url);

        if let Some(token) = self.storage.get(SESSION_TOKEN_KEY).await? {
            builder = builder.bearer_auth(token);
        }

        Ok(builder)
    }

    /// Sends the request and maps non-success statuses onto the error
    /// taxonomy.
    async fn send<T: DeserializeOwned>(&self, path: &str, builder: RequestBuilder) -> QueueResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(path, status = status.as_u16(), "Queue API response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, path, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QueueError::Transport(format!("Bad response body from {}: {}", path, e)))
    }

    /// Same as [`send`](Self::send) for endpoints that return no body.
    async fn send_unit(&self, path: &str, builder: RequestBuilder) -> QueueResult<()> {
        let response = builder
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, path, body));
        }
        Ok(())
    }

    fn map_status(status: StatusCode, path: &str, body: String) -> QueueError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                QueueError::AuthFailure(format!("HTTP {} from {}: {}", status.as_u16(), path, body))
            }
            StatusCode::NOT_FOUND => QueueError::NotFound {
                entity: "resource",
                id: path.to_string(),
            },
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                QueueError::InvalidState(body)
            }
            _ => QueueError::Transport(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                path,
                body
            )),
        }
    }
}

// =============================================================================
// Contract Implementation
// =============================================================================

#[derive(serde::Deserialize)]
struct CustomerBody {
    id: String,
}

#[async_trait]
impl QueueBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn customer_id(&self) -> QueueResult<String> {
        let builder = self.request(Method::GET, "v1/customer").await?;
        let body: CustomerBody = self.send("v1/customer", builder).await?;
        Ok(body.id)
    }

    async fn wallet(&self) -> QueueResult<Wallet> {
        let builder = self.request(Method::GET, "v1/wallet").await?;
        self.send("v1/wallet", builder).await
    }

    async fn set_plan_active(&self, active: bool) -> QueueResult<()> {
        let builder = self
            .request(Method::PUT, "v1/wallet/plan")
            .await?
            .json(&json!({ "active": active }));
        self.send_unit("v1/wallet/plan", builder).await
    }

    async fn create_pix_topup(&self, amount_cents: i64) -> QueueResult<Topup> {
        // Enforced client-side so both backends reject identically,
        // whatever the service does with a non-positive amount.
        if amount_cents <= 0 {
            return Err(QueueError::InvalidAmount { amount_cents });
        }

        let builder = self
            .request(Method::POST, "v1/wallet/topups")
            .await?
            .json(&json!({ "amount_cents": amount_cents }));
        self.send("v1/wallet/topups", builder).await
    }

    async fn topup_status(&self, id: &str) -> QueueResult<Topup> {
        let path = format!("v1/wallet/topups/{}", id);
        let builder = self.request(Method::GET, &path).await?;
        self.send(&path, builder).await
    }

    async fn create_order(&self, new_order: NewOrder) -> QueueResult<Order> {
        let builder = self
            .request(Method::POST, "v1/orders")
            .await?
            .json(&new_order);
        self.send("v1/orders", builder).await
    }

    async fn update_order(&self, id: &str, patch: OrderPatch) -> QueueResult<Order> {
        let path = format!("v1/orders/{}", id);
        let builder = self.request(Method::PATCH, &path).await?.json(&patch);
        self.send(&path, builder).await
    }

    async fn list_orders(&self) -> QueueResult<Vec<Order>> {
        let builder = self.request(Method::GET, "v1/orders").await?;
        self.send("v1/orders", builder).await
    }

    async fn order_detail(&self, id: &str) -> QueueResult<OrderDetail> {
        let path = format!("v1/orders/{}", id);
        let builder = self.request(Method::GET, &path).await?;
        self.send(&path, builder).await
    }

    async fn upload_order_asset(
        &self,
        order_id: &str,
        file: AssetUpload,
    ) -> QueueResult<OrderAsset> {
        // Byte transport happens out-of-band (device upload URL); the
        // queue service only registers the metadata.
        let path = format!("v1/orders/{}/assets", order_id);
        let builder = self.request(Method::POST, &path).await?.json(&file);
        self.send(&path, builder).await
    }

    async fn submit_order(&self, id: &str) -> QueueResult<SubmitOutcome> {
        let path = format!("v1/orders/{}/submit", id);
        let builder = self.request(Method::POST, &path).await?;
        self.send(&path, builder).await
    }

    async fn post_order_info(&self, order_id: &str, message: &str) -> QueueResult<OrderDetail> {
        let path = format!("v1/orders/{}/events", order_id);
        let builder = self
            .request(Method::POST, &path)
            .await?
            .json(&json!({ "message": message }));
        self.send(&path, builder).await
    }

    async fn set_approval(
        &self,
        deliverable_id: &str,
        status: ApprovalStatus,
        feedback: Option<String>,
    ) -> QueueResult<OrderDetail> {
        let path = format!("v1/deliverables/{}/approval", deliverable_id);
        let builder = self
            .request(Method::POST, &path)
            .await?
            .json(&json!({ "status": status, "feedback": feedback }));
        self.send(&path, builder).await
    }

    async fn pause_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        let path = format!("v1/orders/{}/ads/pause", order_id);
        let builder = self.request(Method::POST, &path).await?;
        self.send(&path, builder).await
    }

    async fn resume_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        let path = format!("v1/orders/{}/ads/resume", order_id);
        let builder = self.request(Method::POST, &path).await?;
        self.send(&path, builder).await
    }

    async fn stop_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        let path = format!("v1/orders/{}/ads/stop", order_id);
        let builder = self.request(Method::POST, &path).await?;
        self.send(&path, builder).await
    }
}
