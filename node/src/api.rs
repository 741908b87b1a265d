//! # REST API
//!
//! Builds the axum router that exposes the registry node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                   | Description                     |
//! |--------|----------------------------------------|---------------------------------|
//! | GET    | `/health`                              | Liveness probe                  |
//! | GET    | `/status`                              | Owner, counts, version          |
//! | POST   | `/issuers`                             | Signed: grant issuer capability |
//! | GET    | `/issuers/:address`                    | Issuer membership               |
//! | POST   | `/credential-types`                    | Signed: create credential type  |
//! | GET    | `/credential-types/:id`                | Credential type by id           |
//! | POST   | `/credentials`                         | Signed: record a credential     |
//! | GET    | `/credentials/:id`                     | Credential by id                |
//! | GET    | `/holders/:address/credentials`        | A holder's credentials          |
//! | GET    | `/holders/:address/credentials/:index` | A holder's k-th credential      |
//! | POST   | `/blobs`                               | Publish a blob                  |
//! | GET    | `/blobs/:hash`                         | Fetch a blob                    |
//!
//! ## Signed calls
//!
//! Mutating registry endpoints take a [`SignedCall`]: the payload, a nonce,
//! the caller's Ed25519 public key, and a signature over the compact JSON
//! encoding of `{"nonce": .., "payload": ..}` with object keys in sorted
//! order. The caller address is derived from the public key, never taken
//! from the payload. A call whose nonce is not above the caller's last
//! accepted nonce is refused with 409, so a captured call cannot be
//! replayed (see [`crate::nonces`]).

use axum::{
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use credvault_contracts::{Credential, CredentialType, RegistryError, SharedRegistry};
use credvault_protocol::config::MAX_BLOB_SIZE;
use credvault_protocol::crypto::{CallSignature, SigningKeypair, SigningPublicKey};
use credvault_protocol::identity::Address;
use credvault_protocol::storage::{ContentHash, ContentStore, StoreError};

use crate::metrics::SharedMetrics;
use crate::nonces::{NonceError, NonceLedger};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub registry: SharedRegistry,
    /// Backing store for `/blobs`. Local sled store or a remote HTTP store.
    pub store: Arc<dyn ContentStore>,
    /// Last accepted signed-call nonce per caller.
    pub nonces: NonceLedger,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Count a refused registry call and convert it for the response.
    fn rejected(&self, err: impl Into<ApiError>) -> ApiError {
        self.metrics.registry_rejections_total.inc();
        err.into()
    }

    /// Verify a signed call and spend its nonce, yielding the caller and
    /// the decoded payload.
    async fn accept<T: DeserializeOwned>(&self, call: SignedCall) -> Result<(Address, T), ApiError> {
        let nonce = call.nonce;
        let (caller, payload) = call.open().map_err(|e| self.rejected(e))?;
        self.nonces
            .consume(&caller, nonce)
            .await
            .map_err(|e| self.rejected(e))?;
        Ok((caller, payload))
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/issuers", post(add_issuer_handler))
        .route("/issuers/:address", get(is_issuer_handler))
        .route("/credential-types", post(add_credential_type_handler))
        .route("/credential-types/:id", get(credential_type_handler))
        .route("/credentials", post(issue_credential_handler))
        .route("/credentials/:id", get(credential_handler))
        .route("/holders/:address/credentials", get(holder_credentials_handler))
        .route(
            "/holders/:address/credentials/:index",
            get(holder_credential_by_index_handler),
        )
        .route("/blobs", post(publish_blob_handler))
        .route("/blobs/:hash", get(fetch_blob_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.metrics.clone(),
                    track_latency,
                ))
                .layer(DefaultBodyLimit::max(MAX_BLOB_SIZE)),
        )
        .with_state(state)
}

async fn track_latency(State(metrics): State<SharedMetrics>, req: Request, next: Next) -> Response {
    let timer = metrics.http_request_duration_seconds.start_timer();
    let resp = next.run(req).await;
    timer.observe_duration();
    resp
}

// ---------------------------------------------------------------------------
// Signed Calls
// ---------------------------------------------------------------------------

/// Envelope for a registry mutation signed by its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCall {
    /// Hex-encoded Ed25519 public key of the caller.
    pub public_key: String,
    /// Hex-encoded Ed25519 signature over the canonical call bytes.
    pub signature: String,
    /// Must exceed the caller's last accepted nonce.
    pub nonce: u64,
    pub payload: serde_json::Value,
}

/// Compact JSON of `{"nonce", "payload"}` with object keys sorted.
/// `serde_json::Value` keeps maps in a `BTreeMap`, so building a `Value`
/// sorts them.
fn canonical_bytes(nonce: u64, payload: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&serde_json::json!({ "nonce": nonce, "payload": payload }))
}

impl SignedCall {
    /// Sign `payload` with `nonce` as `keypair`.
    pub fn sign<T: Serialize>(
        keypair: &SigningKeypair,
        nonce: u64,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(payload)?;
        let signature = keypair.sign(&canonical_bytes(nonce, &payload)?);
        Ok(Self {
            public_key: keypair.public_key().to_hex(),
            signature: signature.to_hex(),
            nonce,
            payload,
        })
    }

    /// Verify the signature and decode the payload, yielding the caller.
    /// Does not look at nonce freshness; [`NonceLedger`] does that.
    pub fn open<T: DeserializeOwned>(self) -> Result<(Address, T), ApiError> {
        let key = SigningPublicKey::from_hex(&self.public_key)
            .map_err(|_| ApiError::BadRequest("invalid public key".into()))?;
        let signature = CallSignature::from_hex(&self.signature)
            .map_err(|_| ApiError::Forbidden("invalid signature".into()))?;
        let message = canonical_bytes(self.nonce, &self.payload)
            .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;

        if !key.verify(&message, &signature) {
            return Err(ApiError::Forbidden("signature verification failed".into()));
        }

        let payload = serde_json::from_value(self.payload)
            .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;
        Ok((Address::from_public_key(&key), payload))
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Payload of `POST /issuers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddIssuerRequest {
    pub issuer: Address,
}

/// Payload of `POST /credential-types`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCredentialTypeRequest {
    pub name: String,
}

/// Payload of `POST /credentials`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCredentialRequest {
    pub credential_type_id: u64,
    pub holder: Address,
    pub content_hash: ContentHash,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Registry owner address.
    pub owner: String,
    pub issuers: u64,
    pub credential_types: u64,
    pub credentials: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddIssuerResponse {
    pub issuer: Address,
    /// False when the address already held the capability.
    pub added: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuerResponse {
    pub address: Address,
    pub is_issuer: bool,
}

/// Response for endpoints that allocate an id.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: u64,
}

/// Response payload for `GET /holders/:address/credentials`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HolderCredentialsResponse {
    pub holder: Address,
    pub count: u64,
    /// In issuance order.
    pub credentials: Vec<Credential>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub hash: ContentHash,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler failure, rendered as a status code and an [`ErrorResponse`].
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    /// A signed call reused a spent nonce.
    Conflict(String),
    Internal(String),
    /// The upstream store returned the wrong bytes or refused the request.
    BadGateway(String),
    Unavailable(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::PermissionDenied { .. } => ApiError::Forbidden(err.to_string()),
            RegistryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RegistryError::IndexOutOfRange { .. } | RegistryError::InvalidName(_) => {
                ApiError::BadRequest(err.to_string())
            }
            RegistryError::Journal(e) => {
                tracing::error!(error = %e, "registry journal failure");
                ApiError::Internal("registry journal failure".into())
            }
            RegistryError::Interrupted(_) => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl From<NonceError> for ApiError {
    fn from(err: NonceError) -> Self {
        match err {
            NonceError::Stale { .. } => ApiError::Conflict(err.to_string()),
            NonceError::Storage(_) | NonceError::Corrupt(_) => {
                tracing::error!(error = %err, "nonce ledger failure");
                ApiError::Internal("nonce ledger failure".into())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::InvalidHash(_) => ApiError::BadRequest(err.to_string()),
            StoreError::StoreUnavailable(_) => ApiError::Unavailable(err.to_string()),
            StoreError::Corrupted { .. } => {
                tracing::error!(error = %err, "store returned corrupted blob");
                ApiError::BadGateway(err.to_string())
            }
            StoreError::Rejected { .. } => {
                tracing::warn!(error = %err, "upstream store refused request");
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::Forbidden(e) => (StatusCode::FORBIDDEN, e),
            ApiError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            ApiError::Conflict(e) => (StatusCode::CONFLICT, e),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
            ApiError::BadGateway(e) => (StatusCode::BAD_GATEWAY, e),
            ApiError::Unavailable(e) => (StatusCode::SERVICE_UNAVAILABLE, e),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

fn parse_address(s: &str) -> Result<Address, ApiError> {
    Address::parse(s).map_err(|e| ApiError::BadRequest(format!("invalid address: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: owner and record counts, read under one lock.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = {
        let registry = state.registry.read();
        StatusResponse {
            version: state.version.clone(),
            owner: registry.owner().to_string(),
            issuers: registry.issuers().len() as u64,
            credential_types: registry.credential_type_count(),
            credentials: registry.credential_count(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    };
    Json(resp)
}

/// `POST /issuers`: owner-only.
async fn add_issuer_handler(
    State(state): State<AppState>,
    Json(call): Json<SignedCall>,
) -> Result<Json<AddIssuerResponse>, ApiError> {
    let (caller, req): (Address, AddIssuerRequest) = state.accept(call).await?;

    let issuer = req.issuer;
    let added = state
        .registry
        .with_write(move |reg| reg.add_issuer(&caller, issuer))
        .await
        .map_err(|e| state.rejected(e))?;
    if added {
        state.metrics.issuers_added_total.inc();
    }

    Ok(Json(AddIssuerResponse {
        issuer: req.issuer,
        added,
    }))
}

async fn is_issuer_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<IssuerResponse>, ApiError> {
    let address = parse_address(&address)?;
    Ok(Json(IssuerResponse {
        address,
        is_issuer: state.registry.is_issuer(&address),
    }))
}

/// `POST /credential-types`: issuer-only; the caller owns the new type.
async fn add_credential_type_handler(
    State(state): State<AppState>,
    Json(call): Json<SignedCall>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let (caller, req): (Address, AddCredentialTypeRequest) = state.accept(call).await?;

    let id = state
        .registry
        .with_write(move |reg| reg.add_credential_type(&caller, &req.name))
        .await
        .map_err(|e| state.rejected(e))?;
    state.metrics.credential_types_added_total.inc();

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn credential_type_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<CredentialType>, ApiError> {
    Ok(Json(state.registry.get_credential_type(id)?))
}

/// `POST /credentials`: records a credential whose sealed document the
/// caller has already published.
async fn issue_credential_handler(
    State(state): State<AppState>,
    Json(call): Json<SignedCall>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let (caller, req): (Address, IssueCredentialRequest) = state.accept(call).await?;

    let id = state
        .registry
        .with_write(move |reg| {
            reg.issue_credential(&caller, req.credential_type_id, req.holder, req.content_hash)
        })
        .await
        .map_err(|e| state.rejected(e))?;
    state.metrics.credentials_issued_total.inc();

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn credential_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Credential>, ApiError> {
    Ok(Json(state.registry.get_credential(id)?))
}

async fn holder_credentials_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<HolderCredentialsResponse>, ApiError> {
    let holder = parse_address(&address)?;
    let credentials = state.registry.credentials_by_holder(&holder);
    Ok(Json(HolderCredentialsResponse {
        holder,
        count: credentials.len() as u64,
        credentials,
    }))
}

async fn holder_credential_by_index_handler(
    State(state): State<AppState>,
    Path((address, index)): Path<(String, u64)>,
) -> Result<Json<Credential>, ApiError> {
    let holder = parse_address(&address)?;
    Ok(Json(state.registry.get_credential_by_holder(&holder, index)?))
}

/// `POST /blobs`: raw body in, content hash out.
async fn publish_blob_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let hash = state.store.publish(&body).await?;
    state.metrics.blobs_published_total.inc();
    Ok((StatusCode::CREATED, Json(PublishResponse { hash })))
}

async fn fetch_blob_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let hash = ContentHash::parse(&hash)?;
    let bytes = state.store.fetch(&hash).await?;
    state.metrics.blobs_fetched_total.inc();
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
