//! OpenWork Server
//!
//! The HTTP surface over the settlement engine. Authentication happens
//! upstream; this server trusts the identity headers (`x-agent-id`,
//! `x-user-id`) and only translates them into a typed caller for the
//! engine. Dispute resolution additionally accepts the shared admin
//! secret via `x-admin-secret`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use openwork_disputes::{AdminAuth, DisputeResolver, HttpJudge};
use openwork_engine::{CreateTaskRequest, TaskEngine};
use openwork_escrow::{CustodyConfig, EscrowGateway, MockChain};
use openwork_fees::FeeSchedule;
use openwork_observers::{InAppNotifier, Notifier, Observers, TrustClient, TrustEvent, WebhookNotifier};
use openwork_store::MarketStore;
use openwork_types::{
    Agent, AgentId, Bid, Caller, DisputeId, DisputeResolution, ErrorClass, HumanId,
    PermitSignature, TaskId, Usdc, WalletAddress, WorkError, WorkResult,
};

// ============================================================================
// Configuration
// ============================================================================

struct ServerConfig {
    host: String,
    port: u16,
    admin_secret: Option<String>,
    custody: Option<CustodyConfig>,
    trust_url: Option<String>,
}

impl ServerConfig {
    fn from_env() -> Self {
        let custody = match (
            std::env::var("OPENWORK_CUSTODY_ADDRESS"),
            std::env::var("OPENWORK_TREASURY_ADDRESS"),
            std::env::var("OPENWORK_TOKEN_ADDRESS"),
        ) {
            (Ok(custody_address), Ok(treasury_address), Ok(token_address)) => Some(CustodyConfig {
                custody_address: WalletAddress::new(custody_address),
                treasury_address: WalletAddress::new(treasury_address),
                token_address: WalletAddress::new(token_address),
                chain_id: std::env::var("OPENWORK_CHAIN_ID")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8453),
                token_name: std::env::var("OPENWORK_TOKEN_NAME")
                    .unwrap_or_else(|_| "USD Coin".to_string()),
                token_version: std::env::var("OPENWORK_TOKEN_VERSION")
                    .unwrap_or_else(|_| "2".to_string()),
            }),
            _ => None,
        };

        Self {
            host: std::env::var("OPENWORK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("OPENWORK_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3010),
            admin_secret: std::env::var("OPENWORK_ADMIN_SECRET").ok(),
            custody,
            trust_url: std::env::var("OPENWORK_TRUST_URL").ok(),
        }
    }
}

// ============================================================================
// Trust client wiring
// ============================================================================

/// Posts trust updates to an external reputation service, or just logs
/// them when no endpoint is configured
struct HttpTrust {
    client: reqwest::Client,
    url: Option<String>,
}

#[async_trait::async_trait]
impl TrustClient for HttpTrust {
    async fn record(&self, wallet: &WalletAddress, event: TrustEvent) -> WorkResult<()> {
        let (kind, amount) = match event {
            TrustEvent::JobCompleted { amount } => ("job_completed", amount),
            TrustEvent::PaymentMade { amount } => ("payment_made", amount),
        };
        let Some(url) = &self.url else {
            info!(wallet = %wallet, kind, %amount, "trust update (no endpoint configured)");
            return Ok(());
        };
        self.client
            .post(url)
            .json(&json!({ "wallet": wallet, "event": kind, "amount": amount }))
            .send()
            .await
            .map_err(|e| WorkError::internal(format!("trust endpoint unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| WorkError::internal(format!("trust endpoint rejected update: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// State, errors, caller extraction
// ============================================================================

#[derive(Clone)]
struct AppState {
    store: MarketStore,
    engine: TaskEngine,
    resolver: DisputeResolver,
    admin_secret: Option<String>,
}

struct ApiError(WorkError);

impl From<WorkError> for ApiError {
    fn from(e: WorkError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.class() {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorClass::Forbidden => StatusCode::FORBIDDEN,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Upstream => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.error_code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Resolve the caller from the upstream identity headers
fn caller_from(headers: &HeaderMap) -> Result<Caller, ApiError> {
    if let Some(value) = headers.get("x-agent-id") {
        let raw = value
            .to_str()
            .map_err(|_| WorkError::unauthorized("x-agent-id header is not valid text"))?;
        let id = AgentId::parse(raw)
            .map_err(|_| WorkError::unauthorized("x-agent-id is not a valid agent id"))?;
        return Ok(Caller::Agent(id));
    }
    if let Some(value) = headers.get("x-user-id") {
        let raw = value
            .to_str()
            .map_err(|_| WorkError::unauthorized("x-user-id header is not valid text"))?;
        let id = HumanId::parse(raw)
            .map_err(|_| WorkError::unauthorized("x-user-id is not a valid user id"))?;
        return Ok(Caller::Human(id));
    }
    Err(WorkError::unauthorized("no identity header supplied").into())
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::parse(raw)
        .map_err(|_| {
            WorkError::TaskNotFound {
                task_id: raw.to_string(),
            }
            .into()
        })
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "openwork-server" }))
}

#[derive(Deserialize)]
struct RegisterAgentRequest {
    name: String,
    #[serde(default)]
    wallet: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    input_schema: Option<serde_json::Value>,
    #[serde(default)]
    style_profile: Option<String>,
    #[serde(default)]
    webhook_url: Option<String>,
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<Agent> {
    if req.name.trim().is_empty() {
        return Err(WorkError::invalid_input("name", "must not be empty").into());
    }
    let mut agent = Agent::new(req.name);
    agent.wallet = req.wallet.map(WalletAddress::new);
    agent.skills = req.skills;
    agent.input_schema = req.input_schema;
    agent.style_profile = req.style_profile;
    agent.webhook_url = req.webhook_url;
    state.store.insert_agent(agent.clone()).await;
    info!(agent = %agent.id, "agent registered");
    Ok(Json(agent))
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Agent> {
    let id = AgentId::parse(&id).map_err(|_| WorkError::AgentNotFound {
        agent_id: id.clone(),
    })?;
    Ok(Json(state.store.agent(&id).await?))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<openwork_engine::CreateTaskResponse> {
    let poster = caller_from(&headers)?;
    Ok(Json(state.engine.create_task(poster, req).await?))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<openwork_types::Task> {
    let id = parse_task_id(&id)?;
    Ok(Json(state.store.task(&id).await?))
}

/// Bid audit trail for a task (the synthetic auto-bid for direct hires)
async fn get_task_bids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Bid>> {
    let id = parse_task_id(&id)?;
    // 404 for unknown tasks rather than an empty list
    state.store.task(&id).await?;
    Ok(Json(state.store.bids_for_task(&id).await))
}

#[derive(Deserialize)]
struct ChallengeQuery {
    owner: String,
}

async fn funding_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    axum::extract::Query(query): axum::extract::Query<ChallengeQuery>,
) -> ApiResult<openwork_types::PermitChallenge> {
    let id = parse_task_id(&id)?;
    let caller = caller_from(&headers)?;
    let owner = WalletAddress::new(query.owner);
    Ok(Json(
        state.engine.funding_challenge(&id, &caller, &owner).await?,
    ))
}

#[derive(Deserialize)]
struct FundRequest {
    owner: String,
    signature: PermitSignature,
    /// Optional client echo of the signed amount, in USDC
    #[serde(default)]
    amount: Option<f64>,
}

async fn fund_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<FundRequest>,
) -> ApiResult<openwork_engine::FundResponse> {
    let id = parse_task_id(&id)?;
    let caller = caller_from(&headers)?;
    let owner = WalletAddress::new(req.owner);
    let declared = req.amount.map(Usdc::from_human);
    Ok(Json(
        state
            .engine
            .fund_escrow(&id, &caller, &owner, &req.signature, declared)
            .await?,
    ))
}

#[derive(Deserialize)]
struct DeliverRequest {
    deliverables: serde_json::Value,
}

async fn deliver_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DeliverRequest>,
) -> ApiResult<openwork_types::Task> {
    let id = parse_task_id(&id)?;
    let caller = caller_from(&headers)?;
    Ok(Json(
        state.engine.deliver(&id, &caller, req.deliverables).await?,
    ))
}

async fn approve_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<openwork_engine::ApprovalResponse> {
    let id = parse_task_id(&id)?;
    let caller = caller_from(&headers)?;
    Ok(Json(state.engine.approve(&id, &caller).await?))
}

#[derive(Deserialize)]
struct DisputeRequest {
    reason: String,
}

async fn dispute_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<openwork_types::Dispute> {
    let id = parse_task_id(&id)?;
    let caller = caller_from(&headers)?;
    Ok(Json(state.engine.dispute(&id, &caller, req.reason).await?))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<openwork_engine::CancelResponse> {
    let id = parse_task_id(&id)?;
    let caller = caller_from(&headers)?;
    Ok(Json(state.engine.cancel(&id, &caller).await?))
}

#[derive(Deserialize)]
struct ResolveRequest {
    /// Explicit resolution; omitted means "ask the judge"
    #[serde(default, flatten)]
    resolution: Option<DisputeResolution>,
}

#[derive(Serialize)]
struct ResolveResponse {
    dispute: openwork_types::Dispute,
    agent_payout: Usdc,
    poster_refund: Usdc,
}

async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    // Bodyless POST means "ask the judge"
    body: Option<Json<ResolveRequest>>,
) -> ApiResult<ResolveResponse> {
    let id = DisputeId::parse(&id).map_err(|_| WorkError::DisputeNotFound {
        dispute_id: id.clone(),
    })?;

    let presented = headers
        .get("x-admin-secret")
        .and_then(|v| v.to_str().ok());
    let auth = match (&state.admin_secret, presented) {
        (Some(expected), Some(given)) if expected == given => AdminAuth::SharedSecret,
        (_, Some(_)) => {
            warn!(dispute = %id, "bad admin secret on resolve request");
            return Err(WorkError::forbidden("invalid admin secret").into());
        }
        (_, None) => AdminAuth::Actor(caller_from(&headers)?),
    };

    let explicit = body.and_then(|Json(req)| req.resolution);
    let outcome = state.resolver.resolve(&id, auth, explicit).await?;
    Ok(Json(ResolveResponse {
        dispute: outcome.dispute,
        agent_payout: outcome.settlement.agent_payout,
        poster_refund: outcome.settlement.poster_refund,
    }))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    if config.custody.is_none() {
        warn!("custody signer not configured; funding and release endpoints will refuse");
    }

    let store = MarketStore::new();
    let gateway = EscrowGateway::new(Arc::new(MockChain::new()), config.custody.clone());
    let (engine, events) = TaskEngine::new(store.clone(), FeeSchedule::default(), gateway);
    let resolver = DisputeResolver::new(
        store.clone(),
        engine.clone(),
        Arc::new(HttpJudge::from_env()),
    );

    let trust = Arc::new(HttpTrust {
        client: reqwest::Client::new(),
        url: config.trust_url.clone(),
    });
    let channels: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(WebhookNotifier::new()),
        Arc::new(InAppNotifier::new(store.clone())),
    ];
    Observers::new(store.clone(), trust, channels).spawn(events);

    let state = Arc::new(AppState {
        store,
        engine,
        resolver,
        admin_secret: config.admin_secret.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/agents", post(register_agent))
        .route("/api/agents/:id", get(get_agent))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/tasks/:id/bids", get(get_task_bids))
        .route("/api/tasks/:id/funding-challenge", get(funding_challenge))
        .route("/api/tasks/:id/fund", post(fund_task))
        .route("/api/tasks/:id/deliver", post(deliver_task))
        .route("/api/tasks/:id/approve", post(approve_task))
        .route("/api/tasks/:id/dispute", post(dispute_task))
        .route("/api/tasks/:id/cancel", post(cancel_task))
        .route("/api/disputes/:id/resolve", post(resolve_dispute))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("OpenWork server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_body_without_resolution_means_ask_the_judge() {
        let req: ResolveRequest = serde_json::from_str("{}").unwrap();
        assert!(req.resolution.is_none());
    }

    #[test]
    fn test_resolve_body_with_explicit_resolution() {
        let req: ResolveRequest = serde_json::from_str(r#"{"resolution": "full_payout"}"#).unwrap();
        assert_eq!(req.resolution, Some(DisputeResolution::FullPayout));

        let req: ResolveRequest = serde_json::from_str(
            r#"{"resolution": "partial_split", "refund_percentage": 40}"#,
        )
        .unwrap();
        assert_eq!(
            req.resolution,
            Some(DisputeResolution::PartialSplit {
                refund_percentage: 40
            })
        );
    }
}
