#![deny(unsafe_code)]

pub mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flightsurety_core::{
    AirlineState, Amount, Clock, FlightKey, FlightRecord, FlightStatus, GovernanceEngine,
    Identity, IgnoredReason, InMemoryTransfer, JournalEntry, ReserveSnapshot, Resolution,
    StatusRequest, SuretyConfig, SuretyError, SystemClock, TransferReceipt, ValueTransfer,
};
use seed::{SeedError, SeedPlan};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Header carrying the authenticated caller identity.
pub const CALLER_HEADER: &str = "x-caller-id";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub owner: Identity,
    pub first_airline: Identity,
    pub engine_identity: Identity,
    pub surety: SuretyConfig,
    pub seed_plan: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            owner: Identity::new("owner"),
            first_airline: Identity::new("airline-1"),
            engine_identity: Identity::new("flightsurety-app"),
            surety: SuretyConfig::default(),
            seed_plan: None,
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<GovernanceEngine>,
}

impl ServiceState {
    /// Bootstrap with the wall clock and the in-process transfer rail.
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        Self::bootstrap_with(
            config,
            Arc::new(SystemClock),
            Arc::new(InMemoryTransfer::new()),
        )
        .await
    }

    pub async fn bootstrap_with(
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Result<Self, ServiceError> {
        let ServiceConfig {
            owner,
            first_airline,
            engine_identity,
            surety,
            seed_plan,
        } = config;

        let engine = GovernanceEngine::bootstrap(
            owner,
            first_airline,
            engine_identity,
            surety,
            clock,
            transfer,
        )
        .await?;

        if let Some(path) = seed_plan {
            let plan = SeedPlan::load(&path)?;
            let applied = plan.apply(&engine).await?;
            info!(path = %path.display(), applied, "Seed plan loaded");
        }

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/admin/operating-status", post(set_operating_status))
        .route("/v1/admin/authorized-callers", post(authorize_caller))
        .route("/v1/airlines", get(airline_count))
        .route("/v1/airlines/register", post(register_airline))
        .route("/v1/airlines/vote", post(vote))
        .route("/v1/airlines/fund", post(fund_airline))
        .route("/v1/airlines/:airline", get(airline_status))
        .route("/v1/airlines/:airline/flights", get(airline_flights))
        .route("/v1/flights", post(register_flight))
        .route(
            "/v1/flights/status-requests",
            get(list_status_requests).post(fetch_flight_status),
        )
        .route("/v1/flights/resolutions", post(resolve_flight_status))
        .route("/v1/insurance", get(insurance_amount).post(buy_insurance))
        .route("/v1/passengers/:passenger/balance", get(passenger_balance))
        .route("/v1/pay", post(pay))
        .route("/v1/reserves", get(reserves))
        .route("/v1/journal", get(journal))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core engine error: {0}")]
    Core(#[from] SuretyError),
    #[error("seed error: {0}")]
    Seed(#[from] SeedError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http {
        status: StatusCode,
        kind: &'static str,
        message: String,
    },
    #[error(transparent)]
    Core(#[from] SuretyError),
}

impl ApiError {
    fn missing_caller() -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            kind: "missing_caller",
            message: format!("{CALLER_HEADER} header is required"),
        }
    }
}

/// HTTP status for a core failure.
pub fn status_for(err: &SuretyError) -> StatusCode {
    match err {
        SuretyError::NotOperational => StatusCode::SERVICE_UNAVAILABLE,
        SuretyError::Unauthorized(_)
        | SuretyError::CallerNotAuthorized(_)
        | SuretyError::CallerNotRegistered(_)
        | SuretyError::CallerNotFunded(_) => StatusCode::FORBIDDEN,
        SuretyError::ConsensusRequired { .. }
        | SuretyError::DuplicateVote { .. }
        | SuretyError::AirlineAlreadyRegistered(_)
        | SuretyError::FlightAlreadyResolved(_)
        | SuretyError::ZeroBalance(_)
        | SuretyError::InsufficientReserves { .. } => StatusCode::CONFLICT,
        SuretyError::InsufficientFunding { .. }
        | SuretyError::DepartureTooSoon { .. }
        | SuretyError::UnknownStatusCode(_)
        | SuretyError::ZeroPremium
        | SuretyError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SuretyError::FlightNotRegistered(_) => StatusCode::NOT_FOUND,
        SuretyError::TransferFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Http {
                status,
                kind,
                message,
            } => (status, kind, message),
            ApiError::Core(err) => (status_for(&err), err.kind(), err.to_string()),
        };
        (
            status,
            Json(serde_json::json!({ "error": message, "kind": kind })),
        )
            .into_response()
    }
}

/// Authenticated caller, taken from [`CALLER_HEADER`].
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(Identity::new(value)))
            .ok_or_else(ApiError::missing_caller)
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    operational: bool,
    journal_entries: usize,
    journal_verified: bool,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    let bus = state.engine.bus();
    Json(HealthResponse {
        status: "ok",
        service: "flightsurety-service",
        operational: state.engine.is_operational().await,
        journal_entries: bus.journal_len().await,
        journal_verified: bus.verify_journal().await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct OperatingStatusRequest {
    operational: bool,
}

#[derive(Debug, Clone, Serialize)]
struct OperatingStatusResponse {
    operational: bool,
}

async fn set_operating_status(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<OperatingStatusRequest>,
) -> Result<Json<OperatingStatusResponse>, ApiError> {
    state
        .engine
        .set_operating_status(&caller, request.operational)
        .await?;
    Ok(Json(OperatingStatusResponse {
        operational: state.engine.is_operational().await,
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorizeRequest {
    identity: Identity,
}

#[derive(Debug, Clone, Serialize)]
struct AuthorizeResponse {
    identity: Identity,
    added: bool,
}

async fn authorize_caller(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let added = state
        .engine
        .authorize_caller(&caller, request.identity.clone())
        .await?;
    Ok(Json(AuthorizeResponse {
        identity: request.identity,
        added,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct AirlineCountResponse {
    registered: usize,
}

async fn airline_count(State(state): State<ServiceState>) -> Json<AirlineCountResponse> {
    Json(AirlineCountResponse {
        registered: state.engine.num_registered_airlines().await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateRequest {
    candidate: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirlineStatusResponse {
    pub airline: Identity,
    pub state: AirlineState,
    pub registered: bool,
    pub funded: bool,
    pub votes: usize,
}

async fn load_airline(state: &ServiceState, airline: Identity) -> AirlineStatusResponse {
    let record = state.engine.airline(&airline).await;
    AirlineStatusResponse {
        airline,
        state: record.state(),
        registered: record.registered,
        funded: record.funded,
        votes: record.voters.len(),
    }
}

async fn register_airline(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<CandidateRequest>,
) -> Result<Json<AirlineStatusResponse>, ApiError> {
    state
        .engine
        .register_airline(&caller, &request.candidate)
        .await?;
    Ok(Json(load_airline(&state, request.candidate).await))
}

async fn vote(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<CandidateRequest>,
) -> Result<Json<AirlineStatusResponse>, ApiError> {
    state.engine.vote(&caller, &request.candidate).await?;
    Ok(Json(load_airline(&state, request.candidate).await))
}

#[derive(Debug, Clone, Deserialize)]
struct FundRequest {
    amount: Amount,
}

async fn fund_airline(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<FundRequest>,
) -> Result<Json<AirlineStatusResponse>, ApiError> {
    state.engine.fund_airline(&caller, request.amount).await?;
    Ok(Json(load_airline(&state, caller).await))
}

async fn airline_status(
    State(state): State<ServiceState>,
    Path(airline): Path<String>,
) -> Json<AirlineStatusResponse> {
    Json(load_airline(&state, Identity::new(airline)).await)
}

#[derive(Debug, Clone, Serialize)]
struct FlightView {
    key: FlightKey,
    status: FlightStatus,
    status_code: u8,
    description: &'static str,
    updated_at: i64,
}

impl FlightView {
    fn new(key: FlightKey, record: FlightRecord) -> Self {
        Self {
            key,
            status: record.status,
            status_code: record.status.code(),
            description: record.status.describe(),
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FlightListResponse {
    items: Vec<FlightView>,
}

async fn airline_flights(
    State(state): State<ServiceState>,
    Path(airline): Path<String>,
) -> Json<FlightListResponse> {
    let items = state
        .engine
        .flights_of(&Identity::new(airline))
        .await
        .into_iter()
        .map(|(key, record)| FlightView::new(key, record))
        .collect();
    Json(FlightListResponse { items })
}

#[derive(Debug, Clone, Deserialize)]
struct RegisterFlightRequest {
    code: String,
    departure: i64,
}

async fn register_flight(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<RegisterFlightRequest>,
) -> Result<(StatusCode, Json<FlightKey>), ApiError> {
    let key = state
        .engine
        .register_flight(&caller, &request.code, request.departure)
        .await?;
    Ok((StatusCode::CREATED, Json(key)))
}

#[derive(Debug, Clone, Deserialize)]
struct FlightQuery {
    airline: String,
    code: String,
    departure: i64,
}

impl FlightQuery {
    fn key(&self) -> FlightKey {
        FlightKey::new(Identity::new(self.airline.as_str()), self.code.as_str(), self.departure)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BuyInsuranceRequest {
    airline: Identity,
    code: String,
    departure: i64,
    amount: Amount,
}

#[derive(Debug, Clone, Serialize)]
struct InsuranceResponse {
    passenger: Identity,
    key: FlightKey,
    amount: Amount,
}

async fn buy_insurance(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<BuyInsuranceRequest>,
) -> Result<Json<InsuranceResponse>, ApiError> {
    let key = FlightKey::new(request.airline, request.code, request.departure);
    let amount = state
        .engine
        .buy_insurance(&caller, &key, request.amount)
        .await?;
    Ok(Json(InsuranceResponse {
        passenger: caller,
        key,
        amount,
    }))
}

async fn insurance_amount(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Query(query): Query<FlightQuery>,
) -> Json<InsuranceResponse> {
    let key = query.key();
    let amount = state.engine.insurance_amount(&caller, &key).await;
    Json(InsuranceResponse {
        passenger: caller,
        key,
        amount,
    })
}

#[derive(Debug, Clone, Serialize)]
struct BalanceResponse {
    passenger: Identity,
    balance: Amount,
}

async fn passenger_balance(
    State(state): State<ServiceState>,
    Path(passenger): Path<String>,
) -> Json<BalanceResponse> {
    let passenger = Identity::new(passenger);
    let balance = state.engine.passenger_balance(&passenger).await;
    Json(BalanceResponse { passenger, balance })
}

async fn pay(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
) -> Result<Json<TransferReceipt>, ApiError> {
    Ok(Json(state.engine.pay(&caller).await?))
}

async fn reserves(State(state): State<ServiceState>) -> Json<ReserveSnapshot> {
    Json(state.engine.reserves().await)
}

#[derive(Debug, Clone, Deserialize)]
struct FlightRequest {
    airline: Identity,
    code: String,
    departure: i64,
}

async fn fetch_flight_status(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<FlightRequest>,
) -> Result<(StatusCode, Json<StatusRequest>), ApiError> {
    let key = FlightKey::new(request.airline, request.code, request.departure);
    let request = state.engine.fetch_flight_status(&caller, &key).await?;
    Ok((StatusCode::ACCEPTED, Json(request)))
}

#[derive(Debug, Clone, Serialize)]
struct StatusRequestListResponse {
    items: Vec<StatusRequest>,
}

async fn list_status_requests(State(state): State<ServiceState>) -> Json<StatusRequestListResponse> {
    Json(StatusRequestListResponse {
        items: state.engine.open_status_requests().await,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct ResolutionRequest {
    airline: Identity,
    code: String,
    departure: i64,
    status_code: u8,
}

#[derive(Debug, Clone, Serialize)]
struct CreditView {
    passenger: Identity,
    amount: Amount,
}

#[derive(Debug, Clone, Serialize)]
struct ResolutionResponse {
    applied: bool,
    status: Option<FlightStatus>,
    ignored: Option<IgnoredReason>,
    credited: Vec<CreditView>,
}

impl From<Resolution> for ResolutionResponse {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Applied { status, credited } => Self {
                applied: true,
                status: Some(status),
                ignored: None,
                credited: credited
                    .into_iter()
                    .map(|credit| CreditView {
                        passenger: credit.passenger,
                        amount: credit.amount,
                    })
                    .collect(),
            },
            Resolution::Ignored(reason) => Self {
                applied: false,
                status: None,
                ignored: Some(reason),
                credited: Vec::new(),
            },
        }
    }
}

async fn resolve_flight_status(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    let key = FlightKey::new(request.airline, request.code, request.departure);
    let resolution = state
        .engine
        .resolve_flight_status(&caller, &key, request.status_code)
        .await?;
    Ok(Json(resolution.into()))
}

#[derive(Debug, Clone, Deserialize)]
struct JournalQuery {
    from: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct JournalResponse {
    total: usize,
    returned: usize,
    verified: bool,
    items: Vec<JournalEntry>,
}

async fn journal(
    State(state): State<ServiceState>,
    Query(query): Query<JournalQuery>,
) -> Json<JournalResponse> {
    let bus = state.engine.bus();
    let total = bus.journal_len().await;
    let limit = query.limit.unwrap_or(100).min(1000);
    let items: Vec<JournalEntry> = state
        .engine
        .journal(query.from.unwrap_or(0))
        .await
        .into_iter()
        .take(limit)
        .collect();
    Json(JournalResponse {
        total,
        returned: items.len(),
        verified: bus.verify_journal().await,
        items,
    })
}
