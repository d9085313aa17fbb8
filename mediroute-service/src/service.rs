use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, request::Parts, HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use mediroute_core::{
    classifier::ClassifyInput, valid_pincode, Config, Facility, FacilityIndex, FacilityStore,
    PincodeResolver, ServiceError, SeverityLevel, SeverityRouter, SpatialQuery, SymptomClassifier,
    DIAGNOSTIC_ROW_CAP,
};

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, kind: &str, message: &str) -> ApiError {
    (status, Json(json!({ "error": kind, "message": message })))
}

fn bad_request(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "InvalidInput", message)
}

/// `Json` with the service's error envelope on rejection. axum's built-in
/// rejection is a plain-text body whose status varies by failure kind
/// (400/415/422); every payload problem must instead surface as
/// `400 {"error": "InvalidInput", ...}`.
struct ValidatedJson<T>(T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => Err(bad_request(&rejection.body_text())),
        }
    }
}

/// `Query` counterpart of [`ValidatedJson`].
struct ValidatedQuery<T>(T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ValidatedQuery(value)),
            Err(rejection) => Err(bad_request(&rejection.body_text())),
        }
    }
}

fn map_error(e: ServiceError) -> ApiError {
    let status = match &e {
        ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ServiceError::CodeNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Deadline => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        // GeocoderUnavailable is recovered inside the resolver; reaching
        // here means a bug, treat it as a store-grade failure.
        ServiceError::Store(_) | ServiceError::StoreTimeout | ServiceError::GeocoderUnavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.kind(), &e.to_string())
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FacilityStore>,
    pub resolver: Arc<PincodeResolver>,
    pub classifier: Arc<SymptomClassifier>,
    pub router: Arc<SeverityRouter>,
}

/// Connect to the facility store and assemble the application. All
/// components receive the configuration at construction; nothing reads
/// the environment at request time.
pub async fn create_app(config: Config) -> anyhow::Result<Router> {
    let store = Arc::new(FacilityStore::connect(&config).await?);
    let index: Arc<dyn FacilityIndex> = store.clone();

    let state = AppState {
        resolver: Arc::new(PincodeResolver::new(&config, index.clone())),
        classifier: Arc::new(SymptomClassifier::new(&config)),
        router: Arc::new(SeverityRouter::new(&config, index)),
        store,
        config: Arc::new(config),
    };
    Ok(build_router(state))
}

fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/hospitals/severity-based", post(severity_based_search))
        .route("/hospitals", get(hospitals_within_radius))
        .route("/hospitals/search", get(hospitals_by_name))
        .route("/hospitals/stats", get(hospital_stats))
        .route("/pincode/{code}", get(resolve_pincode))
        .route("/symptoms/classify", post(classify_symptoms))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origin = config
        .allowed_origin
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3001"));
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "MediRoute",
        "description": "Severity-aware healthcare facility routing",
        "endpoints": {
            "POST /hospitals/severity-based": "Severity-routed facility search",
            "GET /hospitals": "Single-radius diagnostic search",
            "GET /hospitals/search": "Diagnostic facility name search",
            "GET /hospitals/stats": "Facility store counters",
            "GET /pincode/{code}": "Pincode to coordinate resolution",
            "POST /symptoms/classify": "Symptom severity classification",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let timestamp = chrono::Utc::now().to_rfc3339();
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected", "timestamp": timestamp })),
        ),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unreachable", "timestamp": timestamp })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SeverityBasedRequest {
    /// Kept for request logging only; the coordinate drives the search.
    #[serde(default)]
    pincode: Option<String>,
    latitude: f64,
    longitude: f64,
    severity_level: SeverityLevel,
    #[serde(default)]
    specialties: Vec<String>,
}

async fn severity_based_search(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SeverityBasedRequest>,
) -> ApiResult<Value> {
    validate_coordinate(&state.config, request.latitude, request.longitude)?;

    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        pincode = request.pincode.as_deref().unwrap_or("-"),
        severity = %request.severity_level,
        "severity-based search"
    );

    let specialty = request
        .specialties
        .first()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    let level = request.severity_level;
    let routed = with_deadline(&state.config, async {
        state
            .router
            .search(request.latitude, request.longitude, level, specialty)
            .await
    })
    .await?;

    // Government facilities lead for the lower tiers; distance order is
    // preserved within each group. High/emergency keep pure router order.
    let facilities = match level {
        SeverityLevel::Mild | SeverityLevel::Moderate => government_first(routed.facilities),
        SeverityLevel::High | SeverityLevel::Emergency => routed.facilities,
    };

    info!(
        %request_id,
        count = facilities.len(),
        radius_used = routed.radius_used_km,
        "severity-based search complete"
    );

    Ok(Json(json!({
        "facilities": facilities,
        "radiusUsed": routed.radius_used_km,
        "wasExpanded": routed.was_expanded,
        "specialtyFiltered": routed.specialty_filtered,
        "severityLevel": level,
        "config": {
            "level": level.label(),
            "initialRadius": level.initial_radius_km(),
        }
    })))
}

async fn resolve_pincode(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<mediroute_core::PincodeResolution> {
    if !valid_pincode(&code) {
        return Err(bad_request("pincode must be exactly six digits"));
    }

    let resolution = with_deadline(&state.config, state.resolver.resolve(&code)).await?;
    Ok(Json(resolution))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClassifyRequest {
    symptoms: String,
    #[serde(default)]
    clarifying_answers: Vec<String>,
    #[serde(default)]
    stage1_cache: Option<Value>,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

/// Never returns an internal error: the classifier is total and degrades
/// internally. The overall request deadline still applies.
async fn classify_symptoms(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ClassifyRequest>,
) -> ApiResult<mediroute_core::Assessment> {
    if request.symptoms.trim().is_empty() {
        return Err(bad_request("symptoms text is required"));
    }

    let input = ClassifyInput {
        symptoms: request.symptoms,
        clarifying_answers: request.clarifying_answers,
        stage1_cache: request.stage1_cache,
        age: request.age,
        duration: request.duration,
    };
    let assessment = with_deadline(&state.config, async {
        Ok::<_, ServiceError>(state.classifier.classify(&input).await)
    })
    .await?;
    Ok(Json(assessment))
}

#[derive(Debug, Deserialize)]
struct HospitalsQuery {
    lat: f64,
    lng: f64,
    radius: Option<f64>,
    emergency: Option<bool>,
    specialty: Option<String>,
    ayush: Option<bool>,
}

/// Single-radius diagnostic search; no progressive expansion and no
/// quality gate, so data problems stay visible.
async fn hospitals_within_radius(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<HospitalsQuery>,
) -> ApiResult<Value> {
    validate_coordinate(&state.config, params.lat, params.lng)?;
    let radius_km = params.radius.unwrap_or(10.0);
    if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > 50.0 {
        return Err(bad_request("radius must be in (0, 50] km"));
    }

    let mut query = SpatialQuery::new(params.lat, params.lng, radius_km * 1000.0, 0.0);
    query.specialty = params.specialty.filter(|s| !s.trim().is_empty());
    query.emergency_only = params.emergency.unwrap_or(false);
    query.ayush = params.ayush;
    query.limit = DIAGNOSTIC_ROW_CAP;

    let store = state.store.clone();
    let hospitals =
        with_deadline(&state.config, async move { store.nearest_within(&query).await }).await?;
    let count = hospitals.len();

    Ok(Json(json!({
        "hospitals": hospitals,
        "count": count,
        "radius": radius_km,
    })))
}

#[derive(Debug, Deserialize)]
struct NameSearchQuery {
    q: String,
    state: Option<String>,
}

async fn hospitals_by_name(
    State(state): State<AppState>,
    ValidatedQuery(params): ValidatedQuery<NameSearchQuery>,
) -> ApiResult<Value> {
    let q = params.q.trim().to_string();
    if q.is_empty() {
        return Err(bad_request("query parameter q is required"));
    }

    let store = state.store.clone();
    let hospitals = with_deadline(&state.config, async move {
        store.fuzzy_name_search(&q, params.state.as_deref()).await
    })
    .await?;
    let count = hospitals.len();

    Ok(Json(json!({ "hospitals": hospitals, "count": count })))
}

async fn hospital_stats(State(state): State<AppState>) -> ApiResult<mediroute_core::StoreStats> {
    let store = state.store.clone();
    let stats = with_deadline(&state.config, async move { store.stats().await }).await?;
    Ok(Json(stats))
}

fn validate_coordinate(config: &Config, latitude: f64, longitude: f64) -> Result<(), ApiError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(bad_request("latitude and longitude must be finite numbers"));
    }
    if !config.country_bbox.contains(latitude, longitude) {
        return Err(bad_request(
            "coordinates fall outside the supported country bounding box",
        ));
    }
    Ok(())
}

/// Enforce the overall request deadline around a component call. On
/// expiry the downstream future is dropped, cancelling in-flight work;
/// partial results are never returned.
async fn with_deadline<T>(
    config: &Config,
    work: impl std::future::Future<Output = mediroute_core::Result<T>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(config.request_deadline, work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(error = %e, kind = e.kind(), "request failed");
            Err(map_error(e))
        }
        Err(_) => {
            warn!("request deadline exceeded");
            Err(map_error(ServiceError::Deadline))
        }
    }
}

/// Stable partition: government-tagged facilities first, distance order
/// preserved within each group.
fn government_first(facilities: Vec<Facility>) -> Vec<Facility> {
    let (government, private): (Vec<_>, Vec<_>) =
        facilities.into_iter().partition(Facility::is_government);
    government.into_iter().chain(private).collect()
}
