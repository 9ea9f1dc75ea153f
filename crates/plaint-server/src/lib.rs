//! Plaint Web Server
//!
//! Axum-based REST API for the Plaint complaint intake service.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Trusted networks that bypass authentication, with trusted-proxy aware client IPs
//! - Restrictive CORS policy
//! - Input validation (pagination limits, body size limits)
//! - Full audit logging for all API access (reads and writes)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use plaint_core::ai::AIBackend;
use plaint_core::db::Database;
use plaint_core::ComplaintAnalyzer;

mod handlers;

/// Maximum JSON request body size (1 MB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Default page size for list endpoints
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Environment variables read by [`ServerConfig::from_env`]
pub const API_KEYS_ENV: &str = "PLAINT_API_KEYS";
pub const ALLOWED_ORIGINS_ENV: &str = "PLAINT_ALLOWED_ORIGINS";
pub const TRUSTED_NETWORKS_ENV: &str = "PLAINT_TRUSTED_NETWORKS";
pub const TRUSTED_PROXIES_ENV: &str = "PLAINT_TRUSTED_PROXIES";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only, `*` = any)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as `Authorization: Bearer <key>`
    pub api_keys: Vec<String>,
    /// Trusted networks that bypass authentication (e.g., "192.168.1.0/24", "10.0.0.5")
    pub trusted_networks: Vec<ipnet::IpNet>,
    /// Trusted proxies whose X-Forwarded-For headers are trusted
    pub trusted_proxies: Vec<ipnet::IpNet>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            trusted_networks: vec![],
            trusted_proxies: vec![],
        }
    }
}

impl ServerConfig {
    /// Read keys, origins and networks from the `PLAINT_*` environment variables
    pub fn from_env(require_auth: bool) -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            require_auth,
            allowed_origins: split_list(&var(ALLOWED_ORIGINS_ENV)),
            api_keys: split_list(&var(API_KEYS_ENV)),
            trusted_networks: parse_trusted_networks(&var(TRUSTED_NETWORKS_ENV)),
            trusted_proxies: parse_trusted_networks(&var(TRUSTED_PROXIES_ENV)),
        }
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub analyzer: ComplaintAnalyzer,
    pub config: ServerConfig,
}

/// Who made a request, recorded in the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

/// Actor recorded when authentication is disabled
pub const LOCAL_ACTOR: &str = "local";

/// Authentication middleware - validates API keys or trusted networks
///
/// # Security Notes
///
/// **Trusted networks**: Requests from IPs in `trusted_networks` bypass authentication.
/// The client IP comes from the TCP peer address; forwarding headers are only
/// honored when the peer is a configured trusted proxy.
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
///
/// The authenticated [`Actor`] is attached to the request for audit logging.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    connect_info: Option<axum::extract::ConnectInfo<std::net::SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        request
            .extensions_mut()
            .insert(Actor(LOCAL_ACTOR.to_string()));
        return next.run(request).await;
    }

    // Check if request is from a trusted network
    if !state.config.trusted_networks.is_empty() {
        let client_ip = get_client_ip(
            &request,
            connect_info.as_ref(),
            &state.config.trusted_proxies,
        );

        tracing::debug!(
            ?client_ip,
            trusted_networks = ?state.config.trusted_networks,
            path = %request.uri().path(),
            "Checking trusted network auth"
        );

        if let Some(ip) = client_ip {
            if is_ip_trusted(&ip, &state.config.trusted_networks) {
                info!(ip = %ip, path = %request.uri().path(), "Authenticated via trusted network");
                request
                    .extensions_mut()
                    .insert(Actor("trusted-network".to_string()));
                return next.run(request).await;
            }
        }
    }

    // Check for API key in Authorization header (Bearer token)
    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
        request.extensions_mut().insert(Actor("api-key".to_string()));
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Extract client IP address, respecting trusted proxies
///
/// SECURITY: X-Forwarded-For headers are ONLY trusted when the TCP connection
/// comes from a configured trusted proxy. Otherwise, only the actual TCP
/// peer address is used (to prevent header spoofing attacks).
pub(crate) fn get_client_ip(
    request: &Request,
    connect_info: Option<&axum::extract::ConnectInfo<std::net::SocketAddr>>,
    trusted_proxies: &[ipnet::IpNet],
) -> Option<std::net::IpAddr> {
    let peer_ip = connect_info.map(|ci| ci.0.ip())?;

    if trusted_proxies.is_empty() {
        return Some(peer_ip);
    }

    let peer_is_trusted_proxy = trusted_proxies.iter().any(|net| net.contains(&peer_ip));

    if peer_is_trusted_proxy {
        // X-Forwarded-For format: "client, proxy1, proxy2" - take the first (original client)
        if let Some(client_ip) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|forwarded| forwarded.split(',').next())
            .and_then(|first| first.trim().parse::<std::net::IpAddr>().ok())
        {
            return Some(client_ip);
        }

        if let Some(client_ip) = request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|real_ip| real_ip.trim().parse::<std::net::IpAddr>().ok())
        {
            return Some(client_ip);
        }
    }

    Some(peer_ip)
}

/// Check if an IP address is within any of the trusted networks
fn is_ip_trusted(ip: &std::net::IpAddr, trusted_networks: &[ipnet::IpNet]) -> bool {
    trusted_networks.iter().any(|network| network.contains(ip))
}

/// Parse a comma-separated list of IP addresses and CIDR networks
///
/// Examples:
/// - "192.168.1.0/24" - entire subnet
/// - "10.0.0.5" - single IP (parsed as /32 for IPv4 or /128 for IPv6)
/// - "192.168.1.0/24,10.0.0.0/8" - multiple networks
pub fn parse_trusted_networks(input: &str) -> Vec<ipnet::IpNet> {
    input
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(net) = s.parse::<ipnet::IpNet>() {
                return Some(net);
            }
            if let Ok(ip) = s.parse::<std::net::IpAddr>() {
                return Some(ipnet::IpNet::from(ip));
            }
            warn!(input = s, "Failed to parse trusted network entry");
            None
        })
        .collect()
}

/// Actor attached by the auth middleware
pub fn get_actor(request: &Request) -> String {
    request
        .extensions()
        .get::<Actor>()
        .map(|a| a.0.clone())
        .unwrap_or_else(|| LOCAL_ACTOR.to_string())
}

/// Simple message response
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Create the application router
pub fn create_router(
    db: Database,
    analyzer: ComplaintAnalyzer,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> Router {
    match analyzer.ai() {
        Some(client) => info!(
            "AI backend configured: {} {} (model: {})",
            client.backend_name(),
            client.host(),
            client.model()
        ),
        None => info!("ℹ️  AI backend not configured, classifying with patterns only"),
    }

    let state = Arc::new(AppState {
        db,
        analyzer,
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Complaints
        .route(
            "/complaints",
            get(handlers::list_complaints).post(handlers::create_complaint),
        )
        .route(
            "/complaints/:id",
            get(handlers::get_complaint)
                .put(handlers::replace_complaint)
                .patch(handlers::update_complaint)
                .delete(handlers::delete_complaint),
        )
        // Analysis
        .route("/analyze", post(handlers::analyze))
        .route("/statistics", get(handlers::get_statistics))
        .route("/simulate", post(handlers::simulate))
        // Audit
        .route("/audit", get(handlers::list_audit_log))
        // Language model usage
        .route("/ai/stats", get(handlers::get_ai_stats))
        .route("/ai/metrics", get(handlers::list_ai_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health stays reachable without credentials
    let api_routes = api_routes.route("/health", get(handlers::health));

    let cors = build_cors(&config.allowed_origins);

    // Security headers
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none'",
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve the static UI if a directory is provided (`/` → index.html)
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    if allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        return cors;
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(origins)
}

/// Start the server
pub async fn serve(
    db: Database,
    analyzer: ComplaintAnalyzer,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() && config.trusted_networks.is_empty() {
        warn!(
            "⚠️  Authentication required but neither {} nor {} is set; every API call will be rejected",
            API_KEYS_ENV, TRUSTED_NETWORKS_ENV
        );
    }

    check_ai_connection(&analyzer).await;

    let app = create_router(db, analyzer, static_dir, config)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection(analyzer: &ComplaintAnalyzer) {
    match analyzer.ai() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ AI backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  AI backend configured but not responding: {} (model: {}); pattern fallback stays active",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  AI backend not configured (set OPENAI_COMPATIBLE_HOST or OLLAMA_HOST to enable)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // Caller mistakes surface as client errors with their message
        if let Some(core) = err.downcast_ref::<plaint_core::Error>() {
            match core {
                plaint_core::Error::InvalidData(msg) => return Self::bad_request(msg),
                plaint_core::Error::Query(msg) => {
                    return Self::bad_request(&format!("Query parsing failed: {}", msg))
                }
                plaint_core::Error::NotFound(msg) => return Self::not_found(msg),
                _ => {}
            }
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
