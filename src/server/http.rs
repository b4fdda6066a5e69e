//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Requests are routed by
//! hand in [`handle_request`]; API handlers return `crate::types::Result` and
//! errors are rendered into the JSON error envelope here.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::AuthProvider;
use crate::config::Args;
use crate::evidence::{EvidenceIngestor, ImageStore, ObjectStore, ValidationQueue};
use crate::routes::{self, campaigns, evidence, Route};
use crate::store::CampaignStore;
use crate::types::{CampaignError, Result};
use crate::workflow::{CampaignQueries, StepEngine};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Collaborators injected into the application
pub struct Backends {
    pub store: Arc<dyn CampaignStore>,
    /// Label reported by the readiness probe (`mongodb`, `memory`)
    pub store_kind: &'static str,
    pub auth: Arc<dyn AuthProvider>,
    pub objects: Arc<dyn ObjectStore>,
    pub images: Arc<dyn ImageStore>,
    pub queue: Option<Arc<dyn ValidationQueue>>,
}

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn CampaignStore>,
    pub store_kind: &'static str,
    pub auth: Arc<dyn AuthProvider>,
    pub engine: StepEngine,
    pub queries: CampaignQueries,
    pub ingestor: EvidenceIngestor,
    pub validation_enabled: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, backends: Backends) -> Self {
        let temp_dir: PathBuf = args.temp_dir();
        let validation_enabled = backends.queue.is_some();
        let ingestor = EvidenceIngestor::new(
            Arc::clone(&backends.store),
            backends.objects,
            backends.images,
            backends.queue,
            temp_dir,
        );

        Self {
            engine: StepEngine::new(Arc::clone(&backends.store)),
            queries: CampaignQueries::new(Arc::clone(&backends.store)),
            store: backends.store,
            store_kind: backends.store_kind,
            auth: backends.auth,
            ingestor,
            validation_enabled,
            started_at: Instant::now(),
            args,
        }
    }
}

/// Serve until ctrl-c
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Rally listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - error detail is returned to clients");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(&state),
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            routes::readiness_check(&state).await
        }
        (&Method::GET, "/version") => routes::version_info(),
        (&Method::OPTIONS, _) => routes::preflight_response(),
        _ => match routes::match_route(&method, &path) {
            Some(route) => match dispatch(&state, route, req).await {
                Ok(response) => response,
                Err(err) => {
                    log_failure(&method, &path, &err);
                    routes::error_response(&err, state.args.dev_mode)
                }
            },
            None => routes::not_found_response(&path),
        },
    };

    Ok(to_boxed(response))
}

async fn dispatch(
    state: &AppState,
    route: Route,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    match route {
        Route::CreateCampaign => campaigns::create_campaign(state, req).await,
        Route::MyCampaigns => campaigns::my_campaigns(state, req).await,
        Route::TeamCampaigns => campaigns::team_campaigns(state, req).await,
        Route::CampaignStats => campaigns::campaign_stats(state, req).await,
        Route::GetCampaign(id) => campaigns::get_campaign(state, &id).await,
        Route::ApplyStep(id) => campaigns::apply_step(state, &id, req).await,
        Route::UploadEvidence(id) => evidence::upload_evidence(state, &id, req).await,
        Route::EvidenceValidation {
            campaign_id,
            evidence_id,
        } => evidence::validation_callback(state, &campaign_id, &evidence_id, req).await,
    }
}

fn log_failure(method: &Method, path: &str, err: &CampaignError) {
    if err.status_code().is_server_error() {
        error!(%method, path, kind = err.kind(), error = %err, "Request failed");
    } else {
        debug!(%method, path, kind = err.kind(), error = %err, "Request rejected");
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
