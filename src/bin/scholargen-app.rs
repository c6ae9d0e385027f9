use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use clap::Parser;
use tower_http::trace::TraceLayer;

use scholargen::app::context::AppContext;
use scholargen::config::Config;
use scholargen::document::{DocumentId, NewDocument};
use scholargen::generation::{BillingContext, GenerationError, StartResult};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Overrides `SCHOLARGEN_DATA_DIR`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Overrides `SCHOLARGEN_MAX_CONCURRENCY`.
    #[arg(long)]
    max_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    scholargen::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting scholargen-app");

    let mut config = Config::from_env()?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config.max_concurrency = max_concurrency.max(1);
    }
    let ctx = AppContext::from_config(config)?;

    let worker = ctx.worker.clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let worker_task = tokio::spawn(async move {
        worker
            .run(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let _ = shutdown_tx.send(());
    worker_task.await?;
    Ok(())
}

fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/documents", post(create_document))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/status", get(get_status))
        .route("/documents/:id/generate/base", post(generate_base))
        .route("/documents/:id/generate/full", post(generate_full))
        .route("/documents/:id/jobs", get(get_jobs).delete(delete_jobs))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

struct ApiError(GenerationError);

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GenerationError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            err if err.is_precondition() => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

fn start_response(result: StartResult) -> Response {
    let status = if result.success {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(result)).into_response()
}

async fn create_document(
    State(ctx): State<AppContext>,
    Json(body): Json<NewDocument>,
) -> Result<Response, (StatusCode, String)> {
    let document = body
        .into_document()
        .map_err(|err| (StatusCode::UNPROCESSABLE_ENTITY, format!("{err:#}")))?;
    ctx.documents.create(&document).await.map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("create document: {err:#}"),
        )
    })?;
    tracing::info!(document_id = %document.id, user_id = %document.user_id, "document created");
    Ok((StatusCode::CREATED, Json(document)).into_response())
}

async fn get_document(
    State(ctx): State<AppContext>,
    Path(id): Path<DocumentId>,
) -> Result<Response, ApiError> {
    let document = ctx.orchestrator.load(id).await?;
    Ok(Json(document).into_response())
}

async fn get_status(
    State(ctx): State<AppContext>,
    Path(id): Path<DocumentId>,
) -> Result<Response, ApiError> {
    let report = ctx.orchestrator.status(id).await?;
    Ok(Json(report).into_response())
}

async fn generate_base(State(ctx): State<AppContext>, Path(id): Path<DocumentId>) -> Response {
    start_response(ctx.orchestrator.safe_start_base_generation(id).await)
}

/// The charge is always the configured price; a request body is ignored.
async fn generate_full(
    State(ctx): State<AppContext>,
    Path(id): Path<DocumentId>,
) -> Result<Response, ApiError> {
    let document = ctx.orchestrator.load(id).await?;
    let billing = BillingContext::owner_of(&document, ctx.config.full_generation_price);
    Ok(start_response(
        ctx.orchestrator.safe_start_full_generation(id, &billing).await,
    ))
}

async fn get_jobs(
    State(ctx): State<AppContext>,
    Path(id): Path<DocumentId>,
) -> Result<Response, ApiError> {
    let status = ctx.orchestrator.job_status(id).await?;
    Ok(Json(status).into_response())
}

async fn delete_jobs(
    State(ctx): State<AppContext>,
    Path(id): Path<DocumentId>,
) -> Result<Response, ApiError> {
    let deleted = ctx.orchestrator.delete_jobs(id).await?;
    Ok(Json(deleted).into_response())
}
