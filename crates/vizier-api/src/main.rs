// Vizier API server
//
// Exposes the Viztrail Store, Project Cache and Execution Controller
// over HTTP. The wire details here (routes, status codes, OpenAPI) are
// the external collaborator spec.md §1 scopes out of the core; the core
// logic all lives in vizier-store/vizier-cache/vizier-backend/vizier-engine.

mod branches;
mod common;
mod error;
mod modules;
mod projects;
mod tasks;
mod workflows;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vizier_backend::builtins::{DropDatasetHandler, LoadDatasetHandler, PythonCellHandler, UpdateCellHandler};
use vizier_backend::{Backend, HandlerRegistry, InProcessBackend};
use vizier_cache::{CommonProjectCache, ContainerProjectCache, ProjectCache};
use vizier_core::VizierConfig;
use vizier_engine::ExecutionController;
use vizier_store::{FsViztrailStore, ViztrailStore};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        projects::list_projects,
        projects::create_project,
        projects::get_project,
        projects::rename_project,
        projects::delete_project,
        branches::list_branches,
        branches::create_branch,
        branches::get_branch,
        branches::rename_branch,
        branches::delete_branch,
        workflows::get_workflow,
        modules::get_module,
        modules::append_module,
        modules::insert_module,
        modules::replace_module,
        modules::delete_module,
        modules::cancel_exec,
        tasks::update_task_state,
    ),
    components(schemas(
        vizier_core::Viztrail,
        vizier_core::Branch,
        vizier_core::Workflow,
        vizier_core::WorkflowAction,
        vizier_core::Module,
        vizier_core::ModuleState,
        vizier_core::Command,
        vizier_core::Argument,
        vizier_core::Timestamps,
        vizier_core::Outputs,
        vizier_core::Provenance,
        vizier_core::DatasetDescriptor,
        vizier_core::Identifier,
        common::ErrorResponse,
        projects::ProjectView,
        projects::ContainerEndpointView,
        projects::CreateProjectRequest,
        projects::RenameProjectRequest,
        branches::CreateBranchRequest,
        branches::RenameBranchRequest,
        modules::AppendModuleRequest,
        modules::InsertModuleRequest,
        modules::ReplaceModuleRequest,
        tasks::TaskStateCallback,
    )),
    tags(
        (name = "projects", description = "Project (viztrail) management"),
        (name = "branches", description = "Branch management"),
        (name = "workflows", description = "Immutable workflow snapshots"),
        (name = "modules", description = "Branch edit operations and module lookup"),
        (name = "tasks", description = "Backend task-state callback"),
    ),
    info(
        title = "Vizier API",
        version = "0.1.0",
        description = "Multi-project data-curation notebook service: viztrails, branches, workflows and the execution controller that schedules them.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

fn build_backend() -> Arc<dyn Backend> {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(PythonCellHandler));
    handlers.register(Arc::new(LoadDatasetHandler::new()));
    handlers.register(Arc::new(UpdateCellHandler::new()));
    handlers.register(Arc::new(DropDatasetHandler));
    Arc::new(InProcessBackend::new(handlers, num_cpus()))
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "vizier_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VizierConfig::from_env().context("failed to load configuration")?;
    tracing::info!(storage_base = %config.storage_base.display(), bind_addr = %config.bind_addr, "vizier-api starting");

    let store: Arc<dyn ViztrailStore> = Arc::new(
        FsViztrailStore::open(&config.storage_base)
            .await
            .context("failed to open the filesystem viztrail store")?,
    );

    let cache: Arc<dyn ProjectCache> = match &config.container_manifest {
        Some(manifest) => {
            tracing::info!(manifest = %manifest.display(), "using container-backed project cache");
            Arc::new(ContainerProjectCache::new(manifest.clone()))
        }
        None => Arc::new(CommonProjectCache::new(store.clone())),
    };

    let backend = build_backend();
    let controller = Arc::new(ExecutionController::new(store.clone(), cache.clone(), backend));

    let projects_state = projects::AppState { cache: cache.clone(), store: store.clone() };
    let branches_state = branches::AppState { store: store.clone() };
    let workflows_state = workflows::AppState { store: store.clone() };
    let modules_state = modules::AppState { store: store.clone(), controller: controller.clone() };
    let tasks_state = tasks::AppState { controller: controller.clone() };

    let app = Router::new()
        .route("/health", get(health))
        .merge(projects::routes(projects_state))
        .merge(branches::routes(branches_state))
        .merge(workflows::routes(workflows_state))
        .merge(modules::routes(modules_state))
        .merge(tasks::routes(tasks_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
