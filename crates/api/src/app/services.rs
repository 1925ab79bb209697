//! Service wiring: store selection, external clients, and the orchestration
//! services the handlers call.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use gatepass_auth::SessionIssuer;
use gatepass_core::{Clock, SystemClock};
use gatepass_infra::{
    AppConfig, AuthReconciler, AzureConfig, DirectoryError, DirectoryGateway, GraphClient, GraphError,
    HttpDirectoryGateway, InMemoryUserStore, PostgresUserStore, StoreError, UserQueries, UserStore,
};

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("database unavailable: {0}")]
    Database(String),

    #[error("failed to prepare user store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build directory client: {0}")]
    Directory(#[from] DirectoryError),

    #[error("failed to build identity provider client: {0}")]
    Graph(#[from] GraphError),
}

/// Everything a handler may need, shared behind one `Arc`.
pub struct AppServices {
    pub reconciler: AuthReconciler,
    pub users: UserQueries,
    pub sessions: Arc<SessionIssuer<Arc<dyn Clock>>>,
    pub azure: Option<AzureConfig>,
}

/// Build services from configuration with the system clock.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    build_services_with_clock(config, Arc::new(SystemClock)).await
}

pub async fn build_services_with_clock(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<AppServices, ServicesError> {
    let store = build_store(config).await?;

    config.directory.log_config();
    let directory: Arc<dyn DirectoryGateway> =
        Arc::new(HttpDirectoryGateway::with_clock(&config.directory, clock.clone())?);

    let sessions = Arc::new(SessionIssuer::with_clock(
        config.jwt_secret.expose().as_bytes(),
        config.session_validity,
        clock.clone(),
    ));

    let mut reconciler = AuthReconciler::new(store.clone(), directory.clone(), sessions.clone(), clock.clone());
    if config.azure.is_some() {
        reconciler = reconciler.with_identity_provider(Arc::new(GraphClient::new(&config.graph_base_url)?));
        tracing::info!("federated login enabled");
    } else {
        tracing::info!("federated login disabled: identity provider not configured");
    }

    Ok(AppServices {
        reconciler,
        users: UserQueries::new(store, directory, clock),
        sessions,
        azure: config.azure.clone(),
    })
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn UserStore>, ServicesError> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set; using the in-memory user store");
        return Ok(Arc::new(InMemoryUserStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url.expose())
        .await
        .map_err(|e| ServicesError::Database(e.to_string()))?;

    let store = PostgresUserStore::new(pool);
    store.ensure_schema().await?;
    tracing::info!("using the Postgres user store");
    Ok(Arc::new(store))
}
