//! Example consumer: serves the models under `MODELS_PATH` with crudkit.
//!
//! Run from repo root: `MODELS_PATH=example_consumer/models cargo run -p example-consumer`
//! Without `DATABASE_URL` rows live in memory.

mod hooks;

use crudkit::{
    api_router, init_tracing, load_models_from_dir, AppState, AuditSink, MemoryStore, ModelExtensions, ModelRegistry,
    Persistence, PgStore, Settings, StoreAuditSink, TracingAuditSink,
};
use hooks::{CoverImage, ProductHooks};
use std::sync::Arc;
use tokio::net::TcpListener;

const AUDIT_MODEL: &str = "activity_log";

fn extensions_for(model: &str) -> ModelExtensions {
    match model {
        "product" => ModelExtensions::new()
            .hooks(ProductHooks)
            .handler("cover_image", CoverImage),
        _ => ModelExtensions::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    init_tracing();

    let mut registry = ModelRegistry::with_default_access(settings.default_access);
    for config in load_models_from_dir(&settings.models_path).await? {
        let ext = extensions_for(&config.key());
        registry.register_model(config, ext)?;
    }
    let registry = Arc::new(registry);

    let store: Arc<dyn Persistence> = match &settings.database_url {
        Some(url) => Arc::new(PgStore::connect(url, settings.db_max_connections, registry.clone()).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let audit: Arc<dyn AuditSink> = match registry.get(AUDIT_MODEL) {
        Some(m) => Arc::new(StoreAuditSink::new(store.clone(), m.config.clone())),
        None => Arc::new(TracingAuditSink),
    };

    let state = AppState::new(registry.clone(), store, &settings.api_prefix)?
        .with_audit(audit)
        .with_public_identity(settings.identify_public);
    for entry in state.dispatcher.table().entries() {
        tracing::debug!(route = %entry.key(), handler = ?entry.handler, "route");
    }
    let app = api_router(state, settings.body_limit);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        models = registry.len(),
        prefix = %settings.api_prefix,
        "crudkit example listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
