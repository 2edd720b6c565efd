use actix_web::{middleware::Logger, web, App, HttpServer};
use nova_push_gateway::FcmLegacyClient;
use realtime_messaging_service::{
    config, error, logging, metrics, routes,
    state::AppState,
    store::{MemoryDocumentStore, PgDocumentStore, StoreClient},
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let store = match &cfg.database_url {
        Some(url) => {
            let pg = PgDocumentStore::connect(url, cfg.database_max_connections)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            pg.migrate()
                .await
                .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;
            StoreClient::new(Arc::new(pg))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory document store");
            StoreClient::new(Arc::new(MemoryDocumentStore::new()))
        }
    };

    let gateway = FcmLegacyClient::new(cfg.push.gateway_url.clone(), cfg.push.timeout)
        .map_err(|e| error::AppError::StartServer(format!("push gateway: {e}")))?;
    tracing::info!(endpoint = gateway.endpoint(), "push gateway client ready");

    let port = cfg.port;
    let state = AppState::new(cfg, store, Arc::new(gateway));

    tracing::info!(port, "starting realtime-messaging-service");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(e.to_string()))
}
