use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use chat_relay_service::{config, error, logging, routes, state::AppState, store::memory::MemoryStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();

    let cfg = Arc::new(config::Config::from_env()?);
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, cfg.clone());

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-relay-service");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(state.clone()))
            .service(routes::health)
            .service(routes::wsroute::ws_handler)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(e.to_string()))
}
