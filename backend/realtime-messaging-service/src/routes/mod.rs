pub mod messages;
pub mod notifications;
pub mod wsroute;

use actix_web::{get, web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "connections": state.registry.connection_count().await,
        "rooms": state.registry.room_count().await,
    }))
}

/// Register every route; shared by the server and the HTTP tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(wsroute::ws_handler)
        .service(messages::send_message)
        .service(messages::get_conversation)
        .service(messages::get_conversations)
        .service(messages::delete_message)
        .service(notifications::notify_like)
        .service(notifications::notify_comment)
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));
}
