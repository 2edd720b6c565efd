use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tracing::{error, warn};

use crate::error::AppError;
use crate::middleware::{bearer_token, AuthenticatedUser};
use crate::state::AppState;
use crate::websocket::session::WsSession;
use crate::websocket::{ConnectionHandle, UserKey};

/// Handshake context: who is connecting, for which tenant
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

/// Resolve the connection identity; it must match the bearer token
fn authenticate_handshake(
    state: &AppState,
    params: &WsParams,
    req: &HttpRequest,
) -> Result<UserKey, AppError> {
    let tenant_id = params
        .tenant_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("tenantId is required".to_string()))?;
    let user_id = params
        .user_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("userId is required".to_string()))?;

    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(req))
        .ok_or(AppError::Unauthorized)?;
    let caller = AuthenticatedUser::from(state.jwt.verify(token)?);

    if caller.tenant_id != tenant_id || caller.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(UserKey::new(tenant_id, user_id))
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    let user = match authenticate_handshake(&state, &params, &req) {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "WebSocket connection rejected");
            return Err(e.into());
        }
    };

    let (handle, outbound) = ConnectionHandle::new(user, state.config.ws.outbound_queue_capacity);
    let snapshot = state
        .router
        .on_connect(&handle)
        .await
        .map_err(AppError::from)?;

    let session = WsSession::new(
        handle.clone(),
        outbound,
        state.router.clone(),
        snapshot,
        &state.config.ws,
    );

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            error!(connection_id = %handle.id(), error = %e, "WebSocket upgrade failed");
            state.router.on_disconnect(&handle).await;
            Err(e)
        }
    }
}
