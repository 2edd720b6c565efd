/// Direct message HTTP endpoints
///
/// A thin surface over the same conversation store and event router the
/// WebSocket transport uses. Every call acts inside the caller's tenant.
use actix_web::{delete, get, post, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::models::ADMIN_USER_ID;
use crate::state::AppState;
use crate::websocket::MessageEnvelope;

/// List the user's conversations
///
/// **Endpoint**: `GET /messages/{userId}`
#[get("/messages/{user_id}")]
pub async fn get_conversations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    user_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id.into_inner();
    user.require_self_or_admin(&user_id)?;

    let conversations = state
        .conversations
        .conversations_for(&user.tenant_id, &user_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversations))
}

/// Single conversation between the user and one counterpart
///
/// **Endpoint**: `GET /messages/{userId}/{counterpartId}`
#[get("/messages/{user_id}/{counterpart_id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, counterpart_id) = path.into_inner();
    user.require_self_or_admin(&user_id)?;

    let conversation = state
        .conversations
        .conversation_with(&user.tenant_id, &user_id, &counterpart_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

/// Persist a message, deliver it live and push-notify the recipient
///
/// **Endpoint**: `POST /messages/send_msg`
#[post("/messages/send_msg")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    request: web::Json<MessageEnvelope>,
) -> Result<HttpResponse, AppError> {
    let MessageEnvelope { tenant_id, message } = request.into_inner();
    if tenant_id != user.tenant_id {
        return Err(AppError::Forbidden);
    }
    // Admins may also write from the tenant's admin inbox
    let may_send_as = message.from_id == user.user_id
        || (user.is_admin() && message.from_id == ADMIN_USER_ID);
    if !may_send_as {
        return Err(AppError::Forbidden);
    }

    let sent = state.router.send_message(&tenant_id, message).await?;
    Ok(HttpResponse::Created().json(sent.message))
}

/// Delete a message the caller sent
///
/// **Endpoint**: `DELETE /messages/{messageId}`
#[delete("/messages/{message_id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    message_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    state
        .conversations
        .delete(&user.tenant_id, &message_id.into_inner(), &user.user_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
