use actix_web::{post, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::services::PostActivity;
use crate::state::AppState;

fn authorize(user: &AuthenticatedUser, activity: &PostActivity) -> Result<(), AppError> {
    if activity.post_id.trim().is_empty() || activity.recipient_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "postId and recipientId are required".to_string(),
        ));
    }
    user.require_self_or_admin(&activity.sender_id)
}

/// **Endpoint**: `POST /notifications/like`
#[post("/notifications/like")]
pub async fn notify_like(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    request: web::Json<PostActivity>,
) -> Result<HttpResponse, AppError> {
    let activity = request.into_inner();
    authorize(&user, &activity)?;

    let report = state
        .dispatcher
        .send_like_notification(&user.tenant_id, &activity)
        .await;
    Ok(HttpResponse::Ok().json(report))
}

/// **Endpoint**: `POST /notifications/comment`
#[post("/notifications/comment")]
pub async fn notify_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    request: web::Json<PostActivity>,
) -> Result<HttpResponse, AppError> {
    let activity = request.into_inner();
    authorize(&user, &activity)?;

    let report = state
        .dispatcher
        .send_comment_notification(&user.tenant_id, &activity)
        .await;
    Ok(HttpResponse::Ok().json(report))
}
