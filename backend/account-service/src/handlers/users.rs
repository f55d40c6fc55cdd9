/// Authenticated account endpoints
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::auth::MessageResponse;
use super::form::AccountForm;
use crate::app_state::AppState;
use crate::error::Result;
use crate::middleware::AuthenticatedAccount;
use crate::models::ProfileSummary;
use crate::services::authorize;

#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub message: String,
    pub status: u16,
    pub user: ProfileSummary,
}

/// PUT /api/v1/user/{id}
pub async fn edit_user(
    state: web::Data<AppState>,
    caller: AuthenticatedAccount,
    id: web::Path<i64>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let id = id.into_inner();
    // Refuse before buffering someone else's upload
    authorize(&caller.0, id)?;

    let form = AccountForm::read(payload, state.max_avatar_bytes).await?;
    let input = form.edit()?;

    let account = state
        .accounts
        .edit_user(&caller.0, id, input, form.avatar)
        .await?;

    Ok(HttpResponse::Ok().json(EditResponse {
        message: "User updated successfully".to_string(),
        status: 200,
        user: ProfileSummary::from(&account),
    }))
}

/// DELETE /api/v1/user/{id}
pub async fn delete_user(
    state: web::Data<AppState>,
    caller: AuthenticatedAccount,
    id: web::Path<i64>,
) -> Result<HttpResponse> {
    state.accounts.delete_user(&caller.0, id.into_inner()).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "User successfully deleted".to_string(),
        status: 200,
    }))
}
