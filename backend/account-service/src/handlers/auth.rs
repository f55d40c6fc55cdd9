/// Public authentication endpoints
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::form::AccountForm;
use crate::app_state::AppState;
use crate::error::Result;
use crate::models::{AccountView, ForgotPasswordInput, LoginInput, ResetPasswordInput};
use crate::services::Session;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub status: u16,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub status: u16,
    pub token: String,
    pub user: AccountView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub status: u16,
}

fn session_response(message: &str, session: Session) -> HttpResponse {
    HttpResponse::Ok().json(SessionResponse {
        message: message.to_string(),
        status: 200,
        user: AccountView::from(&session.account),
        token: session.token,
    })
}

/// POST /api/v1/auth/register
pub async fn register(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse> {
    let form = AccountForm::read(payload, state.max_avatar_bytes).await?;
    let input = form.registration()?;

    let account = state.accounts.register(input, form.avatar).await?;

    Ok(HttpResponse::Created().json(RegisterResponse {
        message: "User created successfully, please check your email for verification"
            .to_string(),
        status: 201,
        user_id: account.id,
    }))
}

/// GET /api/v1/auth/verify/{token}
pub async fn verify_email(
    state: web::Data<AppState>,
    token: web::Path<String>,
) -> Result<HttpResponse> {
    let session = state.accounts.verify_email(&token).await?;
    Ok(session_response("Email verified successfully", session))
}

/// POST /api/v1/auth/login
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginInput>,
) -> Result<HttpResponse> {
    let session = state.accounts.login(body.into_inner()).await?;
    Ok(session_response("Login successful", session))
}

/// POST /api/v1/auth/forgot-password
pub async fn forgot_password(
    state: web::Data<AppState>,
    body: web::Json<ForgotPasswordInput>,
) -> Result<HttpResponse> {
    state.accounts.forgot_password(body.into_inner()).await?;

    Ok(HttpResponse::Created().json(MessageResponse {
        message: "If the address is registered, a reset link has been sent".to_string(),
        status: 201,
    }))
}

/// GET /api/v1/auth/reset-password/{token}
pub async fn reset_password_link(
    state: web::Data<AppState>,
    token: web::Path<String>,
) -> Result<HttpResponse> {
    let session = state.accounts.reset_password(&token, None).await?;
    Ok(session_response("Reset token accepted", session))
}

/// POST /api/v1/auth/reset-password/{token}
pub async fn reset_password(
    state: web::Data<AppState>,
    token: web::Path<String>,
    body: web::Json<ResetPasswordInput>,
) -> Result<HttpResponse> {
    let session = state
        .accounts
        .reset_password(&token, Some(body.into_inner()))
        .await?;
    Ok(session_response("Password reset successfully", session))
}
