use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::{password, AuthenticatedUser},
    domain::CommonStatus,
    error::{AppError, AppResult},
    models::User,
    pagination::exact_pattern,
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::email.ilike(exact_pattern(payload.email.trim())))
        .filter(users::status.ne(CommonStatus::TERMINAL.as_str()))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| {
            warn!(email = %payload.email.trim(), "login rejected: unknown email");
            AppError::unauthorized()
        })?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        warn!(user_id = user.id, "login rejected: wrong password");
        return Err(AppError::unauthorized());
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, &user.role)
        .map_err(AppError::from)?;

    info!(user_id = user.id, role = %user.role, "user logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
    }))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}
