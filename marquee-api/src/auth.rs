use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use marquee_core::Role;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, middleware::auth::Claims, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub actor_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Stand-in for the external identity service; issues tokens for any actor.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(issue_token))
}

async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    if req.actor_id.trim().is_empty() {
        return Err(AppError::ValidationError("actor_id is required".to_string()));
    }
    let token = issue(&state, &req.actor_id, req.role)?;
    Ok(Json(TokenResponse { token, expires_in: state.auth.expiration }))
}

pub fn issue(state: &AppState, actor_id: &str, role: Role) -> Result<String, AppError> {
    let claims = Claims {
        sub: actor_id.to_owned(),
        role: role.as_str().to_owned(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!("Token encoding failed: {}", e)))
}
