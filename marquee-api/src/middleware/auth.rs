use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use marquee_core::{Actor, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Result<Actor, AppError> {
        let role: Role = self
            .role
            .parse()
            .map_err(|_| AppError::AuthenticationError(format!("Unknown role {}", self.role)))?;
        Ok(Actor::new(self.sub.clone(), role))
    }
}

// ============================================================================
// Identity Middleware
// ============================================================================

/// Resolves the bearer token into an [`Actor`] and stores it in the request
/// extensions. Role checks happen in the engine.
pub async fn identity_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authenticate(&state, &req) {
        Ok(actor) => {
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

fn authenticate(state: &AppState, req: &Request) -> Result<Actor, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::AuthenticationError("Expected a Bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(e.to_string()))?;

    token_data.claims.actor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_resolve_to_actor() {
        let claims = Claims { sub: "rev-7".to_string(), role: "reviewer".to_string(), exp: 0 };
        let actor = claims.actor().unwrap();
        assert_eq!(actor.id, "rev-7");
        assert_eq!(actor.role, Role::Reviewer);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let claims = Claims { sub: "x".to_string(), role: "SUPER_ADMIN".to_string(), exp: 0 };
        assert!(matches!(claims.actor(), Err(AppError::AuthenticationError(_))));
    }
}
