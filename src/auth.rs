use crate::{errors::AppError, models::Claims, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// The operator behind a request. Freezing and paying record `name`.
/// Add `operator: AuthOperator` as a parameter in any handler that requires authentication.
#[derive(Debug, Clone)]
pub struct AuthOperator {
    pub id: String,
    pub name: String,
}

impl FromRequestParts<AppState> for AuthOperator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers: &HeaderMap = &parts.headers;

        let auth_header = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;

        let secret = state.config.jwt_secret.as_bytes();
        let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &Validation::default())
            .map_err(|_| AppError::InvalidToken)?;

        let claims = token_data.claims;
        if claims.sub.trim().is_empty() || claims.name.trim().is_empty() {
            return Err(AppError::InvalidToken);
        }

        Ok(AuthOperator {
            id: claims.sub,
            name: claims.name,
        })
    }
}

// Tokens are issued by the identity service; this is only for tests.
#[cfg(test)]
pub fn generate_token(
    operator_id: &str,
    operator_name: &str,
    secret: &str,
    expiry_hours: i64,
) -> Result<String, AppError> {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = Utc::now().timestamp() as usize;
    let exp = (Utc::now() + chrono::Duration::hours(expiry_hours)).timestamp() as usize;

    let claims = Claims {
        sub: operator_id.to_string(),
        name: operator_name.to_string(),
        exp,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}
