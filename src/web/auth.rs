use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::web::error::AppError;

/// Claims minted by the external auth layer. The pipeline only verifies
/// them; issuing tokens is out of scope.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: i32,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub username: String,
}

/// Validates the JWT a WebSocket client passes as a `token` query
/// parameter. Browsers cannot set headers on a WS upgrade, hence the query
/// parameter.
pub fn authenticate_ws_connection(
    token: Option<String>,
    jwt_secret: &str,
) -> Result<AuthenticatedUser, AppError> {
    let token_str = token.ok_or_else(|| {
        warn!("WebSocket auth: missing token in query.");
        AppError::Unauthorized("Missing authentication token".to_string())
    })?;

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_ref());
    let validation = Validation::default();

    match decode::<Claims>(&token_str, &decoding_key, &validation) {
        Ok(token_data) => {
            let claims = token_data.claims;
            Ok(AuthenticatedUser {
                id: claims.user_id,
                username: claims.sub,
            })
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth: JWT validation failed.");
            let message = match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidToken => "Invalid token",
                jsonwebtoken::errors::ErrorKind::InvalidSignature => "Invalid token signature",
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "Token has expired",
                _ => "Token validation failed",
            };
            Err(AppError::Unauthorized(message.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(user_id: i32, exp: usize) -> String {
        let claims = Claims {
            sub: "operator".to_string(),
            user_id,
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_is_accepted() {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        let user = authenticate_ws_connection(Some(token_for(7, exp)), SECRET).unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(user.username, "operator");
    }

    #[test]
    fn missing_or_bad_token_is_rejected() {
        assert!(authenticate_ws_connection(None, SECRET).is_err());
        assert!(authenticate_ws_connection(Some("garbage".to_string()), SECRET).is_err());

        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        let wrong_secret = authenticate_ws_connection(Some(token_for(7, exp)), "other-secret");
        assert!(wrong_secret.is_err());
    }
}
