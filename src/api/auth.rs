// =============================================================================
// Signed-Token Authentication — Axum extractor + WS query-param helper
// =============================================================================
//
// The engine treats authentication as an external gate: whoever issues
// tokens (the dashboard's login flow) shares a secret with this process,
// set via the `TICKWATCH_API_SECRET` environment variable. A token is
//
//   <expiry-unix-seconds>.<hex HMAC-SHA256(secret, expiry-string)>
//
// Validation recomputes the MAC (constant-time verify) and checks expiry.
// REST endpoints use the `AuthBearer` extractor; WebSocket upgrades pass
// the token as a `?token=` query parameter and call `validate_token`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the shared signing secret.
pub const SECRET_ENV: &str = "TICKWATCH_API_SECRET";

// =============================================================================
// Token issue / validation
// =============================================================================

/// Sign a token valid for `ttl_secs` from now. Used by the token-minting
/// side of the gate and by the tests.
pub fn issue_token(secret: &str, ttl_secs: i64) -> String {
    let expiry = Utc::now().timestamp() + ttl_secs;
    sign_expiry(secret, expiry)
}

fn sign_expiry(secret: &str, expiry: i64) -> String {
    let payload = expiry.to_string();
    // new_from_slice only fails on zero-length invalid keys for HMAC; any
    // byte string is a valid HMAC key.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{payload}.{signature}")
}

/// Check a token against a specific secret at a specific time.
fn validate_with_secret(token: &str, secret: &str, now_unix: i64) -> bool {
    let (payload, signature_hex) = match token.split_once('.') {
        Some(parts) => parts,
        None => return false,
    };

    let expiry: i64 = match payload.parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    if expiry <= now_unix {
        return false;
    }

    let signature = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(payload.as_bytes());
    // verify_slice is constant-time.
    mac.verify_slice(&signature).is_ok()
}

/// Validate a token against the `TICKWATCH_API_SECRET` environment
/// variable. Returns `false` when the secret is unset (everything is
/// rejected rather than left open).
pub fn validate_token(token: &str) -> bool {
    let secret = std::env::var(SECRET_ENV).unwrap_or_default();
    if secret.is_empty() {
        warn!("{SECRET_ENV} is not set -- all authenticated requests will be rejected");
        return false;
    }
    validate_with_secret(token, &secret, Utc::now().timestamp())
}

// =============================================================================
// Extractor
// =============================================================================

/// Axum extractor that validates `Authorization: Bearer <token>`.
///
/// On success it yields the raw token (useful for audit logging); on
/// failure it short-circuits the request with 403.
pub struct AuthBearer(pub String);

pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, axum::Json(body)).into_response()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match auth_header {
            Some(value) if value.starts_with("Bearer ") => &value[7..],
            _ => {
                warn!("missing or malformed Authorization header");
                return Err(AuthRejection {
                    status: StatusCode::FORBIDDEN,
                    message: "Missing or invalid authorization token",
                });
            }
        };

        if !validate_token(token) {
            warn!("invalid token presented");
            return Err(AuthRejection {
                status: StatusCode::FORBIDDEN,
                message: "Invalid authorization token",
            });
        }

        Ok(AuthBearer(token.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_validates() {
        let token = sign_expiry(SECRET, 2_000_000_000);
        assert!(validate_with_secret(&token, SECRET, 1_900_000_000));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_expiry(SECRET, 1_000_000);
        assert!(!validate_with_secret(&token, SECRET, 2_000_000));
    }

    #[test]
    fn tampered_expiry_is_rejected() {
        let token = sign_expiry(SECRET, 1_500_000_000);
        let signature = token.split_once('.').unwrap().1;
        let forged = format!("2000000000.{signature}");
        assert!(!validate_with_secret(&forged, SECRET, 1_000_000_000));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_expiry("other-secret", 2_000_000_000);
        assert!(!validate_with_secret(&token, SECRET, 1_000_000_000));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        for bad in ["", "no-dot", "123.not-hex!", ".abcdef", "abc.123456"] {
            assert!(
                !validate_with_secret(bad, SECRET, 1_000_000_000),
                "accepted: {bad}"
            );
        }
    }

    #[test]
    fn issue_token_produces_future_expiry() {
        let token = issue_token(SECRET, 3600);
        assert!(validate_with_secret(&token, SECRET, Utc::now().timestamp()));
    }
}
