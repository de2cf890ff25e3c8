use crate::config::AuthConfig;
use crate::error::ServiceError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Caller identity resolved from a bearer credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

/// Turns a bearer token into an identity. Token internals stay behind this seam.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Identity, ServiceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// HS256 validator for tokens minted by the login service
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> Result<Identity, ServiceError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ServiceError::Authentication(format!("Invalid token: {e}")))?;

        if data.claims.username.is_empty() {
            return Err(ServiceError::Authentication("Token has empty username".to_string()));
        }

        Ok(Identity {
            username: data.claims.username,
        })
    }
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn config(issuer: Option<&str>) -> AuthConfig {
        AuthConfig {
            jwt_secret: SECRET.to_string(),
            issuer: issuer.map(str::to_string),
        }
    }

    fn token(username: &str, exp_offset: i64, secret: &str, iss: Option<&str>) -> String {
        let claims = Claims {
            username: username.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iss: iss.map(str::to_string),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_resolves_username() {
        let resolver = JwtIdentityResolver::new(&config(None));
        let identity = resolver.resolve(&token("alice", 3600, SECRET, None)).unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let resolver = JwtIdentityResolver::new(&config(None));
        let err = resolver
            .resolve(&token("alice", 3600, "other-secret", None))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(_)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let resolver = JwtIdentityResolver::new(&config(None));
        assert!(resolver.resolve(&token("alice", -3600, SECRET, None)).is_err());
    }

    #[test]
    fn test_issuer_is_enforced_when_configured() {
        let resolver = JwtIdentityResolver::new(&config(Some("around-auth")));
        assert!(resolver
            .resolve(&token("alice", 3600, SECRET, Some("around-auth")))
            .is_ok());
        assert!(resolver
            .resolve(&token("alice", 3600, SECRET, Some("someone-else")))
            .is_err());
    }

    #[test]
    fn test_empty_username_is_rejected() {
        let resolver = JwtIdentityResolver::new(&config(None));
        assert!(resolver.resolve(&token("", 3600, SECRET, None)).is_err());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let resolver = JwtIdentityResolver::new(&config(None));
        assert!(resolver.resolve("not-a-jwt").is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
