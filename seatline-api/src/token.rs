use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use seatline_core::{CoreError, CoreResult, IdentityClaims, TokenDecoder};

/// Verifies HS256 identity tokens issued by the auth service and extracts
/// the user claims. `exp` is checked when present but not required.
pub struct JwtTokenDecoder {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenDecoder {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims::<&str>(&[]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenDecoder for JwtTokenDecoder {
    fn decode(&self, token: &str) -> CoreResult<IdentityClaims> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| CoreError::ValidationError(format!("identity token rejected: {}", e)))
    }
}
