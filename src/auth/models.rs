//! Authentication request/response DTOs and JWT claims.

use serde::{Deserialize, Serialize};

use crate::domain::{Tier, UserResponse};

/// JWT Claims payload (spec §4.D ties quota to the authenticated user's
/// tier, so the tier rides along in the token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user id)
    pub username: String,
    pub tier: Tier,
    pub exp: usize, // expiration timestamp
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: usize,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_round_trip_through_json() {
        let claims = Claims {
            sub: "abc".to_string(),
            username: "alice".to_string(),
            tier: Tier::Pro,
            exp: 9999999999,
        };
        let json = serde_json::to_string(&claims).unwrap();
        let back: Claims = serde_json::from_str(&json).unwrap();
        assert_eq!(back.username, "alice");
        assert_eq!(back.tier, Tier::Pro);
    }
}
