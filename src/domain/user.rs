//! User account and subscription tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription tier, gating monthly analysis quota (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Public,
    Free,
    Pro,
    Business,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Public => "PUBLIC",
            Tier::Free => "FREE",
            Tier::Pro => "PRO",
            Tier::Business => "BUSINESS",
            Tier::Enterprise => "ENTERPRISE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PUBLIC" => Some(Tier::Public),
            "FREE" => Some(Tier::Free),
            "PRO" => Some(Tier::Pro),
            "BUSINESS" => Some(Tier::Business),
            "ENTERPRISE" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    /// Default monthly analysis limit for this tier. `None` means unbounded.
    pub fn default_limit(&self) -> Option<u32> {
        match self {
            Tier::Public => Some(0),
            Tier::Free => Some(3),
            Tier::Pro => Some(100),
            Tier::Business => Some(1000),
            Tier::Enterprise => None,
        }
    }
}

/// A registered user. Identity is a stable opaque id; never deleted, only
/// deactivated (spec §3 User lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub tier: Tier,
    pub used_this_month: u32,
    pub last_reset: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String, tier: Tier) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            tier,
            used_this_month: 0,
            last_reset: now,
            active: true,
            created_at: now,
        }
    }
}

/// Sanitized user view returned over the API (never carries `password_hash`).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub tier: Tier,
    pub used_this_month: u32,
    pub active: bool,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            tier: user.tier,
            used_this_month: user.used_this_month,
            active: user.active,
        }
    }
}
