//! Domain records compared by the session stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in identity as returned by the authentication service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(rename = "display-name", default)]
    pub display_name: Option<String>,
    #[serde(rename = "email-verified", default)]
    pub email_verified: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A member's editable profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(rename = "user-id")]
    pub user_id: String,
    #[serde(rename = "full-name")]
    pub full_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(rename = "avatar-url", default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(rename = "updated-at")]
    pub updated_at: DateTime<Utc>,
}

/// A coach listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coach {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(rename = "hourly-rate-cents", default)]
    pub hourly_rate_cents: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(rename = "review-count", default)]
    pub review_count: u32,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(rename = "avatar-url", default)]
    pub avatar_url: Option<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            email_verified: false,
            roles: Vec::new(),
        }
    }
}

impl Coach {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            headline: None,
            hourly_rate_cents: None,
            rating: None,
            review_count: 0,
            verified: false,
            specializations: Vec::new(),
            languages: Vec::new(),
            avatar_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coach_deserializes_with_defaults() {
        let coach: Coach = serde_json::from_str(r#"{"id": "c1", "name": "Ines"}"#).unwrap();
        assert_eq!(coach, Coach::new("c1", "Ines"));
    }

    #[test]
    fn test_profile_kebab_keys() {
        let json = r#"{
            "id": "p1",
            "user-id": "u1",
            "full-name": "Ada Lovelace",
            "updated-at": "2024-05-01T12:00:00Z"
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.user_id, "u1");
        assert!(profile.bio.is_none());
    }
}
