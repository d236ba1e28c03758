use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role within the clinic domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Patient,
    Nurse,
    Doctor,
    Admin,
}

/// User record in the database. The Argon2 hash lives in the same row but is
/// deliberately absent here: it is fetched separately, and only when a login
/// actually has to verify a password.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub role: Role,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Freshness marker for the session cache. Bumped by every mutation of
    /// the row, never by login itself.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Fields required to insert a new user row.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub password_hash: String,
    pub role: Role,
}

/// Serialized form of a user held in the session cache. `updated_at` is kept
/// as the canonical RFC 3339 string so the freshness comparison never depends
/// on how the cache backend round-trips timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub role: Role,
    pub is_verified: bool,
    pub updated_at: String,
}

impl UserSnapshot {
    pub fn capture(user: &User, marker: String) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            mobile: user.mobile.clone(),
            role: user.role,
            is_verified: user.is_verified,
            updated_at: marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Nurse).unwrap(), "\"nurse\"");
        let role: Role = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(role, Role::Doctor);
    }

    #[test]
    fn user_serialization_has_no_password_fields() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@clinic.test".into(),
            mobile: "0700000001".into(),
            role: Role::Patient,
            is_verified: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("hash"));
    }
}
