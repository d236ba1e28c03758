use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::auth::{
    dto::{AuthResponse, ChangePasswordRequest, LoginRequest, PublicUser, RegisterRequest},
    jwt::{AuthUser, JwtKeys},
    password::{hash_password, verify_password},
    repo_types::{NewUser, Role},
    session::{resolve_session, AuthError, SessionOptions, SessionSource},
};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/password", post(change_password))
        .route("/auth/me", get(me))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn session_options(state: &AppState) -> SessionOptions {
    SessionOptions {
        cache_ttl_seconds: state.config.cache.ttl_seconds,
        verify_on_cache_hit: state.config.cache.verify_on_hit,
    }
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

#[instrument(skip(state, payload))]
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> Response {
    let keys = JwtKeys::from_ref(&state);
    let options = session_options(&state);

    match resolve_session(
        state.users.as_ref(),
        state.cache.as_ref(),
        &keys,
        &options,
        &payload.email,
        &payload.password,
    )
    .await
    {
        Ok(session) => {
            info!(
                user_id = %session.user.id,
                email = %session.user.email,
                from_cache = session.source == SessionSource::Cache,
                "user logged in"
            );
            (
                StatusCode::OK,
                Json(AuthResponse {
                    success: true,
                    message: "Login successful".into(),
                    user: session.user,
                    token: session.token,
                }),
            )
                .into_response()
        }
        Err(AuthError::NotFound) => {
            warn!("login unknown email");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "User not found" })),
            )
                .into_response()
        }
        Err(AuthError::InvalidCredentials) => {
            warn!("login invalid password");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "Invalid credentials" })),
            )
                .into_response()
        }
        Err(AuthError::Unexpected(e)) => {
            error!(error = %e, "login failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Internal server error" })),
            )
                .into_response()
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();
    payload.mobile = payload.mobile.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    let role = payload.role.unwrap_or(Role::Patient);
    if role == Role::Admin {
        warn!(email = %payload.email, "attempted admin self-registration");
        return Err((StatusCode::BAD_REQUEST, "Invalid role".into()));
    }

    match state.users.find_by_email(&payload.email).await {
        Ok(Some(_)) => {
            warn!(email = %payload.email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Ok(None) => {}
        Err(e) => return Err(internal(e)),
    }
    match state.users.find_by_mobile(&payload.mobile).await {
        Ok(Some(_)) => {
            warn!("mobile already registered");
            return Err((StatusCode::CONFLICT, "Mobile already registered".into()));
        }
        Ok(None) => {}
        Err(e) => return Err(internal(e)),
    }

    let hash = hash_password(&payload.password).map_err(internal)?;

    let user = state
        .users
        .create(NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email,
            mobile: payload.mobile,
            password_hash: hash,
            role,
        })
        .await
        .map_err(internal)?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys
        .sign(user.id, &user.name, &user.email, user.role)
        .map_err(internal)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "Registration successful".into(),
            user: PublicUser::from(&user),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if payload.new_password.len() < 8 {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let hash = state
        .users
        .password_hash(claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    let ok = verify_password(&payload.current_password, &hash).map_err(internal)?;
    if !ok {
        warn!(user_id = %claims.sub, "password change with wrong current password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let new_hash = hash_password(&payload.new_password).map_err(internal)?;
    // Bumps updated_at, which makes any cached login snapshot stale on its
    // own. The cache is intentionally left untouched here.
    state
        .users
        .update_password(claims.sub, &new_hash)
        .await
        .map_err(internal)?;

    info!(user_id = %claims.sub, "password updated");
    Ok(Json(json!({ "success": true, "message": "Password updated" })))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state
        .users
        .find_by_id(claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    Ok(Json(PublicUser::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::auth::repo::UserStore;
    use crate::auth::repo_types::User;
    use crate::cache::NoopSessionCache;

    #[derive(Default)]
    struct MemoryUsers {
        rows: Mutex<Vec<User>>,
        fail_lookups: bool,
    }

    #[async_trait]
    impl UserStore for MemoryUsers {
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            anyhow::ensure!(!self.fail_lookups, "store offline");
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.email == email.to_lowercase()).cloned())
        }

        async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>> {
            anyhow::ensure!(!self.fail_lookups, "store offline");
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.mobile == mobile).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.id == id).cloned())
        }

        async fn password_hash(&self, _id: Uuid) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn create(&self, user: NewUser) -> anyhow::Result<User> {
            let created = User {
                id: Uuid::new_v4(),
                name: user.name,
                email: user.email,
                mobile: user.mobile,
                role: user.role,
                is_verified: false,
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            };
            self.rows.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn update_password(&self, _id: Uuid, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fake_state(users: MemoryUsers) -> AppState {
        AppState::fake(Arc::new(users), Arc::new(NoopSessionCache))
    }

    fn register_request(email: &str, mobile: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada".into(),
            email: email.into(),
            mobile: mobile.into(),
            password: "Secur3P@ssw0rd!".into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_with_conflict() {
        let state = fake_state(MemoryUsers::default());

        let (status, _) = register(
            State(state.clone()),
            Json(register_request("ada@clinic.test", "0700000001")),
        )
        .await
        .expect("first registration succeeds");
        assert_eq!(status, StatusCode::CREATED);

        let (status, message) = register(
            State(state),
            Json(register_request("ADA@clinic.test", "0700000002")),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(message, "Email already registered");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_mobile_with_conflict() {
        let state = fake_state(MemoryUsers::default());

        register(
            State(state.clone()),
            Json(register_request("ada@clinic.test", "0700000001")),
        )
        .await
        .expect("first registration succeeds");

        let (status, message) = register(
            State(state),
            Json(register_request("bob@clinic.test", "0700000001")),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(message, "Mobile already registered");
    }

    #[tokio::test]
    async fn register_surfaces_store_errors_from_the_duplicate_check() {
        let state = fake_state(MemoryUsers {
            fail_lookups: true,
            ..MemoryUsers::default()
        });

        let (status, _) = register(
            State(state),
            Json(register_request("ada@clinic.test", "0700000001")),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn login_response_matches_documented_envelope() {
        let response = AuthResponse {
            success: true,
            message: "Login successful".into(),
            user: PublicUser {
                id: Uuid::new_v4(),
                name: "Ada".into(),
                email: "ada@clinic.test".into(),
                mobile: "0700000001".into(),
                role: Role::Patient,
                is_verified: true,
            },
            token: "jwt".into(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Login successful");
        assert_eq!(json["user"]["email"], "ada@clinic.test");
        assert_eq!(json["user"]["role"], "patient");
        assert_eq!(json["token"], "jwt");
    }

    #[test]
    fn not_found_body_has_only_a_message() {
        let body = json!({ "message": "User not found" });
        assert_eq!(body.as_object().unwrap().len(), 1);
        assert_eq!(body["message"], "User not found");
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ada@clinic.test"));
        assert!(!is_valid_email("ada@clinic"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@clinic.test"));
    }
}
