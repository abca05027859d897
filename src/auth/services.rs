use axum::http::{header::AUTHORIZATION, HeaderMap};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{ChangePasswordRequest, LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest},
        password::Hasher,
        repo_types::NewUser,
    },
    error::{ApiError, ApiResult, AuthRejection},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex");
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Pulls `<token>` out of `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(hasher: &Hasher, plain: &str) -> anyhow::Result<String> {
    let hasher = hasher.clone();
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || hasher.hash(&plain)).await?
}

async fn verify_blocking(hasher: &Hasher, plain: &str, hash: &str) -> anyhow::Result<bool> {
    let hasher = hasher.clone();
    let (plain, hash) = (plain.to_owned(), hash.to_owned());
    tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash)).await?
}

fn validate_registration(req: &RegisterRequest) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, value) in [
        ("email", &req.email),
        ("password", &req.password),
        ("firstName", &req.first_name),
        ("lastName", &req.last_name),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{field} is required"));
        }
    }
    if !req.email.trim().is_empty() && !is_valid_email(&req.email) {
        errors.push("email is invalid".into());
    }
    if !req.password.is_empty() && req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    errors
}

/// Creates an identity and returns it with a fresh token.
pub async fn register(state: &AppState, mut req: RegisterRequest) -> ApiResult<(PublicUser, String)> {
    req.email = normalize_email(&req.email);
    let errors = validate_registration(&req);
    if !errors.is_empty() {
        warn!(?errors, "registration rejected");
        return Err(ApiError::Validation(errors));
    }

    if state.users.find_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(ApiError::Conflict("User with this email already exists".into()));
    }

    let password_hash = hash_blocking(&state.hasher, &req.password).await?;
    // the store's unique index is the final word if two registrations race
    let user = state
        .users
        .create(NewUser {
            email: req.email,
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
        })
        .await?;

    let token = state.keys.sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((user.into(), token))
}

/// Both unknown email and wrong password end in the same `InvalidCredentials`.
pub async fn login(state: &AppState, mut req: LoginRequest) -> ApiResult<(PublicUser, String)> {
    req.email = normalize_email(&req.email);
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let Some(user) = state.users.find_by_email(&req.email).await? else {
        // pay the same argon2 cost as a real check so timing does not reveal the email
        verify_blocking(&state.hasher, &req.password, state.hasher.decoy_hash()).await?;
        warn!(email = %req.email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_blocking(&state.hasher, &req.password, &user.password_hash).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.keys.sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user.into(), token))
}

pub async fn update_profile(
    state: &AppState,
    current: &PublicUser,
    req: UpdateProfileRequest,
) -> ApiResult<PublicUser> {
    let mut errors = Vec::new();
    let mut pick = |field: &str, new: Option<String>, old: &str| match new {
        Some(v) if v.trim().is_empty() => {
            errors.push(format!("{field} must not be empty"));
            String::new()
        }
        Some(v) => v.trim().to_string(),
        None => old.to_string(),
    };
    let first_name = pick("firstName", req.first_name, &current.first_name);
    let last_name = pick("lastName", req.last_name, &current.last_name);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user = state
        .users
        .update_profile(current.id, &first_name, &last_name)
        .await?
        .ok_or(AuthRejection::IdentityNotFound)?;
    info!(user_id = %user.id, "profile updated");
    Ok(user.into())
}

pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    req: ChangePasswordRequest,
) -> ApiResult<()> {
    let mut errors = Vec::new();
    if req.current_password.is_empty() {
        errors.push("currentPassword is required".to_string());
    }
    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "newPassword must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AuthRejection::IdentityNotFound)?;
    if !verify_blocking(&state.hasher, &req.current_password, &user.password_hash).await? {
        warn!(user_id = %user_id, "password change with wrong current password");
        return Err(ApiError::validation("currentPassword is incorrect"));
    }

    let hash = hash_blocking(&state.hasher, &req.new_password).await?;
    if !state.users.update_password(user_id, &hash).await? {
        return Err(AuthRejection::IdentityNotFound.into());
    }
    info!(user_id = %user_id, "password changed");
    Ok(())
}

/// Token -> identity, checking account status. Cheapest checks run first and
/// every rejection returns before any handler logic.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> ApiResult<PublicUser> {
    let token = bearer_token(headers).ok_or(AuthRejection::NoToken)?;

    let user_id = state.keys.verify(token).map_err(|e| {
        warn!(reason = %e, "token rejected");
        AuthRejection::InvalidToken(e)
    })?;

    let Some(user) = state.users.find_by_id(user_id).await? else {
        warn!(%user_id, "token for unknown identity");
        return Err(AuthRejection::IdentityNotFound.into());
    };

    if !user.is_active {
        warn!(%user_id, "deactivated account");
        return Err(AuthRejection::AccountDeactivated.into());
    }
    if user.is_locked {
        warn!(%user_id, "locked account");
        return Err(AuthRejection::AccountLocked.into());
    }

    Ok(user.into())
}
