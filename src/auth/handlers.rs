use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
            UpdateProfileRequest, UserCountResponse, UserResponse,
        },
        extractors::{require_auth, AuthUser},
        services,
    },
    error::ApiResult,
    extract::AppJson,
    response::MessageResponse,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/users/count", get(count_users))
}

pub fn me_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/profile", put(update_profile))
        .route("/auth/password", put(change_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let (user, token) = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "Registration successful",
            user,
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let (user, token) = services::login(&state, payload).await?;
    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful",
        user,
        token,
    }))
}

/// Tokens are stateless; the client logs out by discarding its token.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse::ok(
        "Logged out successfully (client should discard the token)",
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        success: true,
        user,
    })
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = services::update_profile(&state, &user, payload).await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    services::change_password(&state, user.id, payload).await?;
    Ok(Json(MessageResponse::ok("Password updated successfully")))
}

#[instrument(skip(state))]
pub async fn count_users(State(state): State<AppState>) -> ApiResult<Json<UserCountResponse>> {
    let total_users = state.users.count().await?;
    Ok(Json(UserCountResponse {
        success: true,
        total_users,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::app::testing::{register_user, send, TestApp};

    #[tokio::test]
    async fn register_returns_created_with_token() {
        let app = TestApp::new();
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "a@x.com",
                "password": "longenough1",
                "firstName": "A",
                "lastName": "B"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["firstName"], "A");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn register_missing_fields_is_400() {
        let app = TestApp::new();
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"email": "a@x.com", "password": "short"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        let msg = body["message"].as_str().unwrap();
        assert!(msg.contains("firstName"));
        assert!(msg.contains("lastName"));
        assert!(msg.contains("password must be at least 8"));
    }

    #[tokio::test]
    async fn duplicate_register_is_400_conflict() {
        let app = TestApp::new();
        register_user(&app, "a@x.com").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "A@X.COM",
                "password": "longenough1",
                "firstName": "A",
                "lastName": "B"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User with this email already exists");
    }

    #[tokio::test]
    async fn login_failures_share_one_shape() {
        let app = TestApp::new();
        register_user(&app, "a@x.com").await;

        let unknown = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "ghost@x.com", "password": "longenough1"})),
        )
        .await;
        let wrong = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@x.com", "password": "not-the-password"})),
        )
        .await;
        assert_eq!(unknown.0, StatusCode::BAD_REQUEST);
        assert_eq!(unknown, wrong);
    }

    #[tokio::test]
    async fn login_and_me() {
        let app = TestApp::new();
        let (id, _) = register_user(&app, "a@x.com").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@x.com", "password": "longenough1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], id);
    }

    #[tokio::test]
    async fn me_without_token_is_401() {
        let app = TestApp::new();
        let (status, body) = send(&app, "GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Access denied. No token provided.");
    }

    #[tokio::test]
    async fn logout_is_a_stateless_ack() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        let (status, body) = send(&app, "POST", "/api/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        // the token keeps working until it expires
        let (status, _) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn profile_and_password_flows() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/auth/profile",
            Some(&token),
            Some(json!({"lastName": "Lovelace"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["lastName"], "Lovelace");
        assert_eq!(body["user"]["firstName"], "A");

        let (status, _) = send(
            &app,
            "PUT",
            "/api/auth/password",
            Some(&token),
            Some(json!({"currentPassword": "longenough1", "newPassword": "even-longer-2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "a@x.com", "password": "even-longer-2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn user_count_is_public() {
        let app = TestApp::new();
        register_user(&app, "a@x.com").await;
        register_user(&app, "b@x.com").await;
        let (status, body) = send(&app, "GET", "/api/users/count", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalUsers"], 2);
    }
}
