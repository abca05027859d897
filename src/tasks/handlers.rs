use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateTaskRequest, TaskQuery, TaskStats, UpdateTaskRequest},
    repo_types::Task,
    services::{self, parse_id},
};
use crate::{
    auth::{require_auth, AuthUser},
    error::ApiResult,
    extract::{AppJson, AppQuery},
    response::{DataResponse, ListResponse, MessageResponse},
    state::AppState,
};

pub fn task_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/stats", get(task_stats))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/:id/toggle", patch(toggle_task))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppQuery(query): AppQuery<TaskQuery>,
) -> ApiResult<Json<ListResponse<Task>>> {
    let tasks = services::list(&state, user.id, query).await?;
    Ok(Json(ListResponse::ok(tasks)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn task_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<DataResponse<TaskStats>>> {
    let stats = services::stats(&state, user.id).await?;
    Ok(Json(DataResponse::ok(stats)))
}

#[instrument(skip_all, fields(user_id = %user.id, task_id = %id))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<Task>>> {
    let task = services::get(&state, user.id, parse_id(&id)?).await?;
    Ok(Json(DataResponse::ok(task)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<Task>>)> {
    let task = services::create(&state, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::ok(task))))
}

#[instrument(skip_all, fields(user_id = %user.id, task_id = %id))]
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateTaskRequest>,
) -> ApiResult<Json<DataResponse<Task>>> {
    let task = services::update(&state, user.id, parse_id(&id)?, payload).await?;
    Ok(Json(DataResponse::ok(task)))
}

#[instrument(skip_all, fields(user_id = %user.id, task_id = %id))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    services::delete(&state, user.id, parse_id(&id)?).await?;
    Ok(Json(MessageResponse::ok("Task deleted successfully")))
}

#[instrument(skip_all, fields(user_id = %user.id, task_id = %id))]
pub async fn toggle_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<Task>>> {
    let task = services::toggle(&state, user.id, parse_id(&id)?).await?;
    Ok(Json(DataResponse::ok(task)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::app::testing::{register_user, send, TestApp};

    #[tokio::test]
    async fn new_user_has_no_tasks() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        let (status, body) = send(&app, "GET", "/api/tasks", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "count": 0, "data": []}));
    }

    #[tokio::test]
    async fn owner_is_stamped_and_others_get_404() {
        let app = TestApp::new();
        let (alice_id, alice) = register_user(&app, "alice@x.com").await;
        let (bob_id, bob) = register_user(&app, "bob@x.com").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(&alice),
            Some(json!({
                "title": "Buy milk",
                "category": "shopping",
                "priority": "low",
                "ownerId": bob_id
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["ownerId"], alice_id);
        let id = body["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/tasks/{id}");

        let (status, body) = send(&app, "GET", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "message": "Task not found"}));

        // a random id answers exactly the same way
        let missing = format!("/api/tasks/{}", uuid::Uuid::new_v4());
        let (status, other) = send(&app, "GET", &missing, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(other, body);

        for (method, path, payload) in [
            ("PUT", uri.clone(), Some(json!({"title": "mine now"}))),
            ("PATCH", format!("{uri}/toggle"), None),
            ("DELETE", uri.clone(), None),
        ] {
            let (status, _) = send(&app, method, &path, Some(&bob), payload).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {path}");
        }

        let (_, listed) = send(&app, "GET", "/api/tasks", Some(&bob), None).await;
        assert_eq!(listed["count"], 0);

        let (status, body) = send(&app, "GET", &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Buy milk");
    }

    #[tokio::test]
    async fn toggle_flips_and_restores() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        let (_, body) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "t", "status": "pending"})),
        )
        .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/tasks/{id}/toggle");

        let (status, body) = send(&app, "PATCH", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["completed"], true);
        assert_eq!(body["data"]["status"], "completed");

        let (_, body) = send(&app, "PATCH", &uri, Some(&token), None).await;
        assert_eq!(body["data"]["completed"], false);
        assert_eq!(body["data"]["status"], "pending");
    }

    #[tokio::test]
    async fn deactivated_account_is_refused() {
        let app = TestApp::new();
        let (id, token) = register_user(&app, "a@x.com").await;
        let id = id.parse().unwrap();
        app.state.users.set_status(id, false, false).await.unwrap();

        let (status, body) = send(&app, "GET", "/api/tasks", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Account has been deactivated.");

        let (status, _) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "sneaky"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        // nothing was written
        let all = app
            .state
            .tasks
            .list(id, &Default::default())
            .await
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn locked_account_is_refused() {
        let app = TestApp::new();
        let (id, token) = register_user(&app, "a@x.com").await;
        app.state
            .users
            .set_status(id.parse().unwrap(), true, true)
            .await
            .unwrap();
        let (status, body) = send(&app, "GET", "/api/tasks", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Account is locked.");
    }

    #[tokio::test]
    async fn bad_tokens_are_401() {
        let app = TestApp::new();
        let (status, _) = send(&app, "GET", "/api/tasks", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = send(&app, "GET", "/api/tasks", Some("nope"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token.");
    }

    #[tokio::test]
    async fn filters_search_and_sort() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        for body in [
            json!({"title": "Buy milk", "category": "shopping", "priority": "low"}),
            json!({"title": "Quarterly report", "category": "work", "priority": "high",
                   "content": "numbers for the BOARD"}),
            json!({"title": "Dentist", "category": "health", "description": "board-certified"}),
        ] {
            let (status, _) = send(&app, "POST", "/api/tasks", Some(&token), Some(body)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(&app, "GET", "/api/tasks?category=work", Some(&token), None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["title"], "Quarterly report");

        let (_, body) = send(&app, "GET", "/api/tasks?search=board", Some(&token), None).await;
        assert_eq!(body["count"], 2);

        let (_, body) = send(
            &app,
            "GET",
            "/api/tasks?search=board&priority=high",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["count"], 1);

        let (_, body) = send(&app, "GET", "/api/tasks?sort=title", Some(&token), None).await;
        let titles: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Buy milk", "Dentist", "Quarterly report"]);

        let (status, body) = send(&app, "GET", "/api/tasks?status=done", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn invalid_enum_in_body_is_400() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "x", "category": "hobby"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn update_and_delete() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        let (_, body) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(&token),
            Some(json!({"title": "draft"})),
        )
        .await;
        let uri = format!("/api/tasks/{}", body["data"]["id"].as_str().unwrap());

        let (status, body) = send(
            &app,
            "PUT",
            &uri,
            Some(&token),
            Some(json!({"title": "final", "status": "completed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "final");
        assert_eq!(body["data"]["completed"], true);

        let (status, body) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Task deleted successfully");

        let (status, _) = send(&app, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_id_is_404() {
        let app = TestApp::new();
        let (_, token) = register_user(&app, "a@x.com").await;
        let (status, _) = send(&app, "GET", "/api/tasks/not-an-id", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_are_scoped() {
        let app = TestApp::new();
        let (_, alice) = register_user(&app, "alice@x.com").await;
        let (_, bob) = register_user(&app, "bob@x.com").await;
        send(
            &app,
            "POST",
            "/api/tasks",
            Some(&alice),
            Some(json!({"title": "a", "status": "completed"})),
        )
        .await;
        send(&app, "POST", "/api/tasks", Some(&alice), Some(json!({"title": "b"}))).await;

        let (status, body) = send(&app, "GET", "/api/tasks/stats", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["completed"], 1);
        assert_eq!(body["data"]["completionRate"], 50);

        let (_, body) = send(&app, "GET", "/api/tasks/stats", Some(&bob), None).await;
        assert_eq!(body["data"]["total"], 0);
    }
}
