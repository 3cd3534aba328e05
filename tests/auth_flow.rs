mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp, PASSWORD};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticatedUser {
    user_id: i64,
    email: String,
    role: String,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let admin_id = app.insert_user("alice@example.com", "ADMIN").await?;
    let token = app.login_token("Alice@Example.com", PASSWORD).await?;

    let response = app.get("/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let user: AuthenticatedUser = serde_json::from_value(json_body(response).await?)?;

    assert_eq!(user.user_id, admin_id);
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.role, "ADMIN");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_bad_credentials_and_missing_token() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("bob@example.com", "DESIGNER").await?;

    let response = app
        .post_json(
            "/auth/login",
            &json!({ "email": "bob@example.com", "password": "wrong" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/projects/all", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/projects/all", Some("not-a-token")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn role_gates_apply_per_resource() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let (_, customer) = app.user_with_token("carol@example.com", "CUSTOMER").await?;
    let (_, designer) = app.user_with_token("dan@example.com", "DESIGNER").await?;

    let project = json!({ "name": "Depot", "filesRootDirectory": "/srv/depot" });
    let response = app
        .post_json("/api/projects", &project, Some(&customer))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await?;
    assert_eq!(body["error"], "You do not have permission for this operation");

    let response = app.get("/api/users/all", Some(&designer)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json("/api/projects", &project, Some(&designer))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Project docs are readable by every authenticated role.
    let response = app.get("/api/designs/all", Some(&customer)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
