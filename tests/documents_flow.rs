mod common;

use std::path::Path;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use serde_json::{json, Value};

const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

async fn upload_design(app: &TestApp, token: &str, name: &str) -> Result<Value> {
    let response = app
        .upload_doc(
            "/api/designs",
            &[("fileName", name), ("description", "first issue")],
            Some((name, "application/pdf", &b"%PDF-1.7"[..])),
            token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

fn staged_file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn rejects_oversize_uploads_before_writing() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, token) = app.user_with_token("designer@example.com", "DESIGNER").await?;

    let oversize = vec![0u8; MAX_FILE_SIZE + 1];
    let response = app
        .upload_doc(
            "/api/designs",
            &[("fileName", "huge.pdf")],
            Some(("huge.pdf", "application/pdf", oversize.as_slice())),
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(staged_file_count(&app.staging_dir()), 0);

    let page = json_body(app.get("/api/designs/all", Some(&token)).await?).await?;
    assert_eq!(page["totalElements"], 0);

    let at_limit = vec![0u8; MAX_FILE_SIZE];
    let response = app
        .upload_doc(
            "/api/designs",
            &[("fileName", "limit.pdf")],
            Some(("limit.pdf", "application/pdf", at_limit.as_slice())),
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let doc = json_body(response).await?;
    assert_eq!(doc["fileSize"], MAX_FILE_SIZE as i64);
    assert_eq!(doc["fileFormat"], "application/pdf");
    assert_eq!(doc["docStatus"], "INITIAL");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn file_name_is_fixed_after_creation() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, token) = app.user_with_token("designer@example.com", "DESIGNER").await?;

    let doc = upload_design(&app, &token, "sheet.pdf").await?;
    let id = doc["id"].as_str().unwrap_or_default().to_string();
    let path = format!("/api/designs/{id}");

    let response = app
        .upload_doc(
            &path,
            &[("fileName", "other.pdf"), ("description", "renamed")],
            None,
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unchanged = json_body(app.get(&path, Some(&token)).await?).await?;
    assert_eq!(unchanged["fileName"], "sheet.pdf");
    assert_eq!(unchanged["description"], "first issue");

    let response = app
        .upload_doc(
            &path,
            &[
                ("fileName", "sheet.pdf"),
                ("description", "rev B"),
                ("docStatus", "REVISED"),
            ],
            None,
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let revised = json_body(response).await?;
    assert_eq!(revised["description"], "rev B");
    assert_eq!(revised["docStatus"], "REVISED");

    let response = app
        .upload_doc(
            &path,
            &[("fileName", "sheet.pdf"), ("docStatus", "WITHDRAWN")],
            None,
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn links_asbuilt_docs_next_to_their_design() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, designer) = app.user_with_token("designer@example.com", "DESIGNER").await?;
    let (_, developer) = app.user_with_token("developer@example.com", "DEVELOPER").await?;

    let design = upload_design(&app, &designer, "floor.pdf").await?;
    let design_id = design["id"].as_str().unwrap_or_default().to_string();
    let design_address = design["fileAddress"].as_str().unwrap_or_default().to_string();

    let response = app
        .upload_doc(
            "/api/asbuilts",
            &[("fileName", "act.pdf"), ("asbuiltCategory", "HIDDEN_WORKS_ACT")],
            Some(("act.pdf", "application/pdf", &b"act"[..])),
            &developer,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let asbuilt = json_body(response).await?;
    let asbuilt_id = asbuilt["id"].as_str().unwrap_or_default().to_string();

    let response = app
        .post_json(
            "/api/asbuilts/setAsbuiltDocToProjectDoc",
            &json!({ "asbuiltDocId": asbuilt_id, "projectDocId": design_id }),
            Some(&developer),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let linked = json_body(response).await?;
    assert_eq!(linked["projectDocId"], design_id.as_str());
    assert_eq!(linked["asbuiltCategory"], "HIDDEN_WORKS_ACT");
    let address = linked["fileAddress"].as_str().unwrap_or_default();
    assert!(address.starts_with(&format!("{design_address}-ABDs")));
    assert!(Path::new(address).exists());

    let response = app
        .get(
            &format!("/api/asbuilts/allByProjectDocId?projectDocId={design_id}"),
            Some(&developer),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let page = json_body(response).await?;
    assert_eq!(page["totalElements"], 1);
    assert_eq!(page["content"][0]["id"], asbuilt_id.as_str());

    // Customers may read single docs but not the cross-entity as-built listings.
    let (_, customer) = app.user_with_token("customer@example.com", "CUSTOMER").await?;
    let response = app
        .get(
            &format!("/api/asbuilts/allByProjectDocId?projectDocId={design_id}"),
            Some(&customer),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn withdrawn_docs_leave_listings_but_stay_readable() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, token) = app.user_with_token("designer@example.com", "DESIGNER").await?;

    let doc = upload_design(&app, &token, "old.pdf").await?;
    let id = doc["id"].as_str().unwrap_or_default().to_string();
    upload_design(&app, &token, "new.pdf").await?;

    let response = app.delete(&format!("/api/designs/{id}"), Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let page = json_body(app.get("/api/designs/all", Some(&token)).await?).await?;
    assert_eq!(page["totalElements"], 1);
    assert_eq!(page["content"][0]["fileName"], "new.pdf");

    let response = app.get(&format!("/api/designs/{id}"), Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let withdrawn = json_body(response).await?;
    assert_eq!(withdrawn["docStatus"], "WITHDRAWN");

    let response = app.delete(&format!("/api/designs/{id}"), Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn oversize_replacement_keeps_the_stored_file() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, token) = app.user_with_token("designer@example.com", "DESIGNER").await?;

    let doc = upload_design(&app, &token, "facade.pdf").await?;
    let id = doc["id"].as_str().unwrap_or_default().to_string();
    let address = doc["fileAddress"].as_str().unwrap_or_default().to_string();
    let path = format!("/api/designs/{id}");

    let oversize = vec![0u8; MAX_FILE_SIZE + 1];
    let response = app
        .upload_doc(
            &path,
            &[("fileName", "facade.pdf")],
            Some(("facade.pdf", "application/pdf", oversize.as_slice())),
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unchanged = json_body(app.get(&path, Some(&token)).await?).await?;
    assert_eq!(unchanged["fileSize"], doc["fileSize"]);
    assert_eq!(unchanged["docStatus"], "INITIAL");
    assert_eq!(std::fs::read(&address)?, b"%PDF-1.7");

    let response = app
        .upload_doc(
            &path,
            &[("fileName", "facade.pdf")],
            Some(("facade.pdf", "application/pdf", &b"%PDF-1.7 rev B"[..])),
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let replaced = json_body(response).await?;
    assert_eq!(replaced["fileSize"], 14);
    assert_eq!(std::fs::read(&address)?, b"%PDF-1.7 rev B");

    app.cleanup().await?;
    Ok(())
}
