use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod asbuilt_docs;
pub mod auth;
pub mod comments;
pub mod companies;
pub mod health;
pub mod project_docs;
pub mod projects;
pub mod users;

/// Uploads above the document size limit still reach the handlers, which answer 400.
const BODY_LIMIT: usize = 16 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let users_routes = Router::new()
        .route("/", post(users::create_user))
        .route("/all", get(users::list_users))
        .route("/setUserToCompany", post(users::set_user_to_company))
        .route("/allByCompanyId", get(users::list_users_by_company))
        .route(
            "/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        );

    let companies_routes = Router::new()
        .route("/", post(companies::create_company))
        .route("/all", get(companies::list_companies))
        .route("/allByProjectId", get(companies::list_companies_by_project))
        .route("/setCompanyToProject", post(companies::set_company_to_project))
        .route(
            "/:id",
            get(companies::get_company)
                .put(companies::update_company)
                .delete(companies::delete_company),
        );

    let projects_routes = Router::new()
        .route("/", post(projects::create_project))
        .route("/all", get(projects::list_projects))
        .route(
            "/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        );

    let designs_routes = Router::new()
        .route("/", post(project_docs::create_project_doc))
        .route("/all", get(project_docs::list_project_docs))
        .route(
            "/setProjectDocToProject",
            post(project_docs::set_project_doc_to_project),
        )
        .route(
            "/allByProjectId",
            get(project_docs::list_project_docs_by_project),
        )
        .route(
            "/allByProjectIdForLastWeek",
            get(project_docs::list_project_docs_by_project_for_last_week),
        )
        .route(
            "/:id",
            get(project_docs::get_project_doc)
                .post(project_docs::update_project_doc)
                .delete(project_docs::delete_project_doc),
        );

    let asbuilts_routes = Router::new()
        .route("/", post(asbuilt_docs::create_asbuilt_doc))
        .route("/all", get(asbuilt_docs::list_asbuilt_docs))
        .route(
            "/setAsbuiltDocToProjectDoc",
            post(asbuilt_docs::set_asbuilt_doc_to_project_doc),
        )
        .route(
            "/setAsbuiltDocToCompany",
            post(asbuilt_docs::set_asbuilt_doc_to_company),
        )
        .route(
            "/allByCompanyId",
            get(asbuilt_docs::list_asbuilt_docs_by_company),
        )
        .route(
            "/allByProjectDocId",
            get(asbuilt_docs::list_asbuilt_docs_by_project_doc),
        )
        .route(
            "/allForLastWeek",
            get(asbuilt_docs::list_asbuilt_docs_for_last_week),
        )
        .route(
            "/allByProjDocIdForLastWeek",
            get(asbuilt_docs::list_asbuilt_docs_by_project_doc_for_last_week),
        )
        .route(
            "/:id",
            get(asbuilt_docs::get_asbuilt_doc)
                .post(asbuilt_docs::update_asbuilt_doc)
                .delete(asbuilt_docs::delete_asbuilt_doc),
        );

    let comments_routes = Router::new()
        .route("/", post(comments::create_comment))
        .route("/all", get(comments::list_comments))
        .route(
            "/setCommentToProjectDoc",
            post(comments::set_comment_to_project_doc),
        )
        .route(
            "/setCommentToAsbuiltDoc",
            post(comments::set_comment_to_asbuilt_doc),
        )
        .route(
            "/allByProjectDocId",
            get(comments::list_comments_by_project_doc),
        )
        .route(
            "/allByAsbuiltDocId",
            get(comments::list_comments_by_asbuilt_doc),
        )
        .route("/allForLastWeek", get(comments::list_comments_for_last_week))
        .route(
            "/allForLastWeekByUser",
            get(comments::list_comments_for_last_week_by_user),
        )
        .route(
            "/:id",
            get(comments::get_comment)
                .put(comments::update_comment)
                .delete(comments::delete_comment),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .nest("/api/users", users_routes)
        .nest("/api/companies", companies_routes)
        .nest("/api/projects", projects_routes)
        .nest("/api/designs", designs_routes)
        .nest("/api/asbuilts", asbuilts_routes)
        .nest("/api/comments", comments_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/auth/login", post(auth::login))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        warn!(origin = value, error = %err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
