use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    domain::CommonStatus,
    error::AppResult,
    linker,
    lookup::{active_asbuilt_doc, active_comment, active_project_doc, active_user, find_comment},
    models::{Comment, NewComment},
    pagination::{order_by, ListParams, Page, PageRequest, SortField},
    policy::{authorize, authorize_owner, Action, Resource},
    schema::comments,
    state::AppState,
    utils::time::{self, to_iso},
};

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub title: Option<String>,
    pub text: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateCommentRequest {
    pub title: Option<String>,
    pub text: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = comments)]
struct CommentChangeset {
    title: Option<String>,
    body: Option<String>,
    updated_by: Option<i64>,
    status: String,
    updated_at: NaiveDateTime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: i64,
    pub title: Option<String>,
    pub text: Option<String>,
    pub project_doc_id: Option<Uuid>,
    pub asbuilt_doc_id: Option<Uuid>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            title: comment.title,
            text: comment.body,
            project_doc_id: comment.project_doc_id,
            asbuilt_doc_id: comment.asbuilt_doc_id,
            created_by: comment.created_by,
            updated_by: comment.updated_by,
            status: comment.status,
            created_at: to_iso(comment.created_at),
            updated_at: to_iso(comment.updated_at),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommentToProjectDocRequest {
    pub comment_id: i64,
    pub project_doc_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommentToAsbuiltDocRequest {
    pub comment_id: i64,
    pub asbuilt_doc_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocScope {
    pub project_doc_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsbuiltDocScope {
    pub asbuilt_doc_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScope {
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum CommentSort {
    Title,
    CreatedAt,
    UpdatedAt,
    Id,
}

impl SortField for CommentSort {
    const DEFAULT: Self = CommentSort::Title;

    fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(CommentSort::Title),
            "createdAt" => Some(CommentSort::CreatedAt),
            "updatedAt" => Some(CommentSort::UpdatedAt),
            "id" => Some(CommentSort::Id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct CommentScope {
    project_doc_id: Option<Uuid>,
    asbuilt_doc_id: Option<Uuid>,
    author_id: Option<i64>,
    changed_since: Option<NaiveDateTime>,
}

fn comments_query(pattern: Option<&str>, scope: &CommentScope) -> comments::BoxedQuery<'static, Pg> {
    let mut query = comments::table
        .filter(comments::status.ne(CommonStatus::TERMINAL.as_str()))
        .into_boxed();
    if let Some(pattern) = pattern {
        let pattern = pattern.to_string();
        query = query.filter(
            comments::title
                .ilike(pattern.clone())
                .or(comments::body.ilike(pattern)),
        );
    }
    if let Some(project_doc_id) = scope.project_doc_id {
        query = query.filter(comments::project_doc_id.eq(project_doc_id));
    }
    if let Some(asbuilt_doc_id) = scope.asbuilt_doc_id {
        query = query.filter(comments::asbuilt_doc_id.eq(asbuilt_doc_id));
    }
    if let Some(author_id) = scope.author_id {
        query = query.filter(
            comments::created_by
                .eq(author_id)
                .or(comments::updated_by.eq(author_id)),
        );
    }
    if let Some(since) = scope.changed_since {
        query = query.filter(comments::created_at.ge(since).or(comments::updated_at.ge(since)));
    }
    query
}

fn load_comments_page(
    conn: &mut PgConnection,
    request: &PageRequest<CommentSort>,
    scope: &CommentScope,
) -> AppResult<Page<CommentResponse>> {
    let pattern = request.pattern.as_deref();
    let total: i64 = comments_query(pattern, scope).count().get_result(conn)?;

    let query = comments_query(pattern, scope);
    let query = match request.sort {
        CommentSort::Title => order_by!(query, request.order, comments::title, comments::id),
        CommentSort::CreatedAt => {
            order_by!(query, request.order, comments::created_at, comments::id)
        }
        CommentSort::UpdatedAt => {
            order_by!(query, request.order, comments::updated_at, comments::id)
        }
        CommentSort::Id => order_by!(query, request.order, comments::id, comments::id),
    };
    let rows: Vec<Comment> = query
        .offset(request.offset())
        .limit(request.limit())
        .load(conn)?;

    Ok(Page::new(
        rows.into_iter().map(CommentResponse::from).collect(),
        total,
        request,
    ))
}

fn scoped_request(params: ListParams) -> AppResult<PageRequest<CommentSort>> {
    ListParams {
        filter: None,
        ..params
    }
    .into_request::<CommentSort>()
}

pub async fn create_comment(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentResponse>)> {
    authorize(&actor, Action::Mutate, Resource::Comment)?;
    let mut conn = state.db()?;
    let comment: Comment = diesel::insert_into(comments::table)
        .values(&NewComment {
            title: payload.title,
            body: payload.text,
            created_by: Some(actor.user_id),
            status: CommonStatus::Created.as_str().to_string(),
        })
        .get_result(&mut conn)?;

    info!(comment_id = comment.id, created_by = actor.user_id, "comment created");
    Ok((StatusCode::CREATED, Json(comment.into())))
}

pub async fn get_comment(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(comment_id): Path<i64>,
) -> AppResult<Json<CommentResponse>> {
    authorize(&actor, Action::Read, Resource::Comment)?;
    let mut conn = state.db()?;
    Ok(Json(find_comment(&mut conn, comment_id)?.into()))
}

/// Only the author or an administrator may edit.
pub async fn update_comment(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(comment_id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> AppResult<Json<CommentResponse>> {
    authorize(&actor, Action::Mutate, Resource::Comment)?;
    let mut conn = state.db()?;
    let comment = active_comment(&mut conn, comment_id)?;
    authorize_owner(&actor, comment.created_by)?;

    let updated: Comment = diesel::update(comments::table.find(comment_id))
        .set(&CommentChangeset {
            title: payload.title,
            body: payload.text,
            updated_by: Some(actor.user_id),
            status: CommonStatus::Updated.as_str().to_string(),
            updated_at: time::now(),
        })
        .get_result(&mut conn)?;

    info!(comment_id, updated_by = actor.user_id, "comment updated");
    Ok(Json(updated.into()))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(comment_id): Path<i64>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Mutate, Resource::Comment)?;
    let mut conn = state.db()?;
    let comment = active_comment(&mut conn, comment_id)?;
    authorize_owner(&actor, comment.created_by)?;

    diesel::update(comments::table.find(comment_id))
        .set((
            comments::status.eq(CommonStatus::Deleted.as_str()),
            comments::updated_by.eq(Some(actor.user_id)),
            comments::updated_at.eq(time::now()),
        ))
        .execute(&mut conn)?;

    info!(comment_id, deleted_by = actor.user_id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommentResponse>>> {
    authorize(&actor, Action::Read, Resource::Comment)?;
    let request = params.into_request::<CommentSort>()?;
    let mut conn = state.db()?;
    Ok(Json(load_comments_page(
        &mut conn,
        &request,
        &CommentScope::default(),
    )?))
}

pub async fn set_comment_to_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetCommentToProjectDocRequest>,
) -> AppResult<Json<CommentResponse>> {
    authorize(&actor, Action::Mutate, Resource::Comment)?;
    let comment =
        linker::comment_to_project_doc(&state, &actor, payload.comment_id, payload.project_doc_id)?;
    Ok(Json(comment.into()))
}

pub async fn set_comment_to_asbuilt_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetCommentToAsbuiltDocRequest>,
) -> AppResult<Json<CommentResponse>> {
    authorize(&actor, Action::Mutate, Resource::Comment)?;
    let comment =
        linker::comment_to_asbuilt_doc(&state, &actor, payload.comment_id, payload.asbuilt_doc_id)?;
    Ok(Json(comment.into()))
}

pub async fn list_comments_by_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<ProjectDocScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommentResponse>>> {
    authorize(&actor, Action::ScopedList, Resource::Comment)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    active_project_doc(&mut conn, scope.project_doc_id)?;
    let scope = CommentScope {
        project_doc_id: Some(scope.project_doc_id),
        ..Default::default()
    };
    Ok(Json(load_comments_page(&mut conn, &request, &scope)?))
}

pub async fn list_comments_by_asbuilt_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<AsbuiltDocScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommentResponse>>> {
    authorize(&actor, Action::ScopedList, Resource::Comment)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    active_asbuilt_doc(&mut conn, scope.asbuilt_doc_id)?;
    let scope = CommentScope {
        asbuilt_doc_id: Some(scope.asbuilt_doc_id),
        ..Default::default()
    };
    Ok(Json(load_comments_page(&mut conn, &request, &scope)?))
}

pub async fn list_comments_for_last_week(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommentResponse>>> {
    authorize(&actor, Action::ScopedList, Resource::Comment)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    let scope = CommentScope {
        changed_since: Some(time::last_week_cutoff(time::now())),
        ..Default::default()
    };
    Ok(Json(load_comments_page(&mut conn, &request, &scope)?))
}

/// Comments the user created or last edited during the past seven days.
pub async fn list_comments_for_last_week_by_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<UserScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CommentResponse>>> {
    authorize(&actor, Action::ScopedList, Resource::Comment)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    active_user(&mut conn, scope.user_id)?;
    let scope = CommentScope {
        author_id: Some(scope.user_id),
        changed_since: Some(time::last_week_cutoff(time::now())),
        ..Default::default()
    };
    Ok(Json(load_comments_page(&mut conn, &request, &scope)?))
}
