use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    docs::{self, DocKind, ProjectDocRecord},
    domain::{DesignCategory, DocStatus},
    error::{AppError, AppResult},
    linker,
    lookup::{active_project, active_project_doc, find_project_doc},
    models::{NewProjectDoc, ProjectDoc},
    pagination::{order_by, ListParams, Page, PageRequest, SortField},
    policy::{authorize, Action, Resource},
    schema::{project_docs, projects},
    state::AppState,
    utils::time,
};

#[derive(AsChangeset)]
#[diesel(table_name = project_docs)]
struct ProjectDocChangeset {
    file_format: Option<String>,
    file_size: Option<i64>,
    description: Option<String>,
    doc_status: Option<String>,
    design_category: Option<String>,
    updated_by: Option<i64>,
    updated_at: NaiveDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProjectDocToProjectRequest {
    pub project_doc_id: Uuid,
    pub project_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScope {
    pub project_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum ProjectDocSort {
    FileName,
    FileSize,
    DocStatus,
    DesignCategory,
    CreatedAt,
    UpdatedAt,
}

impl SortField for ProjectDocSort {
    const DEFAULT: Self = ProjectDocSort::FileName;

    fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "fileName" => Some(ProjectDocSort::FileName),
            "fileSize" => Some(ProjectDocSort::FileSize),
            "docStatus" => Some(ProjectDocSort::DocStatus),
            "designCategory" => Some(ProjectDocSort::DesignCategory),
            "createdAt" => Some(ProjectDocSort::CreatedAt),
            "updatedAt" => Some(ProjectDocSort::UpdatedAt),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ProjectDocScope {
    project_id: Option<i64>,
    changed_since: Option<NaiveDateTime>,
}

fn parse_category(raw: Option<&str>) -> AppResult<Option<DesignCategory>> {
    raw.map(|value| value.parse::<DesignCategory>())
        .transpose()
        .map_err(AppError::bad_request)
}

fn project_docs_query(
    pattern: Option<&str>,
    scope: &ProjectDocScope,
) -> project_docs::BoxedQuery<'static, Pg> {
    let mut query = project_docs::table
        .filter(project_docs::doc_status.ne(DocStatus::TERMINAL.as_str()))
        .into_boxed();
    if let Some(pattern) = pattern {
        let pattern = pattern.to_string();
        let parent_names = projects::table
            .filter(projects::name.ilike(pattern.clone()))
            .select(projects::id.nullable());
        query = query.filter(
            project_docs::file_name
                .nullable()
                .ilike(pattern.clone())
                .or(project_docs::project_id.eq_any(parent_names).nullable())
                .or(project_docs::design_category.ilike(pattern)),
        );
    }
    if let Some(project_id) = scope.project_id {
        query = query.filter(project_docs::project_id.eq(project_id));
    }
    if let Some(since) = scope.changed_since {
        query = query.filter(
            project_docs::created_at
                .ge(since)
                .or(project_docs::updated_at.ge(since)),
        );
    }
    query
}

fn load_project_docs_page(
    conn: &mut PgConnection,
    request: &PageRequest<ProjectDocSort>,
    scope: &ProjectDocScope,
) -> AppResult<Page<ProjectDocRecord>> {
    let pattern = request.pattern.as_deref();
    let total: i64 = project_docs_query(pattern, scope).count().get_result(conn)?;

    let query = project_docs_query(pattern, scope);
    let id = project_docs::id;
    let query = match request.sort {
        ProjectDocSort::FileName => order_by!(query, request.order, project_docs::file_name, id),
        ProjectDocSort::FileSize => order_by!(query, request.order, project_docs::file_size, id),
        ProjectDocSort::DocStatus => {
            order_by!(query, request.order, project_docs::doc_status, id)
        }
        ProjectDocSort::DesignCategory => {
            order_by!(query, request.order, project_docs::design_category, id)
        }
        ProjectDocSort::CreatedAt => {
            order_by!(query, request.order, project_docs::created_at, id)
        }
        ProjectDocSort::UpdatedAt => {
            order_by!(query, request.order, project_docs::updated_at, id)
        }
    };
    let rows: Vec<ProjectDoc> = query
        .offset(request.offset())
        .limit(request.limit())
        .load(conn)?;

    let content = rows
        .into_iter()
        .map(ProjectDocRecord::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Page::new(content, total, request))
}

pub async fn create_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ProjectDocRecord>)> {
    authorize(&actor, Action::Mutate, Resource::ProjectDoc)?;
    let mut form = docs::read_doc_form(&mut multipart, DocKind::ProjectDoc).await?;
    let prepared = docs::prepare_upload(&mut form, &state.config.files_staging_dir)?;
    let category = parse_category(form.category.as_deref())?;

    let new_doc = NewProjectDoc {
        id: prepared.id,
        file_name: prepared.file_name.clone(),
        file_format: prepared.file_format.clone(),
        file_size: prepared.file_size,
        file_address: prepared.address.to_string_lossy().into_owned(),
        description: form.description,
        doc_status: form
            .doc_status
            .unwrap_or(DocStatus::Initial)
            .as_str()
            .to_string(),
        design_category: category.map(|c| c.as_str().to_string()),
        created_by: Some(actor.user_id),
    };

    let row = docs::store_upload(state.files.as_ref(), DocKind::ProjectDoc, &prepared, || {
        let mut conn = state.db()?;
        Ok(diesel::insert_into(project_docs::table)
            .values(&new_doc)
            .get_result::<ProjectDoc>(&mut conn)?)
    })
    .await?;

    info!(
        document_id = %row.id,
        file_name = %row.file_name,
        file_size = row.file_size,
        created_by = actor.user_id,
        "project doc uploaded"
    );
    Ok((StatusCode::CREATED, Json(ProjectDocRecord::try_from(row)?)))
}

pub async fn get_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(doc_id): Path<Uuid>,
) -> AppResult<Json<ProjectDocRecord>> {
    authorize(&actor, Action::Read, Resource::ProjectDoc)?;
    let mut conn = state.db()?;
    let row = find_project_doc(&mut conn, doc_id)?;
    Ok(Json(ProjectDocRecord::try_from(row)?))
}

/// Multipart update. `fileName` must equal the stored name; a `file` part
/// replaces the bytes at the current address.
pub async fn update_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(doc_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ProjectDocRecord>> {
    authorize(&actor, Action::Mutate, Resource::ProjectDoc)?;
    let form = docs::read_doc_form(&mut multipart, DocKind::ProjectDoc).await?;
    let mut conn = state.db()?;
    let doc = active_project_doc(&mut conn, doc_id)?;

    let new_size = docs::check_update(&form, &doc.file_name)?;
    let category = parse_category(form.category.as_deref())?;

    let file_format =
        docs::replace_file(state.files.as_ref(), &form, &doc.file_address, &doc.file_name).await?;

    let updated: ProjectDoc = diesel::update(project_docs::table.find(doc_id))
        .set(&ProjectDocChangeset {
            file_format,
            file_size: new_size,
            description: form.description,
            doc_status: form.doc_status.map(|s| s.as_str().to_string()),
            design_category: category.map(|c| c.as_str().to_string()),
            updated_by: Some(actor.user_id),
            updated_at: time::now(),
        })
        .get_result(&mut conn)?;

    info!(
        document_id = %doc_id,
        replaced_file = new_size.is_some(),
        doc_status = %updated.doc_status,
        "project doc updated"
    );
    Ok(Json(ProjectDocRecord::try_from(updated)?))
}

/// Withdraws the document and removes its file.
pub async fn delete_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(doc_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Mutate, Resource::ProjectDoc)?;
    let mut conn = state.db()?;
    let doc = active_project_doc(&mut conn, doc_id)?;

    diesel::update(project_docs::table.find(doc_id))
        .set((
            project_docs::doc_status.eq(DocStatus::Withdrawn.as_str()),
            project_docs::updated_by.eq(Some(actor.user_id)),
            project_docs::updated_at.eq(time::now()),
        ))
        .execute(&mut conn)?;

    docs::discard_file(
        state.files.as_ref(),
        DocKind::ProjectDoc,
        doc_id,
        std::path::Path::new(&doc.file_address),
    )
    .await;

    info!(document_id = %doc_id, updated_by = actor.user_id, "project doc withdrawn");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_project_docs(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ProjectDocRecord>>> {
    authorize(&actor, Action::Read, Resource::ProjectDoc)?;
    let request = params.into_request::<ProjectDocSort>()?;
    let mut conn = state.db()?;
    Ok(Json(load_project_docs_page(
        &mut conn,
        &request,
        &ProjectDocScope::default(),
    )?))
}

pub async fn set_project_doc_to_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetProjectDocToProjectRequest>,
) -> AppResult<Json<ProjectDocRecord>> {
    authorize(&actor, Action::Mutate, Resource::ProjectDoc)?;
    let doc = linker::project_doc_to_project(
        &state,
        &actor,
        payload.project_doc_id,
        payload.project_id,
    )
    .await?;
    Ok(Json(ProjectDocRecord::try_from(doc)?))
}

async fn list_by_project(
    state: AppState,
    actor: AuthenticatedUser,
    scope: ProjectScope,
    params: ListParams,
    last_week: bool,
) -> AppResult<Json<Page<ProjectDocRecord>>> {
    authorize(&actor, Action::ScopedList, Resource::ProjectDoc)?;
    let request = ListParams {
        filter: None,
        ..params
    }
    .into_request::<ProjectDocSort>()?;
    let mut conn = state.db()?;
    active_project(&mut conn, scope.project_id)?;
    let scope = ProjectDocScope {
        project_id: Some(scope.project_id),
        changed_since: last_week.then(|| time::last_week_cutoff(time::now())),
    };
    Ok(Json(load_project_docs_page(&mut conn, &request, &scope)?))
}

pub async fn list_project_docs_by_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<ProjectScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ProjectDocRecord>>> {
    list_by_project(state, actor, scope, params, false).await
}

pub async fn list_project_docs_by_project_for_last_week(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<ProjectScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ProjectDocRecord>>> {
    list_by_project(state, actor, scope, params, true).await
}
