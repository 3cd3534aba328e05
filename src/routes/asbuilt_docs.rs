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
    docs::{self, AsbuiltDocRecord, DocKind},
    domain::{AsbuiltCategory, DocStatus},
    error::{AppError, AppResult},
    linker,
    lookup::{active_asbuilt_doc, active_company, active_project_doc, find_asbuilt_doc},
    models::{AsbuiltDoc, NewAsbuiltDoc},
    pagination::{order_by, ListParams, Page, PageRequest, SortField},
    policy::{authorize, Action, Resource},
    schema::{asbuilt_docs, project_docs},
    state::AppState,
    utils::time,
};

#[derive(AsChangeset)]
#[diesel(table_name = asbuilt_docs)]
struct AsbuiltDocChangeset {
    file_format: Option<String>,
    file_size: Option<i64>,
    description: Option<String>,
    doc_status: Option<String>,
    asbuilt_category: Option<String>,
    updated_by: Option<i64>,
    updated_at: NaiveDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAsbuiltDocToProjectDocRequest {
    pub asbuilt_doc_id: Uuid,
    pub project_doc_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAsbuiltDocToCompanyRequest {
    pub asbuilt_doc_id: Uuid,
    pub company_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyScope {
    pub company_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocScope {
    pub project_doc_id: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub enum AsbuiltDocSort {
    FileName,
    FileSize,
    DocStatus,
    AsbuiltCategory,
    CreatedAt,
    UpdatedAt,
}

impl SortField for AsbuiltDocSort {
    const DEFAULT: Self = AsbuiltDocSort::FileName;

    fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "fileName" => Some(AsbuiltDocSort::FileName),
            "fileSize" => Some(AsbuiltDocSort::FileSize),
            "docStatus" => Some(AsbuiltDocSort::DocStatus),
            "asbuiltCategory" => Some(AsbuiltDocSort::AsbuiltCategory),
            "createdAt" => Some(AsbuiltDocSort::CreatedAt),
            "updatedAt" => Some(AsbuiltDocSort::UpdatedAt),
            _ => None,
        }
    }
}

#[derive(Default)]
struct AsbuiltScope {
    company_id: Option<i64>,
    project_doc_id: Option<Uuid>,
    changed_since: Option<NaiveDateTime>,
}

fn parse_category(raw: Option<&str>) -> AppResult<Option<AsbuiltCategory>> {
    raw.map(|value| value.parse::<AsbuiltCategory>())
        .transpose()
        .map_err(AppError::bad_request)
}

fn asbuilt_docs_query(
    pattern: Option<&str>,
    scope: &AsbuiltScope,
) -> asbuilt_docs::BoxedQuery<'static, Pg> {
    let mut query = asbuilt_docs::table
        .filter(asbuilt_docs::doc_status.ne(DocStatus::TERMINAL.as_str()))
        .into_boxed();
    if let Some(pattern) = pattern {
        let pattern = pattern.to_string();
        let parent_names = project_docs::table
            .filter(project_docs::file_name.ilike(pattern.clone()))
            .select(project_docs::id.nullable());
        query = query.filter(
            asbuilt_docs::file_name
                .nullable()
                .ilike(pattern.clone())
                .or(asbuilt_docs::project_doc_id.eq_any(parent_names).nullable())
                .or(asbuilt_docs::asbuilt_category.ilike(pattern)),
        );
    }
    if let Some(company_id) = scope.company_id {
        query = query.filter(asbuilt_docs::company_id.eq(company_id));
    }
    if let Some(project_doc_id) = scope.project_doc_id {
        query = query.filter(asbuilt_docs::project_doc_id.eq(project_doc_id));
    }
    if let Some(since) = scope.changed_since {
        query = query.filter(
            asbuilt_docs::created_at
                .ge(since)
                .or(asbuilt_docs::updated_at.ge(since)),
        );
    }
    query
}

fn load_asbuilt_docs_page(
    conn: &mut PgConnection,
    request: &PageRequest<AsbuiltDocSort>,
    scope: &AsbuiltScope,
) -> AppResult<Page<AsbuiltDocRecord>> {
    let pattern = request.pattern.as_deref();
    let total: i64 = asbuilt_docs_query(pattern, scope).count().get_result(conn)?;

    let query = asbuilt_docs_query(pattern, scope);
    let id = asbuilt_docs::id;
    let query = match request.sort {
        AsbuiltDocSort::FileName => order_by!(query, request.order, asbuilt_docs::file_name, id),
        AsbuiltDocSort::FileSize => order_by!(query, request.order, asbuilt_docs::file_size, id),
        AsbuiltDocSort::DocStatus => {
            order_by!(query, request.order, asbuilt_docs::doc_status, id)
        }
        AsbuiltDocSort::AsbuiltCategory => {
            order_by!(query, request.order, asbuilt_docs::asbuilt_category, id)
        }
        AsbuiltDocSort::CreatedAt => {
            order_by!(query, request.order, asbuilt_docs::created_at, id)
        }
        AsbuiltDocSort::UpdatedAt => {
            order_by!(query, request.order, asbuilt_docs::updated_at, id)
        }
    };
    let rows: Vec<AsbuiltDoc> = query
        .offset(request.offset())
        .limit(request.limit())
        .load(conn)?;

    let content = rows
        .into_iter()
        .map(AsbuiltDocRecord::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Page::new(content, total, request))
}

fn scoped_request(params: ListParams) -> AppResult<PageRequest<AsbuiltDocSort>> {
    ListParams {
        filter: None,
        ..params
    }
    .into_request::<AsbuiltDocSort>()
}

pub async fn create_asbuilt_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<AsbuiltDocRecord>)> {
    authorize(&actor, Action::Mutate, Resource::AsbuiltDoc)?;
    let mut form = docs::read_doc_form(&mut multipart, DocKind::AsbuiltDoc).await?;
    let prepared = docs::prepare_upload(&mut form, &state.config.files_staging_dir)?;
    let category = parse_category(form.category.as_deref())?;

    let new_doc = NewAsbuiltDoc {
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
        asbuilt_category: category.map(|c| c.as_str().to_string()),
        created_by: Some(actor.user_id),
    };

    let row = docs::store_upload(state.files.as_ref(), DocKind::AsbuiltDoc, &prepared, || {
        let mut conn = state.db()?;
        Ok(diesel::insert_into(asbuilt_docs::table)
            .values(&new_doc)
            .get_result::<AsbuiltDoc>(&mut conn)?)
    })
    .await?;

    info!(
        document_id = %row.id,
        file_name = %row.file_name,
        file_size = row.file_size,
        created_by = actor.user_id,
        "as-built doc uploaded"
    );
    Ok((StatusCode::CREATED, Json(AsbuiltDocRecord::try_from(row)?)))
}

pub async fn get_asbuilt_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(doc_id): Path<Uuid>,
) -> AppResult<Json<AsbuiltDocRecord>> {
    authorize(&actor, Action::Read, Resource::AsbuiltDoc)?;
    let mut conn = state.db()?;
    let row = find_asbuilt_doc(&mut conn, doc_id)?;
    Ok(Json(AsbuiltDocRecord::try_from(row)?))
}

pub async fn update_asbuilt_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(doc_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<AsbuiltDocRecord>> {
    authorize(&actor, Action::Mutate, Resource::AsbuiltDoc)?;
    let form = docs::read_doc_form(&mut multipart, DocKind::AsbuiltDoc).await?;
    let mut conn = state.db()?;
    let doc = active_asbuilt_doc(&mut conn, doc_id)?;

    let new_size = docs::check_update(&form, &doc.file_name)?;
    let category = parse_category(form.category.as_deref())?;

    let file_format =
        docs::replace_file(state.files.as_ref(), &form, &doc.file_address, &doc.file_name).await?;

    let updated: AsbuiltDoc = diesel::update(asbuilt_docs::table.find(doc_id))
        .set(&AsbuiltDocChangeset {
            file_format,
            file_size: new_size,
            description: form.description,
            doc_status: form.doc_status.map(|s| s.as_str().to_string()),
            asbuilt_category: category.map(|c| c.as_str().to_string()),
            updated_by: Some(actor.user_id),
            updated_at: time::now(),
        })
        .get_result(&mut conn)?;

    info!(
        document_id = %doc_id,
        replaced_file = new_size.is_some(),
        doc_status = %updated.doc_status,
        "as-built doc updated"
    );
    Ok(Json(AsbuiltDocRecord::try_from(updated)?))
}

pub async fn delete_asbuilt_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(doc_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Mutate, Resource::AsbuiltDoc)?;
    let mut conn = state.db()?;
    let doc = active_asbuilt_doc(&mut conn, doc_id)?;

    diesel::update(asbuilt_docs::table.find(doc_id))
        .set((
            asbuilt_docs::doc_status.eq(DocStatus::Withdrawn.as_str()),
            asbuilt_docs::updated_by.eq(Some(actor.user_id)),
            asbuilt_docs::updated_at.eq(time::now()),
        ))
        .execute(&mut conn)?;

    docs::discard_file(
        state.files.as_ref(),
        DocKind::AsbuiltDoc,
        doc_id,
        std::path::Path::new(&doc.file_address),
    )
    .await;

    info!(document_id = %doc_id, updated_by = actor.user_id, "as-built doc withdrawn");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_asbuilt_docs(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<AsbuiltDocRecord>>> {
    authorize(&actor, Action::Read, Resource::AsbuiltDoc)?;
    let request = params.into_request::<AsbuiltDocSort>()?;
    let mut conn = state.db()?;
    Ok(Json(load_asbuilt_docs_page(
        &mut conn,
        &request,
        &AsbuiltScope::default(),
    )?))
}

pub async fn set_asbuilt_doc_to_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetAsbuiltDocToProjectDocRequest>,
) -> AppResult<Json<AsbuiltDocRecord>> {
    authorize(&actor, Action::Mutate, Resource::AsbuiltDoc)?;
    let doc = linker::asbuilt_doc_to_project_doc(
        &state,
        &actor,
        payload.asbuilt_doc_id,
        payload.project_doc_id,
    )
    .await?;
    Ok(Json(AsbuiltDocRecord::try_from(doc)?))
}

pub async fn set_asbuilt_doc_to_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetAsbuiltDocToCompanyRequest>,
) -> AppResult<Json<AsbuiltDocRecord>> {
    authorize(&actor, Action::Mutate, Resource::AsbuiltDoc)?;
    let doc =
        linker::asbuilt_doc_to_company(&state, &actor, payload.asbuilt_doc_id, payload.company_id)?;
    Ok(Json(AsbuiltDocRecord::try_from(doc)?))
}

pub async fn list_asbuilt_docs_by_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<CompanyScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<AsbuiltDocRecord>>> {
    authorize(&actor, Action::ScopedList, Resource::AsbuiltDoc)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    active_company(&mut conn, scope.company_id)?;
    let scope = AsbuiltScope {
        company_id: Some(scope.company_id),
        ..Default::default()
    };
    Ok(Json(load_asbuilt_docs_page(&mut conn, &request, &scope)?))
}

async fn list_by_project_doc(
    state: AppState,
    actor: AuthenticatedUser,
    project_doc_id: Uuid,
    params: ListParams,
    last_week: bool,
) -> AppResult<Json<Page<AsbuiltDocRecord>>> {
    authorize(&actor, Action::ScopedList, Resource::AsbuiltDoc)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    active_project_doc(&mut conn, project_doc_id)?;
    let scope = AsbuiltScope {
        project_doc_id: Some(project_doc_id),
        changed_since: last_week.then(|| time::last_week_cutoff(time::now())),
        ..Default::default()
    };
    Ok(Json(load_asbuilt_docs_page(&mut conn, &request, &scope)?))
}

pub async fn list_asbuilt_docs_by_project_doc(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<ProjectDocScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<AsbuiltDocRecord>>> {
    list_by_project_doc(state, actor, scope.project_doc_id, params, false).await
}

pub async fn list_asbuilt_docs_by_project_doc_for_last_week(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<ProjectDocScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<AsbuiltDocRecord>>> {
    list_by_project_doc(state, actor, scope.project_doc_id, params, true).await
}

pub async fn list_asbuilt_docs_for_last_week(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<AsbuiltDocRecord>>> {
    authorize(&actor, Action::ScopedList, Resource::AsbuiltDoc)?;
    let request = scoped_request(params)?;
    let mut conn = state.db()?;
    let scope = AsbuiltScope {
        changed_since: Some(time::last_week_cutoff(time::now())),
        ..Default::default()
    };
    Ok(Json(load_asbuilt_docs_page(&mut conn, &request, &scope)?))
}
