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

use crate::{
    auth::AuthenticatedUser,
    domain::CommonStatus,
    error::{AppError, AppResult},
    linker,
    lookup::{active_project, find_project},
    models::{NewProject, Project},
    pagination::{exact_pattern, order_by, ListParams, Page, PageRequest, SortField},
    policy::{authorize, Action, Resource},
    relocation::AppliedRelocation,
    schema::projects,
    state::AppState,
    utils::time::{self, to_iso},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub files_root_directory: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub files_root_directory: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = projects)]
struct ProjectChangeset {
    name: Option<String>,
    address: Option<String>,
    description: Option<String>,
    files_root_directory: Option<String>,
    status: Option<String>,
    updated_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub files_root_directory: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            address: project.address,
            description: project.description,
            files_root_directory: project.files_root_directory,
            status: project.status,
            created_at: to_iso(project.created_at),
            updated_at: to_iso(project.updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ProjectSort {
    Name,
    Address,
    FilesRootDirectory,
    CreatedAt,
    UpdatedAt,
    Id,
}

impl SortField for ProjectSort {
    const DEFAULT: Self = ProjectSort::Name;

    fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "name" => Some(ProjectSort::Name),
            "address" => Some(ProjectSort::Address),
            "filesRootDirectory" => Some(ProjectSort::FilesRootDirectory),
            "createdAt" => Some(ProjectSort::CreatedAt),
            "updatedAt" => Some(ProjectSort::UpdatedAt),
            "id" => Some(ProjectSort::Id),
            _ => None,
        }
    }
}

fn required(field: &str, raw: &str) -> AppResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn ensure_name_free(conn: &mut PgConnection, name: &str, except: Option<i64>) -> AppResult<()> {
    let mut query = projects::table
        .filter(projects::name.ilike(exact_pattern(name)))
        .select(projects::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(projects::id.ne(id));
    }
    if query.first::<i64>(conn).optional()?.is_some() {
        return Err(AppError::conflict(format!(
            "Project with name {name} already exists"
        )));
    }
    Ok(())
}

fn projects_query(pattern: Option<&str>) -> projects::BoxedQuery<'static, Pg> {
    let mut query = projects::table
        .filter(projects::status.ne(CommonStatus::TERMINAL.as_str()))
        .into_boxed();
    if let Some(pattern) = pattern {
        let pattern = pattern.to_string();
        query = query.filter(
            projects::name
                .nullable()
                .ilike(pattern.clone())
                .or(projects::address.ilike(pattern.clone()))
                .or(projects::files_root_directory.nullable().ilike(pattern)),
        );
    }
    query
}

fn load_projects_page(
    conn: &mut PgConnection,
    request: &PageRequest<ProjectSort>,
) -> AppResult<Page<ProjectResponse>> {
    let pattern = request.pattern.as_deref();
    let total: i64 = projects_query(pattern).count().get_result(conn)?;

    let query = projects_query(pattern);
    let query = match request.sort {
        ProjectSort::Name => order_by!(query, request.order, projects::name, projects::id),
        ProjectSort::Address => order_by!(query, request.order, projects::address, projects::id),
        ProjectSort::FilesRootDirectory => order_by!(
            query,
            request.order,
            projects::files_root_directory,
            projects::id
        ),
        ProjectSort::CreatedAt => {
            order_by!(query, request.order, projects::created_at, projects::id)
        }
        ProjectSort::UpdatedAt => {
            order_by!(query, request.order, projects::updated_at, projects::id)
        }
        ProjectSort::Id => order_by!(query, request.order, projects::id, projects::id),
    };
    let rows: Vec<Project> = query
        .offset(request.offset())
        .limit(request.limit())
        .load(conn)?;

    Ok(Page::new(
        rows.into_iter().map(ProjectResponse::from).collect(),
        total,
        request,
    ))
}

pub async fn create_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<ProjectResponse>)> {
    authorize(&actor, Action::Mutate, Resource::Project)?;
    let name = required("name", &payload.name)?;
    let files_root_directory = required("filesRootDirectory", &payload.files_root_directory)?;

    let mut conn = state.db()?;
    ensure_name_free(&mut conn, &name, None)?;
    let project: Project = diesel::insert_into(projects::table)
        .values(&NewProject {
            name,
            address: payload.address,
            description: payload.description,
            files_root_directory,
            status: CommonStatus::Created.as_str().to_string(),
        })
        .get_result(&mut conn)?;

    info!(
        project_id = project.id,
        name = %project.name,
        files_root_directory = %project.files_root_directory,
        "project created"
    );
    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn get_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
) -> AppResult<Json<ProjectResponse>> {
    authorize(&actor, Action::Read, Resource::Project)?;
    let mut conn = state.db()?;
    Ok(Json(find_project(&mut conn, project_id)?.into()))
}

/// Applies present fields. A new `filesRootDirectory` moves every live project
/// doc of the project, and their as-built docs, under the new root first.
pub async fn update_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
    Json(payload): Json<UpdateProjectRequest>,
) -> AppResult<Json<ProjectResponse>> {
    authorize(&actor, Action::Mutate, Resource::Project)?;
    let mut conn = state.db()?;
    let project = active_project(&mut conn, project_id)?;

    let name = payload
        .name
        .as_deref()
        .map(|raw| required("name", raw))
        .transpose()?;
    if let Some(name) = name.as_deref() {
        ensure_name_free(&mut conn, name, Some(project_id))?;
    }
    let new_root = payload
        .files_root_directory
        .as_deref()
        .map(|raw| required("filesRootDirectory", raw))
        .transpose()?
        .filter(|root| *root != project.files_root_directory);

    let applied = match new_root.as_deref() {
        Some(root) => {
            linker::plan_project_root_change(&mut conn, project_id, root)?
                .apply(state.files.as_ref())
                .await?
        }
        None => AppliedRelocation::default(),
    };
    let moved = applied.moves().len();

    let changeset = ProjectChangeset {
        name,
        address: payload.address,
        description: payload.description,
        files_root_directory: new_root,
        status: Some(CommonStatus::Updated.as_str().to_string()),
        updated_at: Some(time::now()),
    };
    let updated = linker::commit_relocated(
        state.files.as_ref(),
        applied,
        &mut conn,
        actor.user_id,
        |conn| {
            let updated: Project = diesel::update(projects::table.find(project_id))
                .set(&changeset)
                .get_result(conn)?;
            Ok(updated)
        },
    )
    .await?;

    info!(
        project_id,
        files_root_directory = %updated.files_root_directory,
        relocated_files = moved,
        "project updated"
    );
    Ok(Json(updated.into()))
}

pub async fn delete_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Mutate, Resource::Project)?;
    let mut conn = state.db()?;
    active_project(&mut conn, project_id)?;

    diesel::update(projects::table.find(project_id))
        .set((
            projects::status.eq(CommonStatus::Deleted.as_str()),
            projects::updated_at.eq(time::now()),
        ))
        .execute(&mut conn)?;

    info!(project_id, "project deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_projects(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<ProjectResponse>>> {
    authorize(&actor, Action::Read, Resource::Project)?;
    let request = params.into_request::<ProjectSort>()?;
    let mut conn = state.db()?;
    Ok(Json(load_projects_page(&mut conn, &request)?))
}
