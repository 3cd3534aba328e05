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
    lookup::{active_company, active_project, find_company},
    models::{Company, NewCompany},
    pagination::{exact_pattern, order_by, ListParams, Page, PageRequest, SortField},
    policy::{authorize, Action, Resource},
    schema::{companies, company_projects},
    state::AppState,
    utils::time::{self, to_iso},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyRequest {
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub registration_number: Option<String>,
    pub taxpayer_number: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub registration_number: Option<String>,
    pub taxpayer_number: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = companies)]
struct CompanyChangeset {
    name: Option<String>,
    address: Option<String>,
    description: Option<String>,
    registration_number: Option<String>,
    taxpayer_number: Option<String>,
    status: Option<String>,
    updated_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResponse {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub registration_number: Option<String>,
    pub taxpayer_number: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Company> for CompanyResponse {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            name: company.name,
            address: company.address,
            description: company.description,
            registration_number: company.registration_number,
            taxpayer_number: company.taxpayer_number,
            status: company.status,
            created_at: to_iso(company.created_at),
            updated_at: to_iso(company.updated_at),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCompanyToProjectRequest {
    pub company_id: i64,
    pub project_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScope {
    pub project_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum CompanySort {
    Name,
    Address,
    CreatedAt,
    UpdatedAt,
    Id,
}

impl SortField for CompanySort {
    const DEFAULT: Self = CompanySort::Name;

    fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "name" => Some(CompanySort::Name),
            "address" => Some(CompanySort::Address),
            "createdAt" => Some(CompanySort::CreatedAt),
            "updatedAt" => Some(CompanySort::UpdatedAt),
            "id" => Some(CompanySort::Id),
            _ => None,
        }
    }
}

fn required_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    Ok(name.to_string())
}

fn ensure_name_free(conn: &mut PgConnection, name: &str, except: Option<i64>) -> AppResult<()> {
    let mut query = companies::table
        .filter(companies::name.ilike(exact_pattern(name)))
        .select(companies::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(companies::id.ne(id));
    }
    if query.first::<i64>(conn).optional()?.is_some() {
        return Err(AppError::conflict(format!(
            "Company with name {name} already exists"
        )));
    }
    Ok(())
}

fn companies_query(
    pattern: Option<&str>,
    project_id: Option<i64>,
) -> companies::BoxedQuery<'static, Pg> {
    let mut query = companies::table
        .filter(companies::status.ne(CommonStatus::TERMINAL.as_str()))
        .into_boxed();
    if let Some(pattern) = pattern {
        let pattern = pattern.to_string();
        query = query.filter(
            companies::name
                .nullable()
                .ilike(pattern.clone())
                .or(companies::address.ilike(pattern)),
        );
    }
    if let Some(project_id) = project_id {
        query = query.filter(
            companies::id.eq_any(
                company_projects::table
                    .filter(company_projects::project_id.eq(project_id))
                    .select(company_projects::company_id),
            ),
        );
    }
    query
}

fn load_companies_page(
    conn: &mut PgConnection,
    request: &PageRequest<CompanySort>,
    project_id: Option<i64>,
) -> AppResult<Page<CompanyResponse>> {
    let pattern = request.pattern.as_deref();
    let total: i64 = companies_query(pattern, project_id)
        .count()
        .get_result(conn)?;

    let query = companies_query(pattern, project_id);
    let query = match request.sort {
        CompanySort::Name => order_by!(query, request.order, companies::name, companies::id),
        CompanySort::Address => {
            order_by!(query, request.order, companies::address, companies::id)
        }
        CompanySort::CreatedAt => {
            order_by!(query, request.order, companies::created_at, companies::id)
        }
        CompanySort::UpdatedAt => {
            order_by!(query, request.order, companies::updated_at, companies::id)
        }
        CompanySort::Id => order_by!(query, request.order, companies::id, companies::id),
    };
    let rows: Vec<Company> = query
        .offset(request.offset())
        .limit(request.limit())
        .load(conn)?;

    Ok(Page::new(
        rows.into_iter().map(CompanyResponse::from).collect(),
        total,
        request,
    ))
}

pub async fn create_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyResponse>)> {
    authorize(&actor, Action::Mutate, Resource::Company)?;
    let name = required_name(&payload.name)?;

    let mut conn = state.db()?;
    ensure_name_free(&mut conn, &name, None)?;
    let company: Company = diesel::insert_into(companies::table)
        .values(&NewCompany {
            name,
            address: payload.address,
            description: payload.description,
            registration_number: payload.registration_number,
            taxpayer_number: payload.taxpayer_number,
            status: CommonStatus::Created.as_str().to_string(),
        })
        .get_result(&mut conn)?;

    info!(company_id = company.id, name = %company.name, "company created");
    Ok((StatusCode::CREATED, Json(company.into())))
}

pub async fn get_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(company_id): Path<i64>,
) -> AppResult<Json<CompanyResponse>> {
    authorize(&actor, Action::Read, Resource::Company)?;
    let mut conn = state.db()?;
    Ok(Json(find_company(&mut conn, company_id)?.into()))
}

pub async fn update_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(company_id): Path<i64>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> AppResult<Json<CompanyResponse>> {
    authorize(&actor, Action::Mutate, Resource::Company)?;
    let mut conn = state.db()?;
    active_company(&mut conn, company_id)?;

    let name = payload.name.as_deref().map(required_name).transpose()?;
    if let Some(name) = name.as_deref() {
        ensure_name_free(&mut conn, name, Some(company_id))?;
    }

    let company: Company = diesel::update(companies::table.find(company_id))
        .set(&CompanyChangeset {
            name,
            address: payload.address,
            description: payload.description,
            registration_number: payload.registration_number,
            taxpayer_number: payload.taxpayer_number,
            status: Some(CommonStatus::Updated.as_str().to_string()),
            updated_at: Some(time::now()),
        })
        .get_result(&mut conn)?;

    info!(company_id, "company updated");
    Ok(Json(company.into()))
}

pub async fn delete_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(company_id): Path<i64>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Mutate, Resource::Company)?;
    let mut conn = state.db()?;
    active_company(&mut conn, company_id)?;

    diesel::update(companies::table.find(company_id))
        .set((
            companies::status.eq(CommonStatus::Deleted.as_str()),
            companies::updated_at.eq(time::now()),
        ))
        .execute(&mut conn)?;

    info!(company_id, "company deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_companies(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CompanyResponse>>> {
    authorize(&actor, Action::Read, Resource::Company)?;
    let request = params.into_request::<CompanySort>()?;
    let mut conn = state.db()?;
    Ok(Json(load_companies_page(&mut conn, &request, None)?))
}

pub async fn list_companies_by_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<ProjectScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<CompanyResponse>>> {
    authorize(&actor, Action::ScopedList, Resource::Company)?;
    let request = ListParams {
        filter: None,
        ..params
    }
    .into_request::<CompanySort>()?;
    let mut conn = state.db()?;
    active_project(&mut conn, scope.project_id)?;
    Ok(Json(load_companies_page(
        &mut conn,
        &request,
        Some(scope.project_id),
    )?))
}

pub async fn set_company_to_project(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetCompanyToProjectRequest>,
) -> AppResult<Json<CompanyResponse>> {
    authorize(&actor, Action::Mutate, Resource::Company)?;
    let company = linker::company_to_project(&state, payload.company_id, payload.project_id)?;
    Ok(Json(company.into()))
}
