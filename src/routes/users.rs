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
    auth::{password, AuthenticatedUser},
    domain::{CommonStatus, Role},
    error::{AppError, AppResult},
    linker,
    lookup::{active_company, active_user, find_user},
    models::{NewUser, User},
    pagination::{exact_pattern, order_by, ListParams, Page, PageRequest, SortField},
    policy::{authorize, Action, Resource},
    schema::users,
    state::AppState,
    utils::time::{self, to_iso},
};

const NAME_MAX_LEN: usize = 20;
const EMAIL_MAX_LEN: usize = 255;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub role: Role,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub role: Option<Role>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct UserChangeset {
    email: Option<String>,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    phone_number: Option<String>,
    role: Option<String>,
    status: Option<String>,
    updated_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub role: String,
    pub company_id: Option<i64>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            position: user.position,
            phone_number: user.phone_number,
            role: user.role,
            company_id: user.company_id,
            status: user.status,
            created_at: to_iso(user.created_at),
            updated_at: to_iso(user.updated_at),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserToCompanyRequest {
    pub user_id: i64,
    pub company_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyScope {
    pub company_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum UserSort {
    LastName,
    FirstName,
    Email,
    Position,
    Role,
    CreatedAt,
    UpdatedAt,
    Id,
}

impl SortField for UserSort {
    const DEFAULT: Self = UserSort::LastName;

    fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "lastName" => Some(UserSort::LastName),
            "firstName" => Some(UserSort::FirstName),
            "email" => Some(UserSort::Email),
            "position" => Some(UserSort::Position),
            "role" => Some(UserSort::Role),
            "createdAt" => Some(UserSort::CreatedAt),
            "updatedAt" => Some(UserSort::UpdatedAt),
            "id" => Some(UserSort::Id),
            _ => None,
        }
    }
}

/// Plain `local@domain.tld` check; no whitespace, exactly one `@`.
pub fn validate_email(raw: &str) -> AppResult<String> {
    let email = raw.trim();
    let valid = email.len() <= EMAIL_MAX_LEN
        && !email.contains(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
    if !valid {
        return Err(AppError::bad_request(format!("invalid email: {email}")));
    }
    Ok(email.to_string())
}

/// `+` optional, then 10 to 15 digits.
pub fn validate_phone(raw: &str) -> AppResult<String> {
    let phone = raw.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !(10..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::bad_request(format!("invalid phone number: {phone}")));
    }
    Ok(phone.to_string())
}

fn validate_name(field: &str, raw: Option<String>) -> AppResult<Option<String>> {
    let Some(value) = raw.map(|v| v.trim().to_string()) else {
        return Ok(None);
    };
    if value.chars().count() > NAME_MAX_LEN {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {NAME_MAX_LEN} characters"
        )));
    }
    Ok(Some(value))
}

fn ensure_email_free(conn: &mut PgConnection, email: &str, except: Option<i64>) -> AppResult<()> {
    let mut query = users::table
        .filter(users::email.ilike(exact_pattern(email)))
        .select(users::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(users::id.ne(id));
    }
    if query.first::<i64>(conn).optional()?.is_some() {
        return Err(AppError::conflict(format!(
            "User with email {email} already exists"
        )));
    }
    Ok(())
}

fn users_query(pattern: Option<&str>, company_id: Option<i64>) -> users::BoxedQuery<'static, Pg> {
    let mut query = users::table
        .filter(users::status.ne(CommonStatus::TERMINAL.as_str()))
        .into_boxed();
    if let Some(pattern) = pattern {
        let pattern = pattern.to_string();
        query = query.filter(
            users::email
                .nullable()
                .ilike(pattern.clone())
                .or(users::first_name.ilike(pattern.clone()))
                .or(users::last_name.ilike(pattern.clone()))
                .or(users::position.ilike(pattern)),
        );
    }
    if let Some(company_id) = company_id {
        query = query.filter(users::company_id.eq(company_id));
    }
    query
}

fn load_users_page(
    conn: &mut PgConnection,
    request: &PageRequest<UserSort>,
    company_id: Option<i64>,
) -> AppResult<Page<UserResponse>> {
    let pattern = request.pattern.as_deref();
    let total: i64 = users_query(pattern, company_id).count().get_result(conn)?;

    let query = users_query(pattern, company_id);
    let query = match request.sort {
        UserSort::LastName => order_by!(query, request.order, users::last_name, users::id),
        UserSort::FirstName => order_by!(query, request.order, users::first_name, users::id),
        UserSort::Email => order_by!(query, request.order, users::email, users::id),
        UserSort::Position => order_by!(query, request.order, users::position, users::id),
        UserSort::Role => order_by!(query, request.order, users::role, users::id),
        UserSort::CreatedAt => order_by!(query, request.order, users::created_at, users::id),
        UserSort::UpdatedAt => order_by!(query, request.order, users::updated_at, users::id),
        UserSort::Id => order_by!(query, request.order, users::id, users::id),
    };
    let rows: Vec<User> = query
        .offset(request.offset())
        .limit(request.limit())
        .load(conn)?;

    Ok(Page::new(
        rows.into_iter().map(UserResponse::from).collect(),
        total,
        request,
    ))
}

pub async fn create_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    authorize(&actor, Action::Mutate, Resource::User)?;

    let email = validate_email(&payload.email)?;
    let phone_number = payload
        .phone_number
        .as_deref()
        .map(validate_phone)
        .transpose()?;
    if payload.password.is_empty() {
        return Err(AppError::bad_request("password must not be empty"));
    }

    let new_user = NewUser {
        email,
        password_hash: password::hash_password(&payload.password)?,
        first_name: validate_name("firstName", payload.first_name)?,
        last_name: validate_name("lastName", payload.last_name)?,
        position: payload.position,
        phone_number,
        role: payload.role.as_str().to_string(),
        status: CommonStatus::Created.as_str().to_string(),
    };

    let mut conn = state.db()?;
    ensure_email_free(&mut conn, &new_user.email, None)?;
    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)?;

    info!(user_id = user.id, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Action::Read, Resource::User)?;
    let mut conn = state.db()?;
    Ok(Json(find_user(&mut conn, user_id)?.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Action::Mutate, Resource::User)?;
    let mut conn = state.db()?;
    active_user(&mut conn, user_id)?;

    let email = payload.email.as_deref().map(validate_email).transpose()?;
    if let Some(email) = email.as_deref() {
        ensure_email_free(&mut conn, email, Some(user_id))?;
    }
    let password_hash = match payload.password.as_deref() {
        Some("") => return Err(AppError::bad_request("password must not be empty")),
        Some(raw) => Some(password::hash_password(raw)?),
        None => None,
    };

    let changeset = UserChangeset {
        email,
        password_hash,
        first_name: validate_name("firstName", payload.first_name)?,
        last_name: validate_name("lastName", payload.last_name)?,
        position: payload.position,
        phone_number: payload
            .phone_number
            .as_deref()
            .map(validate_phone)
            .transpose()?,
        role: payload.role.map(|role| role.as_str().to_string()),
        status: Some(CommonStatus::Updated.as_str().to_string()),
        updated_at: Some(time::now()),
    };

    let user: User = diesel::update(users::table.find(user_id))
        .set(&changeset)
        .get_result(&mut conn)?;

    info!(user_id, "user updated");
    Ok(Json(user.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    authorize(&actor, Action::Mutate, Resource::User)?;
    let mut conn = state.db()?;
    active_user(&mut conn, user_id)?;

    diesel::update(users::table.find(user_id))
        .set((
            users::status.eq(CommonStatus::Deleted.as_str()),
            users::updated_at.eq(time::now()),
        ))
        .execute(&mut conn)?;

    info!(user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<UserResponse>>> {
    authorize(&actor, Action::Read, Resource::User)?;
    let request = params.into_request::<UserSort>()?;
    let mut conn = state.db()?;
    Ok(Json(load_users_page(&mut conn, &request, None)?))
}

pub async fn set_user_to_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Json(payload): Json<SetUserToCompanyRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Action::Mutate, Resource::User)?;
    let user = linker::user_to_company(&state, payload.user_id, payload.company_id)?;
    Ok(Json(user.into()))
}

pub async fn list_users_by_company(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Query(scope): Query<CompanyScope>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<UserResponse>>> {
    authorize(&actor, Action::ScopedList, Resource::User)?;
    let request = ListParams {
        filter: None,
        ..params
    }
    .into_request::<UserSort>()?;
    let mut conn = state.db()?;
    active_company(&mut conn, scope.company_id)?;
    Ok(Json(load_users_page(
        &mut conn,
        &request,
        Some(scope.company_id),
    )?))
}
