//! Row lookups by id. `find_*` returns rows in any status (get-by-id still
//! shows terminal rows); `active_*` treats terminal rows as missing.

use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{AsbuiltDoc, Comment, Company, Project, ProjectDoc, User};
use crate::schema::{asbuilt_docs, comments, companies, project_docs, projects, users};

pub fn find_user(conn: &mut PgConnection, id: i64) -> AppResult<User> {
    users::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::entity_not_found("User"))
}

pub fn active_user(conn: &mut PgConnection, id: i64) -> AppResult<User> {
    let user = find_user(conn, id)?;
    if user.is_deleted() {
        return Err(AppError::entity_not_found("User"));
    }
    Ok(user)
}

pub fn find_company(conn: &mut PgConnection, id: i64) -> AppResult<Company> {
    companies::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::entity_not_found("Company"))
}

pub fn active_company(conn: &mut PgConnection, id: i64) -> AppResult<Company> {
    let company = find_company(conn, id)?;
    if company.is_deleted() {
        return Err(AppError::entity_not_found("Company"));
    }
    Ok(company)
}

pub fn find_project(conn: &mut PgConnection, id: i64) -> AppResult<Project> {
    projects::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::entity_not_found("Project"))
}

pub fn active_project(conn: &mut PgConnection, id: i64) -> AppResult<Project> {
    let project = find_project(conn, id)?;
    if project.is_deleted() {
        return Err(AppError::entity_not_found("Project"));
    }
    Ok(project)
}

pub fn find_project_doc(conn: &mut PgConnection, id: Uuid) -> AppResult<ProjectDoc> {
    project_docs::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::entity_not_found("ProjectDoc"))
}

pub fn active_project_doc(conn: &mut PgConnection, id: Uuid) -> AppResult<ProjectDoc> {
    let doc = find_project_doc(conn, id)?;
    if doc.is_withdrawn() {
        return Err(AppError::entity_not_found("ProjectDoc"));
    }
    Ok(doc)
}

pub fn find_asbuilt_doc(conn: &mut PgConnection, id: Uuid) -> AppResult<AsbuiltDoc> {
    asbuilt_docs::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::entity_not_found("AsbuiltDoc"))
}

pub fn active_asbuilt_doc(conn: &mut PgConnection, id: Uuid) -> AppResult<AsbuiltDoc> {
    let doc = find_asbuilt_doc(conn, id)?;
    if doc.is_withdrawn() {
        return Err(AppError::entity_not_found("AsbuiltDoc"));
    }
    Ok(doc)
}

pub fn find_comment(conn: &mut PgConnection, id: i64) -> AppResult<Comment> {
    comments::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::entity_not_found("Comment"))
}

pub fn active_comment(conn: &mut PgConnection, id: i64) -> AppResult<Comment> {
    let comment = find_comment(conn, id)?;
    if comment.is_deleted() {
        return Err(AppError::entity_not_found("Comment"));
    }
    Ok(comment)
}
