use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{CommonStatus, DocStatus};
use crate::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub role: String,
    pub company_id: Option<i64>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub role: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub registration_number: Option<String>,
    pub taxpayer_number: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub registration_number: Option<String>,
    pub taxpayer_number: Option<String>,
    pub status: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = company_projects)]
pub struct NewCompanyProject {
    pub company_id: i64,
    pub project_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub files_root_directory: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub files_root_directory: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = project_docs)]
pub struct ProjectDoc {
    pub id: Uuid,
    pub file_name: String,
    pub file_format: Option<String>,
    pub file_size: i64,
    pub file_address: String,
    pub description: Option<String>,
    pub doc_status: String,
    pub design_category: Option<String>,
    pub project_id: Option<i64>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_docs)]
pub struct NewProjectDoc {
    pub id: Uuid,
    pub file_name: String,
    pub file_format: Option<String>,
    pub file_size: i64,
    pub file_address: String,
    pub description: Option<String>,
    pub doc_status: String,
    pub design_category: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = asbuilt_docs)]
pub struct AsbuiltDoc {
    pub id: Uuid,
    pub file_name: String,
    pub file_format: Option<String>,
    pub file_size: i64,
    pub file_address: String,
    pub description: Option<String>,
    pub doc_status: String,
    pub asbuilt_category: Option<String>,
    pub project_doc_id: Option<Uuid>,
    pub company_id: Option<i64>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = asbuilt_docs)]
pub struct NewAsbuiltDoc {
    pub id: Uuid,
    pub file_name: String,
    pub file_format: Option<String>,
    pub file_size: i64,
    pub file_address: String,
    pub description: Option<String>,
    pub doc_status: String,
    pub asbuilt_category: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: i64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub project_doc_id: Option<Uuid>,
    pub asbuilt_doc_id: Option<Uuid>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub title: Option<String>,
    pub body: Option<String>,
    pub created_by: Option<i64>,
    pub status: String,
}

fn is_deleted(status: &str) -> bool {
    status == CommonStatus::TERMINAL.as_str()
}

fn is_withdrawn(status: &str) -> bool {
    status == DocStatus::TERMINAL.as_str()
}

impl User {
    pub fn is_deleted(&self) -> bool {
        is_deleted(&self.status)
    }
}

impl Company {
    pub fn is_deleted(&self) -> bool {
        is_deleted(&self.status)
    }
}

impl Project {
    pub fn is_deleted(&self) -> bool {
        is_deleted(&self.status)
    }
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        is_deleted(&self.status)
    }
}

impl ProjectDoc {
    pub fn is_withdrawn(&self) -> bool {
        is_withdrawn(&self.doc_status)
    }
}

impl AsbuiltDoc {
    pub fn is_withdrawn(&self) -> bool {
        is_withdrawn(&self.doc_status)
    }
}
