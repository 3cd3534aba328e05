//! Association operations between entities. Every link checks both ends are
//! live, writes the owned side and bumps the owning side in one transaction,
//! and relocates document files first where the parent dictates the address.

use diesel::prelude::*;
use diesel::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::docs::DocKind;
use crate::error::{AppError, AppResult};
use crate::lookup::{
    active_asbuilt_doc, active_comment, active_company, active_project, active_project_doc,
    active_user,
};
use crate::models::{AsbuiltDoc, Comment, Company, NewCompanyProject, ProjectDoc, User};
use crate::relocation::{asbuilt_doc_target, project_doc_target, AppliedRelocation, RelocationPlan};
use crate::schema::{asbuilt_docs, comments, companies, company_projects, project_docs, projects, users};
use crate::state::AppState;
use crate::storage::FileStore;
use crate::utils::time;

/// Live as-built docs attached to a project doc, oldest first.
pub fn active_asbuilt_children(
    conn: &mut PgConnection,
    project_doc_id: Uuid,
) -> QueryResult<Vec<AsbuiltDoc>> {
    asbuilt_docs::table
        .filter(asbuilt_docs::project_doc_id.eq(project_doc_id))
        .filter(asbuilt_docs::doc_status.ne(crate::domain::DocStatus::TERMINAL.as_str()))
        .order((asbuilt_docs::created_at.asc(), asbuilt_docs::id.asc()))
        .load(conn)
}

/// Plan for moving every live project doc of a project (and their as-built
/// docs) under `new_root`.
pub fn plan_project_root_change(
    conn: &mut PgConnection,
    project_id: i64,
    new_root: &str,
) -> AppResult<RelocationPlan> {
    let docs: Vec<ProjectDoc> = project_docs::table
        .filter(project_docs::project_id.eq(project_id))
        .filter(project_docs::doc_status.ne(crate::domain::DocStatus::TERMINAL.as_str()))
        .order((project_docs::created_at.asc(), project_docs::id.asc()))
        .load(conn)?;

    let mut plan = RelocationPlan::new();
    for doc in docs {
        let target = project_doc_target(new_root, &doc.file_name);
        let children = active_asbuilt_children(conn, doc.id)?;
        plan.push(DocKind::ProjectDoc, doc.id, &doc.file_address, target.clone());
        plan.push_asbuilt_children(&target.to_string_lossy(), &children);
    }
    Ok(plan)
}

/// Persists the relocated addresses and runs `write` in one transaction. When
/// the transaction fails the file moves are undone; on success the emptied
/// `-ABDs` directories are removed.
pub async fn commit_relocated<T, F>(
    files: &dyn FileStore,
    applied: AppliedRelocation,
    conn: &mut PgConnection,
    actor_id: i64,
    write: F,
) -> AppResult<T>
where
    F: FnOnce(&mut PgConnection) -> AppResult<T>,
{
    let result = conn.transaction::<_, AppError, _>(|conn| {
        applied.persist(conn, actor_id)?;
        write(conn)
    });

    match result {
        Ok(value) => {
            applied.prune_vacated_dirs(files).await;
            Ok(value)
        }
        Err(err) => {
            if !applied.moves().is_empty() {
                warn!(
                    moves = applied.moves().len(),
                    error = %err,
                    "transaction failed after relocating files, reverting"
                );
            }
            applied.revert(files).await;
            Err(err)
        }
    }
}

pub async fn asbuilt_doc_to_project_doc(
    state: &AppState,
    actor: &AuthenticatedUser,
    asbuilt_doc_id: Uuid,
    project_doc_id: Uuid,
) -> AppResult<AsbuiltDoc> {
    let mut conn = state.db()?;
    let doc = active_asbuilt_doc(&mut conn, asbuilt_doc_id)?;
    let parent = active_project_doc(&mut conn, project_doc_id)?;

    let mut plan = RelocationPlan::new();
    plan.push(
        DocKind::AsbuiltDoc,
        doc.id,
        &doc.file_address,
        asbuilt_doc_target(&parent.file_address, &doc.file_name),
    );
    let applied = plan.apply(state.files.as_ref()).await?;

    let now = time::now();
    let updated = commit_relocated(
        state.files.as_ref(),
        applied,
        &mut conn,
        actor.user_id,
        |conn| {
            diesel::update(project_docs::table.find(parent.id))
                .set(project_docs::updated_at.eq(now))
                .execute(conn)?;
            let updated = diesel::update(asbuilt_docs::table.find(doc.id))
                .set((
                    asbuilt_docs::project_doc_id.eq(Some(parent.id)),
                    asbuilt_docs::updated_by.eq(Some(actor.user_id)),
                    asbuilt_docs::updated_at.eq(now),
                ))
                .get_result::<AsbuiltDoc>(conn)?;
            Ok(updated)
        },
    )
    .await?;

    info!(
        asbuilt_doc_id = %updated.id,
        project_doc_id = %parent.id,
        file_address = %updated.file_address,
        "as-built doc linked to project doc"
    );
    Ok(updated)
}

pub async fn project_doc_to_project(
    state: &AppState,
    actor: &AuthenticatedUser,
    project_doc_id: Uuid,
    project_id: i64,
) -> AppResult<ProjectDoc> {
    let mut conn = state.db()?;
    let doc = active_project_doc(&mut conn, project_doc_id)?;
    let project = active_project(&mut conn, project_id)?;
    let children = active_asbuilt_children(&mut conn, doc.id)?;

    let target = project_doc_target(&project.files_root_directory, &doc.file_name);
    let mut plan = RelocationPlan::new();
    plan.push(DocKind::ProjectDoc, doc.id, &doc.file_address, target.clone());
    plan.push_asbuilt_children(&target.to_string_lossy(), &children);
    let applied = plan.apply(state.files.as_ref()).await?;

    let now = time::now();
    let updated = commit_relocated(
        state.files.as_ref(),
        applied,
        &mut conn,
        actor.user_id,
        |conn| {
            diesel::update(projects::table.find(project.id))
                .set(projects::updated_at.eq(now))
                .execute(conn)?;
            let updated = diesel::update(project_docs::table.find(doc.id))
                .set((
                    project_docs::project_id.eq(Some(project.id)),
                    project_docs::updated_by.eq(Some(actor.user_id)),
                    project_docs::updated_at.eq(now),
                ))
                .get_result::<ProjectDoc>(conn)?;
            Ok(updated)
        },
    )
    .await?;

    info!(
        project_doc_id = %updated.id,
        project_id = project.id,
        file_address = %updated.file_address,
        cascaded = children.len(),
        "project doc linked to project"
    );
    Ok(updated)
}

pub fn asbuilt_doc_to_company(
    state: &AppState,
    actor: &AuthenticatedUser,
    asbuilt_doc_id: Uuid,
    company_id: i64,
) -> AppResult<AsbuiltDoc> {
    let mut conn = state.db()?;
    let now = time::now();
    let updated = conn.transaction::<_, AppError, _>(|conn| {
        let doc = active_asbuilt_doc(conn, asbuilt_doc_id)?;
        let company = active_company(conn, company_id)?;
        diesel::update(companies::table.find(company.id))
            .set(companies::updated_at.eq(now))
            .execute(conn)?;
        let updated = diesel::update(asbuilt_docs::table.find(doc.id))
            .set((
                asbuilt_docs::company_id.eq(Some(company.id)),
                asbuilt_docs::updated_by.eq(Some(actor.user_id)),
                asbuilt_docs::updated_at.eq(now),
            ))
            .get_result::<AsbuiltDoc>(conn)?;
        Ok(updated)
    })?;

    info!(asbuilt_doc_id = %updated.id, company_id, "as-built doc linked to company");
    Ok(updated)
}

/// Attaches a comment to a project doc, detaching it from any as-built doc.
pub fn comment_to_project_doc(
    state: &AppState,
    actor: &AuthenticatedUser,
    comment_id: i64,
    project_doc_id: Uuid,
) -> AppResult<Comment> {
    let mut conn = state.db()?;
    let now = time::now();
    let updated = conn.transaction::<_, AppError, _>(|conn| {
        let comment = active_comment(conn, comment_id)?;
        let doc = active_project_doc(conn, project_doc_id)?;
        diesel::update(project_docs::table.find(doc.id))
            .set(project_docs::updated_at.eq(now))
            .execute(conn)?;
        let updated = diesel::update(comments::table.find(comment.id))
            .set((
                comments::project_doc_id.eq(Some(doc.id)),
                comments::asbuilt_doc_id.eq(None::<Uuid>),
                comments::updated_by.eq(Some(actor.user_id)),
                comments::updated_at.eq(now),
            ))
            .get_result::<Comment>(conn)?;
        Ok(updated)
    })?;

    info!(comment_id, project_doc_id = %project_doc_id, "comment linked to project doc");
    Ok(updated)
}

/// Attaches a comment to an as-built doc, detaching it from any project doc.
pub fn comment_to_asbuilt_doc(
    state: &AppState,
    actor: &AuthenticatedUser,
    comment_id: i64,
    asbuilt_doc_id: Uuid,
) -> AppResult<Comment> {
    let mut conn = state.db()?;
    let now = time::now();
    let updated = conn.transaction::<_, AppError, _>(|conn| {
        let comment = active_comment(conn, comment_id)?;
        let doc = active_asbuilt_doc(conn, asbuilt_doc_id)?;
        diesel::update(asbuilt_docs::table.find(doc.id))
            .set(asbuilt_docs::updated_at.eq(now))
            .execute(conn)?;
        let updated = diesel::update(comments::table.find(comment.id))
            .set((
                comments::asbuilt_doc_id.eq(Some(doc.id)),
                comments::project_doc_id.eq(None::<Uuid>),
                comments::updated_by.eq(Some(actor.user_id)),
                comments::updated_at.eq(now),
            ))
            .get_result::<Comment>(conn)?;
        Ok(updated)
    })?;

    info!(comment_id, asbuilt_doc_id = %asbuilt_doc_id, "comment linked to as-built doc");
    Ok(updated)
}

/// Adds the company↔project pair. Linking an existing pair changes nothing
/// but the timestamps.
pub fn company_to_project(state: &AppState, company_id: i64, project_id: i64) -> AppResult<Company> {
    let mut conn = state.db()?;
    let now = time::now();
    let (company, inserted) = conn.transaction::<_, AppError, _>(|conn| {
        let company = active_company(conn, company_id)?;
        let project = active_project(conn, project_id)?;
        let inserted = diesel::insert_into(company_projects::table)
            .values(&NewCompanyProject {
                company_id: company.id,
                project_id: project.id,
            })
            .on_conflict_do_nothing()
            .execute(conn)?;
        diesel::update(projects::table.find(project.id))
            .set(projects::updated_at.eq(now))
            .execute(conn)?;
        let company = diesel::update(companies::table.find(company.id))
            .set(companies::updated_at.eq(now))
            .get_result::<Company>(conn)?;
        Ok((company, inserted))
    })?;

    info!(company_id, project_id, already_linked = inserted == 0, "company linked to project");
    Ok(company)
}

pub fn user_to_company(state: &AppState, user_id: i64, company_id: i64) -> AppResult<User> {
    let mut conn = state.db()?;
    let now = time::now();
    let updated = conn.transaction::<_, AppError, _>(|conn| {
        let user = active_user(conn, user_id)?;
        let company = active_company(conn, company_id)?;
        diesel::update(companies::table.find(company.id))
            .set(companies::updated_at.eq(now))
            .execute(conn)?;
        let updated = diesel::update(users::table.find(user.id))
            .set((
                users::company_id.eq(Some(company.id)),
                users::updated_at.eq(now),
            ))
            .get_result::<User>(conn)?;
        Ok(updated)
    })?;

    info!(user_id, company_id, "user linked to company");
    Ok(updated)
}
