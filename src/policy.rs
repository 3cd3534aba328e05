//! Role gates per resource and the comment ownership gate.

use crate::auth::AuthenticatedUser;
use crate::domain::Role;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Company,
    Project,
    ProjectDoc,
    AsbuiltDoc,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Get by id and the paged `/all` listing.
    Read,
    /// Listings scoped to another entity (`allByProjectId`, `allForLastWeek`, ...).
    ScopedList,
    /// Create, update, delete and link.
    Mutate,
}

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const ADMIN_DESIGNER: &[Role] = &[Role::Admin, Role::Designer];
const ADMIN_DESIGNER_DEVELOPER: &[Role] = &[Role::Admin, Role::Designer, Role::Developer];

/// Roles allowed to perform `action` on `resource`; `None` admits any
/// authenticated principal.
pub fn allowed_roles(resource: Resource, action: Action) -> Option<&'static [Role]> {
    match (resource, action) {
        (Resource::User, _) => Some(ADMIN_ONLY),
        (Resource::Company, _) => Some(ADMIN_DESIGNER_DEVELOPER),
        (Resource::Project, _) => Some(ADMIN_DESIGNER),
        (Resource::ProjectDoc, Action::Mutate) => Some(ADMIN_DESIGNER),
        (Resource::ProjectDoc, _) => None,
        (Resource::AsbuiltDoc, Action::Read) => None,
        (Resource::AsbuiltDoc, _) => Some(ADMIN_DESIGNER_DEVELOPER),
        (Resource::Comment, _) => None,
    }
}

pub fn authorize(actor: &AuthenticatedUser, action: Action, resource: Resource) -> AppResult<()> {
    match allowed_roles(resource, action) {
        Some(roles) if !roles.contains(&actor.role) => Err(AppError::forbidden()),
        _ => Ok(()),
    }
}

/// Passes when the actor created the row or is an administrator.
pub fn authorize_owner(actor: &AuthenticatedUser, owner_id: Option<i64>) -> AppResult<()> {
    if actor.role == Role::Admin || owner_id == Some(actor.user_id) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
