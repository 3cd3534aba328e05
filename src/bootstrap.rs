use anyhow::{Context, Result};
use diesel::prelude::*;
use tracing::info;

use crate::{
    auth::password,
    domain::{CommonStatus, Role},
    models::{NewUser, User},
    pagination::exact_pattern,
    schema::users,
};

/// Creates an ADMIN account unless a user with `email` already exists.
/// Returns `true` when a row was inserted.
pub fn ensure_admin(conn: &mut PgConnection, email: &str, password: &str) -> Result<bool> {
    let email = email.trim();
    let existing: Option<User> = users::table
        .filter(users::email.ilike(exact_pattern(email)))
        .first(conn)
        .optional()
        .context("failed to look up bootstrap admin")?;
    if let Some(user) = existing {
        info!(user_id = user.id, email = %user.email, "bootstrap admin already present");
        return Ok(false);
    }

    let password_hash = password::hash_password(password)?;
    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            email: email.to_string(),
            password_hash,
            first_name: None,
            last_name: None,
            position: None,
            phone_number: None,
            role: Role::Admin.as_str().to_string(),
            status: CommonStatus::Created.as_str().to_string(),
        })
        .get_result(conn)
        .context("failed to insert bootstrap admin")?;

    info!(user_id = user.id, email = %user.email, "bootstrap admin created");
    Ok(true)
}
