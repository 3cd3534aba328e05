use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use diesel::prelude::*;

use construction_docs::{
    bootstrap,
    config::AppConfig,
    db,
    domain::DocStatus,
    schema::{asbuilt_docs, project_docs},
    storage::{FileStore, LocalFileStore},
};

const USAGE: &str = "Usage: maintenance create-admin <email> <password> | maintenance audit-files";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("create-admin") => {
            let (Some(email), Some(password)) = (args.next(), args.next()) else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            create_admin(&email, &password)?
        }
        Some("audit-files") => audit_files().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_pool() -> Result<db::PgPool> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded backend configuration"
    );
    db::init_pool_with_size(&config.database_url, 1)
}

fn create_admin(email: &str, password: &str) -> Result<()> {
    let pool = load_pool()?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    if bootstrap::ensure_admin(&mut conn, email, password)? {
        println!("Admin {email} created.");
    } else {
        println!("User {email} already exists, nothing to do.");
    }
    Ok(())
}

async fn audit_files() -> Result<()> {
    let pool = load_pool()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let withdrawn = DocStatus::TERMINAL.as_str();

    let design_files: Vec<(uuid::Uuid, String)> = project_docs::table
        .filter(project_docs::doc_status.ne(withdrawn))
        .select((project_docs::id, project_docs::file_address))
        .load(&mut conn)
        .context("failed to load project docs")?;
    let asbuilt_files: Vec<(uuid::Uuid, String)> = asbuilt_docs::table
        .filter(asbuilt_docs::doc_status.ne(withdrawn))
        .select((asbuilt_docs::id, asbuilt_docs::file_address))
        .load(&mut conn)
        .context("failed to load as-built docs")?;

    let files = LocalFileStore::new();
    let mut missing = 0usize;
    for (label, rows) in [("project doc", &design_files), ("as-built doc", &asbuilt_files)] {
        for (id, address) in rows {
            if !files.exists(Path::new(address)).await? {
                missing += 1;
                println!("{label} {id}: file missing at {address}");
            }
        }
    }

    println!(
        "Checked {} documents, {missing} missing files.",
        design_files.len() + asbuilt_files.len()
    );
    Ok(())
}
