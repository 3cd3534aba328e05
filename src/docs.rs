//! Shared document core for project docs and as-built docs: records, upload
//! validation and multipart form parsing.

use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{AsbuiltCategory, DesignCategory, DocStatus};
use crate::error::{AppError, AppResult};
use crate::models::{AsbuiltDoc, ProjectDoc};
use crate::storage::FileStore;
use crate::utils::time::serialize_iso;

/// Upper bound for stored document bytes (10 MiB).
pub const MAX_FILE_SIZE: i64 = 10_485_760;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    ProjectDoc,
    AsbuiltDoc,
}

impl DocKind {
    pub fn label(&self) -> &'static str {
        match self {
            DocKind::ProjectDoc => "ProjectDoc",
            DocKind::AsbuiltDoc => "AsbuiltDoc",
        }
    }

    fn category_field(&self) -> &'static str {
        match self {
            DocKind::ProjectDoc => "designCategory",
            DocKind::AsbuiltDoc => "asbuiltCategory",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocCore {
    pub id: Uuid,
    pub file_name: String,
    pub file_format: Option<String>,
    pub file_size: i64,
    pub file_address: String,
    pub description: Option<String>,
    pub doc_status: DocStatus,
    #[serde(serialize_with = "serialize_iso")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_iso")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocRecord {
    #[serde(flatten)]
    pub core: DocCore,
    pub design_category: Option<DesignCategory>,
    pub project_id: Option<i64>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsbuiltDocRecord {
    #[serde(flatten)]
    pub core: DocCore,
    pub asbuilt_category: Option<AsbuiltCategory>,
    pub project_doc_id: Option<Uuid>,
    pub company_id: Option<i64>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

fn parse_stored<T: std::str::FromStr<Err = String>>(value: &str) -> AppResult<T> {
    value.parse::<T>().map_err(AppError::internal)
}

fn parse_stored_opt<T: std::str::FromStr<Err = String>>(
    value: Option<&str>,
) -> AppResult<Option<T>> {
    value.map(parse_stored).transpose()
}

impl TryFrom<ProjectDoc> for ProjectDocRecord {
    type Error = AppError;

    fn try_from(row: ProjectDoc) -> AppResult<Self> {
        Ok(Self {
            design_category: parse_stored_opt(row.design_category.as_deref())?,
            project_id: row.project_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            core: DocCore {
                doc_status: parse_stored(&row.doc_status)?,
                id: row.id,
                file_name: row.file_name,
                file_format: row.file_format,
                file_size: row.file_size,
                file_address: row.file_address,
                description: row.description,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
    }
}

impl TryFrom<AsbuiltDoc> for AsbuiltDocRecord {
    type Error = AppError;

    fn try_from(row: AsbuiltDoc) -> AppResult<Self> {
        Ok(Self {
            asbuilt_category: parse_stored_opt(row.asbuilt_category.as_deref())?,
            project_doc_id: row.project_doc_id,
            company_id: row.company_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            core: DocCore {
                doc_status: parse_stored(&row.doc_status)?,
                id: row.id,
                file_name: row.file_name,
                file_format: row.file_format,
                file_size: row.file_size,
                file_address: row.file_address,
                description: row.description,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
    }
}

pub fn validate_file_size(len: usize) -> AppResult<i64> {
    let size = i64::try_from(len).unwrap_or(i64::MAX);
    if size > MAX_FILE_SIZE {
        return Err(AppError::bad_request(format!(
            "file size {size} exceeds the limit of {MAX_FILE_SIZE} bytes"
        )));
    }
    Ok(size)
}

/// Accepts a bare file name; separators and dot-only names are rejected.
pub fn validate_file_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("fileName must not be empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(AppError::bad_request(format!(
            "fileName must be a plain file name, got {name}"
        )));
    }
    Ok(name.to_string())
}

pub fn ensure_same_file_name(stored: &str, given: &str) -> AppResult<()> {
    if stored != given.trim() {
        return Err(AppError::bad_request(format!(
            "fileName cannot be changed (stored: {stored})"
        )));
    }
    Ok(())
}

pub fn staging_path(staging_dir: &Path, id: Uuid, file_name: &str) -> PathBuf {
    staging_dir.join(format!("{id}_{file_name}"))
}

pub fn resolve_file_format(content_type: Option<&str>, file_name: &str) -> Option<String> {
    content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(file_name).first().map(|mime| mime.to_string()))
}

#[derive(Debug)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub original_name: Option<String>,
}

/// Fields of the multipart create/update form.
#[derive(Debug, Default)]
pub struct DocForm {
    pub file: Option<UploadedFile>,
    pub file_name: Option<String>,
    pub description: Option<String>,
    pub doc_status: Option<DocStatus>,
    pub category: Option<String>,
}

impl DocForm {
    /// Name from the `fileName` field, falling back to the uploaded file's name.
    pub fn effective_file_name(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.file.as_ref().and_then(|f| f.original_name.as_deref()))
    }
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> AppResult<Option<String>> {
    let value = field.text().await.map_err(|err| {
        error!(error = %err, field = name, "invalid multipart text field");
        AppError::bad_request(format!("invalid {name}: {err}"))
    })?;
    let trimmed = value.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub async fn read_doc_form(multipart: &mut Multipart, kind: DocKind) -> AppResult<DocForm> {
    let mut form = DocForm::default();
    let category_field = kind.category_field();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let original_name = field.file_name().map(|n| n.to_string());
                let content_type = field.content_type().map(|mime| mime.to_string());
                let bytes = field.bytes().await.map_err(|err| {
                    let msg = format!("failed to read file bytes: {err}");
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(msg)
                })?;
                form.file = Some(UploadedFile {
                    bytes,
                    content_type,
                    original_name,
                });
            }
            Some("fileName") => form.file_name = text_field(field, "fileName").await?,
            Some("description") => form.description = text_field(field, "description").await?,
            Some("docStatus") => {
                form.doc_status = text_field(field, "docStatus")
                    .await?
                    .map(|value| value.parse::<DocStatus>())
                    .transpose()
                    .map_err(AppError::bad_request)?;
            }
            Some(other) if other == category_field => {
                form.category = text_field(field, category_field).await?;
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Validated input for a new document, ready to be written to staging.
#[derive(Debug)]
pub struct PreparedUpload {
    pub id: Uuid,
    pub file_name: String,
    pub file_format: Option<String>,
    pub file_size: i64,
    pub address: PathBuf,
    pub bytes: Bytes,
}

/// Checks a create form and assigns the staging address. Performs no I/O.
pub fn prepare_upload(form: &mut DocForm, staging_dir: &Path) -> AppResult<PreparedUpload> {
    let file = form
        .file
        .take()
        .ok_or_else(|| AppError::bad_request("file field is required"))?;
    let file_size = validate_file_size(file.bytes.len())?;
    let raw_name = form
        .file_name
        .clone()
        .or_else(|| file.original_name.clone())
        .ok_or_else(|| AppError::bad_request("fileName is required"))?;
    let file_name = validate_file_name(&raw_name)?;
    if form.doc_status == Some(DocStatus::Withdrawn) {
        return Err(AppError::bad_request("a document cannot be created withdrawn"));
    }

    let id = Uuid::new_v4();
    Ok(PreparedUpload {
        id,
        file_format: resolve_file_format(file.content_type.as_deref(), &file_name),
        address: staging_path(staging_dir, id, &file_name),
        file_name,
        file_size,
        bytes: file.bytes,
    })
}

/// Checks an update form against the stored row without touching anything.
/// Returns the size of the replacement file, if one was sent.
pub fn check_update(form: &DocForm, stored_file_name: &str) -> AppResult<Option<i64>> {
    let given = form
        .effective_file_name()
        .ok_or_else(|| AppError::bad_request("fileName is required"))?;
    ensure_same_file_name(stored_file_name, given)?;
    let new_size = form
        .file
        .as_ref()
        .map(|file| validate_file_size(file.bytes.len()))
        .transpose()?;
    if form.doc_status == Some(DocStatus::Withdrawn) {
        return Err(AppError::bad_request(
            "docStatus WITHDRAWN can only be set by deleting the document",
        ));
    }
    Ok(new_size)
}

/// Writes the prepared bytes to staging and runs `insert`. When the insert
/// fails the staged file is removed again.
pub async fn store_upload<T, F>(
    files: &dyn FileStore,
    kind: DocKind,
    prepared: &PreparedUpload,
    insert: F,
) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T>,
{
    files
        .write(&prepared.address, &prepared.bytes)
        .await
        .map_err(|err| {
            error!(
                kind = kind.label(),
                file_name = %prepared.file_name,
                error = %err,
                "failed to stage document"
            );
            AppError::from(err)
        })?;

    match insert() {
        Ok(row) => Ok(row),
        Err(err) => {
            discard_file(files, kind, prepared.id, &prepared.address).await;
            Err(err)
        }
    }
}

/// Overwrites the stored bytes with the form's file, if it carries one, and
/// returns the new file format. Call only after `check_update` passed.
pub async fn replace_file(
    files: &dyn FileStore,
    form: &DocForm,
    address: &str,
    file_name: &str,
) -> AppResult<Option<String>> {
    let Some(file) = form.file.as_ref() else {
        return Ok(None);
    };
    files.write(Path::new(address), &file.bytes).await?;
    Ok(resolve_file_format(file.content_type.as_deref(), file_name))
}

/// Removes a document file, logging instead of failing.
pub async fn discard_file(files: &dyn FileStore, kind: DocKind, doc_id: Uuid, address: &Path) {
    if let Err(err) = files.remove(address).await {
        warn!(
            kind = kind.label(),
            document_id = %doc_id,
            file_address = %address.display(),
            error = %err,
            "failed to remove document file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFileStore;
    use axum::http::StatusCode;

    fn form_with(bytes: usize, name: &str) -> DocForm {
        DocForm {
            file: Some(UploadedFile {
                bytes: Bytes::from(vec![0u8; bytes]),
                content_type: None,
                original_name: Some("upload.bin".into()),
            }),
            file_name: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert_eq!(validate_file_size(10_485_760).unwrap(), MAX_FILE_SIZE);
        let err = validate_file_size(10_485_761).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn file_names_must_be_plain() {
        assert_eq!(validate_file_name(" plan.pdf ").unwrap(), "plan.pdf");
        for bad in ["", "  ", "..", ".", "../etc/passwd", "a/b.pdf", "a\\b.pdf"] {
            assert!(validate_file_name(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn file_name_change_is_rejected() {
        assert!(ensure_same_file_name("plan.pdf", "plan.pdf").is_ok());
        let err = ensure_same_file_name("plan.pdf", "plan-v2.pdf").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn staging_path_prefixes_id() {
        let id = Uuid::nil();
        let path = staging_path(Path::new("/data/filetemp"), id, "plan.pdf");
        assert_eq!(
            path,
            PathBuf::from("/data/filetemp/00000000-0000-0000-0000-000000000000_plan.pdf")
        );
    }

    #[test]
    fn file_format_falls_back_to_guess() {
        assert_eq!(
            resolve_file_format(Some("application/pdf"), "x.bin").as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            resolve_file_format(None, "plan.pdf").as_deref(),
            Some("application/pdf")
        );
        assert_eq!(resolve_file_format(None, "noext"), None);
    }

    #[test]
    fn prepare_upload_rejects_oversize_without_assigning_address() {
        let mut form = form_with(MAX_FILE_SIZE as usize + 1, "big.pdf");
        let err = prepare_upload(&mut form, Path::new("/tmp/staging")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn update_requires_stored_file_name() {
        let form = form_with(3, "other.pdf");
        let err = check_update(&form, "plan.pdf").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let missing = DocForm::default();
        assert!(check_update(&missing, "plan.pdf").is_err());

        let form = form_with(3, "plan.pdf");
        assert_eq!(check_update(&form, "plan.pdf").unwrap(), Some(3));
    }

    #[test]
    fn update_without_file_or_name_field_uses_upload_name() {
        let form = DocForm {
            file: Some(UploadedFile {
                bytes: Bytes::from_static(b"abc"),
                content_type: None,
                original_name: Some("plan.pdf".into()),
            }),
            ..Default::default()
        };
        assert_eq!(check_update(&form, "plan.pdf").unwrap(), Some(3));
    }

    #[test]
    fn update_cannot_withdraw() {
        let form = DocForm {
            file_name: Some("plan.pdf".into()),
            doc_status: Some(DocStatus::Withdrawn),
            ..Default::default()
        };
        assert!(check_update(&form, "plan.pdf").is_err());
    }

    #[test]
    fn prepare_upload_uses_form_file_name() {
        let mut form = form_with(3, "plan.pdf");
        let prepared = prepare_upload(&mut form, Path::new("/tmp/staging")).unwrap();
        assert_eq!(prepared.file_name, "plan.pdf");
        assert_eq!(prepared.file_size, 3);
        assert_eq!(prepared.file_format.as_deref(), Some("application/pdf"));
        assert!(prepared
            .address
            .ends_with(format!("{}_plan.pdf", prepared.id)));
    }

    fn prepared_in(dir: &Path) -> PreparedUpload {
        let mut form = form_with(4, "plan.pdf");
        prepare_upload(&mut form, dir).unwrap()
    }

    #[tokio::test]
    async fn failed_insert_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let prepared = prepared_in(dir.path());

        let err = store_upload(&store, DocKind::ProjectDoc, &prepared, || {
            assert!(prepared.address.exists());
            Err::<(), _>(AppError::bad_request("duplicate"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!prepared.address.exists());
    }

    #[tokio::test]
    async fn successful_insert_keeps_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let prepared = prepared_in(dir.path());

        let id = store_upload(&store, DocKind::AsbuiltDoc, &prepared, || Ok(prepared.id))
            .await
            .unwrap();

        assert_eq!(id, prepared.id);
        assert_eq!(std::fs::read(&prepared.address).unwrap(), vec![0u8; 4]);
    }

    #[tokio::test]
    async fn replace_file_only_writes_when_a_file_was_sent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let address = dir.path().join("plan.pdf");
        std::fs::write(&address, b"old").unwrap();
        let address = address.to_str().unwrap();

        let no_file = DocForm {
            file_name: Some("plan.pdf".into()),
            ..Default::default()
        };
        assert_eq!(replace_file(&store, &no_file, address, "plan.pdf").await.unwrap(), None);
        assert_eq!(std::fs::read(address).unwrap(), b"old");

        let form = form_with(2, "plan.pdf");
        let format = replace_file(&store, &form, address, "plan.pdf").await.unwrap();
        assert_eq!(format.as_deref(), Some("application/pdf"));
        assert_eq!(std::fs::read(address).unwrap(), vec![0u8; 2]);
    }
}
