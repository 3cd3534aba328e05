//! Physical relocation of document files when they are attached to a parent.
//!
//! Project docs live at `<filesRootDirectory>/<fileName>`; as-built docs live
//! next to their project doc at `<projectDocAddress>-ABDs/<fileName>`.

use std::path::{Path, PathBuf};

use diesel::prelude::*;
use diesel::PgConnection;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::docs::DocKind;
use crate::error::AppResult;
use crate::models::AsbuiltDoc;
use crate::schema::{asbuilt_docs, project_docs};
use crate::storage::FileStore;

pub const ASBUILT_DIR_SUFFIX: &str = "-ABDs";

pub fn project_doc_target(files_root_directory: &str, file_name: &str) -> PathBuf {
    Path::new(files_root_directory).join(file_name)
}

pub fn asbuilt_doc_target(project_doc_address: &str, file_name: &str) -> PathBuf {
    PathBuf::from(format!("{project_doc_address}{ASBUILT_DIR_SUFFIX}")).join(file_name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMove {
    pub kind: DocKind,
    pub doc_id: Uuid,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Ordered list of moves. Moves whose source equals the destination are dropped.
#[derive(Debug, Default)]
pub struct RelocationPlan {
    moves: Vec<FileMove>,
}

impl RelocationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DocKind, doc_id: Uuid, from: impl Into<PathBuf>, to: PathBuf) {
        let from = from.into();
        if from != to {
            self.moves.push(FileMove {
                kind,
                doc_id,
                from,
                to,
            });
        }
    }

    /// Adds the moves of `children` into the `-ABDs` directory of a project doc
    /// that will live at `project_doc_address`.
    pub fn push_asbuilt_children(&mut self, project_doc_address: &str, children: &[AsbuiltDoc]) {
        for child in children {
            let to = asbuilt_doc_target(project_doc_address, &child.file_name);
            self.push(DocKind::AsbuiltDoc, child.id, &child.file_address, to);
        }
    }

    pub fn moves(&self) -> &[FileMove] {
        &self.moves
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Executes the moves in order. When one fails, the moves already done are
    /// undone in reverse order and the failure is returned.
    pub async fn apply(self, files: &dyn FileStore) -> AppResult<AppliedRelocation> {
        let mut done: Vec<FileMove> = Vec::with_capacity(self.moves.len());
        for step in self.moves {
            match files.rename(&step.from, &step.to).await {
                Ok(()) => {
                    info!(
                        kind = step.kind.label(),
                        document_id = %step.doc_id,
                        from = %step.from.display(),
                        to = %step.to.display(),
                        "document file relocated"
                    );
                    done.push(step);
                }
                Err(err) => {
                    error!(
                        kind = step.kind.label(),
                        document_id = %step.doc_id,
                        from = %step.from.display(),
                        to = %step.to.display(),
                        error = %err,
                        "document file relocation failed"
                    );
                    AppliedRelocation { moves: done }.revert(files).await;
                    return Err(err.into());
                }
            }
        }
        Ok(AppliedRelocation { moves: done })
    }
}

/// Moves that have been carried out on disk and can still be undone.
#[derive(Debug, Default)]
pub struct AppliedRelocation {
    moves: Vec<FileMove>,
}

impl AppliedRelocation {
    pub fn moves(&self) -> &[FileMove] {
        &self.moves
    }

    pub fn new_address(&self, doc_id: Uuid) -> Option<&Path> {
        self.moves
            .iter()
            .find(|step| step.doc_id == doc_id)
            .map(|step| step.to.as_path())
    }

    /// Best effort: failures are logged and the remaining moves still run.
    pub async fn revert(self, files: &dyn FileStore) {
        for step in self.moves.into_iter().rev() {
            if let Err(err) = files.rename(&step.to, &step.from).await {
                error!(
                    kind = step.kind.label(),
                    document_id = %step.doc_id,
                    from = %step.to.display(),
                    to = %step.from.display(),
                    error = %err,
                    "failed to revert document file move"
                );
            }
        }
    }

    /// `-ABDs` directories that held a moved file before the moves ran.
    pub fn vacated_dirs(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = Vec::new();
        for step in &self.moves {
            let Some(parent) = step.from.parent() else {
                continue;
            };
            let is_abds = parent
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(ASBUILT_DIR_SUFFIX));
            if is_abds && !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        dirs
    }

    /// Removes the vacated `-ABDs` directories that are now empty. Failures
    /// are logged and never undo the relocation.
    pub async fn prune_vacated_dirs(&self, files: &dyn FileStore) {
        for dir in self.vacated_dirs() {
            match files.remove_dir_if_empty(dir).await {
                Ok(true) => debug!(dir = %dir.display(), "removed empty as-built directory"),
                Ok(false) => {}
                Err(err) => warn!(
                    dir = %dir.display(),
                    error = %err,
                    "failed to remove empty as-built directory"
                ),
            }
        }
    }

    /// Writes every new address to its row. Meant to run inside the link
    /// transaction.
    pub fn persist(&self, conn: &mut PgConnection, updated_by: i64) -> QueryResult<()> {
        for step in &self.moves {
            let address = step.to.to_string_lossy().into_owned();
            match step.kind {
                DocKind::ProjectDoc => {
                    diesel::update(project_docs::table.find(step.doc_id))
                        .set((
                            project_docs::file_address.eq(address),
                            project_docs::updated_by.eq(Some(updated_by)),
                        ))
                        .execute(conn)?;
                }
                DocKind::AsbuiltDoc => {
                    diesel::update(asbuilt_docs::table.find(step.doc_id))
                        .set((
                            asbuilt_docs::file_address.eq(address),
                            asbuilt_docs::updated_by.eq(Some(updated_by)),
                        ))
                        .execute(conn)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStoreError, LocalFileStore};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn project_doc_lands_under_project_root() {
        assert_eq!(
            project_doc_target("/data/tower", "plan.pdf"),
            PathBuf::from("/data/tower/plan.pdf")
        );
    }

    #[test]
    fn asbuilt_doc_lands_in_abds_directory() {
        assert_eq!(
            asbuilt_doc_target("/data/tower/plan.pdf", "act-1.pdf"),
            PathBuf::from("/data/tower/plan.pdf-ABDs/act-1.pdf")
        );
    }

    #[test]
    fn no_op_moves_are_skipped() {
        let mut plan = RelocationPlan::new();
        plan.push(
            DocKind::ProjectDoc,
            Uuid::new_v4(),
            "/data/tower/plan.pdf",
            PathBuf::from("/data/tower/plan.pdf"),
        );
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn applies_moves_and_reports_new_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let staged = dir.path().join("staging/1_plan.pdf");
        store.write(&staged, b"plan").await.unwrap();
        let root = dir.path().join("tower");
        let target = project_doc_target(root.to_str().unwrap(), "plan.pdf");
        let id = Uuid::new_v4();

        let mut plan = RelocationPlan::new();
        plan.push(DocKind::ProjectDoc, id, &staged, target.clone());
        let applied = plan.apply(&store).await.unwrap();

        assert_eq!(applied.new_address(id), Some(target.as_path()));
        assert!(!staged.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"plan");
    }

    #[tokio::test]
    async fn missing_source_is_not_found_and_leaves_nothing_moved() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let first = dir.path().join("staging/a.pdf");
        store.write(&first, b"a").await.unwrap();
        let missing = dir.path().join("staging/ghost.pdf");

        let mut plan = RelocationPlan::new();
        plan.push(DocKind::ProjectDoc, Uuid::new_v4(), &first, dir.path().join("p/a.pdf"));
        plan.push(DocKind::AsbuiltDoc, Uuid::new_v4(), &missing, dir.path().join("p/a.pdf-ABDs/ghost.pdf"));

        let err = plan.apply(&store).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.message().starts_with("file was not found: "));
        assert!(first.exists(), "completed move was not reverted");
        assert!(!dir.path().join("p/a.pdf").exists());
    }

    #[tokio::test]
    async fn occupied_destination_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let from = dir.path().join("staging/plan.pdf");
        let to = dir.path().join("tower/plan.pdf");
        store.write(&from, b"new").await.unwrap();
        store.write(&to, b"existing").await.unwrap();

        let mut plan = RelocationPlan::new();
        plan.push(DocKind::ProjectDoc, Uuid::new_v4(), &from, to.clone());
        let err = plan.apply(&store).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(std::fs::read(&to).unwrap(), b"existing");
        assert!(from.exists());
    }

    /// Delegates to the local store but fails the rename numbered `fail_at`.
    struct FailingStore {
        inner: LocalFileStore,
        renames: AtomicUsize,
        fail_at: usize,
    }

    #[async_trait]
    impl FileStore for FailingStore {
        async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), FileStoreError> {
            self.inner.write(path, bytes).await
        }

        async fn exists(&self, path: &Path) -> Result<bool, FileStoreError> {
            self.inner.exists(path).await
        }

        async fn rename(&self, from: &Path, to: &Path) -> Result<(), FileStoreError> {
            let n = self.renames.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_at {
                return Err(FileStoreError::Move {
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"),
                });
            }
            self.inner.rename(from, to).await
        }

        async fn remove(&self, path: &Path) -> Result<(), FileStoreError> {
            self.inner.remove(path).await
        }

        async fn remove_dir_if_empty(&self, dir: &Path) -> Result<bool, FileStoreError> {
            self.inner.remove_dir_if_empty(dir).await
        }
    }

    #[tokio::test]
    async fn later_failure_reverts_earlier_moves_in_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let store = FailingStore {
            inner: LocalFileStore::new(),
            renames: AtomicUsize::new(0),
            fail_at: 2,
        };
        let pd_from = dir.path().join("old/plan.pdf");
        let abd_from = dir.path().join("old/plan.pdf-ABDs/act.pdf");
        let third = dir.path().join("old/plan.pdf-ABDs/photo.jpg");
        for path in [&pd_from, &abd_from, &third] {
            store.write(path, b"x").await.unwrap();
        }
        let pd_to = dir.path().join("new/plan.pdf");

        let mut plan = RelocationPlan::new();
        plan.push(DocKind::ProjectDoc, Uuid::new_v4(), &pd_from, pd_to.clone());
        plan.push(
            DocKind::AsbuiltDoc,
            Uuid::new_v4(),
            &abd_from,
            asbuilt_doc_target(pd_to.to_str().unwrap(), "act.pdf"),
        );
        plan.push(
            DocKind::AsbuiltDoc,
            Uuid::new_v4(),
            &third,
            asbuilt_doc_target(pd_to.to_str().unwrap(), "photo.jpg"),
        );

        let err = plan.apply(&store).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(pd_from.exists());
        assert!(abd_from.exists());
        assert!(third.exists());
        assert!(!pd_to.exists());
    }

    #[tokio::test]
    async fn revert_restores_applied_moves() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let from = dir.path().join("staging/plan.pdf");
        store.write(&from, b"plan").await.unwrap();

        let mut plan = RelocationPlan::new();
        plan.push(DocKind::ProjectDoc, Uuid::new_v4(), &from, dir.path().join("tower/plan.pdf"));
        let applied = plan.apply(&store).await.unwrap();
        assert!(!from.exists());

        applied.revert(&store).await;

        assert!(from.exists());
        assert!(!dir.path().join("tower/plan.pdf").exists());
    }

    #[tokio::test]
    async fn pruning_removes_only_emptied_abds_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let old_root = dir.path().join("old");
        let new_root = dir.path().join("new");
        let plan_from = old_root.join("plan.pdf");
        let act_from = old_root.join("plan.pdf-ABDs/act.pdf");
        let kept = old_root.join("roof.pdf-ABDs/photo.jpg");
        let staged = dir.path().join("staging/1_survey.pdf");
        for path in [&plan_from, &act_from, &kept, &staged] {
            store.write(path, b"x").await.unwrap();
        }
        let plan_to = new_root.join("plan.pdf");
        let plan_address = plan_to.to_str().unwrap();

        let mut plan = RelocationPlan::new();
        plan.push(DocKind::ProjectDoc, Uuid::new_v4(), &plan_from, plan_to.clone());
        plan.push(DocKind::AsbuiltDoc, Uuid::new_v4(), &act_from, asbuilt_doc_target(plan_address, "act.pdf"));
        plan.push(DocKind::AsbuiltDoc, Uuid::new_v4(), &staged, asbuilt_doc_target(plan_address, "survey.pdf"));
        let applied = plan.apply(&store).await.unwrap();

        assert_eq!(applied.vacated_dirs(), vec![old_root.join("plan.pdf-ABDs").as_path()]);
        applied.prune_vacated_dirs(&store).await;

        assert!(!old_root.join("plan.pdf-ABDs").exists());
        assert!(kept.exists());
        assert!(old_root.exists());
        assert!(dir.path().join("staging").exists());
        assert!(new_root.join("plan.pdf-ABDs/act.pdf").exists());
    }
}
