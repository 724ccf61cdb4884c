//! # Capsule Service
//!
//! Coordinates validation output, the `FileStore` and the `CapsuleRepo`.

use std::sync::Arc;

use tc_core::{
    now_millis, sanitize_file_name, AppError, Capsule, CapsuleFile, CapsuleRepo, CapsuleWithFiles,
    FileStore, NewCapsule, Result, StoredObject, Upload,
};
use tracing::{info, warn};
use uuid::Uuid;

pub struct CapsuleService {
    repo: Arc<dyn CapsuleRepo>,
    store: Arc<dyn FileStore>,
}

impl CapsuleService {
    pub fn new(repo: Arc<dyn CapsuleRepo>, store: Arc<dyn FileStore>) -> Self {
        Self { repo, store }
    }

    /// Stores every upload, then writes the capsule and its file rows.
    ///
    /// All-or-nothing: on any failure the objects written so far are removed.
    pub async fn create(&self, new: NewCapsule, uploads: Vec<Upload>) -> Result<CapsuleWithFiles> {
        let capsule = Capsule {
            id: Uuid::now_v7(),
            title: new.title,
            owner: new.owner,
            message: new.message,
            unlock_date: new.unlock_date,
            created_at: now_millis(),
            is_unlocked: false,
        };

        let mut files = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let file_id = Uuid::now_v7();
            let key = format!("{}/{}_{}", capsule.id, file_id, sanitize_file_name(&upload.file_name));
            let mimetype = upload.mimetype();

            match self.store.put(&key, upload.data, &mimetype).await {
                Ok(storage_ref) => files.push(CapsuleFile {
                    id: file_id,
                    capsule_id: capsule.id,
                    original_name: upload.file_name,
                    storage_ref,
                    mimetype,
                }),
                Err(e) => {
                    self.discard(&files).await;
                    return Err(AppError::Storage(e));
                }
            }
        }

        if let Err(e) = self.repo.create_capsule(&capsule, &files).await {
            self.discard(&files).await;
            return Err(AppError::Database(e));
        }

        info!(
            capsule_id = %capsule.id,
            owner = %capsule.owner,
            files = files.len(),
            unlock_date = %capsule.unlock_date,
            "capsule sealed"
        );
        Ok(CapsuleWithFiles { capsule, files })
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<Capsule>> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(AppError::validation("owner is required"));
        }
        self.repo.list_capsules(owner).await.map_err(AppError::Database)
    }

    pub async fn get(&self, id: Uuid) -> Result<CapsuleWithFiles> {
        self.repo
            .get_capsule(id)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::not_found("capsule", id))
    }

    /// Forces the capsule open regardless of its date. Repeated calls are no-ops.
    pub async fn unlock(&self, id: Uuid) -> Result<Capsule> {
        let capsule = self
            .repo
            .unlock_capsule(id)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::not_found("capsule", id))?;

        info!(capsule_id = %id, "capsule unlocked manually");
        Ok(capsule)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let files = self
            .repo
            .delete_capsule(id)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::not_found("capsule", id))?;

        self.discard(&files).await;
        info!(capsule_id = %id, files = files.len(), "capsule deleted");
        Ok(())
    }

    /// Fetches an attachment of an unlocked capsule.
    pub async fn open_file(&self, capsule_id: Uuid, file_id: Uuid) -> Result<(CapsuleFile, StoredObject)> {
        let CapsuleWithFiles { capsule, files } = self.get(capsule_id).await?;

        let file = files
            .into_iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| AppError::not_found("file", file_id))?;

        if !capsule.is_unlocked {
            return Err(AppError::Locked(format!("capsule {capsule_id} is still sealed")));
        }

        let object = self.store.get(&file.storage_ref).await.map_err(AppError::Storage)?;
        Ok((file, object))
    }

    async fn discard(&self, files: &[CapsuleFile]) {
        for file in files {
            if let Err(e) = self.store.delete(&file.storage_ref).await {
                warn!(error = %e, storage_ref = %file.storage_ref, "failed to remove stored file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use bytes::Bytes;
    use chrono::Utc;
    use mockall::predicate::eq;
    use tc_core::{MockCapsuleRepo, MockFileStore};

    fn new_capsule() -> NewCapsule {
        NewCapsule {
            title: "T".into(),
            owner: "o".into(),
            message: "m".into(),
            unlock_date: Utc::now() + chrono::Duration::days(1),
        }
    }

    fn upload(name: &str) -> Upload {
        Upload {
            file_name: name.into(),
            content_type: None,
            data: Bytes::from_static(b"data"),
        }
    }

    fn service(repo: MockCapsuleRepo, store: MockFileStore) -> CapsuleService {
        CapsuleService::new(Arc::new(repo), Arc::new(store))
    }

    #[tokio::test]
    async fn create_stores_files_under_capsule_keys() {
        let mut store = MockFileStore::new();
        store
            .expect_put()
            .times(2)
            .returning(|key, _, _| Ok(format!("/uploads/{key}")));

        let mut repo = MockCapsuleRepo::new();
        repo.expect_create_capsule()
            .times(1)
            .returning(|capsule, files| {
                assert!(files.iter().all(|f| f.capsule_id == capsule.id));
                Ok(())
            });

        let created = service(repo, store)
            .create(new_capsule(), vec![upload("a b.txt"), upload("c.png")])
            .await
            .unwrap();

        assert!(!created.capsule.is_unlocked);
        assert_eq!(created.files.len(), 2);
        assert_eq!(created.files[0].original_name, "a b.txt");
        assert_eq!(created.files[0].mimetype, "text/plain");
        assert_eq!(created.files[1].mimetype, "image/png");
        let prefix = format!("/uploads/{}/", created.capsule.id);
        assert!(created.files[0].storage_ref.starts_with(&prefix));
        assert!(created.files[0].storage_ref.ends_with("_a_b.txt"));
    }

    #[tokio::test]
    async fn create_removes_written_files_when_a_later_upload_fails() {
        let mut store = MockFileStore::new();
        let mut calls = 0;
        store.expect_put().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Ok("ref-1".into())
            } else {
                Err(anyhow!("disk full"))
            }
        });
        store
            .expect_delete()
            .with(eq("ref-1"))
            .times(1)
            .returning(|_| Ok(()));

        let mut repo = MockCapsuleRepo::new();
        repo.expect_create_capsule().never();

        let err = service(repo, store)
            .create(new_capsule(), vec![upload("a"), upload("b")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn create_removes_files_when_insert_fails() {
        let mut store = MockFileStore::new();
        store.expect_put().returning(|_, _, _| Ok("ref".into()));
        store.expect_delete().times(1).returning(|_| Ok(()));

        let mut repo = MockCapsuleRepo::new();
        repo.expect_create_capsule()
            .returning(|_, _| Err(anyhow!("database is locked")));

        let err = service(repo, store)
            .create(new_capsule(), vec![upload("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn get_and_unlock_report_missing_capsules() {
        let mut repo = MockCapsuleRepo::new();
        repo.expect_get_capsule().returning(|_| Ok(None));
        repo.expect_unlock_capsule().returning(|_| Ok(None));
        repo.expect_delete_capsule().returning(|_| Ok(None));
        let svc = service(repo, MockFileStore::new());

        let id = Uuid::now_v7();
        assert!(matches!(svc.get(id).await, Err(AppError::NotFound { kind: "capsule", .. })));
        assert!(matches!(svc.unlock(id).await, Err(AppError::NotFound { .. })));
        assert!(matches!(svc.delete(id).await, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn list_rejects_blank_owner() {
        let mut repo = MockCapsuleRepo::new();
        repo.expect_list_capsules().never();
        let err = service(repo, MockFileStore::new()).list("  ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn open_file_refuses_sealed_capsules() {
        let capsule_id = Uuid::now_v7();
        let file_id = Uuid::now_v7();
        let mut repo = MockCapsuleRepo::new();
        repo.expect_get_capsule().returning(move |id| {
            Ok(Some(CapsuleWithFiles {
                capsule: Capsule {
                    id,
                    title: "T".into(),
                    owner: "o".into(),
                    message: String::new(),
                    unlock_date: Utc::now(),
                    created_at: Utc::now(),
                    is_unlocked: false,
                },
                files: vec![CapsuleFile {
                    id: file_id,
                    capsule_id: id,
                    original_name: "a".into(),
                    storage_ref: "ref".into(),
                    mimetype: "text/plain".into(),
                }],
            }))
        });
        let mut store = MockFileStore::new();
        store.expect_get().never();
        let svc = service(repo, store);

        let err = svc.open_file(capsule_id, file_id).await.unwrap_err();
        assert!(matches!(err, AppError::Locked(_)));

        let err = svc.open_file(capsule_id, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: "file", .. }));
    }
}
