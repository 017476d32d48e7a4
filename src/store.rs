//! The storage interface the facades and routes work against.
//!
//! [`RemoteStore`] goes through the hosted backend; [`LocalDataStore`]
//! keeps everything in the local key-value store. Which one serves a
//! deployment is decided once, when the application state is built.

use crate::gateway::{self, Backend, GatewayError};
use crate::local::{LocalDataStore, LocalError};
use crate::models::{
    ClassItem, ClassStudent, CorrectionItem, GradeEntry, NewCorrection, NotificationItem,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Local(#[from] LocalError),
    #[error("hosted backend required")]
    NotConfigured,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn fetch_classes(&self) -> Result<Vec<ClassItem>, StoreError>;
    async fn create_class(&self, name: &str, created_by: &str) -> Result<ClassItem, StoreError>;
    async fn rename_class(&self, id: &str, name: &str) -> Result<(), StoreError>;
    async fn delete_class(&self, id: &str) -> Result<(), StoreError>;

    async fn class_students(&self, class_id: &str) -> Result<Vec<ClassStudent>, StoreError>;
    async fn add_class_member(&self, class_id: &str, student_id: &str) -> Result<(), StoreError>;
    async fn remove_class_member(&self, class_id: &str, student_id: &str) -> Result<(), StoreError>;

    async fn class_grades(&self, class_id: &str) -> Result<Vec<GradeEntry>, StoreError>;
    async fn student_grades(&self, student_id: &str) -> Result<Vec<GradeEntry>, StoreError>;
    async fn save_class_grades(
        &self,
        class_id: &str,
        entries: &[GradeEntry],
    ) -> Result<(), StoreError>;

    /// Newest first. With a class, also keeps corrections posted for
    /// every class.
    async fn fetch_corrections(
        &self,
        class_id: Option<&str>,
    ) -> Result<Vec<CorrectionItem>, StoreError>;
    async fn add_correction(&self, new: &NewCorrection) -> Result<CorrectionItem, StoreError>;
    async fn delete_correction(&self, id: &str, file_path: Option<&str>) -> Result<(), StoreError>;

    async fn fetch_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationItem>, StoreError>;
    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError>;
    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<(), StoreError>;
    /// Notifies every member of the class that grades were published;
    /// returns the number of notifications created.
    async fn notify_class(
        &self,
        class_id: &str,
        class_name: &str,
        exam_names: &[String],
    ) -> Result<usize, StoreError>;
}

/// Storage on the hosted backend, acting as whoever the handle is scoped to.
#[derive(Clone)]
pub struct RemoteStore {
    db: Arc<dyn Backend>,
}

impl RemoteStore {
    pub fn new(db: Arc<dyn Backend>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DataStore for RemoteStore {
    async fn fetch_classes(&self) -> Result<Vec<ClassItem>, StoreError> {
        Ok(gateway::classes::fetch_classes(&*self.db).await?)
    }

    async fn create_class(&self, name: &str, created_by: &str) -> Result<ClassItem, StoreError> {
        Ok(gateway::classes::insert_class(&*self.db, name, created_by).await?)
    }

    async fn rename_class(&self, id: &str, name: &str) -> Result<(), StoreError> {
        Ok(gateway::classes::rename_class(&*self.db, id, name).await?)
    }

    async fn delete_class(&self, id: &str) -> Result<(), StoreError> {
        Ok(gateway::classes::delete_class(&*self.db, id).await?)
    }

    async fn class_students(&self, class_id: &str) -> Result<Vec<ClassStudent>, StoreError> {
        Ok(gateway::classes::class_students(&*self.db, class_id).await?)
    }

    async fn add_class_member(&self, class_id: &str, student_id: &str) -> Result<(), StoreError> {
        Ok(gateway::classes::add_student_to_class(&*self.db, class_id, student_id).await?)
    }

    async fn remove_class_member(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<(), StoreError> {
        Ok(gateway::classes::remove_student_from_class(&*self.db, class_id, student_id).await?)
    }

    async fn class_grades(&self, class_id: &str) -> Result<Vec<GradeEntry>, StoreError> {
        Ok(gateway::grades::fetch_class_grades(&*self.db, class_id).await?)
    }

    async fn student_grades(&self, student_id: &str) -> Result<Vec<GradeEntry>, StoreError> {
        Ok(gateway::grades::fetch_student_grades(&*self.db, student_id).await?)
    }

    async fn save_class_grades(
        &self,
        class_id: &str,
        entries: &[GradeEntry],
    ) -> Result<(), StoreError> {
        Ok(gateway::grades::save_class_grades(&*self.db, class_id, entries).await?)
    }

    async fn fetch_corrections(
        &self,
        class_id: Option<&str>,
    ) -> Result<Vec<CorrectionItem>, StoreError> {
        Ok(gateway::corrections::fetch_corrections(&*self.db, class_id).await?)
    }

    async fn add_correction(&self, new: &NewCorrection) -> Result<CorrectionItem, StoreError> {
        Ok(gateway::corrections::insert_correction(&*self.db, new).await?)
    }

    async fn delete_correction(&self, id: &str, file_path: Option<&str>) -> Result<(), StoreError> {
        Ok(gateway::corrections::delete_correction(&*self.db, id, file_path).await?)
    }

    async fn fetch_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationItem>, StoreError> {
        Ok(gateway::notifications::fetch_notifications(&*self.db, user_id).await?)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError> {
        Ok(gateway::notifications::mark_read(&*self.db, id).await?)
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<(), StoreError> {
        Ok(gateway::notifications::mark_all_read(&*self.db, user_id).await?)
    }

    async fn notify_class(
        &self,
        class_id: &str,
        class_name: &str,
        exam_names: &[String],
    ) -> Result<usize, StoreError> {
        Ok(
            gateway::notifications::create_for_class(&*self.db, class_id, class_name, exam_names)
                .await?,
        )
    }
}

// The local store has no notion of notifications; those calls are empty.
#[async_trait]
impl DataStore for LocalDataStore {
    async fn fetch_classes(&self) -> Result<Vec<ClassItem>, StoreError> {
        let mut classes = self.get_classes();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    async fn create_class(&self, name: &str, _created_by: &str) -> Result<ClassItem, StoreError> {
        Ok(self.add_class(name, Vec::new())?)
    }

    async fn rename_class(&self, id: &str, name: &str) -> Result<(), StoreError> {
        Ok(LocalDataStore::rename_class(self, id, name)?)
    }

    async fn delete_class(&self, id: &str) -> Result<(), StoreError> {
        Ok(LocalDataStore::delete_class(self, id)?)
    }

    async fn class_students(&self, class_id: &str) -> Result<Vec<ClassStudent>, StoreError> {
        Ok(LocalDataStore::class_students(self, class_id))
    }

    async fn add_class_member(&self, class_id: &str, student_id: &str) -> Result<(), StoreError> {
        Ok(LocalDataStore::add_class_member(self, class_id, student_id)?)
    }

    async fn remove_class_member(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> Result<(), StoreError> {
        Ok(LocalDataStore::remove_class_member(self, class_id, student_id)?)
    }

    async fn class_grades(&self, class_id: &str) -> Result<Vec<GradeEntry>, StoreError> {
        Ok(self.grades_for_class(class_id))
    }

    async fn student_grades(&self, student_id: &str) -> Result<Vec<GradeEntry>, StoreError> {
        Ok(self.grades_for_student(student_id))
    }

    async fn save_class_grades(
        &self,
        class_id: &str,
        entries: &[GradeEntry],
    ) -> Result<(), StoreError> {
        Ok(self.merge_class_grades(class_id, entries)?)
    }

    async fn fetch_corrections(
        &self,
        class_id: Option<&str>,
    ) -> Result<Vec<CorrectionItem>, StoreError> {
        let mut list: Vec<CorrectionItem> = self
            .get_corrections()
            .into_iter()
            .filter(|c| match (class_id, c.class_id.as_deref()) {
                (Some(wanted), Some(own)) => wanted == own,
                _ => true,
            })
            .collect();
        list.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(list)
    }

    async fn add_correction(&self, new: &NewCorrection) -> Result<CorrectionItem, StoreError> {
        Ok(LocalDataStore::add_correction(self, new)?)
    }

    async fn delete_correction(&self, id: &str, file_path: Option<&str>) -> Result<(), StoreError> {
        Ok(LocalDataStore::delete_correction(self, id, file_path)?)
    }

    async fn fetch_notifications(
        &self,
        _user_id: &str,
    ) -> Result<Vec<NotificationItem>, StoreError> {
        Ok(Vec::new())
    }

    async fn mark_notification_read(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn mark_all_notifications_read(&self, _user_id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn notify_class(
        &self,
        _class_id: &str,
        _class_name: &str,
        _exam_names: &[String],
    ) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;
    use crate::local::LocalKv;
    use tempfile::TempDir;

    fn grade(student: &str, exam: &str, note: f64) -> GradeEntry {
        GradeEntry {
            student_id: student.into(),
            exam_name: exam.into(),
            note,
            date: "2026-01-05".into(),
            coefficient: Some(1.0),
        }
    }

    // Both implementations answer the same sequence the same way.
    async fn class_lifecycle(store: &dyn DataStore) {
        let c = store.create_class("X", "2").await.unwrap();
        let classes = store.fetch_classes().await.unwrap();
        assert_eq!(classes.len(), 1);
        assert!(classes[0].student_ids.is_empty());

        store.add_class_member(&c.id, "3").await.unwrap();
        let classes = store.fetch_classes().await.unwrap();
        assert_eq!(classes[0].student_ids, vec!["3".to_string()]);

        store
            .save_class_grades(&c.id, &[grade("3", "DS1", 9.0), grade("3", "DS1", 12.0)])
            .await
            .unwrap();
        let grades = store.class_grades(&c.id).await.unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].note, 12.0);

        store.delete_class(&c.id).await.unwrap();
        assert!(store.fetch_classes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_class_lifecycle() {
        let store = RemoteStore::new(Arc::new(FakeBackend::new()));
        class_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn local_class_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(LocalKv::open(dir.path()));
        class_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn local_corrections_filter_by_class() {
        let dir = TempDir::new().unwrap();
        let store = LocalDataStore::new(LocalKv::open(dir.path()));
        for (title, class_id) in [("A", Some("c1")), ("B", None), ("C", Some("c2"))] {
            DataStore::add_correction(
                &store,
                &NewCorrection {
                    title: title.into(),
                    class_id: class_id.map(str::to_string),
                    file_path: format!("{title}.pdf"),
                    file_name: format!("{title}.pdf"),
                    uploaded_by: String::new(),
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(DataStore::fetch_corrections(&store, None).await.unwrap().len(), 3);
        let c1 = DataStore::fetch_corrections(&store, Some("c1")).await.unwrap();
        let mut titles: Vec<_> = c1.iter().map(|c| c.title.as_str()).collect();
        titles.sort();
        assert_eq!(titles, vec!["A", "B"]);
    }
}
