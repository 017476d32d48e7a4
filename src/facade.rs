//! Per-entity views over a [`DataStore`]: the current list, a loading flag
//! and the last error, plus mutators that refetch once they succeed.
//!
//! A facade built without a store reports an empty list and treats its
//! mutators as no-ops.

use crate::models::{
    ClassItem, ClassStudent, CorrectionItem, GradeEntry, NewCorrection, NotificationItem,
};
use crate::store::{DataStore, StoreError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FacadeState<T> {
    pub data: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for FacadeState<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

/// What a facade lists and how to load it.
#[async_trait]
pub trait Resource: Send + Sync {
    type Item: Clone + Send + Sync + Serialize;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<Self::Item>, StoreError>;
}

pub struct Facade<R: Resource> {
    store: Option<Arc<dyn DataStore>>,
    resource: R,
    state: FacadeState<R::Item>,
}

impl<R: Resource> Facade<R> {
    /// Builds the facade and performs the initial load.
    pub async fn open(store: Option<Arc<dyn DataStore>>, resource: R) -> Self {
        let mut facade = Self {
            store,
            resource,
            state: FacadeState::default(),
        };
        facade.refetch().await;
        facade
    }

    pub fn state(&self) -> &FacadeState<R::Item> {
        &self.state
    }

    pub fn into_state(self) -> FacadeState<R::Item> {
        self.state
    }

    pub fn data(&self) -> &[R::Item] {
        &self.state.data
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub async fn refetch(&mut self) {
        let Some(store) = self.store.clone() else {
            self.state = FacadeState::default();
            return;
        };
        self.state.loading = true;
        self.state.error = None;
        match self.resource.load(&*store).await {
            Ok(data) => self.state.data = data,
            Err(e) => {
                tracing::debug!(error = %e, "facade refetch failed");
                self.state.error = Some(e.to_string());
            }
        }
        self.state.loading = false;
    }

    /// Refetches after a successful mutation; records a failed one.
    async fn settle<T>(&mut self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match result {
            Ok(v) => {
                self.refetch().await;
                Ok(v)
            }
            Err(e) => {
                self.state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn begin(&mut self) -> Option<Arc<dyn DataStore>> {
        let store = self.store.clone()?;
        self.state.error = None;
        Some(store)
    }
}

pub struct Classes;

#[async_trait]
impl Resource for Classes {
    type Item = ClassItem;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<ClassItem>, StoreError> {
        store.fetch_classes().await
    }
}

impl Facade<Classes> {
    pub async fn add_class(
        &mut self,
        name: &str,
        created_by: &str,
    ) -> Result<Option<ClassItem>, StoreError> {
        let Some(store) = self.begin() else {
            return Ok(None);
        };
        let result = store.create_class(name, created_by).await;
        self.settle(result).await.map(Some)
    }

    pub async fn rename_class(&mut self, id: &str, name: &str) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store.rename_class(id, name).await;
        self.settle(result).await
    }

    pub async fn delete_class(&mut self, id: &str) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store.delete_class(id).await;
        self.settle(result).await
    }
}

pub struct ClassRoster {
    pub class_id: String,
}

#[async_trait]
impl Resource for ClassRoster {
    type Item = ClassStudent;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<ClassStudent>, StoreError> {
        store.class_students(&self.class_id).await
    }
}

impl Facade<ClassRoster> {
    pub async fn add_student(&mut self, student_id: &str) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store.add_class_member(&self.resource.class_id, student_id).await;
        self.settle(result).await
    }

    pub async fn remove_student(&mut self, student_id: &str) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store
            .remove_class_member(&self.resource.class_id, student_id)
            .await;
        self.settle(result).await
    }
}

pub struct ClassGrades {
    pub class_id: String,
}

#[async_trait]
impl Resource for ClassGrades {
    type Item = GradeEntry;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<GradeEntry>, StoreError> {
        store.class_grades(&self.class_id).await
    }
}

impl Facade<ClassGrades> {
    pub async fn set_grades(&mut self, entries: &[GradeEntry]) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store.save_class_grades(&self.resource.class_id, entries).await;
        self.settle(result).await
    }
}

pub struct StudentGrades {
    pub student_id: String,
}

#[async_trait]
impl Resource for StudentGrades {
    type Item = GradeEntry;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<GradeEntry>, StoreError> {
        store.student_grades(&self.student_id).await
    }
}

#[derive(Default)]
pub struct Corrections {
    pub class_id: Option<String>,
    /// When set, only corrections for these classes or for every class.
    pub visible_classes: Option<Vec<String>>,
}

impl Corrections {
    pub fn all() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Resource for Corrections {
    type Item = CorrectionItem;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<CorrectionItem>, StoreError> {
        let mut list = store.fetch_corrections(self.class_id.as_deref()).await?;
        if let Some(visible) = &self.visible_classes {
            list.retain(|c| c.class_id.as_ref().map_or(true, |id| visible.contains(id)));
        }
        Ok(list)
    }
}

impl Facade<Corrections> {
    /// Unlike the other mutators this one needs a store.
    pub async fn add_correction(
        &mut self,
        new: &NewCorrection,
    ) -> Result<CorrectionItem, StoreError> {
        let Some(store) = self.begin() else {
            return Err(StoreError::NotConfigured);
        };
        let result = store.add_correction(new).await;
        self.settle(result).await
    }

    pub async fn delete_correction(
        &mut self,
        id: &str,
        file_path: Option<&str>,
    ) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store.delete_correction(id, file_path).await;
        self.settle(result).await
    }
}

pub struct Notifications {
    pub user_id: String,
}

#[async_trait]
impl Resource for Notifications {
    type Item = NotificationItem;

    async fn load(&self, store: &dyn DataStore) -> Result<Vec<NotificationItem>, StoreError> {
        store.fetch_notifications(&self.user_id).await
    }
}

impl Facade<Notifications> {
    pub fn unread_count(&self) -> usize {
        self.state.data.iter().filter(|n| !n.read).count()
    }

    pub async fn mark_read(&mut self, id: &str) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store.mark_notification_read(id).await;
        self.settle(result).await
    }

    pub async fn mark_all_read(&mut self) -> Result<(), StoreError> {
        let Some(store) = self.begin() else {
            return Ok(());
        };
        let result = store
            .mark_all_notifications_read(&self.resource.user_id)
            .await;
        self.settle(result).await
    }
}

pub type ClassesFacade = Facade<Classes>;
pub type ClassRosterFacade = Facade<ClassRoster>;
pub type ClassGradesFacade = Facade<ClassGrades>;
pub type StudentGradesFacade = Facade<StudentGrades>;
pub type CorrectionsFacade = Facade<Corrections>;
pub type NotificationsFacade = Facade<Notifications>;
