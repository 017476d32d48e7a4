use crate::config::AppConfig;
use crate::gateway::supabase::SupabaseClient;
use crate::gateway::{AuthBackend, Backend, GatewayError};
use crate::local::{LocalDataStore, LocalKv};
use crate::store::{DataStore, RemoteStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Handles on the hosted backend.
#[derive(Clone)]
pub struct RemoteHandles {
    /// Public-key handle; scoped per request to the caller's token.
    pub db: Arc<dyn Backend>,
    pub auth: Arc<dyn AuthBackend>,
    /// Service-role handles for the privileged endpoints, when configured.
    pub admin: Option<AdminHandles>,
}

#[derive(Clone)]
pub struct AdminHandles {
    pub db: Arc<dyn Backend>,
    pub auth: Arc<dyn AuthBackend>,
}

#[derive(Clone)]
pub enum StorageMode {
    Remote(RemoteHandles),
    Local(Arc<LocalDataStore>),
}

#[derive(Clone)]
pub struct AppState {
    pub mode: StorageMode,
    pub public_dir: PathBuf,
}

impl AppState {
    /// Picks the storage mode once: hosted backend when configured,
    /// local store otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let mode = match &config.backend {
            Some(b) => {
                let client = SupabaseClient::new(&b.url, &b.anon_key)?;
                let admin = match &b.service_role_key {
                    Some(key) => {
                        let admin = SupabaseClient::new(&b.url, key)?;
                        Some(AdminHandles {
                            db: Arc::new(admin.clone()),
                            auth: Arc::new(admin),
                        })
                    }
                    None => None,
                };
                tracing::info!(backend = %b.url, privileged = admin.is_some(), "using hosted backend");
                StorageMode::Remote(RemoteHandles {
                    db: Arc::new(client.clone()),
                    auth: Arc::new(client),
                    admin,
                })
            }
            None => {
                let dir = config.local_store_dir();
                tracing::info!(dir = %dir.display(), "no hosted backend configured, using local store");
                let store = LocalDataStore::new(LocalKv::open(dir)).with_files_dir(config.corrections_dir());
                StorageMode::Local(Arc::new(store))
            }
        };
        Ok(Self {
            mode,
            public_dir: config.public_dir.clone(),
        })
    }

    pub fn remote(handles: RemoteHandles, public_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: StorageMode::Remote(handles),
            public_dir: public_dir.into(),
        }
    }

    pub fn local(store: LocalDataStore, public_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: StorageMode::Local(Arc::new(store)),
            public_dir: public_dir.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.mode, StorageMode::Remote(_))
    }

    pub fn local_store(&self) -> Option<&Arc<LocalDataStore>> {
        match &self.mode {
            StorageMode::Local(store) => Some(store),
            StorageMode::Remote(_) => None,
        }
    }

    /// Store the facades read through. Remote access acts as the holder of
    /// `access_token`; an unavailable local store yields `None`.
    pub fn facade_source(&self, access_token: Option<&str>) -> Option<Arc<dyn DataStore>> {
        match &self.mode {
            StorageMode::Remote(r) => {
                let db = match access_token {
                    Some(token) => r.db.with_access_token(token),
                    None => r.db.clone(),
                };
                let store: Arc<dyn DataStore> = Arc::new(RemoteStore::new(db));
                Some(store)
            }
            StorageMode::Local(store) if store.kv().is_available() => {
                let store: Arc<dyn DataStore> = store.clone();
                Some(store)
            }
            StorageMode::Local(_) => None,
        }
    }

    /// Store acting with service-role rights, for writes on behalf of other
    /// users (notification fan-out). Remote mode only.
    pub fn privileged_store(&self) -> Option<Arc<dyn DataStore>> {
        match &self.mode {
            StorageMode::Remote(RemoteHandles { admin: Some(a), .. }) => {
                let store: Arc<dyn DataStore> = Arc::new(RemoteStore::new(a.db.clone()));
                Some(store)
            }
            _ => None,
        }
    }

    pub fn corrections_dir(&self) -> PathBuf {
        self.public_dir.join("corrections")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;

    #[test]
    fn unavailable_local_store_has_no_facade_source() {
        let state = AppState::local(LocalDataStore::new(LocalKv::unavailable()), "./public");
        assert!(!state.is_remote());
        assert!(state.facade_source(None).is_none());
    }

    #[test]
    fn remote_mode_always_has_a_source() {
        let fake = FakeBackend::new();
        let state = AppState::remote(
            RemoteHandles {
                db: Arc::new(fake.clone()),
                auth: Arc::new(fake),
                admin: None,
            },
            "./public",
        );
        assert!(state.is_remote());
        assert!(state.facade_source(Some("token")).is_some());
        assert!(state.local_store().is_none());
    }
}
