use std::env;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Hosted backend coordinates. Present only when both URL and key are set.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub backend: Option<BackendConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any variable source; blank values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| get(*k));

        let backend = match (
            first(&["BACKEND_URL", "NEXT_PUBLIC_SUPABASE_URL"]),
            first(&["BACKEND_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]),
        ) {
            (Some(url), Some(anon_key)) => Some(BackendConfig {
                url,
                anon_key,
                service_role_key: first(&["BACKEND_SERVICE_ROLE_KEY", "SUPABASE_SERVICE_ROLE_KEY"]),
            }),
            _ => None,
        };

        Self {
            port: get("PORT").and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "./data".into())),
            public_dir: PathBuf::from(get("PUBLIC_DIR").unwrap_or_else(|| "./public".into())),
            max_upload_bytes: get("MAX_UPLOAD_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            backend,
        }
    }

    pub fn local_store_dir(&self) -> PathBuf {
        self.data_dir.join("local")
    }

    /// Where uploaded correction files land in local mode.
    pub fn corrections_dir(&self) -> PathBuf {
        self.public_dir.join("corrections")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_to_local_mode() {
        let c = config(&[]);
        assert_eq!(c.port, 8081);
        assert_eq!(c.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(c.local_store_dir(), PathBuf::from("./data/local"));
        assert_eq!(c.corrections_dir(), PathBuf::from("./public/corrections"));
        assert!(c.backend.is_none());
    }

    #[test]
    fn backend_needs_url_and_key() {
        assert!(config(&[("BACKEND_URL", "https://x.supabase.co")]).backend.is_none());
        assert!(config(&[("BACKEND_URL", "https://x.supabase.co"), ("BACKEND_ANON_KEY", " ")])
            .backend
            .is_none());

        let c = config(&[
            ("NEXT_PUBLIC_SUPABASE_URL", "https://x.supabase.co"),
            ("NEXT_PUBLIC_SUPABASE_ANON_KEY", "anon"),
            ("BACKEND_SERVICE_ROLE_KEY", "service"),
            ("PORT", "9000"),
        ]);
        let b = c.backend.unwrap();
        assert_eq!(b.url, "https://x.supabase.co");
        assert_eq!(b.service_role_key.as_deref(), Some("service"));
        assert_eq!(c.port, 9000);
    }
}
