//! Typed access to the hosted backend.
//!
//! The backend exposes three surfaces: REST tables (PostgREST conventions),
//! object storage and auth. [`Backend`] and [`AuthBackend`] are the handles
//! every gateway function takes; [`supabase::SupabaseClient`] talks to the
//! real service and [`fake::FakeBackend`] keeps everything in memory.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub mod classes;
pub mod corrections;
pub mod fake;
pub mod grades;
pub mod notifications;
pub mod profiles;
pub mod supabase;

pub const CLASSES: &str = "classes";
pub const CLASS_STUDENTS: &str = "class_students";
pub const GRADES: &str = "grades";
pub const CORRECTIONS: &str = "corrections";
pub const NOTIFICATIONS: &str = "notifications";
pub const PROFILES: &str = "profiles";

/// Storage bucket holding correction PDFs.
pub const CORRECTIONS_BUCKET: &str = "corrections";

/// Error reported by the backend, carrying its own message.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct GatewayError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Schema drift: the remote table lacks an optional column.
    pub fn is_missing_column(&self, column: &str) -> bool {
        let m = &self.message;
        m.contains(column) || (m.contains("column") && m.contains("does not exist"))
    }

    pub fn is_already_registered(&self) -> bool {
        let m = &self.message;
        m.contains("already registered") || m.contains("already exists")
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        Self {
            status,
            code: None,
            message: e.to_string(),
        }
    }
}

pub(crate) fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, GatewayError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| GatewayError::new(format!("unexpected row shape: {e}")))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A read (or the row selection of an update/delete) against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        self.filters.push(Filter::In {
            column: column.to_string(),
            values: values.to_vec(),
        });
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Column names requested, without whitespace.
    pub fn column_list(&self) -> Vec<&str> {
        self.columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Filter and ordering parameters in PostgREST syntax.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        for f in &self.filters {
            match f {
                Filter::Eq { column, value } => params.push((column.clone(), format!("eq.{value}"))),
                Filter::In { column, values } => {
                    let quoted: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
                    params.push((column.clone(), format!("in.({})", quoted.join(","))));
                }
            }
        }
        if let Some(o) = &self.order {
            let dir = if o.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", o.column, dir)));
        }
        params
    }

    /// Full read parameters, `select` first.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.column_list().join(","))];
        params.extend(self.filter_params());
        params
    }
}

fn quote_list_item(v: &str) -> String {
    let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Handle on the hosted tables and object storage.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Public base URL of the backend, used to derive download links.
    fn base_url(&self) -> &str;

    /// Same backend, acting on behalf of the holder of `access_token`.
    fn with_access_token(&self, access_token: &str) -> Arc<dyn Backend>;

    async fn select(&self, query: &Query) -> Result<Vec<Value>, GatewayError>;

    /// Inserts rows; returns the created rows projected on `returning`
    /// (empty when `returning` is `None`).
    async fn insert(
        &self,
        table: &str,
        rows: Value,
        returning: Option<&str>,
    ) -> Result<Vec<Value>, GatewayError>;

    /// Inserts rows, overwriting any row that shares the `on_conflict` key.
    async fn upsert(&self, table: &str, rows: Value, on_conflict: &str) -> Result<(), GatewayError>;

    async fn update(&self, query: &Query, patch: Value) -> Result<(), GatewayError>;

    async fn delete(&self, query: &Query) -> Result<(), GatewayError>;

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), GatewayError>;
}

/// User as known to the hosted auth service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    pub fn metadata_name(&self) -> Option<String> {
        self.user_metadata
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn metadata_must_change_password(&self) -> bool {
        self.user_metadata
            .get("must_change_password")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewAuthUser {
    pub email: String,
    pub password: String,
    pub email_confirm: bool,
    pub user_metadata: Value,
}

/// Handle on the hosted auth service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn user_for_token(&self, access_token: &str) -> Result<AuthUser, GatewayError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, GatewayError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError>;

    async fn update_password(&self, access_token: &str, password: &str) -> Result<(), GatewayError>;

    /// Privileged: requires a service-role handle.
    async fn admin_create_user(&self, user: &NewAuthUser) -> Result<AuthUser, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_follow_postgrest_syntax() {
        let q = Query::table(CLASS_STUDENTS)
            .select("class_id, user_id")
            .in_list("class_id", &["a".to_string(), "b,c".to_string()])
            .eq("user_id", "u1")
            .order("name", false);
        assert_eq!(
            q.params(),
            vec![
                ("select".to_string(), "class_id,user_id".to_string()),
                ("class_id".to_string(), "in.(\"a\",\"b,c\")".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("order".to_string(), "name.desc".to_string()),
            ]
        );
    }

    #[test]
    fn missing_column_detection() {
        let drift = GatewayError::new("column profiles.must_change_password does not exist");
        assert!(drift.is_missing_column("must_change_password"));
        let other = GatewayError::new("column grades.foo does not exist");
        assert!(other.is_missing_column("must_change_password"));
        let unrelated = GatewayError::new("permission denied for table profiles");
        assert!(!unrelated.is_missing_column("must_change_password"));
    }

    #[test]
    fn auth_metadata_accessors() {
        let u = AuthUser {
            id: "u1".into(),
            email: Some("a@b.fr".into()),
            user_metadata: serde_json::json!({"name": "Léa", "must_change_password": true}),
        };
        assert_eq!(u.metadata_name().as_deref(), Some("Léa"));
        assert!(u.metadata_must_change_password());
    }
}
