use super::{AuthBackend, AuthSession, AuthUser, Backend, Filter, GatewayError, NewAuthUser, Query};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

type Row = Map<String, Value>;

#[derive(Default)]
struct FakeState {
    tables: BTreeMap<String, Vec<Row>>,
    // (table, column) pairs the simulated schema lacks
    missing_columns: HashSet<(String, String)>,
    failing_updates: HashSet<String>,
    fail_object_removal: bool,
    objects: HashSet<String>,
    users: HashMap<String, (AuthUser, String)>,
    tokens: HashMap<String, String>,
    calls: Vec<String>,
}

/// In-memory stand-in for the hosted backend.
///
/// Clones share state, so a test can keep one handle for seeding and
/// inspection while the code under test holds another.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

const FAKE_BASE_URL: &str = "https://backend.test";

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn seed(&self, table: &str, rows: Value) {
        let mut st = self.lock();
        let list = st.tables.entry(table.to_string()).or_default();
        for row in as_rows(rows) {
            list.push(with_defaults(table, row));
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Simulates an older schema where `table` has no `column`.
    pub fn drop_column(&self, table: &str, column: &str) {
        let mut st = self.lock();
        st.missing_columns
            .insert((table.to_string(), column.to_string()));
        if let Some(rows) = st.tables.get_mut(table) {
            for row in rows {
                row.remove(column);
            }
        }
    }

    pub fn fail_updates_on(&self, table: &str) {
        self.lock().failing_updates.insert(table.to_string());
    }

    pub fn fail_object_removal(&self, fail: bool) {
        self.lock().fail_object_removal = fail;
    }

    pub fn put_object(&self, bucket: &str, path: &str) {
        self.lock().objects.insert(format!("{bucket}/{path}"));
    }

    pub fn has_object(&self, bucket: &str, path: &str) -> bool {
        self.lock().objects.contains(&format!("{bucket}/{path}"))
    }

    /// Registers an auth user and returns an access token for it.
    pub fn add_auth_user(&self, id: &str, email: &str, password: &str, metadata: Value) -> String {
        let mut st = self.lock();
        let user = AuthUser {
            id: id.to_string(),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        st.users
            .insert(id.to_string(), (user, password.to_string()));
        let token = format!("token-{id}");
        st.tokens.insert(token.clone(), id.to_string());
        token
    }

    pub fn password_of(&self, id: &str) -> Option<String> {
        self.lock().users.get(id).map(|(_, pw)| pw.clone())
    }

    pub fn auth_user_by_email(&self, email: &str) -> Option<AuthUser> {
        self.lock()
            .users
            .values()
            .find(|(u, _)| u.email.as_deref() == Some(email))
            .map(|(u, _)| u.clone())
    }

    /// Operations received so far, e.g. `select classes`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn as_rows(rows: Value) -> Vec<Row> {
    match rows {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(m) => Some(m),
                _ => None,
            })
            .collect(),
        Value::Object(m) => vec![m],
        _ => Vec::new(),
    }
}

fn with_defaults(table: &str, mut row: Row) -> Row {
    let now = Value::String(Utc::now().to_rfc3339());
    if table != super::CLASS_STUDENTS && !row.contains_key("id") {
        row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    match table {
        super::NOTIFICATIONS => {
            row.entry("read").or_insert(Value::Bool(false));
            row.entry("created_at").or_insert(now);
        }
        super::CORRECTIONS => {
            row.entry("uploaded_at").or_insert(now);
        }
        super::CLASSES | super::PROFILES => {
            row.entry("created_at").or_insert(now);
        }
        _ => {}
    }
    row
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn matches(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| match f {
        Filter::Eq { column, value } => row.get(column).map(value_text).as_deref() == Some(value),
        Filter::In { column, values } => row
            .get(column)
            .map(|v| values.contains(&value_text(v)))
            .unwrap_or(false),
    })
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_text(x).cmp(&value_text(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn missing_column_error(table: &str, column: &str) -> GatewayError {
    GatewayError::new(format!("column {table}.{column} does not exist"))
        .with_status(400)
        .with_code("42703")
}

impl FakeState {
    fn check_columns<'a>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), GatewayError> {
        for c in columns {
            if self
                .missing_columns
                .contains(&(table.to_string(), c.to_string()))
            {
                return Err(missing_column_error(table, c));
            }
        }
        Ok(())
    }

    fn project(row: &Row, columns: &[&str]) -> Value {
        if columns == ["*"] {
            return Value::Object(row.clone());
        }
        let mut out = Map::new();
        for c in columns {
            out.insert(c.to_string(), row.get(*c).cloned().unwrap_or(Value::Null));
        }
        Value::Object(out)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn base_url(&self) -> &str {
        FAKE_BASE_URL
    }

    fn with_access_token(&self, _access_token: &str) -> Arc<dyn Backend> {
        Arc::new(self.clone())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Value>, GatewayError> {
        let mut st = self.lock();
        st.calls.push(format!("select {}", query.table));
        let columns = query.column_list();
        st.check_columns(&query.table, columns.iter().copied())?;
        let mut rows: Vec<Row> = st
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches(r, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        Ok(rows
            .iter()
            .map(|r| FakeState::project(r, &columns))
            .collect())
    }

    async fn insert(
        &self,
        table: &str,
        rows: Value,
        returning: Option<&str>,
    ) -> Result<Vec<Value>, GatewayError> {
        let mut st = self.lock();
        st.calls.push(format!("insert {table}"));
        let rows = as_rows(rows);
        for row in &rows {
            st.check_columns(table, row.keys().map(String::as_str))?;
        }
        let created: Vec<Row> = rows.into_iter().map(|r| with_defaults(table, r)).collect();
        st.tables
            .entry(table.to_string())
            .or_default()
            .extend(created.iter().cloned());
        Ok(match returning {
            Some(cols) => {
                let cols: Vec<&str> = cols.split(',').map(str::trim).collect();
                created.iter().map(|r| FakeState::project(r, &cols)).collect()
            }
            None => Vec::new(),
        })
    }

    async fn upsert(&self, table: &str, rows: Value, on_conflict: &str) -> Result<(), GatewayError> {
        let mut st = self.lock();
        st.calls.push(format!("upsert {table}"));
        let rows = as_rows(rows);
        for row in &rows {
            st.check_columns(table, row.keys().map(String::as_str))?;
        }
        let key_cols: Vec<&str> = on_conflict.split(',').map(str::trim).collect();
        let key_of = |r: &Row| -> Vec<String> {
            key_cols
                .iter()
                .map(|c| r.get(*c).map(value_text).unwrap_or_default())
                .collect()
        };
        let list = st.tables.entry(table.to_string()).or_default();
        for row in rows {
            let key = key_of(&row);
            match list.iter_mut().find(|existing| key_of(&**existing) == key) {
                Some(existing) => {
                    for (k, v) in row {
                        existing.insert(k, v);
                    }
                }
                None => list.push(with_defaults(table, row)),
            }
        }
        Ok(())
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<(), GatewayError> {
        let mut st = self.lock();
        st.calls.push(format!("update {}", query.table));
        if st.failing_updates.contains(&query.table) {
            return Err(GatewayError::new(format!("update on {} rejected", query.table)).with_status(500));
        }
        let patch = as_rows(patch).into_iter().next().unwrap_or_default();
        st.check_columns(&query.table, patch.keys().map(String::as_str))?;
        if let Some(rows) = st.tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|r| matches(r, &query.filters)) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, query: &Query) -> Result<(), GatewayError> {
        let mut st = self.lock();
        st.calls.push(format!("delete {}", query.table));
        if let Some(rows) = st.tables.get_mut(&query.table) {
            rows.retain(|r| !matches(r, &query.filters));
        }
        // membership rows follow their class, as the foreign key cascade does
        if query.table == super::CLASSES {
            let remaining: HashSet<String> = st
                .tables
                .get(super::CLASSES)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| r.get("id").map(value_text))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(links) = st.tables.get_mut(super::CLASS_STUDENTS) {
                links.retain(|l| {
                    l.get("class_id")
                        .map(|c| remaining.contains(&value_text(c)))
                        .unwrap_or(false)
                });
            }
        }
        Ok(())
    }

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), GatewayError> {
        let mut st = self.lock();
        st.calls.push(format!("remove_objects {bucket}"));
        if st.fail_object_removal {
            return Err(GatewayError::new("storage unavailable").with_status(503));
        }
        for p in paths {
            st.objects.remove(&format!("{bucket}/{p}"));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn user_for_token(&self, access_token: &str) -> Result<AuthUser, GatewayError> {
        let st = self.lock();
        st.tokens
            .get(access_token)
            .and_then(|id| st.users.get(id))
            .map(|(u, _)| u.clone())
            .ok_or_else(|| GatewayError::new("invalid JWT").with_status(401))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, GatewayError> {
        let mut st = self.lock();
        let found = st
            .users
            .values()
            .find(|(u, pw)| u.email.as_deref() == Some(email) && pw == password)
            .map(|(u, _)| u.clone());
        let user = found.ok_or_else(|| GatewayError::new("Invalid login credentials").with_status(400))?;
        let token = format!("token-{}", user.id);
        st.tokens.insert(token.clone(), user.id.clone());
        Ok(AuthSession {
            access_token: token,
            refresh_token: None,
            user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        self.lock().tokens.remove(access_token);
        Ok(())
    }

    async fn update_password(&self, access_token: &str, password: &str) -> Result<(), GatewayError> {
        let mut st = self.lock();
        let id = st
            .tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| GatewayError::new("invalid JWT").with_status(401))?;
        match st.users.get_mut(&id) {
            Some((_, pw)) => {
                *pw = password.to_string();
                Ok(())
            }
            None => Err(GatewayError::new("User not found").with_status(404)),
        }
    }

    async fn admin_create_user(&self, user: &NewAuthUser) -> Result<AuthUser, GatewayError> {
        let mut st = self.lock();
        st.calls.push("admin_create_user".to_string());
        if st
            .users
            .values()
            .any(|(u, _)| u.email.as_deref() == Some(user.email.as_str()))
        {
            return Err(GatewayError::new(
                "A user with this email address has already been registered",
            )
            .with_status(422));
        }
        let created = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(user.email.clone()),
            user_metadata: user.user_metadata.clone(),
        };
        st.users
            .insert(created.id.clone(), (created.clone(), user.password.clone()));
        Ok(created)
    }
}
