use super::{AuthBackend, AuthSession, AuthUser, Backend, GatewayError, NewAuthUser, Query};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// REST/storage/auth client for the hosted backend.
///
/// `api_key` goes in the `apikey` header of every request; the bearer token
/// is the caller's access token when scoped, the key itself otherwise.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    bearer: Option<String>,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bearer: None,
        })
    }

    pub fn scoped(&self, access_token: &str) -> Self {
        Self {
            bearer: Some(access_token.to_string()),
            ..self.clone()
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self.bearer.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    fn rest(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
    }

    fn auth_request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/auth/v1{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
    }
}

/// Turns a non-2xx response into a [`GatewayError`] carrying the backend's
/// own message (REST, storage and auth each name the field differently).
async fn check(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("backend responded {status}"));
    let mut err = GatewayError::new(message).with_status(status.as_u16());
    if let Some(code) = body.get("code").and_then(|c| match c {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }) {
        err = err.with_code(code);
    }
    tracing::debug!(status = %status, error = %err, "backend request failed");
    Err(err)
}

async fn json_rows(resp: Response) -> Result<Vec<Value>, GatewayError> {
    let body: Value = check(resp).await?.json().await?;
    Ok(match body {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

#[async_trait]
impl Backend for SupabaseClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_access_token(&self, access_token: &str) -> Arc<dyn Backend> {
        Arc::new(self.scoped(access_token))
    }

    async fn select(&self, query: &Query) -> Result<Vec<Value>, GatewayError> {
        let resp = self
            .rest(Method::GET, &query.table)
            .query(&query.params())
            .send()
            .await?;
        json_rows(resp).await
    }

    async fn insert(
        &self,
        table: &str,
        rows: Value,
        returning: Option<&str>,
    ) -> Result<Vec<Value>, GatewayError> {
        let mut req = self.rest(Method::POST, table).json(&rows);
        match returning {
            Some(cols) => {
                let cols: Vec<&str> = cols.split(',').map(str::trim).collect();
                req = req
                    .header("Prefer", "return=representation")
                    .query(&[("select", cols.join(","))]);
                json_rows(req.send().await?).await
            }
            None => {
                check(req.header("Prefer", "return=minimal").send().await?).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn upsert(&self, table: &str, rows: Value, on_conflict: &str) -> Result<(), GatewayError> {
        let resp = self
            .rest(Method::POST, table)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", on_conflict)])
            .json(&rows)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<(), GatewayError> {
        let resp = self
            .rest(Method::PATCH, &query.table)
            .header("Prefer", "return=minimal")
            .query(&query.filter_params())
            .json(&patch)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete(&self, query: &Query) -> Result<(), GatewayError> {
        let resp = self
            .rest(Method::DELETE, &query.table)
            .query(&query.filter_params())
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<(), GatewayError> {
        let resp = self
            .request(Method::DELETE, &format!("/storage/v1/object/{bucket}"))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for SupabaseClient {
    async fn user_for_token(&self, access_token: &str) -> Result<AuthUser, GatewayError> {
        let resp = self
            .auth_request(Method::GET, "/user", access_token)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, GatewayError> {
        let resp = self
            .auth_request(Method::POST, "/token", &self.api_key)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let resp = self
            .auth_request(Method::POST, "/logout", access_token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn update_password(&self, access_token: &str, password: &str) -> Result<(), GatewayError> {
        let resp = self
            .auth_request(Method::PUT, "/user", access_token)
            .json(&json!({ "password": password }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn admin_create_user(&self, user: &NewAuthUser) -> Result<AuthUser, GatewayError> {
        let resp = self
            .auth_request(Method::POST, "/admin/users", &self.api_key)
            .json(user)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}
