//! Auth routes and the server-side endpoints that need privileged access
//! or the local filesystem.

use crate::capabilities::{capabilities, Action, Capabilities};
use crate::error::AppError;
use crate::gateway::{notifications, profiles, NewAuthUser};
use crate::models::{Profile, Role};
use crate::routes::{caller, current_user, forbidden, AuthHeader};
use crate::session::{self, CurrentUser};
use crate::state::{AppState, StorageMode};
use axum::extract::{Multipart, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Suffix of every generated student password.
pub const INITIAL_PASSWORD_SUFFIX: &str = "Svt2026!";

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ÿ' => 'y',
        other => other,
    }
}

/// Initial password of a new student account, derived from their name.
///
/// `"Léa Martin"` gives `"leamartinSvt2026!"`; a name with nothing usable
/// falls back to `"eleveSvt2026!"`.
pub fn initial_student_password(name: &str) -> String {
    let base: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(fold_accent)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    let base = if base.is_empty() { "eleve" } else { base.as_str() };
    format!("{base}{INITIAL_PASSWORD_SUFFIX}")
}

/// Keeps `[A-Za-z0-9._-]` and replaces everything else with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ---- auth ----

#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginView {
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(flatten)]
    current: CurrentUser,
    capabilities: Capabilities,
}

fn bad_credentials() -> AppError {
    AppError::Unauthorized("Email ou mot de passe incorrect.".into())
}

pub async fn login(State(state): State<AppState>, Json(c): Json<Credentials>) -> Result<Json<LoginView>, AppError> {
    let email = c.email.trim();
    if email.is_empty() || c.password.is_empty() {
        return Err(AppError::validation("Email et mot de passe requis."));
    }
    match &state.mode {
        StorageMode::Remote(r) => {
            let s = r.auth.sign_in_with_password(email, &c.password).await.map_err(|e| {
                tracing::info!(error = %e, "sign-in rejected");
                bad_credentials()
            })?;
            let current = current_user(&state, Some(s.access_token.as_str())).await;
            tracing::info!(user_id = %current.user.id, role = %current.role, "signed in");
            Ok(Json(LoginView {
                access_token: Some(s.access_token),
                refresh_token: s.refresh_token,
                capabilities: capabilities(current.role),
                current,
            }))
        }
        StorageMode::Local(store) => {
            let user = store.authenticate(email, &c.password)?.ok_or_else(bad_credentials)?;
            store.login(&user)?;
            let current = session::current_local_user(store);
            tracing::info!(user_id = %current.user.id, role = %current.role, "signed in locally");
            Ok(Json(LoginView {
                access_token: None,
                refresh_token: None,
                capabilities: capabilities(current.role),
                current,
            }))
        }
    }
}

pub async fn logout(State(state): State<AppState>, auth: AuthHeader) -> Result<Json<Value>, AppError> {
    match &state.mode {
        StorageMode::Remote(r) => {
            if let Some(TypedHeader(header)) = auth {
                if let Err(e) = r.auth.sign_out(header.token()).await {
                    tracing::warn!(error = %e, "sign-out failed");
                }
            }
        }
        StorageMode::Local(store) => store.logout()?,
    }
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct NewPassword {
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirmation: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthHeader,
    Json(body): Json<NewPassword>,
) -> Result<Json<Value>, AppError> {
    let caller = caller(&state, auth).await?;
    match (&state.mode, caller.token.as_deref(), &caller.backend) {
        (StorageMode::Remote(r), Some(token), Some(db)) => {
            session::change_password(
                &*r.auth,
                &**db,
                token,
                caller.id(),
                &body.password,
                &body.confirmation,
            )
            .await?;
        }
        (StorageMode::Local(store), _, _) => {
            session::validate_new_password(&body.password, &body.confirmation)?;
            store.set_user_password(&caller.current.user.email, &body.password)?;
            tracing::info!(user_id = %caller.id(), "local password changed");
        }
        _ => return Err(AppError::Unauthorized("Non authentifié.".into())),
    }
    Ok(Json(json!({ "ok": true })))
}

// ---- privileged endpoints ----

#[derive(Deserialize)]
pub struct NewUserRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

#[derive(Serialize)]
pub struct CreatedUser {
    id: String,
    email: String,
    name: String,
}

/// Creates a student account with a generated password and a profile that
/// forces a password change on first sign-in.
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthHeader,
    Json(body): Json<NewUserRequest>,
) -> Result<Json<CreatedUser>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let email = body.email.trim().to_lowercase();
    let name = body.name.trim().to_string();
    if email.is_empty() || name.is_empty() {
        return Err(AppError::validation("Email et nom requis."));
    }
    let StorageMode::Remote(remote) = &state.mode else {
        return Err(AppError::Unavailable("Création de comptes indisponible en mode local.".into()));
    };
    let admin = remote
        .admin
        .as_ref()
        .ok_or_else(|| AppError::internal("service role key not configured"))?;

    let created = admin
        .auth
        .admin_create_user(&NewAuthUser {
            email: email.clone(),
            password: initial_student_password(&name),
            email_confirm: true,
            user_metadata: json!({ "name": name, "must_change_password": true }),
        })
        .await
        .map_err(|e| {
            if e.is_already_registered() {
                AppError::Conflict("Un compte existe déjà avec cet email.".into())
            } else {
                AppError::Backend(e)
            }
        })?;

    let profile = Profile {
        id: created.id.clone(),
        name: name.clone(),
        email: email.clone(),
        role: Role::Student,
        must_change_password: true,
    };
    profiles::upsert_profile(&*admin.db, &profile).await?;
    tracing::info!(user_id = %created.id, created_by = %caller.id(), "student account created");
    Ok(Json(CreatedUser {
        id: created.id,
        email,
        name,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassNotice {
    #[serde(default)]
    class_id: String,
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    exam_names: Vec<Value>,
    #[serde(default)]
    user_id: String,
}

/// Fans a "grades published" notification out to a class on behalf of
/// `userId`, who must be allowed to publish.
pub async fn create_notifications_for_class(
    State(state): State<AppState>,
    Json(body): Json<ClassNotice>,
) -> Result<Json<Value>, AppError> {
    if body.class_id.is_empty() || body.class_name.is_empty() || body.user_id.is_empty() {
        return Err(AppError::validation("classId, className et userId requis."));
    }
    let StorageMode::Remote(remote) = &state.mode else {
        return Err(AppError::Unavailable("Notifications indisponibles en mode local.".into()));
    };
    let admin = remote
        .admin
        .as_ref()
        .ok_or_else(|| AppError::internal("service role key not configured"))?;

    let allowed = profiles::fetch_profile(&*admin.db, &body.user_id)
        .await?
        .is_some_and(|p| capabilities(p.role).allows(Action::PublishNotifications));
    if !allowed {
        tracing::info!(user_id = %body.user_id, "notification fan-out denied");
        return Err(forbidden());
    }

    // non-string entries are ignored
    let exam_names: Vec<String> = body
        .exam_names
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let created =
        notifications::create_for_class(&*admin.db, &body.class_id, &body.class_name, &exam_names).await?;
    tracing::info!(class_id = %body.class_id, created, "class notified");
    Ok(Json(json!({ "ok": true, "created": created })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    file_url: String,
    file_name: String,
}

/// Stores an uploaded correction under the public directory. Local mode
/// only; the hosted backend has its own storage.
pub async fn upload_correction(
    State(state): State<AppState>,
    auth: AuthHeader,
    mut mp: Multipart,
) -> Result<Json<UploadedFile>, AppError> {
    if state.is_remote() {
        return Err(AppError::Unavailable("Téléversement local indisponible.".into()));
    }
    let caller = caller(&state, auth).await?;
    caller.require(Action::UploadCorrections)?;

    let mut upload = None;
    while let Some(field) = mp.next_field().await.map_err(AppError::internal)? {
        if field.name() != Some("file") {
            continue;
        }
        // a plain text field named "file" is not a file
        let Some(uploaded_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(AppError::internal)?;
        upload = Some((uploaded_name, bytes));
    }
    let (uploaded_name, bytes) = upload.ok_or_else(|| AppError::validation("Fichier manquant"))?;

    let file_name = format!("{}-{}", Utc::now().timestamp_millis(), sanitize_file_name(&uploaded_name));
    let dir = state.corrections_dir();
    tokio::fs::create_dir_all(&dir).await.map_err(AppError::internal)?;
    tokio::fs::write(dir.join(&file_name), &bytes)
        .await
        .map_err(AppError::internal)?;
    tracing::info!(file = %file_name, size = bytes.len(), "correction uploaded");

    Ok(Json(UploadedFile {
        file_url: format!("/corrections/{file_name}"),
        file_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_from_name() {
        assert_eq!(initial_student_password("Léa Martin"), "leamartinSvt2026!");
        assert_eq!(initial_student_password("  François  Dupré "), "francoisdupreSvt2026!");
        assert_eq!(initial_student_password("Zoé-Anne O'Neil 2"), "zoeanneoneil2Svt2026!");
    }

    #[test]
    fn password_falls_back_when_nothing_usable() {
        assert_eq!(initial_student_password(""), "eleveSvt2026!");
        assert_eq!(initial_student_password(" - ' "), "eleveSvt2026!");
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("DS 1 (corrigé).pdf"), "DS_1__corrig__.pdf");
        assert_eq!(sanitize_file_name("tp_2-final.pdf"), "tp_2-final.pdf");
        assert_eq!(sanitize_file_name("../etc/passwd"), ".._etc_passwd");
    }
}
