use crate::capabilities::{capabilities, Action, Capabilities};
use crate::endpoints;
use crate::error::AppError;
use crate::facade::{
    ClassGrades, ClassGradesFacade, ClassRoster, ClassRosterFacade, Classes, ClassesFacade, Corrections,
    CorrectionsFacade, FacadeState, Notifications, NotificationsFacade, StudentGrades, StudentGradesFacade,
};
use crate::gateway::{profiles, Backend};
use crate::grades::{self, GradeSheet, GradeSummary, SheetAverages};
use crate::models::{ClassItem, ClassStudent, CorrectionItem, GradeEntry, NewCorrection, NotificationItem, Profile, Role};
use crate::session::{self, CurrentUser};
use crate::state::{AppState, StorageMode};
use crate::store::{DataStore, StoreError};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Bearer token of the caller, when sent.
pub(crate) type AuthHeader = Option<TypedHeader<Authorization<Bearer>>>;

/// The full application: API routes, static files and the HTTP layers.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(router(state))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

pub fn router(state: AppState) -> Router {
    let public_dir = state.public_dir.clone();
    Router::new()
        // session
        .route("/api/session", get(get_session))
        .route("/api/auth/login", post(endpoints::login))
        .route("/api/auth/logout", post(endpoints::logout))
        .route("/api/auth/change-password", post(endpoints::change_password))
        // privileged server endpoints
        .route("/api/users/create", post(endpoints::create_user))
        .route(
            "/api/notifications/create-for-class",
            post(endpoints::create_notifications_for_class),
        )
        .route("/api/corrections/upload", post(endpoints::upload_correction))
        // classes, rosters, grades
        .route("/api/classes", get(list_classes).post(create_class))
        .route("/api/classes/:id", put(rename_class).delete(delete_class))
        .route("/api/classes/:id/students", get(list_class_students).post(add_class_student))
        .route("/api/classes/:id/students/:student_id", delete(remove_class_student))
        .route("/api/classes/:id/grades", get(class_grades).post(submit_grades))
        .route("/api/students", get(list_students).post(add_student))
        .route("/api/students/:id", delete(remove_student))
        .route("/api/students/:id/grades", get(student_grades))
        // corrections and notifications
        .route("/api/corrections", get(list_corrections).post(add_correction))
        .route("/api/corrections/:id", delete(delete_correction))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_notifications_read))
        .route("/api/notifications/:id/read", post(mark_notification_read))
        // front-end assets and uploaded corrections
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}

/// A signed-in caller with the store scoped to them.
pub(crate) struct Caller {
    pub current: CurrentUser,
    pub token: Option<String>,
    pub store: Option<Arc<dyn DataStore>>,
    /// Hosted backend acting as the caller; `None` in local mode.
    pub backend: Option<Arc<dyn Backend>>,
}

impl Caller {
    pub fn id(&self) -> &str {
        &self.current.user.id
    }

    pub fn capabilities(&self) -> Capabilities {
        capabilities(self.current.role)
    }

    pub fn require(&self, action: Action) -> Result<(), AppError> {
        if self.capabilities().allows(action) {
            Ok(())
        } else {
            tracing::info!(user_id = %self.id(), role = %self.current.role, ?action, "action denied");
            Err(forbidden())
        }
    }
}

pub(crate) fn forbidden() -> AppError {
    AppError::Forbidden("Non autorisé.".into())
}

fn bearer_token(auth: AuthHeader) -> Option<String> {
    auth.map(|TypedHeader(header)| header.token().to_string())
}

fn scoped_backend(state: &AppState, token: Option<&str>) -> Option<Arc<dyn Backend>> {
    match &state.mode {
        StorageMode::Remote(r) => Some(match token {
            Some(t) => r.db.with_access_token(t),
            None => r.db.clone(),
        }),
        StorageMode::Local(_) => None,
    }
}

pub(crate) async fn current_user(state: &AppState, token: Option<&str>) -> CurrentUser {
    match &state.mode {
        StorageMode::Remote(r) => {
            let db = match token {
                Some(t) => r.db.with_access_token(t),
                None => r.db.clone(),
            };
            session::current_remote_user(&*r.auth, &*db, token).await
        }
        StorageMode::Local(store) => session::current_local_user(store),
    }
}

/// Resolves the caller; anyone not signed in is rejected.
pub(crate) async fn caller(state: &AppState, auth: AuthHeader) -> Result<Caller, AppError> {
    let token = bearer_token(auth);
    let current = current_user(state, token.as_deref()).await;
    if !current.logged_in {
        return Err(AppError::Unauthorized("Non authentifié.".into()));
    }
    Ok(Caller {
        store: state.facade_source(token.as_deref()),
        backend: scoped_backend(state, token.as_deref()),
        current,
        token,
    })
}

// ---- session ----

#[derive(Deserialize)]
struct SessionQuery {
    path: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    #[serde(flatten)]
    current: CurrentUser,
    capabilities: Option<Capabilities>,
    redirect_to: Option<&'static str>,
}

async fn get_session(
    State(state): State<AppState>,
    Query(q): Query<SessionQuery>,
    auth: AuthHeader,
) -> Json<SessionView> {
    let token = bearer_token(auth);
    let current = current_user(&state, token.as_deref()).await;
    let redirect_to = q
        .path
        .as_deref()
        .and_then(|path| session::password_gate(&current, path));
    Json(SessionView {
        capabilities: current.logged_in.then(|| capabilities(current.role)),
        redirect_to,
        current,
    })
}

// ---- classes ----

#[derive(Deserialize)]
struct ClassName {
    #[serde(default)]
    name: String,
}

fn class_name(body: &ClassName) -> Result<&str, AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Nom de classe requis."));
    }
    Ok(name)
}

async fn list_classes(
    State(state): State<AppState>,
    auth: AuthHeader,
) -> Result<Json<FacadeState<ClassItem>>, AppError> {
    let caller = caller(&state, auth).await?;
    let facade = ClassesFacade::open(caller.store.clone(), Classes).await;
    Ok(Json(facade.into_state()))
}

async fn create_class(
    State(state): State<AppState>,
    auth: AuthHeader,
    Json(body): Json<ClassName>,
) -> Result<(StatusCode, Json<FacadeState<ClassItem>>), AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageClasses)?;
    let name = class_name(&body)?;
    let mut facade = ClassesFacade::open(caller.store.clone(), Classes).await;
    if let Some(created) = facade.add_class(name, caller.id()).await? {
        tracing::info!(class_id = %created.id, "class created");
    }
    Ok((StatusCode::CREATED, Json(facade.into_state())))
}

async fn rename_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
    Json(body): Json<ClassName>,
) -> Result<Json<FacadeState<ClassItem>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageClasses)?;
    let name = class_name(&body)?;
    let mut facade = ClassesFacade::open(caller.store.clone(), Classes).await;
    facade.rename_class(&id, name).await?;
    Ok(Json(facade.into_state()))
}

async fn delete_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<Json<FacadeState<ClassItem>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageClasses)?;
    let mut facade = ClassesFacade::open(caller.store.clone(), Classes).await;
    facade.delete_class(&id).await?;
    Ok(Json(facade.into_state()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Membership {
    student_id: String,
}

async fn list_class_students(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<Json<FacadeState<ClassStudent>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let facade = ClassRosterFacade::open(caller.store.clone(), ClassRoster { class_id: id }).await;
    Ok(Json(facade.into_state()))
}

async fn add_class_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
    Json(body): Json<Membership>,
) -> Result<Json<FacadeState<ClassStudent>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let mut facade = ClassRosterFacade::open(caller.store.clone(), ClassRoster { class_id: id }).await;
    facade.add_student(&body.student_id).await?;
    Ok(Json(facade.into_state()))
}

async fn remove_class_student(
    State(state): State<AppState>,
    Path((id, student_id)): Path<(String, String)>,
    auth: AuthHeader,
) -> Result<Json<FacadeState<ClassStudent>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let mut facade = ClassRosterFacade::open(caller.store.clone(), ClassRoster { class_id: id }).await;
    facade.remove_student(&student_id).await?;
    Ok(Json(facade.into_state()))
}

// ---- grades ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassGradesView {
    grades: FacadeState<GradeEntry>,
    averages: SheetAverages,
}

async fn class_grades(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<Json<ClassGradesView>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::EnterGrades)?;
    let facade = ClassGradesFacade::open(caller.store.clone(), ClassGrades { class_id: id }).await;
    Ok(Json(ClassGradesView {
        averages: grades::sheet_averages(facade.data()),
        grades: facade.into_state(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeSubmission {
    #[serde(flatten)]
    sheet: GradeSheet,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    notify: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionView {
    grades: FacadeState<GradeEntry>,
    saved: usize,
    notified: usize,
}

// A failed range check on the backend reads better as the note rule.
fn grade_save_error(e: StoreError) -> AppError {
    let msg = e.to_string();
    if msg.contains("check") || msg.contains("constraint") {
        AppError::validation("Une note doit être entre 0 et 20.")
    } else {
        e.into()
    }
}

/// Validates the whole sheet, saves it, then tells the class.
///
/// Every cell is checked before anything is sent. The notification is best
/// effort: its failure is logged and the save still succeeds.
async fn submit_grades(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
    Json(body): Json<GradeSubmission>,
) -> Result<Json<SubmissionView>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::EnterGrades)?;

    let sheet = &body.sheet;
    let mut typed: Vec<String> = sheet.notes.keys().cloned().collect();
    typed.sort();
    let date = sheet
        .date
        .clone()
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    let entries = sheet.entries(&typed, &date)?;

    let roster = ClassRosterFacade::open(caller.store.clone(), ClassRoster { class_id: id.clone() }).await;
    if let Some(e) = roster.error() {
        return Err(AppError::Internal(e.to_string()));
    }
    let members: HashSet<&str> = roster.data().iter().map(|s| s.id.as_str()).collect();
    let entries: Vec<GradeEntry> = entries
        .into_iter()
        .filter(|e| members.contains(e.student_id.as_str()))
        .collect();

    let mut grades = ClassGradesFacade::open(caller.store.clone(), ClassGrades { class_id: id.clone() }).await;
    grades.set_grades(&entries).await.map_err(grade_save_error)?;
    tracing::info!(class_id = %id, saved = entries.len(), "grades saved");

    let mut notified = 0;
    if body.notify.unwrap_or(true) && !entries.is_empty() {
        let class_name = match body.class_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => Some(n.to_string()),
            None => ClassesFacade::open(caller.store.clone(), Classes)
                .await
                .data()
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone()),
        };
        let notifier = state.privileged_store().or_else(|| caller.store.clone());
        if let (Some(class_name), Some(notifier)) = (class_name, notifier) {
            match notifier.notify_class(&id, &class_name, &sheet.exam_names).await {
                Ok(n) => notified = n,
                Err(e) => tracing::warn!(class_id = %id, error = %e, "grade notification failed"),
            }
        }
    }

    Ok(Json(SubmissionView {
        saved: entries.len(),
        notified,
        grades: grades.into_state(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentGradesView {
    grades: FacadeState<GradeEntry>,
    summary: GradeSummary,
}

async fn student_grades(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<Json<StudentGradesView>, AppError> {
    let caller = caller(&state, auth).await?;
    let caps = caller.capabilities();
    let own = caller.id() == id && caps.allows(Action::ViewOwnGrades);
    if !own && !caps.allows(Action::EnterGrades) {
        return Err(forbidden());
    }
    let facade = StudentGradesFacade::open(caller.store.clone(), StudentGrades { student_id: id }).await;
    Ok(Json(StudentGradesView {
        summary: grades::summarize(facade.data()),
        grades: facade.into_state(),
    }))
}

// ---- student accounts ----

#[derive(Deserialize)]
struct NewStudent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

async fn list_students(State(state): State<AppState>, auth: AuthHeader) -> Result<Json<Vec<Profile>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let students = match (&state.mode, &caller.backend) {
        (StorageMode::Local(store), _) => store.get_students(),
        (StorageMode::Remote(_), Some(db)) => profiles::fetch_profiles(&**db, Some(Role::Student)).await?,
        (StorageMode::Remote(_), None) => Vec::new(),
    };
    Ok(Json(students))
}

async fn add_student(
    State(state): State<AppState>,
    auth: AuthHeader,
    Json(body): Json<NewStudent>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let store = state
        .local_store()
        .ok_or_else(|| AppError::Unavailable("Utilisez /api/users/create avec le backend hébergé.".into()))?;
    let student = store.add_student(&body.name, &body.email)?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn remove_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<StatusCode, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ManageStudents)?;
    let store = state
        .local_store()
        .ok_or_else(|| AppError::Unavailable("Suppression de comptes non disponible avec le backend hébergé.".into()))?;
    store.remove_student(&id)?;
    tracing::info!(student_id = %id, "local student removed");
    Ok(StatusCode::NO_CONTENT)
}

// ---- corrections ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorrectionFilter {
    class_id: Option<String>,
}

async fn list_corrections(
    State(state): State<AppState>,
    Query(filter): Query<CorrectionFilter>,
    auth: AuthHeader,
) -> Result<Json<FacadeState<CorrectionItem>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::ViewCorrections)?;
    // students only see their own classes' corrections
    let visible_classes = if caller.capabilities().allows(Action::UploadCorrections) {
        None
    } else {
        let classes = ClassesFacade::open(caller.store.clone(), Classes).await;
        Some(
            classes
                .data()
                .iter()
                .filter(|c| c.student_ids.iter().any(|s| s == caller.id()))
                .map(|c| c.id.clone())
                .collect(),
        )
    };
    let facade = CorrectionsFacade::open(
        caller.store.clone(),
        Corrections {
            class_id: filter.class_id.filter(|c| !c.is_empty()),
            visible_classes,
        },
    )
    .await;
    Ok(Json(facade.into_state()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedCorrection {
    correction: CorrectionItem,
    corrections: FacadeState<CorrectionItem>,
}

async fn add_correction(
    State(state): State<AppState>,
    auth: AuthHeader,
    Json(mut body): Json<NewCorrection>,
) -> Result<(StatusCode, Json<CreatedCorrection>), AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::UploadCorrections)?;
    if body.title.trim().is_empty() || body.file_path.trim().is_empty() {
        return Err(AppError::validation("Titre et fichier requis."));
    }
    body.uploaded_by = caller.id().to_string();
    let mut facade = CorrectionsFacade::open(caller.store.clone(), Corrections::all()).await;
    let correction = facade.add_correction(&body).await?;
    tracing::info!(correction_id = %correction.id, "correction added");
    Ok((
        StatusCode::CREATED,
        Json(CreatedCorrection {
            correction,
            corrections: facade.into_state(),
        }),
    ))
}

async fn delete_correction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<Json<FacadeState<CorrectionItem>>, AppError> {
    let caller = caller(&state, auth).await?;
    caller.require(Action::UploadCorrections)?;
    let mut facade = CorrectionsFacade::open(caller.store.clone(), Corrections::all()).await;
    let file_path = facade
        .data()
        .iter()
        .find(|c| c.id == id)
        .and_then(|c| c.file_path.clone());
    facade.delete_correction(&id, file_path.as_deref()).await?;
    Ok(Json(facade.into_state()))
}

// ---- notifications ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationsView {
    #[serde(flatten)]
    state: FacadeState<NotificationItem>,
    unread_count: usize,
}

impl From<NotificationsFacade> for NotificationsView {
    fn from(f: NotificationsFacade) -> Self {
        Self {
            unread_count: f.unread_count(),
            state: f.into_state(),
        }
    }
}

async fn notifications_of(caller: &Caller) -> NotificationsFacade {
    NotificationsFacade::open(
        caller.store.clone(),
        Notifications {
            user_id: caller.id().to_string(),
        },
    )
    .await
}

async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthHeader,
) -> Result<Json<NotificationsView>, AppError> {
    let caller = caller(&state, auth).await?;
    Ok(Json(notifications_of(&caller).await.into()))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthHeader,
) -> Result<Json<NotificationsView>, AppError> {
    let caller = caller(&state, auth).await?;
    let mut facade = notifications_of(&caller).await;
    facade.mark_read(&id).await?;
    Ok(Json(facade.into()))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    auth: AuthHeader,
) -> Result<Json<NotificationsView>, AppError> {
    let caller = caller(&state, auth).await?;
    let mut facade = notifications_of(&caller).await;
    facade.mark_all_read().await?;
    Ok(Json(facade.into()))
}
