//! Who is signed in, as which role, and whether they must change their
//! password before going anywhere else.

use crate::gateway::{profiles, AuthBackend, AuthUser, Backend, GatewayError};
use crate::local::LocalDataStore;
use crate::models::{Profile, Role};
use serde::Serialize;
use thiserror::Error;

pub const CHANGE_PASSWORD_PATH: &str = "/dashboard/student/change-password";
pub const MIN_PASSWORD_LEN: usize = 8;

/// What the auth service says about the signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub user_id: String,
    pub email: Option<String>,
    pub metadata_name: Option<String>,
    pub must_change_password: bool,
}

impl From<&AuthUser> for SessionInfo {
    fn from(u: &AuthUser) -> Self {
        Self {
            user_id: u.id.clone(),
            email: u.email.clone(),
            metadata_name: u.metadata_name(),
            must_change_password: u.metadata_must_change_password(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user: Profile,
    pub role: Role,
    pub logged_in: bool,
    /// True when identities come from the hosted backend.
    pub remote: bool,
}

impl CurrentUser {
    fn logged_out(remote: bool) -> Self {
        Self {
            user: Profile::placeholder(),
            role: Role::Student,
            logged_in: false,
            remote,
        }
    }

    fn signed_in(user: Profile, remote: bool) -> Self {
        Self {
            role: user.role,
            user,
            logged_in: true,
            remote,
        }
    }
}

/// Reconciles a hosted session with the profile fetched for it.
///
/// A session without its profile still counts as signed in, as a student
/// built from the session itself, so the password gate applies before the
/// profile row exists.
pub fn resolve_remote(
    session: Option<&SessionInfo>,
    profile: Option<&Profile>,
    cached_profiles: &[Profile],
) -> CurrentUser {
    let Some(session) = session else {
        return CurrentUser::logged_out(true);
    };
    let user = match profile {
        Some(p) if p.id == session.user_id => p.clone(),
        None => Profile {
            id: session.user_id.clone(),
            name: session
                .metadata_name
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| session.email.clone().filter(|e| !e.is_empty()))
                .unwrap_or_else(|| "Élève".to_string()),
            email: session.email.clone().unwrap_or_default(),
            role: Role::Student,
            must_change_password: session.must_change_password,
        },
        Some(_) => cached_profiles
            .iter()
            .find(|p| p.id == session.user_id)
            .or_else(|| cached_profiles.first())
            .cloned()
            .unwrap_or_else(Profile::placeholder),
    };
    CurrentUser::signed_in(user, true)
}

/// Identity from the locally stored user id. Nobody counts as signed in
/// until the stored state has been checked once.
pub fn resolve_local(stored_user_id: Option<&str>, users: &[Profile], checked: bool) -> CurrentUser {
    match stored_user_id {
        Some(id) if checked => {
            let user = users
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .unwrap_or_else(Profile::placeholder);
            CurrentUser::signed_in(user, false)
        }
        _ => CurrentUser::logged_out(false),
    }
}

/// Where a signed-in user must be sent instead of `path`, if anywhere.
pub fn password_gate(current: &CurrentUser, path: &str) -> Option<&'static str> {
    let gated = current.logged_in
        && current.role == Role::Student
        && current.user.must_change_password
        && path != CHANGE_PASSWORD_PATH;
    gated.then_some(CHANGE_PASSWORD_PATH)
}

/// Resolves the holder of `access_token` against the hosted backend.
///
/// An unknown or expired token means signed out. A failed profile lookup
/// is treated as a profile not loaded yet.
pub async fn current_remote_user(
    auth: &dyn AuthBackend,
    db: &dyn Backend,
    access_token: Option<&str>,
) -> CurrentUser {
    let Some(token) = access_token else {
        return resolve_remote(None, None, &[]);
    };
    let session = match auth.user_for_token(token).await {
        Ok(u) => SessionInfo::from(&u),
        Err(e) => {
            tracing::debug!(error = %e, "session token rejected");
            return resolve_remote(None, None, &[]);
        }
    };
    let profile = match profiles::fetch_profile(db, &session.user_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(user_id = %session.user_id, error = %e, "profile lookup failed");
            None
        }
    };
    let cached = match &profile {
        Some(p) if p.id != session.user_id => profiles::fetch_profiles(db, None).await.unwrap_or_default(),
        _ => Vec::new(),
    };
    resolve_remote(Some(&session), profile.as_ref(), &cached)
}

/// The signed-in user of a local deployment.
///
/// Local mode is a single-user demo: one identity is stored server-wide,
/// so a sign-in from any client replaces it for every other client.
pub fn current_local_user(store: &LocalDataStore) -> CurrentUser {
    let stored = store.stored_user_id();
    let logged_in = store.is_logged_in();
    resolve_local(stored.as_deref().filter(|_| logged_in), &store.get_users(), true)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PasswordError {
    #[error("Le mot de passe doit contenir au moins 8 caractères.")]
    TooShort,
    #[error("Les deux mots de passe ne correspondent pas.")]
    Mismatch,
}

pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort);
    }
    if password != confirmation {
        return Err(PasswordError::Mismatch);
    }
    Ok(())
}

#[derive(Error, Debug)]
pub enum ChangePasswordError {
    #[error(transparent)]
    Invalid(#[from] PasswordError),
    #[error(transparent)]
    Backend(#[from] GatewayError),
}

/// Validates, updates the password, then clears the profile flag.
///
/// Once the password itself is changed, a failure to clear the flag is
/// logged and the change still succeeds.
pub async fn change_password(
    auth: &dyn AuthBackend,
    db: &dyn Backend,
    access_token: &str,
    user_id: &str,
    password: &str,
    confirmation: &str,
) -> Result<(), ChangePasswordError> {
    validate_new_password(password, confirmation)?;
    auth.update_password(access_token, password).await?;
    if let Err(e) = profiles::set_must_change_password(db, user_id, false).await {
        tracing::warn!(user_id = %user_id, error = %e, "password changed but flag not cleared");
    }
    tracing::info!(user_id = %user_id, "password changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;
    use crate::gateway::PROFILES;
    use serde_json::json;

    fn profile(id: &str, role: Role, flag: bool) -> Profile {
        Profile {
            id: id.into(),
            name: format!("user {id}"),
            email: format!("{id}@svt-lycee.fr"),
            role,
            must_change_password: flag,
        }
    }

    fn session(id: &str, name: Option<&str>, email: Option<&str>, flag: bool) -> SessionInfo {
        SessionInfo {
            user_id: id.into(),
            email: email.map(str::to_string),
            metadata_name: name.map(str::to_string),
            must_change_password: flag,
        }
    }

    #[test]
    fn no_session_is_logged_out() {
        let cur = resolve_remote(None, Some(&profile("u1", Role::Teacher, false)), &[]);
        assert!(!cur.logged_in);
        assert_eq!(cur.user, Profile::placeholder());
    }

    #[test]
    fn matching_profile_wins() {
        let s = session("u1", None, None, true);
        let p = profile("u1", Role::Teacher, false);
        let cur = resolve_remote(Some(&s), Some(&p), &[]);
        assert!(cur.logged_in);
        assert_eq!(cur.role, Role::Teacher);
        assert!(!cur.user.must_change_password);
    }

    #[test]
    fn missing_profile_synthesizes_student_from_session() {
        let s = session("u1", Some("Léa"), Some("lea@x.fr"), true);
        let cur = resolve_remote(Some(&s), None, &[]);
        assert_eq!(cur.role, Role::Student);
        assert_eq!(cur.user.name, "Léa");
        assert!(cur.user.must_change_password);

        let s = session("u1", None, Some("lea@x.fr"), false);
        assert_eq!(resolve_remote(Some(&s), None, &[]).user.name, "lea@x.fr");
        let s = session("u1", None, None, false);
        assert_eq!(resolve_remote(Some(&s), None, &[]).user.name, "Élève");
    }

    #[test]
    fn mismatched_profile_falls_back_to_cache() {
        let s = session("u2", None, None, false);
        let stale = profile("u1", Role::Teacher, false);
        let cached = vec![profile("u0", Role::Admin, false), profile("u2", Role::Student, false)];
        assert_eq!(resolve_remote(Some(&s), Some(&stale), &cached).user.id, "u2");
        let cached = vec![profile("u0", Role::Admin, false)];
        assert_eq!(resolve_remote(Some(&s), Some(&stale), &cached).user.id, "u0");
        assert_eq!(
            resolve_remote(Some(&s), Some(&stale), &[]).user,
            Profile::placeholder()
        );
    }

    #[test]
    fn local_needs_stored_id_and_check() {
        let users = vec![profile("2", Role::Teacher, false)];
        assert!(!resolve_local(Some("2"), &users, false).logged_in);
        assert!(!resolve_local(None, &users, true).logged_in);
        let cur = resolve_local(Some("2"), &users, true);
        assert!(cur.logged_in);
        assert_eq!(cur.role, Role::Teacher);
    }

    #[test]
    fn gate_redirects_flagged_students_except_on_target() {
        let flagged = CurrentUser::signed_in(profile("s1", Role::Student, true), true);
        assert_eq!(password_gate(&flagged, "/dashboard/student"), Some(CHANGE_PASSWORD_PATH));
        assert_eq!(password_gate(&flagged, CHANGE_PASSWORD_PATH), None);

        let teacher = CurrentUser::signed_in(profile("t1", Role::Teacher, true), true);
        assert_eq!(password_gate(&teacher, "/dashboard"), None);
        let clear = CurrentUser::signed_in(profile("s2", Role::Student, false), true);
        assert_eq!(password_gate(&clear, "/dashboard"), None);
    }

    #[test]
    fn password_rules() {
        assert_eq!(validate_new_password("court", "court"), Err(PasswordError::TooShort));
        assert_eq!(
            validate_new_password("assezlong1", "assezlong2"),
            Err(PasswordError::Mismatch)
        );
        assert_eq!(validate_new_password("éééééééé", "éééééééé"), Ok(()));
    }

    #[tokio::test]
    async fn change_password_clears_flag() {
        let db = FakeBackend::new();
        let token = db.add_auth_user("s1", "s1@svt-lycee.fr", "Initial1!", json!({}));
        db.seed(
            PROFILES,
            json!([{ "id": "s1", "name": "S", "email": "s1@svt-lycee.fr", "role": "student", "must_change_password": true }]),
        );
        change_password(&db, &db, &token, "s1", "nouveau-mdp", "nouveau-mdp")
            .await
            .unwrap();
        assert_eq!(db.password_of("s1").as_deref(), Some("nouveau-mdp"));
        let cur = current_remote_user(&db, &db, Some(&token)).await;
        assert!(!cur.user.must_change_password);
    }

    #[tokio::test]
    async fn flag_clear_failure_is_not_surfaced() {
        let db = FakeBackend::new();
        let token = db.add_auth_user("s1", "s1@svt-lycee.fr", "Initial1!", json!({}));
        db.fail_updates_on(PROFILES);
        change_password(&db, &db, &token, "s1", "nouveau-mdp", "nouveau-mdp")
            .await
            .unwrap();
        assert_eq!(db.password_of("s1").as_deref(), Some("nouveau-mdp"));
    }

    #[tokio::test]
    async fn invalid_password_makes_no_call() {
        let db = FakeBackend::new();
        let token = db.add_auth_user("s1", "s1@svt-lycee.fr", "Initial1!", json!({}));
        let err = change_password(&db, &db, &token, "s1", "abc", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ChangePasswordError::Invalid(PasswordError::TooShort)));
        assert_eq!(db.password_of("s1").as_deref(), Some("Initial1!"));
    }

    #[tokio::test]
    async fn remote_user_without_profile_row() {
        let db = FakeBackend::new();
        let token = db.add_auth_user(
            "s1",
            "s1@svt-lycee.fr",
            "x",
            json!({ "name": "Hugo", "must_change_password": true }),
        );
        let cur = current_remote_user(&db, &db, Some(&token)).await;
        assert!(cur.logged_in);
        assert_eq!(cur.user.name, "Hugo");
        assert_eq!(password_gate(&cur, "/dashboard"), Some(CHANGE_PASSWORD_PATH));

        assert!(!current_remote_user(&db, &db, Some("bogus")).await.logged_in);
        assert!(!current_remote_user(&db, &db, None).await.logged_in);
    }
}
