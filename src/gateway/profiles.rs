use super::{parse_rows, Backend, GatewayError, Query, PROFILES};
use crate::models::{Profile, Role};
use serde::Deserialize;
use serde_json::{json, Value};

const PROFILE_COLUMNS: &str = "id, name, email, role, must_change_password";
// Deployments created before the password-change flag existed.
const LEGACY_PROFILE_COLUMNS: &str = "id, name, email, role";

const FLAG_COLUMN: &str = "must_change_password";

#[derive(Deserialize)]
struct ProfileRow {
    id: String,
    name: String,
    email: String,
    role: Role,
    #[serde(default)]
    must_change_password: Option<bool>,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Profile {
            id: r.id,
            name: r.name,
            email: r.email,
            role: r.role,
            must_change_password: r.must_change_password.unwrap_or(false),
        }
    }
}

fn profiles_query(columns: &str, role: Option<Role>) -> Query {
    let mut q = Query::table(PROFILES).select(columns);
    if let Some(role) = role {
        q = q.eq("role", role.as_str());
    }
    q.order("name", true)
}

/// Profiles ordered by name, optionally limited to one role.
pub async fn fetch_profiles(db: &dyn Backend, role: Option<Role>) -> Result<Vec<Profile>, GatewayError> {
    let rows = match db.select(&profiles_query(PROFILE_COLUMNS, role)).await {
        Ok(rows) => rows,
        Err(e) if e.is_missing_column(FLAG_COLUMN) => {
            tracing::debug!(error = %e, "profiles without password flag, retrying");
            db.select(&profiles_query(LEGACY_PROFILE_COLUMNS, role))
                .await?
        }
        Err(e) => return Err(e),
    };
    let rows: Vec<ProfileRow> = parse_rows(rows)?;
    Ok(rows.into_iter().map(Profile::from).collect())
}

pub async fn fetch_profile(db: &dyn Backend, id: &str) -> Result<Option<Profile>, GatewayError> {
    let query = |columns: &str| Query::table(PROFILES).select(columns).eq("id", id);
    let rows = match db.select(&query(PROFILE_COLUMNS)).await {
        Ok(rows) => rows,
        Err(e) if e.is_missing_column(FLAG_COLUMN) => {
            tracing::debug!(error = %e, "profile without password flag, retrying");
            db.select(&query(LEGACY_PROFILE_COLUMNS)).await?
        }
        Err(e) => return Err(e),
    };
    let rows: Vec<ProfileRow> = parse_rows(rows)?;
    Ok(rows.into_iter().next().map(Profile::from))
}

/// Creates or replaces a profile keyed on id.
///
/// On a backend without the flag column the profile is written without it.
pub async fn upsert_profile(db: &dyn Backend, profile: &Profile) -> Result<(), GatewayError> {
    let row = json!({
        "id": profile.id,
        "name": profile.name,
        "email": profile.email,
        "role": profile.role,
    });
    let mut with_flag = row.clone();
    with_flag[FLAG_COLUMN] = Value::Bool(profile.must_change_password);
    match db.upsert(PROFILES, with_flag, "id").await {
        Err(e) if e.is_missing_column(FLAG_COLUMN) => {
            tracing::debug!(error = %e, "profile upsert without password flag");
            db.upsert(PROFILES, row, "id").await
        }
        other => other,
    }
}

/// Sets the password-change flag. A backend without the column has nothing
/// to clear, so that case succeeds.
pub async fn set_must_change_password(db: &dyn Backend, id: &str, value: bool) -> Result<(), GatewayError> {
    match db
        .update(&Query::table(PROFILES).eq("id", id), json!({ FLAG_COLUMN: value }))
        .await
    {
        Err(e) if e.is_missing_column(FLAG_COLUMN) => {
            tracing::warn!(profile_id = %id, "profiles table has no password flag column");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;

    fn seed(db: &FakeBackend) {
        db.seed(
            PROFILES,
            json!([
                { "id": "t1", "name": "Marie Dupont", "email": "marie.dupont@svt-lycee.fr", "role": "teacher" },
                { "id": "s2", "name": "Emma Bernard", "email": "emma.bernard@svt-lycee.fr", "role": "student", "must_change_password": true },
                { "id": "s1", "name": "Lucas Martin", "email": "lucas.martin@svt-lycee.fr", "role": "student" }
            ]),
        );
    }

    #[tokio::test]
    async fn lists_by_role_sorted_by_name() {
        let db = FakeBackend::new();
        seed(&db);
        let students = fetch_profiles(&db, Some(Role::Student)).await.unwrap();
        let names: Vec<&str> = students.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Emma Bernard", "Lucas Martin"]);
        assert!(students[0].must_change_password);
        assert!(!students[1].must_change_password);
        assert_eq!(fetch_profiles(&db, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_flag_column_falls_back_to_false() {
        let db = FakeBackend::new();
        seed(&db);
        db.drop_column(PROFILES, FLAG_COLUMN);

        let all = fetch_profiles(&db, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|p| !p.must_change_password));

        let one = fetch_profile(&db, "s2").await.unwrap().unwrap();
        assert_eq!(one.role, Role::Student);
        assert!(!one.must_change_password);
    }

    #[tokio::test]
    async fn unknown_profile_is_none() {
        let db = FakeBackend::new();
        seed(&db);
        assert!(fetch_profile(&db, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_retries_without_flag() {
        let db = FakeBackend::new();
        db.drop_column(PROFILES, FLAG_COLUMN);
        let p = Profile {
            id: "s9".into(),
            name: "Léa Moreau".into(),
            email: "lea.moreau@svt-lycee.fr".into(),
            role: Role::Student,
            must_change_password: true,
        };
        upsert_profile(&db, &p).await.unwrap();
        let stored = fetch_profile(&db, "s9").await.unwrap().unwrap();
        assert_eq!(stored.name, "Léa Moreau");
        assert!(!stored.must_change_password);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_profile() {
        let db = FakeBackend::new();
        seed(&db);
        let mut p = fetch_profile(&db, "s1").await.unwrap().unwrap();
        p.must_change_password = true;
        upsert_profile(&db, &p).await.unwrap();
        assert_eq!(db.rows(PROFILES).len(), 3);
        assert!(fetch_profile(&db, "s1").await.unwrap().unwrap().must_change_password);
    }

    #[tokio::test]
    async fn clearing_flag_tolerates_missing_column() {
        let db = FakeBackend::new();
        seed(&db);
        set_must_change_password(&db, "s2", false).await.unwrap();
        assert!(!fetch_profile(&db, "s2").await.unwrap().unwrap().must_change_password);

        db.drop_column(PROFILES, FLAG_COLUMN);
        set_must_change_password(&db, "s2", false).await.unwrap();
    }
}
