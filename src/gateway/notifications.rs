use super::{classes, parse_rows, Backend, GatewayError, Query, NOTIFICATIONS};
use crate::models::NotificationItem;
use serde::{Deserialize, Serialize};
use serde_json::json;

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, read, created_at";

pub const GRADES_PUBLISHED_TITLE: &str = "Nouvelles notes disponibles";

#[derive(Deserialize)]
struct NotificationRow {
    id: String,
    user_id: String,
    title: String,
    message: String,
    read: bool,
    created_at: String,
}

impl From<NotificationRow> for NotificationItem {
    fn from(r: NotificationRow) -> Self {
        NotificationItem {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            message: r.message,
            read: r.read,
            created_at: r.created_at,
        }
    }
}

#[derive(Serialize)]
struct NewNotification<'a> {
    user_id: &'a str,
    title: &'a str,
    message: &'a str,
}

/// Body of the "grades published" notice.
pub fn grades_published_message(class_name: &str, exam_names: &[String]) -> String {
    let exams = if exam_names.is_empty() {
        "les évaluations".to_string()
    } else {
        exam_names.join(", ")
    };
    format!(
        "Les notes du {exams} pour la classe {class_name} sont disponibles dans votre espace."
    )
}

/// Notifications of one recipient, newest first.
pub async fn fetch_notifications(
    db: &dyn Backend,
    user_id: &str,
) -> Result<Vec<NotificationItem>, GatewayError> {
    let rows: Vec<NotificationRow> = parse_rows(
        db.select(
            &Query::table(NOTIFICATIONS)
                .select(NOTIFICATION_COLUMNS)
                .eq("user_id", user_id)
                .order("created_at", false),
        )
        .await?,
    )?;
    Ok(rows.into_iter().map(NotificationItem::from).collect())
}

pub async fn mark_read(db: &dyn Backend, id: &str) -> Result<(), GatewayError> {
    db.update(&Query::table(NOTIFICATIONS).eq("id", id), json!({ "read": true }))
        .await
}

pub async fn mark_all_read(db: &dyn Backend, user_id: &str) -> Result<(), GatewayError> {
    db.update(
        &Query::table(NOTIFICATIONS)
            .eq("user_id", user_id)
            .eq("read", "false"),
        json!({ "read": true }),
    )
    .await
}

/// One "grades published" notification per member of the class.
///
/// Returns how many were created; a class without members sends nothing.
pub async fn create_for_class(
    db: &dyn Backend,
    class_id: &str,
    class_name: &str,
    exam_names: &[String],
) -> Result<usize, GatewayError> {
    let members = classes::class_student_ids(db, class_id).await?;
    if members.is_empty() {
        tracing::info!(class_id = %class_id, "no class members, notifications skipped");
        return Ok(0);
    }
    let message = grades_published_message(class_name, exam_names);
    let rows: Vec<NewNotification<'_>> = members
        .iter()
        .map(|user_id| NewNotification {
            user_id,
            title: GRADES_PUBLISHED_TITLE,
            message: &message,
        })
        .collect();
    let rows = serde_json::to_value(&rows)
        .map_err(|e| GatewayError::new(format!("notification rows: {e}")))?;
    db.insert(NOTIFICATIONS, rows, None).await?;
    Ok(members.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;
    use crate::gateway::CLASS_STUDENTS;

    #[test]
    fn message_names_exams_and_class() {
        assert_eq!(
            grades_published_message("1ère S", &["DS1".into(), "TP2".into()]),
            "Les notes du DS1, TP2 pour la classe 1ère S sont disponibles dans votre espace."
        );
        assert_eq!(
            grades_published_message("1ère S", &[]),
            "Les notes du les évaluations pour la classe 1ère S sont disponibles dans votre espace."
        );
    }

    #[tokio::test]
    async fn fans_out_one_row_per_member() {
        let db = FakeBackend::new();
        db.seed(
            CLASS_STUDENTS,
            json!([
                { "class_id": "c1", "user_id": "s1" },
                { "class_id": "c1", "user_id": "s2" },
                { "class_id": "c2", "user_id": "s3" }
            ]),
        );
        let n = create_for_class(&db, "c1", "1ère S", &["DS1".into()])
            .await
            .unwrap();
        assert_eq!(n, 2);

        let rows = db.rows(NOTIFICATIONS);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["title"] == GRADES_PUBLISHED_TITLE));
        assert_eq!(rows[0]["message"], rows[1]["message"]);
    }

    #[tokio::test]
    async fn empty_class_sends_nothing() {
        let db = FakeBackend::new();
        let n = create_for_class(&db, "c1", "1ère S", &[]).await.unwrap();
        assert_eq!(n, 0);
        assert!(!db.calls().iter().any(|c| c.starts_with("insert")));
    }

    #[tokio::test]
    async fn mark_read_single_and_all() {
        let db = FakeBackend::new();
        db.seed(
            NOTIFICATIONS,
            json!([
                { "id": "n1", "user_id": "s1", "title": "t", "message": "m", "created_at": "2026-01-01T10:00:00Z" },
                { "id": "n2", "user_id": "s1", "title": "t", "message": "m", "created_at": "2026-01-02T10:00:00Z" },
                { "id": "n3", "user_id": "s2", "title": "t", "message": "m", "created_at": "2026-01-03T10:00:00Z" }
            ]),
        );

        let list = fetch_notifications(&db, "s1").await.unwrap();
        let ids: Vec<&str> = list.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
        assert!(list.iter().all(|n| !n.read));

        mark_read(&db, "n1").await.unwrap();
        let list = fetch_notifications(&db, "s1").await.unwrap();
        assert_eq!(list.iter().filter(|n| n.read).count(), 1);

        mark_all_read(&db, "s1").await.unwrap();
        assert!(fetch_notifications(&db, "s1")
            .await
            .unwrap()
            .iter()
            .all(|n| n.read));
        assert!(!fetch_notifications(&db, "s2").await.unwrap()[0].read);
    }
}
