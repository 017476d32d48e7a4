use super::{parse_rows, Backend, GatewayError, Query, CLASSES, CLASS_STUDENTS, PROFILES};
use crate::models::{ClassItem, ClassStudent};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

#[derive(Deserialize)]
struct ClassRow {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct MembershipRow {
    class_id: String,
    user_id: String,
}

/// Classes sorted by name, each with its member ids.
pub async fn fetch_classes(db: &dyn Backend) -> Result<Vec<ClassItem>, GatewayError> {
    let rows: Vec<ClassRow> = parse_rows(
        db.select(&Query::table(CLASSES).select("id, name").order("name", true))
            .await?,
    )?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let links: Vec<MembershipRow> = parse_rows(
        db.select(
            &Query::table(CLASS_STUDENTS)
                .select("class_id, user_id")
                .in_list("class_id", &ids),
        )
        .await?,
    )?;

    let mut members: HashMap<String, Vec<String>> =
        ids.iter().map(|id| (id.clone(), Vec::new())).collect();
    for link in links {
        if let Some(list) = members.get_mut(&link.class_id) {
            list.push(link.user_id);
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| ClassItem {
            student_ids: members.remove(&row.id).unwrap_or_default(),
            id: row.id,
            name: row.name,
        })
        .collect())
}

pub async fn insert_class(
    db: &dyn Backend,
    name: &str,
    created_by: &str,
) -> Result<ClassItem, GatewayError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GatewayError::new("class name is required"));
    }
    if created_by.is_empty() {
        return Err(GatewayError::new("class creator is required"));
    }
    let created: Vec<ClassRow> = parse_rows(
        db.insert(
            CLASSES,
            json!({ "name": name, "created_by": created_by }),
            Some("id, name"),
        )
        .await?,
    )?;
    let row = created
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::new("class insert returned no row"))?;
    Ok(ClassItem {
        id: row.id,
        name: row.name,
        student_ids: Vec::new(),
    })
}

pub async fn rename_class(db: &dyn Backend, id: &str, name: &str) -> Result<(), GatewayError> {
    db.update(&Query::table(CLASSES).eq("id", id), json!({ "name": name.trim() }))
        .await
}

/// Removes the class; membership links go with it, student accounts stay.
pub async fn delete_class(db: &dyn Backend, id: &str) -> Result<(), GatewayError> {
    db.delete(&Query::table(CLASSES).eq("id", id)).await
}

pub async fn class_student_ids(db: &dyn Backend, class_id: &str) -> Result<Vec<String>, GatewayError> {
    let rows: Vec<MembershipRow> = parse_rows(
        db.select(
            &Query::table(CLASS_STUDENTS)
                .select("class_id, user_id")
                .eq("class_id", class_id),
        )
        .await?,
    )?;
    Ok(rows.into_iter().map(|r| r.user_id).collect())
}

pub async fn class_students(db: &dyn Backend, class_id: &str) -> Result<Vec<ClassStudent>, GatewayError> {
    let ids = class_student_ids(db, class_id).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    parse_rows(
        db.select(
            &Query::table(PROFILES)
                .select("id, name, email")
                .in_list("id", &ids),
        )
        .await?,
    )
}

pub async fn add_student_to_class(
    db: &dyn Backend,
    class_id: &str,
    user_id: &str,
) -> Result<(), GatewayError> {
    db.insert(
        CLASS_STUDENTS,
        json!({ "class_id": class_id, "user_id": user_id }),
        None,
    )
    .await?;
    Ok(())
}

pub async fn remove_student_from_class(
    db: &dyn Backend,
    class_id: &str,
    user_id: &str,
) -> Result<(), GatewayError> {
    db.delete(
        &Query::table(CLASS_STUDENTS)
            .eq("class_id", class_id)
            .eq("user_id", user_id),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;

    #[tokio::test]
    async fn empty_class_set_skips_membership_query() {
        let db = FakeBackend::new();
        assert!(fetch_classes(&db).await.unwrap().is_empty());
        assert_eq!(db.calls(), vec!["select classes".to_string()]);
    }

    #[tokio::test]
    async fn created_class_starts_empty_then_gains_member() {
        let db = FakeBackend::new();
        let created = insert_class(&db, "X", "t1").await.unwrap();

        let classes = fetch_classes(&db).await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "X");
        assert!(classes[0].student_ids.is_empty());

        add_student_to_class(&db, &created.id, "s1").await.unwrap();
        let classes = fetch_classes(&db).await.unwrap();
        assert_eq!(classes[0].student_ids, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn classes_come_back_sorted_by_name() {
        let db = FakeBackend::new();
        insert_class(&db, "Terminale", "t1").await.unwrap();
        insert_class(&db, "Seconde", "t1").await.unwrap();
        let names: Vec<String> = fetch_classes(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Seconde", "Terminale"]);
    }

    #[tokio::test]
    async fn insert_requires_name_and_creator() {
        let db = FakeBackend::new();
        assert!(insert_class(&db, "  ", "t1").await.is_err());
        assert!(insert_class(&db, "X", "").await.is_err());
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_drops_links_but_not_profiles() {
        let db = FakeBackend::new();
        db.seed(
            PROFILES,
            json!([{ "id": "s1", "name": "Lucas", "email": "l@x.fr", "role": "student" }]),
        );
        let c = insert_class(&db, "1ère S", "t1").await.unwrap();
        add_student_to_class(&db, &c.id, "s1").await.unwrap();
        assert_eq!(class_students(&db, &c.id).await.unwrap().len(), 1);

        delete_class(&db, &c.id).await.unwrap();
        assert!(fetch_classes(&db).await.unwrap().is_empty());
        assert!(db.rows(CLASS_STUDENTS).is_empty());
        assert_eq!(db.rows(PROFILES).len(), 1);
    }

    #[tokio::test]
    async fn rename_and_remove_member() {
        let db = FakeBackend::new();
        let c = insert_class(&db, "A", "t1").await.unwrap();
        add_student_to_class(&db, &c.id, "s1").await.unwrap();
        add_student_to_class(&db, &c.id, "s2").await.unwrap();
        rename_class(&db, &c.id, "B").await.unwrap();
        remove_student_from_class(&db, &c.id, "s1").await.unwrap();

        let classes = fetch_classes(&db).await.unwrap();
        assert_eq!(classes[0].name, "B");
        assert_eq!(classes[0].student_ids, vec!["s2".to_string()]);
    }
}
