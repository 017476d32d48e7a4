use super::{parse_rows, Backend, GatewayError, Query, CORRECTIONS, CORRECTIONS_BUCKET};
use crate::models::{CorrectionItem, NewCorrection};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use serde_json::json;

const CORRECTION_COLUMNS: &str = "id, title, class_id, file_path, file_name, uploaded_at";

// Characters escaped inside one path segment of a public object URL.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Deserialize)]
struct CorrectionRow {
    id: String,
    title: String,
    class_id: Option<String>,
    file_path: String,
    file_name: String,
    uploaded_at: String,
}

impl CorrectionRow {
    fn into_item(self, base_url: &str) -> CorrectionItem {
        CorrectionItem {
            file_url: public_file_url(base_url, &self.file_path),
            id: self.id,
            title: self.title,
            class_id: self.class_id,
            file_path: Some(self.file_path),
            file_name: self.file_name,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Public download URL of a stored correction. Derived, never stored.
pub fn public_file_url(base_url: &str, file_path: &str) -> String {
    let encoded: Vec<String> = file_path
        .split('/')
        .map(|seg| utf8_percent_encode(seg, SEGMENT).to_string())
        .collect();
    format!(
        "{}/storage/v1/object/public/{}/{}",
        base_url.trim_end_matches('/'),
        CORRECTIONS_BUCKET,
        encoded.join("/")
    )
}

/// Corrections newest first. With a class, keeps that class's corrections
/// and the ones posted for every class.
pub async fn fetch_corrections(
    db: &dyn Backend,
    class_id: Option<&str>,
) -> Result<Vec<CorrectionItem>, GatewayError> {
    let q = Query::table(CORRECTIONS)
        .select(CORRECTION_COLUMNS)
        .order("uploaded_at", false);
    let mut rows: Vec<CorrectionRow> = parse_rows(db.select(&q).await?)?;
    if let Some(class_id) = class_id {
        rows.retain(|r| r.class_id.as_deref().map_or(true, |c| c == class_id));
    }
    let base = db.base_url();
    Ok(rows.into_iter().map(|r| r.into_item(base)).collect())
}

pub async fn insert_correction(
    db: &dyn Backend,
    new: &NewCorrection,
) -> Result<CorrectionItem, GatewayError> {
    let created: Vec<CorrectionRow> = parse_rows(
        db.insert(
            CORRECTIONS,
            json!({
                "title": new.title,
                "class_id": new.class_id,
                "file_path": new.file_path,
                "file_name": new.file_name,
                "uploaded_by": new.uploaded_by,
            }),
            Some(CORRECTION_COLUMNS),
        )
        .await?,
    )?;
    created
        .into_iter()
        .next()
        .map(|r| r.into_item(db.base_url()))
        .ok_or_else(|| GatewayError::new("correction insert returned no row"))
}

pub async fn delete_correction_row(db: &dyn Backend, id: &str) -> Result<(), GatewayError> {
    db.delete(&Query::table(CORRECTIONS).eq("id", id)).await
}

pub async fn remove_correction_file(db: &dyn Backend, file_path: &str) -> Result<(), GatewayError> {
    db.remove_objects(CORRECTIONS_BUCKET, &[file_path.to_string()])
        .await
}

/// Removes the stored file, then the metadata row.
///
/// A failed file removal is logged and does not stop the row removal.
pub async fn delete_correction(
    db: &dyn Backend,
    id: &str,
    file_path: Option<&str>,
) -> Result<(), GatewayError> {
    if let Some(path) = file_path {
        if let Err(e) = remove_correction_file(db, path).await {
            tracing::warn!(correction_id = %id, file_path = %path, error = %e, "correction file removal failed");
        }
    }
    delete_correction_row(db, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeBackend;

    fn new_correction(class_id: Option<&str>, path: &str) -> NewCorrection {
        NewCorrection {
            title: "Correction DS1".into(),
            class_id: class_id.map(str::to_string),
            file_path: path.into(),
            file_name: "ds1.pdf".into(),
            uploaded_by: "t1".into(),
        }
    }

    #[test]
    fn url_is_derived_from_base_and_path() {
        assert_eq!(
            public_file_url("https://x.supabase.co/", "c1/171-ds 1.pdf"),
            "https://x.supabase.co/storage/v1/object/public/corrections/c1/171-ds%201.pdf"
        );
    }

    #[tokio::test]
    async fn fetch_filters_by_class_and_derives_urls() {
        let db = FakeBackend::new();
        insert_correction(&db, &new_correction(Some("c1"), "c1/a.pdf"))
            .await
            .unwrap();
        insert_correction(&db, &new_correction(Some("c2"), "c2/b.pdf"))
            .await
            .unwrap();
        insert_correction(&db, &new_correction(None, "all/c.pdf"))
            .await
            .unwrap();

        let all = fetch_corrections(&db, None).await.unwrap();
        assert_eq!(all.len(), 3);
        let c1 = fetch_corrections(&db, Some("c1")).await.unwrap();
        let mut paths: Vec<_> = c1.iter().filter_map(|c| c.file_path.as_deref()).collect();
        paths.sort();
        assert_eq!(paths, vec!["all/c.pdf", "c1/a.pdf"]);
        let a = c1.iter().find(|c| c.class_id.as_deref() == Some("c1")).unwrap();
        assert_eq!(
            a.file_url,
            "https://backend.test/storage/v1/object/public/corrections/c1/a.pdf"
        );
    }

    #[tokio::test]
    async fn delete_removes_row_and_file() {
        let db = FakeBackend::new();
        let item = insert_correction(&db, &new_correction(None, "all/a.pdf"))
            .await
            .unwrap();
        db.put_object(CORRECTIONS_BUCKET, "all/a.pdf");

        delete_correction(&db, &item.id, item.file_path.as_deref())
            .await
            .unwrap();
        assert!(db.rows(CORRECTIONS).is_empty());
        assert!(!db.has_object(CORRECTIONS_BUCKET, "all/a.pdf"));
    }

    #[tokio::test]
    async fn failed_file_removal_still_removes_row() {
        let db = FakeBackend::new();
        let item = insert_correction(&db, &new_correction(None, "all/a.pdf"))
            .await
            .unwrap();
        db.put_object(CORRECTIONS_BUCKET, "all/a.pdf");
        db.fail_object_removal(true);

        delete_correction(&db, &item.id, item.file_path.as_deref())
            .await
            .unwrap();
        assert!(db.rows(CORRECTIONS).is_empty());
        assert!(db.has_object(CORRECTIONS_BUCKET, "all/a.pdf"));
    }
}
