use super::{parse_rows, Backend, GatewayError, Query, GRADES};
use crate::models::GradeEntry;
use serde::{Deserialize, Serialize};

const GRADE_COLUMNS: &str = "student_id, exam_name, note, date, coefficient";

/// Composite identity of a stored grade.
pub const GRADE_CONFLICT_KEY: &str = "class_id,student_id,exam_name";

#[derive(Deserialize)]
struct GradeRow {
    student_id: String,
    exam_name: String,
    note: f64,
    date: String,
    coefficient: Option<f64>,
}

impl From<GradeRow> for GradeEntry {
    fn from(r: GradeRow) -> Self {
        GradeEntry {
            student_id: r.student_id,
            exam_name: r.exam_name,
            note: r.note,
            date: r.date,
            coefficient: r.coefficient,
        }
    }
}

#[derive(Serialize)]
struct GradeUpsert<'a> {
    class_id: &'a str,
    student_id: &'a str,
    exam_name: &'a str,
    note: f64,
    date: &'a str,
    coefficient: Option<f64>,
}

pub async fn fetch_class_grades(db: &dyn Backend, class_id: &str) -> Result<Vec<GradeEntry>, GatewayError> {
    let rows: Vec<GradeRow> = parse_rows(
        db.select(&Query::table(GRADES).select(GRADE_COLUMNS).eq("class_id", class_id))
            .await?,
    )?;
    Ok(rows.into_iter().map(GradeEntry::from).collect())
}

/// Every grade of a student across classes, newest first.
pub async fn fetch_student_grades(
    db: &dyn Backend,
    student_id: &str,
) -> Result<Vec<GradeEntry>, GatewayError> {
    let rows: Vec<GradeRow> = parse_rows(
        db.select(
            &Query::table(GRADES)
                .select(GRADE_COLUMNS)
                .eq("student_id", student_id)
                .order("date", false),
        )
        .await?,
    )?;
    Ok(rows.into_iter().map(GradeEntry::from).collect())
}

/// Upserts a grade sheet keyed on (class, student, exam).
///
/// Within one batch the last entry for a slot wins, so the request never
/// carries the same key twice. An empty sheet sends nothing.
pub async fn save_class_grades(
    db: &dyn Backend,
    class_id: &str,
    entries: &[GradeEntry],
) -> Result<(), GatewayError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut unique: Vec<&GradeEntry> = Vec::with_capacity(entries.len());
    for e in entries {
        match unique.iter_mut().find(|kept| kept.same_slot(e)) {
            Some(kept) => *kept = e,
            None => unique.push(e),
        }
    }
    let rows: Vec<GradeUpsert<'_>> = unique
        .into_iter()
        .map(|e| GradeUpsert {
            class_id,
            student_id: &e.student_id,
            exam_name: &e.exam_name,
            note: e.note,
            date: &e.date,
            coefficient: e.coefficient,
        })
        .collect();
    let rows = serde_json::to_value(&rows)
        .map_err(|e| GatewayError::new(format!("grade rows: {e}")))?;
    db.upsert(GRADES, rows, GRADE_CONFLICT_KEY).await
}
