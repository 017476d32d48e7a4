// Note validation and the aggregates shown on the grade pages.

use crate::models::GradeEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const NOTE_MIN: f64 = 0.0;
pub const NOTE_MAX: f64 = 20.0;

/// A student's average stays hidden below this many notes.
pub const MIN_NOTES_FOR_AVERAGE: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoteError {
    #[error("Veuillez entrer un nombre.")]
    NotANumber,
    #[error("La note doit être entre 0 et 20.")]
    OutOfRange,
}

pub fn is_valid_note(n: f64) -> bool {
    n.is_finite() && (NOTE_MIN..=NOTE_MAX).contains(&n)
}

/// Parses a typed note. Blank input means "no grade entered", not zero.
/// Comma and dot are both accepted as decimal separator.
pub fn parse_note(raw: &str) -> Result<Option<f64>, NoteError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let normalized = trimmed.replacen(',', ".", 1);
    let n: f64 = normalized.parse().map_err(|_| NoteError::NotANumber)?;
    if !n.is_finite() {
        return Err(NoteError::NotANumber);
    }
    if !is_valid_note(n) {
        return Err(NoteError::OutOfRange);
    }
    Ok(Some(n))
}

pub fn mention(average: f64) -> &'static str {
    match average {
        a if a >= 16.0 => "Très bien",
        a if a >= 14.0 => "Bien",
        a if a >= 12.0 => "Assez bien",
        a if a >= 10.0 => "Passable",
        a if a >= 8.0 => "Insuffisant",
        _ => "Échec",
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub count: usize,
    pub average: Option<f64>,
    pub mention: Option<String>,
    pub best: Option<f64>,
    pub worst: Option<f64>,
}

pub fn summarize(grades: &[GradeEntry]) -> GradeSummary {
    let notes: Vec<f64> = grades.iter().map(|g| g.note).collect();
    let count = notes.len();
    let average = if count >= MIN_NOTES_FOR_AVERAGE {
        Some(notes.iter().sum::<f64>() / count as f64)
    } else {
        None
    };
    GradeSummary {
        count,
        average,
        mention: average.map(|a| mention(a).to_string()),
        best: notes.iter().copied().reduce(f64::max),
        worst: notes.iter().copied().reduce(f64::min),
    }
}

/// A teacher's grade sheet as typed: one raw cell per (student, exam).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub exam_names: Vec<String>,
    // student id -> exam name -> raw cell
    #[serde(default)]
    pub notes: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{student_id} / {exam_name}: {error}")]
pub struct CellError {
    pub student_id: String,
    pub exam_name: String,
    pub error: NoteError,
}

impl GradeSheet {
    fn cell(&self, student_id: &str, exam: &str) -> &str {
        self.notes
            .get(student_id)
            .and_then(|row| row.get(exam))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Turns the sheet into entries for the given roster. Blank cells are
    /// skipped; the first invalid cell rejects the whole sheet.
    pub fn entries(&self, student_ids: &[String], date: &str) -> Result<Vec<GradeEntry>, CellError> {
        let mut out = Vec::new();
        for student_id in student_ids {
            for exam in &self.exam_names {
                let note = parse_note(self.cell(student_id, exam)).map_err(|error| CellError {
                    student_id: student_id.clone(),
                    exam_name: exam.clone(),
                    error,
                })?;
                if let Some(note) = note {
                    out.push(GradeEntry {
                        student_id: student_id.clone(),
                        exam_name: exam.clone(),
                        note,
                        date: date.to_string(),
                        coefficient: Some(1.0),
                    });
                }
            }
        }
        Ok(out)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SheetAverages {
    // student id -> mean of their entered notes
    pub rows: HashMap<String, f64>,
    // exam name -> mean over the class
    pub columns: HashMap<String, f64>,
}

fn mean(vals: &[f64]) -> Option<f64> {
    if vals.is_empty() {
        None
    } else {
        Some(vals.iter().sum::<f64>() / vals.len() as f64)
    }
}

pub fn sheet_averages(grades: &[GradeEntry]) -> SheetAverages {
    let mut by_student: HashMap<&str, Vec<f64>> = HashMap::new();
    let mut by_exam: HashMap<&str, Vec<f64>> = HashMap::new();
    for g in grades {
        by_student.entry(&g.student_id).or_default().push(g.note);
        by_exam.entry(&g.exam_name).or_default().push(g.note);
    }
    SheetAverages {
        rows: by_student
            .into_iter()
            .filter_map(|(k, v)| mean(&v).map(|m| (k.to_string(), m)))
            .collect(),
        columns: by_exam
            .into_iter()
            .filter_map(|(k, v)| mean(&v).map(|m| (k.to_string(), m)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(student: &str, exam: &str, note: f64) -> GradeEntry {
        GradeEntry {
            student_id: student.into(),
            exam_name: exam.into(),
            note,
            date: "2026-02-01".into(),
            coefficient: None,
        }
    }

    #[test]
    fn accepts_bounds_and_decimal_separators() {
        assert_eq!(parse_note("0"), Ok(Some(0.0)));
        assert_eq!(parse_note("20"), Ok(Some(20.0)));
        assert_eq!(parse_note("12.5"), Ok(Some(12.5)));
        assert_eq!(parse_note("12,5"), Ok(Some(12.5)));
        assert_eq!(parse_note(" 7 "), Ok(Some(7.0)));
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert_eq!(parse_note("-0.1"), Err(NoteError::OutOfRange));
        assert_eq!(parse_note("20.1"), Err(NoteError::OutOfRange));
        assert_eq!(parse_note("abc"), Err(NoteError::NotANumber));
        assert_eq!(parse_note("inf"), Err(NoteError::NotANumber));
        assert_eq!(parse_note("NaN"), Err(NoteError::NotANumber));
    }

    #[test]
    fn blank_is_no_grade() {
        assert_eq!(parse_note(""), Ok(None));
        assert_eq!(parse_note("   "), Ok(None));
    }

    #[test]
    fn average_hidden_below_three_notes() {
        let s = summarize(&[entry("a", "DS1", 12.0), entry("a", "DS2", 15.0)]);
        assert_eq!(s.count, 2);
        assert_eq!(s.average, None);
        assert_eq!(s.mention, None);
        assert_eq!(s.best, Some(15.0));
        assert_eq!(s.worst, Some(12.0));
    }

    #[test]
    fn average_shown_from_three_notes() {
        let s = summarize(&[
            entry("a", "DS1", 12.0),
            entry("a", "DS2", 15.0),
            entry("a", "DS3", 18.0),
        ]);
        assert_eq!(s.average, Some(15.0));
        assert_eq!(s.mention.as_deref(), Some("Bien"));
    }

    #[test]
    fn mention_thresholds() {
        assert_eq!(mention(16.0), "Très bien");
        assert_eq!(mention(12.0), "Assez bien");
        assert_eq!(mention(9.5), "Insuffisant");
        assert_eq!(mention(3.0), "Échec");
    }

    #[test]
    fn sheet_skips_blank_cells_and_rejects_invalid_ones() {
        let mut sheet = GradeSheet {
            exam_names: vec!["DS1".into(), "DS2".into()],
            ..Default::default()
        };
        sheet
            .notes
            .entry("s1".into())
            .or_default()
            .insert("DS1".into(), "14,5".into());
        let roster = vec!["s1".to_string(), "s2".to_string()];
        let entries = sheet.entries(&roster, "2026-03-01").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].note, 14.5);
        assert_eq!(entries[0].coefficient, Some(1.0));

        sheet
            .notes
            .entry("s2".into())
            .or_default()
            .insert("DS2".into(), "21".into());
        let err = sheet.entries(&roster, "2026-03-01").unwrap_err();
        assert_eq!(err.student_id, "s2");
        assert_eq!(err.error, NoteError::OutOfRange);
    }

    #[test]
    fn row_and_column_means() {
        let avg = sheet_averages(&[
            entry("a", "DS1", 10.0),
            entry("a", "DS2", 14.0),
            entry("b", "DS1", 16.0),
        ]);
        assert_eq!(avg.rows["a"], 12.0);
        assert_eq!(avg.rows["b"], 16.0);
        assert_eq!(avg.columns["DS1"], 13.0);
        assert_eq!(avg.columns["DS2"], 14.0);
    }
}
