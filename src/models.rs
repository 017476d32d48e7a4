use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Identity and role record of a user, distinct from the auth credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub must_change_password: bool,
}

impl Profile {
    /// Empty student placeholder used when nobody can be resolved.
    pub fn placeholder() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            email: String::new(),
            role: Role::Student,
            must_change_password: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassItem {
    pub id: String,
    pub name: String,
    pub student_ids: Vec<String>,
}

/// Roster line of a class member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassStudent {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// One note for one exam. Identity within a class is (student_id, exam_name).
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub student_id: String,
    pub exam_name: String,
    pub note: f64,
    pub date: String,
    #[serde(default)]
    pub coefficient: Option<f64>,
}

impl GradeEntry {
    pub fn same_slot(&self, other: &GradeEntry) -> bool {
        self.student_id == other.student_id && self.exam_name == other.exam_name
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionItem {
    pub id: String,
    pub title: String,
    // None means visible to every class
    pub class_id: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub file_path: Option<String>,
    pub file_name: String,
    pub uploaded_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCorrection {
    pub title: String,
    #[serde(default)]
    pub class_id: Option<String>,
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub uploaded_by: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}
