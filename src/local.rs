//! File-backed key-value store used when no hosted backend is configured.
//!
//! Each key is one JSON document under the store directory. Without a
//! directory the store is unavailable: reads yield the fallback and writes
//! do nothing.

use crate::models::{ClassItem, ClassStudent, CorrectionItem, GradeEntry, NewCorrection, Profile, Role};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const KEY_USERS: &str = "svt-users";
pub const KEY_PASSWORDS: &str = "svt-passwords";
pub const KEY_ROLE: &str = "svt-auth-role";
pub const KEY_USER_ID: &str = "svt-auth-user-id";
pub const KEY_LOGGED_IN: &str = "svt-auth-logged-in";
pub const KEY_CLASSES: &str = "svt-classes";
pub const KEY_GRADES: &str = "svt-grades";
pub const KEY_CORRECTIONS: &str = "svt-corrections";

pub const DEFAULT_PASSWORD: &str = "demo";
pub const DEFAULT_STUDENT_PASSWORD: &str = "eleve123";

/// Grades keyed by class id.
pub type GradesMap = BTreeMap<String, Vec<GradeEntry>>;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("Un utilisateur avec cet email existe déjà.")]
    DuplicateEmail,
    #[error("{0}")]
    Invalid(String),
    #[error("local store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("local store encoding: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct LocalKv {
    root: Option<PathBuf>,
}

impl LocalKv {
    /// Store rooted at `dir`, created if needed. Falls back to an
    /// unavailable store when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match fs::create_dir_all(&dir) {
            Ok(()) => Self { root: Some(dir) },
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "local store unavailable");
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self { root: None }
    }

    pub fn is_available(&self) -> bool {
        self.root.is_some()
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join(format!("{key}.json")))
    }

    /// Stored value for `key`; absent, unreadable or corrupt values yield
    /// `fallback`.
    pub fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let Some(path) = self.path(key) else {
            return fallback;
        };
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(_) => return fallback,
        };
        match serde_json::from_slice(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(key, error = %e, "ignoring corrupt local value");
                fallback
            }
        }
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), LocalError> {
        let Some(path) = self.path(key) else {
            return Ok(());
        };
        let body = serde_json::to_vec(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), LocalError> {
        let Some(path) = self.path(key) else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The demo accounts present before anything is stored.
pub fn seed_users() -> Vec<Profile> {
    let user = |id: &str, name: &str, email: &str, role| Profile {
        id: id.into(),
        name: name.into(),
        email: email.into(),
        role,
        must_change_password: false,
    };
    vec![
        user("1", "Admin SVT", "admin@svt-lycee.fr", Role::Admin),
        user("2", "Marie Dupont", "marie.dupont@svt-lycee.fr", Role::Teacher),
        user("3", "Lucas Martin", "lucas.martin@svt-lycee.fr", Role::Student),
        user("4", "Emma Bernard", "emma.bernard@svt-lycee.fr", Role::Student),
        user("5", "Hugo Petit", "hugo.petit@svt-lycee.fr", Role::Student),
        user("6", "Léa Moreau", "lea.moreau@svt-lycee.fr", Role::Student),
    ]
}

fn default_password(role: Role) -> &'static str {
    match role {
        Role::Student => DEFAULT_STUDENT_PASSWORD,
        Role::Admin | Role::Teacher => DEFAULT_PASSWORD,
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `<prefix>-<millis>`, bumped until it collides with none of `taken`.
fn next_id<'a>(prefix: &str, taken: impl Iterator<Item = &'a str> + Clone) -> String {
    let mut n = Utc::now().timestamp_millis();
    loop {
        let id = format!("{prefix}-{n}");
        if !taken.clone().any(|t| t == id) {
            return id;
        }
        n += 1;
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Millisecond timestamp of a grade date (`YYYY-MM-DD` or RFC 3339).
fn date_millis(date: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.timestamp_millis());
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Download link of a locally stored correction file.
pub fn local_file_url(file_path: &str) -> String {
    if file_path.starts_with('/') || file_path.starts_with("http://") || file_path.starts_with("https://") {
        file_path.to_string()
    } else {
        format!("/corrections/{file_path}")
    }
}

/// All application data kept in a [`LocalKv`].
///
/// Derived operations that read, modify and write back hold `write_lock`
/// for their whole cycle.
pub struct LocalDataStore {
    kv: LocalKv,
    files_dir: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl LocalDataStore {
    pub fn new(kv: LocalKv) -> Self {
        Self {
            kv,
            files_dir: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding uploaded correction files, cleaned up on delete.
    pub fn with_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_dir = Some(dir.into());
        self
    }

    pub fn kv(&self) -> &LocalKv {
        &self.kv
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- users and passwords ----

    pub fn get_users(&self) -> Vec<Profile> {
        self.kv.load(KEY_USERS, seed_users())
    }

    pub fn get_students(&self) -> Vec<Profile> {
        self.get_users()
            .into_iter()
            .filter(|u| u.role == Role::Student)
            .collect()
    }

    fn passwords(&self) -> BTreeMap<String, String> {
        self.kv.load(KEY_PASSWORDS, BTreeMap::new())
    }

    /// Matches the e-mail case-insensitively and the trimmed password
    /// exactly. Users without a stored password get the default one first.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<Profile>, LocalError> {
        let _g = self.guard();
        let users = self.get_users();
        let mut passwords = self.passwords();
        let mut changed = false;
        for u in &users {
            let key = email_key(&u.email);
            if !passwords.contains_key(&key) {
                passwords.insert(key, default_password(u.role).to_string());
                changed = true;
            }
        }
        if changed {
            self.kv.save(KEY_PASSWORDS, &passwords)?;
        }

        let wanted = email_key(email);
        let Some(user) = users.into_iter().find(|u| email_key(&u.email) == wanted) else {
            return Ok(None);
        };
        Ok(match passwords.get(&wanted) {
            Some(stored) if stored == password.trim() => Some(user),
            _ => None,
        })
    }

    pub fn set_user_password(&self, email: &str, password: &str) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut passwords = self.passwords();
        passwords.insert(email_key(email), password.to_string());
        self.kv.save(KEY_PASSWORDS, &passwords)
    }

    /// New student with the default student password.
    pub fn add_student(&self, name: &str, email: &str) -> Result<Profile, LocalError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() || email.is_empty() {
            return Err(LocalError::Invalid("Nom et email requis.".into()));
        }
        let _g = self.guard();
        let mut users = self.get_users();
        let wanted = email_key(email);
        if users.iter().any(|u| email_key(&u.email) == wanted) {
            return Err(LocalError::DuplicateEmail);
        }
        let user = Profile {
            id: next_id("s", users.iter().map(|u| u.id.as_str())),
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Student,
            must_change_password: false,
        };
        users.push(user.clone());
        self.kv.save(KEY_USERS, &users)?;

        let mut passwords = self.passwords();
        passwords.insert(wanted, DEFAULT_STUDENT_PASSWORD.to_string());
        self.kv.save(KEY_PASSWORDS, &passwords)?;
        tracing::info!(student_id = %user.id, "local student added");
        Ok(user)
    }

    /// Removes the student account and its class memberships.
    pub fn remove_student(&self, id: &str) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut classes = self.get_classes();
        for c in &mut classes {
            c.student_ids.retain(|s| s != id);
        }
        self.kv.save(KEY_CLASSES, &classes)?;

        let mut users = self.get_users();
        users.retain(|u| u.id != id);
        self.kv.save(KEY_USERS, &users)
    }

    // ---- stored identity ----

    pub fn stored_role(&self) -> Option<Role> {
        self.kv.load::<Option<Role>>(KEY_ROLE, None)
    }

    pub fn set_stored_role(&self, role: Role) -> Result<(), LocalError> {
        self.kv.save(KEY_ROLE, &role)
    }

    pub fn stored_user_id(&self) -> Option<String> {
        self.kv.load::<Option<String>>(KEY_USER_ID, None)
    }

    pub fn is_logged_in(&self) -> bool {
        self.kv.load(KEY_LOGGED_IN, false)
    }

    /// Remembers `user` as the signed-in identity.
    pub fn login(&self, user: &Profile) -> Result<(), LocalError> {
        let _g = self.guard();
        self.kv.save(KEY_USER_ID, &user.id)?;
        self.kv.save(KEY_LOGGED_IN, &true)?;
        self.kv.save(KEY_ROLE, &user.role)
    }

    pub fn logout(&self) -> Result<(), LocalError> {
        let _g = self.guard();
        self.kv.remove(KEY_USER_ID)?;
        self.kv.remove(KEY_LOGGED_IN)?;
        self.kv.remove(KEY_ROLE)
    }

    /// Stored user, else the first user with the stored role (student by
    /// default), else the first user.
    pub fn current_user(&self) -> Option<Profile> {
        let users = self.get_users();
        if let Some(id) = self.stored_user_id() {
            if let Some(u) = users.iter().find(|u| u.id == id) {
                return Some(u.clone());
            }
        }
        let role = self.stored_role().unwrap_or(Role::Student);
        users
            .iter()
            .find(|u| u.role == role)
            .or_else(|| users.first())
            .cloned()
    }

    // ---- classes ----

    pub fn get_classes(&self) -> Vec<ClassItem> {
        self.kv.load(KEY_CLASSES, Vec::new())
    }

    pub fn add_class(&self, name: &str, student_ids: Vec<String>) -> Result<ClassItem, LocalError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LocalError::Invalid("Nom de classe requis.".into()));
        }
        let _g = self.guard();
        let mut classes = self.get_classes();
        let item = ClassItem {
            id: next_id("c", classes.iter().map(|c| c.id.as_str())),
            name: name.to_string(),
            student_ids,
        };
        classes.push(item.clone());
        self.kv.save(KEY_CLASSES, &classes)?;
        Ok(item)
    }

    pub fn update_class(&self, id: &str, name: &str, student_ids: Vec<String>) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut classes = self.get_classes();
        if let Some(c) = classes.iter_mut().find(|c| c.id == id) {
            c.name = name.trim().to_string();
            c.student_ids = student_ids;
        }
        self.kv.save(KEY_CLASSES, &classes)
    }

    pub fn rename_class(&self, id: &str, name: &str) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut classes = self.get_classes();
        if let Some(c) = classes.iter_mut().find(|c| c.id == id) {
            c.name = name.trim().to_string();
        }
        self.kv.save(KEY_CLASSES, &classes)
    }

    pub fn delete_class(&self, id: &str) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut classes = self.get_classes();
        classes.retain(|c| c.id != id);
        self.kv.save(KEY_CLASSES, &classes)
    }

    pub fn add_class_member(&self, class_id: &str, student_id: &str) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut classes = self.get_classes();
        if let Some(c) = classes.iter_mut().find(|c| c.id == class_id) {
            if !c.student_ids.iter().any(|s| s == student_id) {
                c.student_ids.push(student_id.to_string());
            }
        }
        self.kv.save(KEY_CLASSES, &classes)
    }

    pub fn remove_class_member(&self, class_id: &str, student_id: &str) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut classes = self.get_classes();
        if let Some(c) = classes.iter_mut().find(|c| c.id == class_id) {
            c.student_ids.retain(|s| s != student_id);
        }
        self.kv.save(KEY_CLASSES, &classes)
    }

    /// Members of a class that still have an account.
    pub fn class_students(&self, class_id: &str) -> Vec<ClassStudent> {
        let Some(class) = self.get_classes().into_iter().find(|c| c.id == class_id) else {
            return Vec::new();
        };
        let users = self.get_users();
        class
            .student_ids
            .iter()
            .filter_map(|id| users.iter().find(|u| &u.id == id))
            .map(|u| ClassStudent {
                id: u.id.clone(),
                name: u.name.clone(),
                email: u.email.clone(),
            })
            .collect()
    }

    // ---- grades ----

    pub fn get_grades(&self) -> GradesMap {
        self.kv.load(KEY_GRADES, GradesMap::new())
    }

    pub fn grades_for_class(&self, class_id: &str) -> Vec<GradeEntry> {
        self.get_grades().remove(class_id).unwrap_or_default()
    }

    pub fn set_grades_for_class(&self, class_id: &str, entries: Vec<GradeEntry>) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut grades = self.get_grades();
        grades.insert(class_id.to_string(), entries);
        self.kv.save(KEY_GRADES, &grades)
    }

    /// Replaces the entry sharing (student, exam) in the class, or appends.
    pub fn set_grade_for_student(&self, class_id: &str, entry: GradeEntry) -> Result<(), LocalError> {
        let _g = self.guard();
        let mut grades = self.get_grades();
        let list = grades.entry(class_id.to_string()).or_default();
        list.retain(|e| !e.same_slot(&entry));
        list.push(entry);
        self.kv.save(KEY_GRADES, &grades)
    }

    /// Upserts a batch of entries into one class in a single write.
    pub fn merge_class_grades(&self, class_id: &str, entries: &[GradeEntry]) -> Result<(), LocalError> {
        if entries.is_empty() {
            return Ok(());
        }
        let _g = self.guard();
        let mut grades = self.get_grades();
        let list = grades.entry(class_id.to_string()).or_default();
        for entry in entries {
            list.retain(|e| !e.same_slot(entry));
            list.push(entry.clone());
        }
        self.kv.save(KEY_GRADES, &grades)
    }

    /// Every grade of a student across classes, newest first. Entries with
    /// the same date keep their stored order.
    pub fn grades_for_student(&self, student_id: &str) -> Vec<GradeEntry> {
        let mut out: Vec<GradeEntry> = self
            .get_grades()
            .into_values()
            .flatten()
            .filter(|e| e.student_id == student_id)
            .collect();
        out.sort_by(|a, b| date_millis(&b.date).cmp(&date_millis(&a.date)));
        out
    }

    // ---- corrections ----

    pub fn get_corrections(&self) -> Vec<CorrectionItem> {
        self.kv.load(KEY_CORRECTIONS, Vec::new())
    }

    pub fn add_correction(&self, new: &NewCorrection) -> Result<CorrectionItem, LocalError> {
        if new.title.trim().is_empty() || new.file_path.is_empty() {
            return Err(LocalError::Invalid("Titre et fichier requis.".into()));
        }
        let _g = self.guard();
        let mut list = self.get_corrections();
        let item = CorrectionItem {
            id: next_id("corr", list.iter().map(|c| c.id.as_str())),
            title: new.title.trim().to_string(),
            class_id: new.class_id.clone(),
            file_url: local_file_url(&new.file_path),
            file_path: Some(new.file_path.clone()),
            file_name: new.file_name.clone(),
            uploaded_at: now_iso(),
        };
        list.push(item.clone());
        self.kv.save(KEY_CORRECTIONS, &list)?;
        Ok(item)
    }

    /// Removes the correction; its uploaded file goes too when it lives in
    /// the files directory. A failed file removal is only logged.
    pub fn delete_correction(&self, id: &str, file_path: Option<&str>) -> Result<(), LocalError> {
        if let (Some(dir), Some(path)) = (&self.files_dir, file_path) {
            if let Some(name) = Path::new(path).file_name() {
                let target = dir.join(name);
                if let Err(e) = fs::remove_file(&target) {
                    tracing::warn!(correction_id = %id, file = %target.display(), error = %e, "correction file removal failed");
                }
            }
        }
        let _g = self.guard();
        let mut list = self.get_corrections();
        list.retain(|c| c.id != id);
        self.kv.save(KEY_CORRECTIONS, &list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalDataStore) {
        let dir = TempDir::new().unwrap();
        let s = LocalDataStore::new(LocalKv::open(dir.path().join("local")));
        (dir, s)
    }

    fn grade(student: &str, exam: &str, note: f64, date: &str) -> GradeEntry {
        GradeEntry {
            student_id: student.into(),
            exam_name: exam.into(),
            note,
            date: date.into(),
            coefficient: None,
        }
    }

    #[test]
    fn unavailable_store_reads_fallback_and_ignores_writes() {
        let kv = LocalKv::unavailable();
        assert!(!kv.is_available());
        kv.save("k", &vec![1, 2]).unwrap();
        assert_eq!(kv.load("k", vec![9]), vec![9]);
    }

    #[test]
    fn corrupt_value_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let kv = LocalKv::open(dir.path());
        fs::write(dir.path().join("svt-classes.json"), b"{not json").unwrap();
        let classes: Vec<ClassItem> = kv.load(KEY_CLASSES, Vec::new());
        assert!(classes.is_empty());
    }

    #[test]
    fn authenticate_seeds_default_passwords() {
        let (_d, s) = store();
        let teacher = s
            .authenticate("  Marie.Dupont@SVT-lycee.fr ", "demo")
            .unwrap()
            .unwrap();
        assert_eq!(teacher.role, Role::Teacher);
        assert!(s
            .authenticate("lucas.martin@svt-lycee.fr", " eleve123 ")
            .unwrap()
            .is_some());
        assert!(s.authenticate("lucas.martin@svt-lycee.fr", "demo").unwrap().is_none());
        assert!(s.authenticate("nobody@svt-lycee.fr", "demo").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_creates_nothing() {
        let (_d, s) = store();
        let before = s.get_users().len();
        let err = s.add_student("Autre Lucas", "LUCAS.MARTIN@svt-lycee.fr").unwrap_err();
        assert!(matches!(err, LocalError::DuplicateEmail));
        assert_eq!(s.get_users().len(), before);
    }

    #[test]
    fn added_student_can_sign_in() {
        let (_d, s) = store();
        let u = s.add_student(" Nina Roux ", "nina.roux@svt-lycee.fr").unwrap();
        assert!(u.id.starts_with("s-"));
        assert_eq!(u.name, "Nina Roux");
        assert_eq!(s.get_students().len(), 5);
        let signed = s.authenticate("nina.roux@svt-lycee.fr", "eleve123").unwrap();
        assert_eq!(signed.map(|p| p.id), Some(u.id));
    }

    #[test]
    fn rapid_ids_do_not_collide() {
        let (_d, s) = store();
        let a = s.add_class("A", Vec::new()).unwrap();
        let b = s.add_class("B", Vec::new()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn removing_student_clears_memberships() {
        let (_d, s) = store();
        let c = s.add_class("1ère S", vec!["3".into(), "4".into()]).unwrap();
        s.remove_student("3").unwrap();
        assert!(s.get_users().iter().all(|u| u.id != "3"));
        let classes = s.get_classes();
        assert_eq!(classes[0].id, c.id);
        assert_eq!(classes[0].student_ids, vec!["4".to_string()]);
    }

    #[test]
    fn login_logout_and_current_user() {
        let (_d, s) = store();
        assert!(!s.is_logged_in());
        let emma = s.get_users().into_iter().find(|u| u.id == "4").unwrap();
        s.login(&emma).unwrap();
        assert!(s.is_logged_in());
        assert_eq!(s.stored_role(), Some(Role::Student));
        assert_eq!(s.current_user().unwrap().id, "4");

        s.logout().unwrap();
        assert!(!s.is_logged_in());
        assert!(s.stored_user_id().is_none());
        // falls back to the first student
        assert_eq!(s.current_user().unwrap().id, "3");
    }

    #[test]
    fn grade_for_student_upserts_slot() {
        let (_d, s) = store();
        s.set_grade_for_student("c1", grade("3", "DS1", 8.0, "2026-01-05"))
            .unwrap();
        s.set_grade_for_student("c1", grade("3", "DS1", 13.0, "2026-01-06"))
            .unwrap();
        let list = s.grades_for_class("c1");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].note, 13.0);
    }

    #[test]
    fn student_grades_newest_first_and_stable() {
        let (_d, s) = store();
        s.set_grades_for_class(
            "c1",
            vec![
                grade("3", "DS1", 10.0, "2026-01-05"),
                grade("3", "TP1", 12.0, "2026-03-01"),
                grade("4", "DS1", 15.0, "2026-01-05"),
            ],
        )
        .unwrap();
        s.set_grades_for_class(
            "c2",
            vec![
                grade("3", "Oral", 9.0, "2026-03-01"),
                grade("3", "DS2", 11.0, "2026-02-10T08:00:00Z"),
            ],
        )
        .unwrap();
        let exams: Vec<String> = s
            .grades_for_student("3")
            .into_iter()
            .map(|g| g.exam_name)
            .collect();
        assert_eq!(exams, vec!["TP1", "Oral", "DS2", "DS1"]);
    }

    #[test]
    fn corrections_add_and_delete_with_file() {
        let dir = TempDir::new().unwrap();
        let files = dir.path().join("public/corrections");
        fs::create_dir_all(&files).unwrap();
        fs::write(files.join("171-ds1.pdf"), b"%PDF").unwrap();
        let s = LocalDataStore::new(LocalKv::open(dir.path().join("local"))).with_files_dir(&files);

        let item = s
            .add_correction(&NewCorrection {
                title: "Correction DS1".into(),
                class_id: None,
                file_path: "171-ds1.pdf".into(),
                file_name: "ds1.pdf".into(),
                uploaded_by: String::new(),
            })
            .unwrap();
        assert!(item.id.starts_with("corr-"));
        assert_eq!(item.file_url, "/corrections/171-ds1.pdf");

        s.delete_correction(&item.id, item.file_path.as_deref()).unwrap();
        assert!(s.get_corrections().is_empty());
        assert!(!files.join("171-ds1.pdf").exists());
    }
}
