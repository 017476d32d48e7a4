//! What each role may see and do.
//!
//! Every authorization decision and every navigation set comes from
//! [`capabilities`]; callers never compare role strings themselves.

use crate::models::Role;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Administer,
    ManageClasses,
    ManageStudents,
    EnterGrades,
    UploadCorrections,
    PublishNotifications,
    ViewOwnGrades,
    ViewCorrections,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavLink {
    pub href: &'static str,
    pub label: &'static str,
}

const fn link(href: &'static str, label: &'static str) -> NavLink {
    NavLink { href, label }
}

const TEACHER_LINKS: [NavLink; 5] = [
    link("/dashboard/teacher", "Tableau de bord"),
    link("/dashboard/teacher/students", "Élèves"),
    link("/dashboard/teacher/notes", "Saisie des notes"),
    link("/dashboard/teacher/classes", "Classes"),
    link("/dashboard/teacher/corrections", "Corrections PDF"),
];

const STUDENT_LINKS: [NavLink; 3] = [
    link("/dashboard/student", "Tableau de bord"),
    link("/dashboard/student/notes", "Mes notes"),
    link("/dashboard/student/corrections", "Corrections"),
];

const ADMIN_LINK: NavLink = link("/dashboard/admin", "Administration");

const STAFF_ACTIONS: [Action; 6] = [
    Action::ManageClasses,
    Action::ManageStudents,
    Action::EnterGrades,
    Action::UploadCorrections,
    Action::PublishNotifications,
    Action::ViewCorrections,
];

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub role: Role,
    pub home: &'static str,
    pub nav: Vec<NavLink>,
    pub actions: Vec<Action>,
}

impl Capabilities {
    pub fn allows(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

pub fn capabilities(role: Role) -> Capabilities {
    match role {
        Role::Admin => {
            let mut nav = vec![ADMIN_LINK];
            nav.extend(TEACHER_LINKS);
            let mut actions = vec![Action::Administer];
            actions.extend(STAFF_ACTIONS);
            Capabilities {
                role,
                home: ADMIN_LINK.href,
                nav,
                actions,
            }
        }
        Role::Teacher => Capabilities {
            role,
            home: TEACHER_LINKS[0].href,
            nav: TEACHER_LINKS.to_vec(),
            actions: STAFF_ACTIONS.to_vec(),
        },
        Role::Student => Capabilities {
            role,
            home: STUDENT_LINKS[0].href,
            nav: STUDENT_LINKS.to_vec(),
            actions: vec![Action::ViewOwnGrades, Action::ViewCorrections],
        },
    }
}
