//! Classbook server: classes, grades, corrections and notifications for a
//! school subject, backed either by a hosted backend or a local store.

pub mod capabilities;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod grades;
pub mod local;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
