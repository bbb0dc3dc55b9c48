pub mod controllers;
pub mod models;
pub mod repositories;

pub use controllers::{SettingsError, SettingsStore};
