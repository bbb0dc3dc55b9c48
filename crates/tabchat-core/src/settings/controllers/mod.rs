pub mod settings_controller;

pub use settings_controller::{SettingsError, SettingsResult, SettingsStore};
