pub mod general_model;
pub mod models_store;
pub mod providers_store;

pub use general_model::{GLOBAL_SETTINGS_ID, GeneralSettingsModel, GeneralSettingsPatch};
pub use models_store::{LlmModel, ModelsModel};
pub use providers_store::{ProviderConfig, ProvidersModel};
