pub mod general_settings_json_repository;
pub mod general_settings_repository;
pub mod in_memory_repository;
pub mod json_file_repository;
pub mod models_json_repository;
pub mod models_repository;
pub mod provider_repository;

pub use general_settings_json_repository::GeneralSettingsJsonRepository;
pub use general_settings_repository::GeneralSettingsRepository;
pub use in_memory_repository::InMemorySettingsRepository;
pub use json_file_repository::JsonFileRepository;
pub use models_json_repository::JsonModelsRepository;
pub use models_repository::ModelsRepository;
pub use provider_repository::{BoxFuture, ProviderRepository, RepositoryError, RepositoryResult};
