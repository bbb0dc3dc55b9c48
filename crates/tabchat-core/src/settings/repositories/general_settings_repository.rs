use super::provider_repository::{BoxFuture, RepositoryResult};
use crate::settings::models::GeneralSettingsModel;

pub trait GeneralSettingsRepository: Send + Sync + 'static {
    /// Load general settings from storage. A missing file yields defaults.
    fn load(&self) -> BoxFuture<'static, RepositoryResult<GeneralSettingsModel>>;

    fn save(&self, settings: GeneralSettingsModel) -> BoxFuture<'static, RepositoryResult<()>>;
}
