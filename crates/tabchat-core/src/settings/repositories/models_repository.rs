use super::provider_repository::{BoxFuture, RepositoryResult};
use crate::settings::models::LlmModel;

pub trait ModelsRepository: Send + Sync + 'static {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<LlmModel>>>;

    fn save_all(&self, models: Vec<LlmModel>) -> BoxFuture<'static, RepositoryResult<()>>;
}
