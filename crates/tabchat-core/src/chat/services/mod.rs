pub mod completion;
pub mod echo_provider;
pub mod provider_registry;
pub mod provider_resolver;
pub mod rig_provider;
pub mod title_generator;

pub use completion::{
    CompletionError, CompletionProvider, CompletionRequest, FragmentStream, StructuredRequest,
    parse_json_object,
};
pub use echo_provider::EchoProvider;
pub use provider_registry::{ProviderConstructor, ProviderError, ProviderRegistry};
pub use provider_resolver::{ConfigurationError, ProviderResolver};
pub use rig_provider::{RigCompletionProvider, RigKind};
pub use title_generator::{TitleGenerator, clean_title};
