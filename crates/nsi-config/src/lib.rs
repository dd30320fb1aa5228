mod error;
mod loader;
mod raw;
mod settings;

pub use error::ConfigError;
pub use loader::load_provider_config;
pub use settings::{
    ApiConfig, NrmBackendSelection, ProviderConfig, RequesterConfig, StoreBackend,
};
