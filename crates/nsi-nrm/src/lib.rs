pub mod backend;
pub mod cli_ssh;
pub mod error;
pub mod yaml_stub;

pub use backend::{NrmBackend, NrmCallParams};
pub use cli_ssh::CliSshBackend;
pub use error::NrmError;
pub use yaml_stub::YamlStubBackend;
