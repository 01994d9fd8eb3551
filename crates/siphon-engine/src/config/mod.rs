//! Service configuration: YAML types, parsing with `${VAR}` substitution,
//! and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_config, parse_config_str, substitute_env_vars};
pub use types::{ExportSettings, ServiceConfig, SourceConfig, SourceKind, StoreConfig};
pub use validator::validate_config;
