pub mod catalogue;
pub mod credentials;
pub mod parser;
pub mod schema;
pub mod types;

pub use catalogue::HeaderCatalogues;
pub use credentials::{redact_secrets, resolve_secret};
pub use parser::{parse_config, parse_config_str};
pub use types::*;
