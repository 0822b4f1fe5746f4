pub mod types;
pub mod classification;

pub use types::CachesnakeError;
pub use classification::ErrorClassification;
