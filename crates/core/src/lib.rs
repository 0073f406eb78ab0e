pub mod config;
pub mod metadata;

pub use config::Config;
pub use metadata::RunMetadata;
