mod env_file;
pub mod types;
mod validators;

// Re-export all public types
pub use env_file::EnvLookup;
pub use types::*;
pub(crate) use validators::parse_size_string;
