pub mod executor;

pub use executor::ScriptRunner;
