//! Voting-record extraction for council meeting minutes.

pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod inference;
pub mod normalize;
pub mod orchestrator;
pub mod resolver;
pub mod schema;
pub mod source;

pub use error::PipelineError;
