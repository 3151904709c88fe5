pub mod config;
pub mod deferred;
pub mod error;
pub mod harness;
pub mod resume;
pub mod scheduler;
pub mod streaming;
pub mod tree;

pub use error::ResumeError;
