pub mod build;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod display;
pub mod errors;
pub mod logging;
pub mod timer;
pub mod types;
pub mod vcs;
pub mod versions;
