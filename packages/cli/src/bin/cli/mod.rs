pub mod challenge;
pub mod config;
pub mod maintenance;
pub mod serve;
