pub mod archive;
pub mod backups;
pub mod config;
pub mod error;
pub mod revision;
pub mod types;
