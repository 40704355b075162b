pub mod auth;
pub mod budget;
pub mod dropbox;
pub mod error;
pub mod factory;
pub mod gdrive;
pub mod local;
pub mod null;
pub mod oauth;
pub mod provider;

pub use error::{Result, StorageError};
pub use provider::{CloudStorage, ProviderState};
