pub mod factory;
pub mod local;
pub mod plain;
pub mod provider;
pub mod store;

pub use factory::create_protector;
pub use provider::SecretProtector;
pub use store::{CredentialFile, CredentialStore};
