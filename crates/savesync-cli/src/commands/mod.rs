pub mod backups;
pub mod init;
pub mod list;
pub mod login;
pub mod restore;
pub mod run;
pub mod select;
pub mod settings;
pub mod status;
pub mod store;
pub mod version;
