pub mod paths;
pub mod secure_storage;

pub use paths::AppPaths;
pub use secure_storage::{CredentialStore, KeyringStorage, MemoryStorage, SecureStorage};
