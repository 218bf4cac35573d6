//! Client authentication
//!
//! Bastion users log in with a password checked against a SHA-256 hash
//! from the config, or with a key listed in an authorized_keys file.

mod keys;
mod users;

pub use keys::{AuthorizedKey, AuthorizedKeys};
pub use users::{hash_password, UserCredentials};
