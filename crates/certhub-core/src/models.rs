//! Domain models for certhub.
//!
//! These are the records shared across all crates: the identity side
//! (organisations and users) and the PKI side (servers with their names,
//! keys and certificates).

pub mod certificate;
pub mod key;
pub mod organisation;
pub mod server;
pub mod user;
