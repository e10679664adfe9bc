//! MySQL server interaction: version gating, live coordinates, dump parsing.

pub mod dsn;
pub mod dump;
pub mod position;
pub mod version;

pub use dsn::ClientCredentials;
pub use version::ServerVersion;
