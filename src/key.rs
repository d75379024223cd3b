//! Activation keys, client identities, and the random source that mints keys.

pub mod generator;
pub mod id;
pub mod secret;

pub use generator::*;
pub use id::*;
pub use secret::*;
