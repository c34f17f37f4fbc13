//! Bearer token model, secret handling, and the credential lifecycle manager.

pub mod credentials;
pub mod secret;
pub mod token;

pub use credentials::*;
pub use secret::*;
pub use token::*;
