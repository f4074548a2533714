//! OPAQUE-style asymmetric PAKE: drives registration and login so that the
//! password, and no password-equivalent, ever reaches the server.

pub mod ciphersuite;
pub mod engine;
pub mod error;

pub use ciphersuite::ArkfileSuite;
pub use engine::{LoginSession, PakeEngine, RegistrationSession, ServerLoginSession};
pub use error::PakeError;
