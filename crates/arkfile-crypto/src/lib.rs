//! Server-side key material lifecycle for Arkfile's authentication core.
//!
//! Owns the process-wide TOTP master key (§4.C Server-Key Manager) and
//! derives the per-login session key from PAKE export material (§4.E
//! Session Binder). Both halves share one property: the secret they hand out
//! is scoped to a single operation and zeroized on every exit path.

pub mod error;
pub mod server_key;
pub mod session;

pub use error::CryptoError;
pub use server_key::{DerivedKey, ServerKeyManager};
pub use session::SessionKey;
