//! TOTP enrollment, validation with replay defense, backup codes, and
//! disable. Secrets and backup-code sets are encrypted at rest under a
//! per-user key supplied by the Server-Key Manager; this crate never
//! derives that key itself.

pub mod backup;
pub mod crypto;
pub mod error;
pub mod service;

pub use error::TotpError;
pub use service::{TotpConfig, TotpService, TotpSetup};
