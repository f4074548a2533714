//! Transactional SQLite-backed persistence for the auth core: opaque PAKE
//! records, TOTP enrollment state, replay-defense usage logs, and refresh
//! tokens. All public operations are async and safe to call from any number
//! of concurrent tasks; the underlying connection is serialized behind a
//! mutex and driven on the blocking thread pool.

pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::AuthStore;
pub use types::{OpaqueRecord, RefreshTokenRecord, TotpSetupRecord, TotpState};
