//! Wires the PAKE Engine, TOTP Service, Server-Key Manager, Token Service,
//! and Auth State Store into one facade: Arkfile's authentication and
//! session core. Exposes the request/response DTOs and operations an
//! external HTTP router would call; does not route HTTP itself.

pub mod capability;
pub mod config;
pub mod core;
pub mod dto;
pub mod error;

pub use capability::{CapabilitySource, DeviceCapability};
pub use config::Config;
pub use core::AuthCore;
pub use error::AuthError;
