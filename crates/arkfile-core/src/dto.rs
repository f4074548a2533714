//! Request/response DTOs for the HTTP surface described in §6. This crate
//! does not route HTTP (that's an external collaborator); it exposes the
//! serde-derived shapes and the operations a router would call them
//! against.

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilitySource, DeviceCapability};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_capability: Option<DeviceCapability>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub auth_method: &'static str,
    pub user_status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub session_key: String,
    pub auth_method: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRequest {
    #[serde(rename = "memoryGB")]
    pub memory_gb: f64,
    pub cpu_cores: u32,
    pub is_mobile: bool,
    #[serde(default)]
    pub requested_capability: Option<DeviceCapability>,
    #[serde(default)]
    pub explicit_consent: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityResponse {
    pub recommended_capability: DeviceCapability,
    pub description: &'static str,
    pub source: CapabilitySource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetupResponse {
    pub secret: String,
    #[serde(rename = "qrCodeURL")]
    pub qr_code_url: String,
    pub manual_entry: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotpCodeRequest {
    pub code: String,
}
