use serde::{Deserialize, Serialize};

/// Recognized device-capability tiers (§6). Governs the client-side KDF
/// memory/CPU cost for the account-password path; stronger tiers cost more
/// to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCapability {
    Minimal,
    Interactive,
    Balanced,
    Maximum,
}

impl DeviceCapability {
    pub fn description(&self) -> &'static str {
        match self {
            DeviceCapability::Minimal => "lowest KDF cost; for constrained or low-memory devices",
            DeviceCapability::Interactive => "low KDF cost; responsive on mobile and older hardware",
            DeviceCapability::Balanced => "moderate KDF cost; the default for most desktops",
            DeviceCapability::Maximum => "highest KDF cost; for dedicated high-memory machines",
        }
    }
}

/// Recommend a capability tier from declared RAM/CPU and mobile flag.
/// Mobile devices are capped at `Interactive` regardless of declared
/// specs, since battery and thermal limits dominate raw capability there.
pub fn recommend(memory_gb: f64, cpu_cores: u32, is_mobile: bool) -> DeviceCapability {
    if is_mobile {
        return DeviceCapability::Interactive;
    }
    match (memory_gb, cpu_cores) {
        (mem, cores) if mem >= 16.0 && cores >= 8 => DeviceCapability::Maximum,
        (mem, cores) if mem >= 8.0 && cores >= 4 => DeviceCapability::Balanced,
        (mem, _) if mem >= 4.0 => DeviceCapability::Interactive,
        _ => DeviceCapability::Minimal,
    }
}

/// Where the resolved capability came from, for the `/api/opaque/capability`
/// response's `source` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilitySource {
    ServerRecommended,
    ClientOverride,
}

/// Resolve a client's requested capability against the server's
/// recommendation. A client may override downward freely; overriding
/// upward without `explicit_consent` is rejected — the spec forbids
/// silently escalating KDF cost behind a user's back (§9 open question).
pub fn resolve_override(
    recommended: DeviceCapability,
    requested: Option<DeviceCapability>,
    explicit_consent: bool,
) -> Result<(DeviceCapability, CapabilitySource), &'static str> {
    match requested {
        None => Ok((recommended, CapabilitySource::ServerRecommended)),
        Some(requested) if requested <= recommended => {
            Ok((requested, CapabilitySource::ClientOverride))
        }
        Some(requested) if explicit_consent => Ok((requested, CapabilitySource::ClientOverride)),
        Some(_) => Err("upward capability override requires explicit consent"),
    }
}
