use argon2::Argon2;
use opaque_ke::key_exchange::tripledh::TripleDh;
use opaque_ke::{CipherSuite, Ristretto255};

/// The committed OPAQUE ciphersuite: Ristretto255 for both the OPRF and the
/// key-exchange group, triple Diffie-Hellman for key exchange, Argon2id for
/// password stretching. Fixed so the on-wire record format and the derived
/// export key stay stable across deployments.
pub struct ArkfileSuite;

impl CipherSuite for ArkfileSuite {
    type OprfCs = Ristretto255;
    type KeGroup = Ristretto255;
    type KeyExchange = TripleDh;
    type Ksf = Argon2<'static>;
}
