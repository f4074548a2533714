use std::io::Write;
use std::path::Path;

use opaque_ke::{
    ClientLogin, ClientLoginFinishParameters, ClientRegistration,
    ClientRegistrationFinishParameters, CredentialFinalization, CredentialRequest,
    CredentialResponse, RegistrationRequest, RegistrationResponse, RegistrationUpload,
    ServerLogin, ServerLoginStartParameters, ServerRegistration, ServerSetup,
};
use rand::rngs::OsRng;

use crate::ciphersuite::ArkfileSuite;
use crate::error::PakeError;

const SERVER_SETUP_FILE: &str = "opaque_server.key";

/// Drives OPAQUE-style registration and login. Owns the server's long-lived
/// key pair, loaded once at process start and never mutated (§5: "read-only
/// shared state ... initialized once at process start before the first
/// request is admitted").
///
/// The protocol itself is stateless on the server between rounds: nothing
/// here is retained across a `create_registration_response` and the
/// matching `store_record` call, or across `create_credential_response` and
/// `user_auth`, beyond the one explicit session value each pair hands back
/// to the caller.
pub struct PakeEngine {
    server_setup: ServerSetup<ArkfileSuite>,
}

/// Client-side state retained between the two rounds of registration. In
/// production this lives on the client and never reaches the server; it
/// exists here so this crate's own test harness can drive both sides of the
/// exchange.
pub struct RegistrationSession(ClientRegistration<ArkfileSuite>);

/// Client-side state retained between the two rounds of login.
pub struct LoginSession(ClientLogin<ArkfileSuite>);

/// Server-side state retained between `create_credential_response` and
/// `user_auth` — the one piece of per-exchange state the server must keep,
/// since `ServerLogin::finish` needs it to verify the client's final MAC.
pub struct ServerLoginSession(ServerLogin<ArkfileSuite>);

impl PakeEngine {
    /// Load the server's OPAQUE key material from `key_dir`, generating and
    /// persisting it on first boot. Mirrors the Server-Key Manager's
    /// write-then-confirm bootstrap (§4.C supplement): the freshly written
    /// file is re-read before the engine is handed back to the caller.
    pub fn init(key_dir: &Path) -> Result<Self, PakeError> {
        let path = key_dir.join(SERVER_SETUP_FILE);

        if path.exists() {
            let bytes = std::fs::read(&path).map_err(|e| PakeError::KeyLoad(e.to_string()))?;
            let server_setup = ServerSetup::<ArkfileSuite>::deserialize(&bytes)
                .map_err(|e| PakeError::KeyLoad(e.to_string()))?;
            return Ok(Self { server_setup });
        }

        std::fs::create_dir_all(key_dir).map_err(|e| PakeError::KeyLoad(e.to_string()))?;
        let server_setup = ServerSetup::<ArkfileSuite>::new(&mut OsRng);
        let serialized = server_setup.serialize();
        write_key_file(&path, &serialized)?;

        let confirmed = std::fs::read(&path).map_err(|e| PakeError::KeyLoad(e.to_string()))?;
        if confirmed != serialized.as_slice() {
            return Err(PakeError::KeyLoad(
                "server key file write could not be confirmed".into(),
            ));
        }

        Ok(Self { server_setup })
    }

    /// One-shot registration for tests and tooling; production traffic
    /// always uses the two-round form below, where client and server never
    /// share process state (§4.A).
    pub fn register(
        &self,
        identifier: &str,
        password: &[u8],
    ) -> Result<(Vec<u8>, [u8; 64]), PakeError> {
        let (session, request) = Self::create_registration_request(password)?;
        let response = self.create_registration_response(&request, identifier)?;
        Self::finalize(session, password, &response)
    }

    // ---- registration (two-round) ------------------------------------

    /// Client-side: start registration. Returns the session to retain and
    /// the wire message `M` to send to the server.
    pub fn create_registration_request(
        password: &[u8],
    ) -> Result<(RegistrationSession, Vec<u8>), PakeError> {
        let result = ClientRegistration::<ArkfileSuite>::start(&mut OsRng, password)?;
        Ok((
            RegistrationSession(result.state),
            result.message.serialize().to_vec(),
        ))
    }

    /// Server-side: answer `M` with `rpub`. Holds no state between this
    /// call and `store_record`.
    pub fn create_registration_response(
        &self,
        message: &[u8],
        identifier: &str,
    ) -> Result<Vec<u8>, PakeError> {
        let message = RegistrationRequest::<ArkfileSuite>::deserialize(message)?;
        let result = ServerRegistration::<ArkfileSuite>::start(
            &self.server_setup,
            message,
            identifier.as_bytes(),
        )?;
        Ok(result.message.serialize().to_vec())
    }

    /// Client-side: consume the session and the server's response,
    /// producing the record to upload and the export key to retain
    /// locally. The server never sees the export key.
    pub fn finalize(
        session: RegistrationSession,
        password: &[u8],
        response: &[u8],
    ) -> Result<(Vec<u8>, [u8; 64]), PakeError> {
        let response = RegistrationResponse::<ArkfileSuite>::deserialize(response)?;
        let result = session.0.finish(
            &mut OsRng,
            password,
            response,
            ClientRegistrationFinishParameters::default(),
        )?;

        let mut export_key = [0u8; 64];
        export_key.copy_from_slice(result.export_key.as_slice());
        Ok((result.message.serialize().to_vec(), export_key))
    }

    /// Server-side: convert the client's final upload into the bytes the
    /// Auth State Store persists. Rejecting a second registration for the
    /// same identifier is the store's job (unique-key violation), not this
    /// function's.
    pub fn store_record(upload: &[u8]) -> Result<Vec<u8>, PakeError> {
        let upload = RegistrationUpload::<ArkfileSuite>::deserialize(upload)?;
        let record = ServerRegistration::<ArkfileSuite>::finish(upload);
        Ok(record.serialize().to_vec())
    }

    // ---- login (two-round) --------------------------------------------

    /// Client-side: start login.
    pub fn create_credential_request(password: &[u8]) -> Result<(LoginSession, Vec<u8>), PakeError> {
        let result = ClientLogin::<ArkfileSuite>::start(&mut OsRng, password)?;
        Ok((LoginSession(result.state), result.message.serialize().to_vec()))
    }

    /// Server-side: answer the client's credential request against the
    /// stored record. Retains `ServerLoginSession` only until `user_auth`
    /// completes the exchange.
    pub fn create_credential_response(
        &self,
        message: &[u8],
        persisted_record: &[u8],
        identifier: &str,
    ) -> Result<(Vec<u8>, ServerLoginSession), PakeError> {
        let message = CredentialRequest::<ArkfileSuite>::deserialize(message)?;
        let record = ServerRegistration::<ArkfileSuite>::deserialize(persisted_record)?;
        let result = ServerLogin::<ArkfileSuite>::start(
            &mut OsRng,
            &self.server_setup,
            Some(record),
            message,
            identifier.as_bytes(),
            ServerLoginStartParameters::default(),
        )?;
        Ok((
            result.message.serialize().to_vec(),
            ServerLoginSession(result.state),
        ))
    }

    /// Client-side: recover the shared session key and export key, and
    /// produce `authU`, the final message the server checks in `user_auth`.
    pub fn recover_credentials(
        session: LoginSession,
        password: &[u8],
        response: &[u8],
    ) -> Result<([u8; 64], [u8; 64], Vec<u8>), PakeError> {
        let response = CredentialResponse::<ArkfileSuite>::deserialize(response)?;
        let result = session
            .0
            .finish(password, response, ClientLoginFinishParameters::default())?;

        let mut session_key = [0u8; 64];
        session_key.copy_from_slice(result.session_key.as_slice());
        let mut export_key = [0u8; 64];
        export_key.copy_from_slice(result.export_key.as_slice());

        Ok((session_key, export_key, result.message.serialize().to_vec()))
    }

    /// Server-side: verify `authU`. Success yields the server's view of the
    /// shared session key, which must equal the client's for the exchange
    /// to count as authenticated. Any MAC failure surfaces as
    /// `BadCredentials`, with no distinction between "wrong password" and
    /// "no such user" in the error shape (§7 propagation policy).
    pub fn user_auth(session: ServerLoginSession, auth_u: &[u8]) -> Result<[u8; 64], PakeError> {
        let finalization = CredentialFinalization::<ArkfileSuite>::deserialize(auth_u)?;
        let result = session
            .0
            .finish(finalization)
            .map_err(|_| PakeError::BadCredentials)?;

        let mut session_key = [0u8; 64];
        session_key.copy_from_slice(result.session_key.as_slice());
        Ok(session_key)
    }
}

fn write_key_file(path: &Path, bytes: &[u8]) -> Result<(), PakeError> {
    let mut file = std::fs::File::create(path).map_err(|e| PakeError::KeyLoad(e.to_string()))?;
    file.write_all(bytes)
        .map_err(|e| PakeError::KeyLoad(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| PakeError::KeyLoad(e.to_string()))?;
    }

    Ok(())
}
