use std::sync::Arc;
use std::time::Duration;

use arkfile_crypto::{ServerKeyManager, SessionKey};
use arkfile_pake::{PakeEngine, PakeError};
use arkfile_store::{AuthStore, OpaqueRecord};
use arkfile_token::{Claims, SigningKeyRing, TokenService};
use arkfile_totp::TotpService;

use crate::capability;
use crate::config::Config;
use crate::dto::{
    CapabilityRequest, CapabilityResponse, LoginRequest, LoginResponse, LogoutRequest,
    RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse, TotpCodeRequest,
    TotpSetupResponse,
};
use crate::error::AuthError;

/// Ties the PAKE Engine, TOTP Service, Server-Key Manager, Token Service,
/// and Auth State Store behind one facade exposing the operations an
/// external HTTP router would call (§6). Does not route HTTP itself.
pub struct AuthCore {
    store: AuthStore,
    key_manager: Arc<ServerKeyManager>,
    pake: Arc<PakeEngine>,
    token: TokenService,
    totp: TotpService,
    pake_op_timeout: Duration,
}

impl AuthCore {
    /// Initialize every shared resource before the first request is
    /// admitted (§5): load/generate the TOTP master key, load/generate the
    /// OPAQUE server key pair, load/generate the JWT signing key ring, and
    /// open the backing store. Any failure here is fatal to process
    /// startup (§7 `KeyLoadError`).
    pub fn init(config: &Config) -> Result<Self, AuthError> {
        let key_manager = Arc::new(ServerKeyManager::new(config.key_dir.clone()));
        key_manager.init_master()?;

        let pake = Arc::new(PakeEngine::init(&config.key_dir)?);
        let ring = SigningKeyRing::init(&config.key_dir, config.token_signing_key_ring_size)?;
        let store = AuthStore::open_with_timeout(
            config.sqlite_path.as_deref(),
            Duration::from_secs(config.store_op_timeout_secs),
        )?;

        let token = TokenService::new(store.clone(), ring, config.token());
        let totp = TotpService::new(store.clone(), config.totp());

        Ok(Self {
            store,
            key_manager,
            pake,
            token,
            totp,
            pake_op_timeout: Duration::from_secs(config.pake_op_timeout_secs),
        })
    }

    /// Run a PAKE computation on the blocking thread pool, bounded by the
    /// configured deadline (§5 `pake.op_timeout_secs`). As with the store's
    /// equivalent, this bounds how long the caller waits, not how long the
    /// OPAQUE math runs: once `spawn_blocking` has started the closure, a
    /// timeout or a missing join result stops this call from waiting any
    /// longer, but the computation itself keeps running to completion on
    /// its blocking thread.
    async fn run_pake<F, R>(&self, f: F) -> Result<R, PakeError>
    where
        F: FnOnce() -> Result<R, PakeError> + Send + 'static,
        R: Send + 'static,
    {
        match tokio::time::timeout(self.pake_op_timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(_join_err)) => Err(PakeError::Protocol),
            Err(_timed_out) => Err(PakeError::Protocol),
        }
    }

    /// Register a new user via the PAKE Engine's one-shot convenience path
    /// (§4.A — production routers wanting the full two-round exchange
    /// should drive the engine directly across two requests instead).
    /// Rejects a second registration for the same identifier.
    pub async fn register(&self, req: &RegisterRequest, now: i64) -> Result<RegisterResponse, AuthError> {
        let pake = self.pake.clone();
        let email = req.email.clone();
        let password = req.password.clone();
        let (record, _export_key) = self
            .run_pake(move || pake.register(&email, password.as_bytes()))
            .await?;

        self.store
            .insert_opaque(OpaqueRecord {
                username: req.email.clone(),
                record,
                approved: false,
                created_at: now,
            })
            .await?;

        tracing::info!(email = %req.email, "registered pending user");
        Ok(RegisterResponse {
            auth_method: "OPAQUE",
            user_status: "pending",
        })
    }

    /// Run the full two-round login exchange synchronously and, on
    /// success, mint a fresh access+refresh pair and derive the session
    /// key from the PAKE export key (§4.E). Non-existent users and wrong
    /// passwords both surface as `BadCredentials` with the same shape
    /// (§7 propagation policy — no existence oracle).
    pub async fn login(&self, req: &LoginRequest, now: i64) -> Result<LoginResponse, AuthError> {
        let record = self
            .store
            .load_opaque(&req.email)
            .await
            .map_err(|_| AuthError::BadCredentials)?;

        if !record.approved {
            return Err(AuthError::NotApproved);
        }

        let pake = self.pake.clone();
        let email = req.email.clone();
        let password = req.password.clone();
        let persisted_record = record.record.clone();

        let (session_key_client, session_key_server, export_key) = self
            .run_pake(move || {
                let (login_session, request) = PakeEngine::create_credential_request(password.as_bytes())?;
                let (response, server_session) =
                    pake.create_credential_response(&request, &persisted_record, &email)?;
                let (session_key_client, export_key, auth_u) =
                    PakeEngine::recover_credentials(login_session, password.as_bytes(), &response)?;
                let session_key_server = PakeEngine::user_auth(server_session, &auth_u)?;
                Ok((session_key_client, session_key_server, export_key))
            })
            .await
            .map_err(|_| AuthError::BadCredentials)?;

        if session_key_client != session_key_server {
            return Err(AuthError::BadCredentials);
        }

        let session_key = SessionKey::derive(&export_key)?;
        let pair = self.token.issue(&req.email, now, None).await?;

        tracing::info!(email = %req.email, "login succeeded");
        Ok(LoginResponse {
            token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_key: session_key.to_base64(),
            auth_method: "OPAQUE",
        })
    }

    pub async fn refresh(&self, req: &RefreshRequest, now: i64) -> Result<RefreshResponse, AuthError> {
        let pair = self.token.refresh(&req.refresh_token, now).await?;
        Ok(RefreshResponse {
            token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    pub async fn logout(&self, req: &LogoutRequest, now: i64) -> Result<(), AuthError> {
        self.token.revoke(&req.refresh_token, now).await?;
        Ok(())
    }

    pub async fn revoke_all(&self, username: &str, now: i64) -> Result<(), AuthError> {
        self.token.revoke_all(username, now).await?;
        Ok(())
    }

    /// Flip the administrative approval flag (§3 supplement — the approval
    /// workflow itself, e.g. an admin UI or support queue, is out of scope;
    /// this is the single mutation that workflow would perform).
    pub async fn approve_user(&self, username: &str) -> Result<(), AuthError> {
        self.store.set_approved(username, true).await?;
        Ok(())
    }

    /// Validate a bearer access token per the middleware contract (§4.D).
    pub fn authenticate(&self, authorization_header: Option<&str>, now: i64) -> Result<Claims, AuthError> {
        let token = TokenService::extract_bearer(authorization_header)?;
        Ok(self.token.parse_access_token(token, now)?)
    }

    pub async fn totp_setup(&self, username: &str, now: i64) -> Result<TotpSetupResponse, AuthError> {
        let user_key = self.key_manager.derive_user_key(username)?;
        let setup = self.totp.generate_setup(username)?;
        self.totp
            .store_setup(username, user_key.as_bytes(), &setup, now)
            .await?;

        Ok(TotpSetupResponse {
            secret: setup.secret_base32,
            qr_code_url: setup.qr_url,
            manual_entry: setup.manual_entry,
            backup_codes: setup.backup_codes,
        })
    }

    pub async fn totp_complete(&self, username: &str, req: &TotpCodeRequest, now: i64) -> Result<(), AuthError> {
        let user_key = self.key_manager.derive_user_key(username)?;
        self.totp
            .complete_setup(username, user_key.as_bytes(), &req.code, now)
            .await?;
        Ok(())
    }

    pub async fn totp_validate(&self, username: &str, req: &TotpCodeRequest, now: i64) -> Result<(), AuthError> {
        let user_key = self.key_manager.derive_user_key(username)?;
        self.totp
            .validate_code(username, user_key.as_bytes(), &req.code, now)
            .await?;
        Ok(())
    }

    /// Validate a one-shot backup code (§4.B) — a distinct operation from
    /// `totp_validate`: backup codes live in their own encrypted set and
    /// their own usage log, burned on first use.
    pub async fn totp_validate_backup(&self, username: &str, req: &TotpCodeRequest, now: i64) -> Result<(), AuthError> {
        let user_key = self.key_manager.derive_user_key(username)?;
        self.totp
            .validate_backup(username, user_key.as_bytes(), &req.code, now)
            .await?;
        Ok(())
    }

    pub async fn totp_disable(&self, username: &str, req: &TotpCodeRequest, now: i64) -> Result<(), AuthError> {
        let user_key = self.key_manager.derive_user_key(username)?;
        self.totp
            .disable(username, user_key.as_bytes(), &req.code, now)
            .await?;
        Ok(())
    }

    pub async fn totp_cleanup(&self, now: i64) -> Result<(u64, u64), AuthError> {
        Ok(self.totp.cleanup_logs(now).await?)
    }

    /// Recommend a device-capability tier and resolve any client override
    /// against it (§6, §9 open question: upward override requires
    /// explicit consent).
    pub fn capability(&self, req: &CapabilityRequest) -> Result<CapabilityResponse, AuthError> {
        let recommended = capability::recommend(req.memory_gb, req.cpu_cores, req.is_mobile);
        let (resolved, source) =
            capability::resolve_override(recommended, req.requested_capability, req.explicit_consent)
                .map_err(|_| AuthError::Malformed)?;

        Ok(CapabilityResponse {
            recommended_capability: resolved,
            description: resolved.description(),
            source,
        })
    }

    pub fn rotate_signing_key(&self) -> Result<(), AuthError> {
        self.token.rotate_signing_key().map_err(AuthError::from)
    }
}
