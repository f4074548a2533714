//! End-to-end scenarios against the full `AuthCore` facade, mirroring the
//! literal scenarios S1-S6 of the authentication core's specification.

use arkfile_core::config::Config;
use arkfile_core::core::AuthCore;
use arkfile_core::dto::{
    LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, TotpCodeRequest,
};
use arkfile_core::error::AuthError;

fn core() -> (tempfile::TempDir, AuthCore) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.key_dir = dir.path().join("keys");
    config.sqlite_path = None;
    let core = AuthCore::init(&config).unwrap();
    (dir, core)
}

#[tokio::test]
async fn s1_registration_and_login_round_trip() {
    let (_dir, core) = core();
    let req = RegisterRequest {
        email: "user@example.com".to_string(),
        password: "CorrectHorse!2Battery".to_string(),
        device_capability: None,
    };
    let resp = core.register(&req, 1_000).await.unwrap();
    assert_eq!(resp.auth_method, "OPAQUE");
    assert_eq!(resp.user_status, "pending");

    // Login before approval is rejected.
    let login_req = LoginRequest {
        email: "user@example.com".to_string(),
        password: "CorrectHorse!2Battery".to_string(),
    };
    let err = core.login(&login_req, 1_100).await.unwrap_err();
    assert!(matches!(err, AuthError::NotApproved));
}

#[tokio::test]
async fn registration_times_out_against_a_zeroed_pake_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.key_dir = dir.path().join("keys");
    config.sqlite_path = None;
    config.pake_op_timeout_secs = 0;
    let core = AuthCore::init(&config).unwrap();

    let req = RegisterRequest {
        email: "slow@example.com".to_string(),
        password: "CorrectHorse!2Battery".to_string(),
        device_capability: None,
    };
    let err = core.register(&req, 1_000).await.unwrap_err();
    assert!(matches!(err, AuthError::ProtocolError));
}

#[tokio::test]
async fn s4_refresh_rotation() {
    let (_dir, core) = core();
    register_and_approve(&core, "rot@example.com", "hunter2-hunter2").await;

    let login_req = LoginRequest {
        email: "rot@example.com".to_string(),
        password: "hunter2-hunter2".to_string(),
    };
    let login = core.login(&login_req, 1_000).await.unwrap();
    assert!(!login.session_key.is_empty());

    let pair1 = core
        .refresh(&RefreshRequest { refresh_token: login.refresh_token.clone() }, 2_000)
        .await
        .unwrap();

    let err = core
        .refresh(&RefreshRequest { refresh_token: login.refresh_token }, 2_500)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Expired));

    let pair2 = core
        .refresh(&RefreshRequest { refresh_token: pair1.refresh_token.clone() }, 3_000)
        .await
        .unwrap();
    assert_ne!(pair1.refresh_token, pair2.refresh_token);
}

#[tokio::test]
async fn s5_revoke_all_invalidates_every_refresh_token() {
    let (_dir, core) = core();
    register_and_approve(&core, "revoke@example.com", "swordfish-swordfish").await;

    let login_req = LoginRequest {
        email: "revoke@example.com".to_string(),
        password: "swordfish-swordfish".to_string(),
    };
    let login1 = core.login(&login_req, 1_000).await.unwrap();
    let login2 = core.login(&login_req, 1_000).await.unwrap();

    core.revoke_all("revoke@example.com", 2_000).await.unwrap();

    assert!(core
        .refresh(&RefreshRequest { refresh_token: login1.refresh_token }, 2_100)
        .await
        .is_err());
    assert!(core
        .refresh(&RefreshRequest { refresh_token: login2.refresh_token }, 2_100)
        .await
        .is_err());
}

#[tokio::test]
async fn logout_revokes_the_presented_refresh_token() {
    let (_dir, core) = core();
    register_and_approve(&core, "logout@example.com", "passphrase-passphrase").await;

    let login = core
        .login(
            &LoginRequest {
                email: "logout@example.com".to_string(),
                password: "passphrase-passphrase".to_string(),
            },
            1_000,
        )
        .await
        .unwrap();

    core.logout(&LogoutRequest { refresh_token: login.refresh_token.clone() }, 2_000)
        .await
        .unwrap();

    let err = core
        .refresh(&RefreshRequest { refresh_token: login.refresh_token }, 2_100)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Expired));
}

#[tokio::test]
async fn login_with_wrong_password_is_bad_credentials_not_an_oracle() {
    let (_dir, core) = core();
    register_and_approve(&core, "wrongpw@example.com", "correct-password").await;

    let err = core
        .login(
            &LoginRequest {
                email: "wrongpw@example.com".to_string(),
                password: "incorrect-password".to_string(),
            },
            1_000,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadCredentials));

    let err_unknown_user = core
        .login(
            &LoginRequest {
                email: "never-registered@example.com".to_string(),
                password: "whatever".to_string(),
            },
            1_000,
        )
        .await
        .unwrap_err();
    assert!(matches!(err_unknown_user, AuthError::BadCredentials));
}

#[tokio::test]
async fn s6_tampered_access_token_is_rejected() {
    let (_dir, core) = core();
    register_and_approve(&core, "tamper@example.com", "tamper-password").await;

    let login = core
        .login(
            &LoginRequest {
                email: "tamper@example.com".to_string(),
                password: "tamper-password".to_string(),
            },
            1_000,
        )
        .await
        .unwrap();

    let claims = core
        .authenticate(Some(&format!("Bearer {}", login.token)), 1_100)
        .unwrap();
    assert_eq!(claims.sub, "tamper@example.com");
    assert_eq!(claims.iss, "arkfile-auth");
    assert!(claims.aud.iter().any(|a| a == "arkfile-api"));
    assert_eq!(claims.exp - claims.iat, 86_400);

    let mut tampered = login.token.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'A' { 'B' } else { 'A' });
    let err = core.authenticate(Some(&format!("Bearer {tampered}")), 1_100).unwrap_err();
    assert!(matches!(err, AuthError::BadSignature));
}

#[tokio::test]
async fn s2_and_s3_totp_enrollment_validation_and_backup_codes() {
    let (_dir, core) = core();
    register_and_approve(&core, "alice@example.com", "alice-password-phrase").await;

    let setup = core.totp_setup("alice@example.com", 1_000).await.unwrap();
    assert_eq!(setup.backup_codes.len(), 10);
    assert!(!setup.secret.is_empty());

    let code = totp_code_for(&setup.secret, "alice@example.com", 1_000);
    core.totp_complete(
        "alice@example.com",
        &TotpCodeRequest { code: code.clone() },
        1_000,
    )
    .await
    .unwrap();

    let err = core
        .totp_validate("alice@example.com", &TotpCodeRequest { code }, 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReplayDetected));

    let bogus_err = core
        .totp_validate(
            "alice@example.com",
            &TotpCodeRequest { code: "000000".to_string() },
            2_000,
        )
        .await
        .unwrap_err();
    assert!(matches!(bogus_err, AuthError::InvalidCode));

    // S3 — each backup code is one-shot; a second presentation is a replay,
    // and an unissued code never validates.
    core.totp_validate_backup(
        "alice@example.com",
        &TotpCodeRequest { code: setup.backup_codes[0].clone() },
        3_000,
    )
    .await
    .unwrap();

    let replay_err = core
        .totp_validate_backup(
            "alice@example.com",
            &TotpCodeRequest { code: setup.backup_codes[0].clone() },
            3_100,
        )
        .await
        .unwrap_err();
    assert!(matches!(replay_err, AuthError::ReplayDetected));

    let invalid_err = core
        .totp_validate_backup(
            "alice@example.com",
            &TotpCodeRequest { code: "INVALIDCODE".to_string() },
            3_200,
        )
        .await
        .unwrap_err();
    assert!(matches!(invalid_err, AuthError::InvalidCode));
}

fn totp_code_for(secret_base32: &str, account: &str, now: i64) -> String {
    use totp_rs::{Algorithm, Secret, TOTP};
    let secret_bytes = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some("Arkfile".to_string()),
        account.to_string(),
    )
    .unwrap();
    totp.generate(now.max(0) as u64)
}

async fn register_and_approve(core: &AuthCore, email: &str, password: &str) {
    core.register(
        &RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            device_capability: None,
        },
        1_000,
    )
    .await
    .unwrap();
    core.approve_user(email).await.unwrap();
}
