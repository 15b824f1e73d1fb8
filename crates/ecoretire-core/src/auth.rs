//! Identity verification sessions (email code / oauth state) and single-use
//! recovery tokens.

use crate::error::CoreError;
use crate::store::{load_json, save_json, StorageConfig};
use crate::types::{AuthMethod, AuthSession, AuthStatus, RecoveryToken};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const EMAIL_SESSION_TTL_MINUTES: i64 = 15;
const OAUTH_SESSION_TTL_MINUTES: i64 = 15;
const RECOVERY_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn random_digits(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| char::from_digit(rng.next_u32() % 10, 10).unwrap())
        .collect()
}

fn random_hex(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn save_session(&self, session: AuthSession) -> Result<(), CoreError>;
    async fn get_session(&self, id: &str) -> Result<Option<AuthSession>, CoreError>;
    async fn latest_verified_for_email(&self, email: &str) -> Result<Option<AuthSession>, CoreError>;
    async fn save_recovery_token(&self, token: RecoveryToken) -> Result<(), CoreError>;
    async fn get_recovery_token_by_hash(&self, hash: &str) -> Result<Option<RecoveryToken>, CoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthState {
    sessions: Vec<AuthSession>,
    recovery_tokens: Vec<RecoveryToken>,
}

pub struct JsonFileAuthStore {
    path: PathBuf,
    state: Mutex<AuthState>,
}

impl JsonFileAuthStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let state: AuthState = load_json(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Mutex::new(AuthState::default()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, CoreError> {
        match config {
            StorageConfig::Memory => Ok(Self::memory()),
            StorageConfig::JsonFile { path } => Self::open(path.clone()),
        }
    }

    fn persist(&self, state: &AuthState) -> Result<(), CoreError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        save_json(&self.path, state)
    }
}

#[async_trait]
impl AuthStore for JsonFileAuthStore {
    async fn save_session(&self, session: AuthSession) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session;
        } else {
            state.sessions.push(session);
        }
        self.persist(&state)?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<AuthSession>, CoreError> {
        let state = self.state.lock().await;
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn latest_verified_for_email(&self, email: &str) -> Result<Option<AuthSession>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .rev()
            .find(|s| {
                s.status == AuthStatus::Verified
                    && s.beneficiary_email.as_deref() == Some(email)
            })
            .cloned())
    }

    async fn save_recovery_token(&self, token: RecoveryToken) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.recovery_tokens.iter_mut().find(|t| t.id == token.id) {
            *existing = token;
        } else {
            state.recovery_tokens.push(token);
        }
        self.persist(&state)?;
        Ok(())
    }

    async fn get_recovery_token_by_hash(&self, hash: &str) -> Result<Option<RecoveryToken>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .recovery_tokens
            .iter()
            .find(|t| t.token_hash == hash)
            .cloned())
    }
}

pub struct AuthService {
    store: std::sync::Arc<dyn AuthStore>,
    email_secret: String,
    oauth_secret: String,
    recovery_secret: String,
    allowed_oauth_providers: Vec<String>,
}

pub struct StartEmailAuthInput {
    pub email: String,
    pub name: Option<String>,
}

/// The plaintext code is returned only so the caller (the email-sending
/// collaborator) can deliver it; it is never persisted.
pub struct StartEmailAuthResult {
    pub session: AuthSession,
    pub code: String,
}

pub struct StartOAuthAuthResult {
    pub session: AuthSession,
    pub state_token: String,
}

impl AuthService {
    pub fn new(
        store: std::sync::Arc<dyn AuthStore>,
        email_secret: impl Into<String>,
        oauth_secret: impl Into<String>,
        recovery_secret: impl Into<String>,
        allowed_oauth_providers: Vec<String>,
    ) -> Self {
        Self {
            store,
            email_secret: email_secret.into(),
            oauth_secret: oauth_secret.into(),
            recovery_secret: recovery_secret.into(),
            allowed_oauth_providers,
        }
    }

    pub async fn start_email_auth(
        &self,
        input: StartEmailAuthInput,
    ) -> Result<StartEmailAuthResult, CoreError> {
        let email = input.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(CoreError::InvalidRequest("email is required".to_string()));
        }
        let code = random_digits(6);
        let now = Utc::now();
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            method: AuthMethod::Email,
            status: AuthStatus::Pending,
            created_at: now,
            expires_at: now + ChronoDuration::minutes(EMAIL_SESSION_TTL_MINUTES),
            verified_at: None,
            beneficiary_name: input.name,
            beneficiary_email: Some(email.clone()),
            auth_provider: None,
            auth_subject: None,
            email_code_hash: Some(sha256_hex(&[&self.email_secret, ":", &code, ":", &email])),
            oauth_state_token: None,
            verification_attempts: 0,
            max_verification_attempts: DEFAULT_MAX_ATTEMPTS,
            linked_user_id: None,
        };
        self.store.save_session(session.clone()).await?;
        Ok(StartEmailAuthResult { session, code })
    }

    pub async fn verify_email_auth(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<AuthSession, CoreError> {
        let mut session = self.load_materialized(session_id).await?;
        if session.status != AuthStatus::Pending {
            return Err(CoreError::VerificationFailed(format!(
                "session is {:?}, not pending",
                session.status
            )));
        }
        let email = session.beneficiary_email.clone().unwrap_or_default();
        let expected = sha256_hex(&[&self.email_secret, ":", code, ":", &email]);
        let matches = session
            .email_code_hash
            .as_deref()
            .map(|stored| constant_time_eq(stored, &expected))
            .unwrap_or(false);

        if matches {
            session.status = AuthStatus::Verified;
            session.verified_at = Some(Utc::now());
        } else {
            session.verification_attempts += 1;
            if session.verification_attempts >= session.max_verification_attempts {
                session.status = AuthStatus::Locked;
            }
        }
        self.store.save_session(session.clone()).await?;

        if matches {
            Ok(session)
        } else if session.status == AuthStatus::Locked {
            Err(CoreError::SessionLocked)
        } else {
            Err(CoreError::VerificationFailed("incorrect code".to_string()))
        }
    }

    pub async fn start_oauth_auth(
        &self,
        provider: &str,
        email: Option<String>,
        name: Option<String>,
    ) -> Result<StartOAuthAuthResult, CoreError> {
        if !self.allowed_oauth_providers.iter().any(|p| p == provider) {
            return Err(CoreError::InvalidRequest(format!(
                "unsupported oauth provider: {provider}"
            )));
        }
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let expires_at = now + ChronoDuration::minutes(OAUTH_SESSION_TTL_MINUTES);
        let state_token = self.sign_oauth_state(&session_id, expires_at);

        let session = AuthSession {
            id: session_id,
            method: AuthMethod::Oauth,
            status: AuthStatus::Pending,
            created_at: now,
            expires_at,
            verified_at: None,
            beneficiary_name: name,
            beneficiary_email: email.map(|e| e.trim().to_lowercase()),
            auth_provider: Some(provider.to_string()),
            auth_subject: None,
            email_code_hash: None,
            oauth_state_token: Some(state_token.clone()),
            verification_attempts: 0,
            max_verification_attempts: DEFAULT_MAX_ATTEMPTS,
            linked_user_id: None,
        };
        self.store.save_session(session.clone()).await?;
        Ok(StartOAuthAuthResult {
            session,
            state_token,
        })
    }

    fn sign_oauth_state(&self, session_id: &str, expires_at: DateTime<Utc>) -> String {
        let payload = format!("{{\"sid\":\"{session_id}\",\"exp\":{}}}", expires_at.timestamp());
        let encoded_payload = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let mut mac =
            HmacSha256::new_from_slice(self.oauth_secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(encoded_payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{encoded_payload}.{signature}")
    }

    fn verify_oauth_state(&self, token: &str) -> Option<(String, i64)> {
        let (payload_b64, signature_b64) = token.split_once('.')?;
        let mut mac =
            HmacSha256::new_from_slice(self.oauth_secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(payload_b64.as_bytes());
        let expected_sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        if !constant_time_eq(&expected_sig, signature_b64) {
            return None;
        }
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
        let sid = payload.get("sid")?.as_str()?.to_string();
        let exp = payload.get("exp")?.as_i64()?;
        Some((sid, exp))
    }

    pub async fn verify_oauth_auth(
        &self,
        session_id: &str,
        state_token: &str,
        provider: &str,
        subject: &str,
        email: Option<String>,
    ) -> Result<AuthSession, CoreError> {
        let mut session = self.load_materialized(session_id).await?;
        if session.status != AuthStatus::Pending {
            return Err(CoreError::VerificationFailed(format!(
                "session is {:?}, not pending",
                session.status
            )));
        }
        if session.auth_provider.as_deref() != Some(provider) {
            return Err(CoreError::VerificationFailed(
                "provider does not match session".to_string(),
            ));
        }

        let (sid, exp) = self
            .verify_oauth_state(state_token)
            .ok_or_else(|| CoreError::VerificationFailed("invalid oauth state token".to_string()))?;
        if sid != session.id || exp <= Utc::now().timestamp() {
            session.verification_attempts += 1;
            if session.verification_attempts >= session.max_verification_attempts {
                session.status = AuthStatus::Locked;
            }
            self.store.save_session(session.clone()).await?;
            return Err(CoreError::VerificationFailed(
                "oauth state token expired or mismatched".to_string(),
            ));
        }

        session.auth_subject = Some(subject.to_string());
        if let Some(email) = email {
            session.beneficiary_email = Some(email.trim().to_lowercase());
        }
        session.status = AuthStatus::Verified;
        session.verified_at = Some(Utc::now());
        self.store.save_session(session.clone()).await?;
        Ok(session)
    }

    async fn load_materialized(&self, session_id: &str) -> Result<AuthSession, CoreError> {
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("auth session {session_id}")))?;
        if session.materialize_expiry(Utc::now()) {
            self.store.save_session(session.clone()).await?;
        }
        Ok(session)
    }

    pub async fn start_recovery(&self, email: &str) -> Result<String, CoreError> {
        let email = email.trim().to_lowercase();
        let source = self
            .store
            .latest_verified_for_email(&email)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no verified session for {email}")))?;

        let raw_token = format!("recover_{}", random_hex(32));
        let token_hash = sha256_hex(&[&self.recovery_secret, ":", &raw_token]);
        let now = Utc::now();
        let token = RecoveryToken {
            id: Uuid::new_v4().to_string(),
            token_hash,
            session_id: source.id,
            beneficiary_email: email,
            created_at: now,
            expires_at: now + ChronoDuration::hours(RECOVERY_TOKEN_TTL_HOURS),
            consumed_at: None,
        };
        self.store.save_recovery_token(token).await?;
        Ok(raw_token)
    }

    pub async fn recover_with_token(&self, raw_token: &str) -> Result<AuthSession, CoreError> {
        let token_hash = sha256_hex(&[&self.recovery_secret, ":", raw_token]);
        let mut token = self
            .store
            .get_recovery_token_by_hash(&token_hash)
            .await?
            .ok_or_else(|| CoreError::VerificationFailed("invalid recovery token".to_string()))?;

        if token.consumed_at.is_some() {
            return Err(CoreError::VerificationFailed(
                "recovery token already used".to_string(),
            ));
        }
        if token.expires_at <= Utc::now() {
            return Err(CoreError::VerificationFailed(
                "recovery token expired".to_string(),
            ));
        }

        let source = self
            .store
            .get_session(&token.session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("source session missing".to_string()))?;

        token.consumed_at = Some(Utc::now());
        self.store.save_recovery_token(token).await?;

        let now = Utc::now();
        let new_session = AuthSession {
            id: Uuid::new_v4().to_string(),
            method: source.method,
            status: AuthStatus::Verified,
            created_at: now,
            expires_at: now + ChronoDuration::minutes(EMAIL_SESSION_TTL_MINUTES),
            verified_at: Some(now),
            beneficiary_name: source.beneficiary_name,
            beneficiary_email: source.beneficiary_email,
            auth_provider: source.auth_provider,
            auth_subject: source.auth_subject,
            email_code_hash: None,
            oauth_state_token: None,
            verification_attempts: 0,
            max_verification_attempts: DEFAULT_MAX_ATTEMPTS,
            linked_user_id: source.linked_user_id,
        };
        self.store.save_session(new_session.clone()).await?;
        Ok(new_session)
    }

    pub async fn link_session_to_user(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<AuthSession, CoreError> {
        let mut session = self.load_materialized(session_id).await?;
        if session.status != AuthStatus::Verified {
            return Err(CoreError::VerificationFailed(
                "session must be verified before linking".to_string(),
            ));
        }
        session.linked_user_id = Some(user_id.to_string());
        self.store.save_session(session.clone()).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            std::sync::Arc::new(JsonFileAuthStore::memory()),
            "email-secret",
            "oauth-secret",
            "recovery-secret",
            vec!["google".to_string()],
        )
    }

    #[tokio::test]
    async fn correct_email_code_verifies_session() {
        let auth = service();
        let started = auth
            .start_email_auth(StartEmailAuthInput {
                email: "Ada@Example.com".to_string(),
                name: None,
            })
            .await
            .unwrap();
        let verified = auth
            .verify_email_auth(&started.session.id, &started.code)
            .await
            .unwrap();
        assert_eq!(verified.status, AuthStatus::Verified);
    }

    #[tokio::test]
    async fn wrong_code_locks_after_max_attempts() {
        let auth = service();
        let started = auth
            .start_email_auth(StartEmailAuthInput {
                email: "a@b.com".to_string(),
                name: None,
            })
            .await
            .unwrap();
        for _ in 0..DEFAULT_MAX_ATTEMPTS - 1 {
            let err = auth.verify_email_auth(&started.session.id, "000000").await;
            assert!(err.is_err());
        }
        let last = auth.verify_email_auth(&started.session.id, "000000").await;
        assert!(matches!(last, Err(CoreError::SessionLocked)));
    }

    #[tokio::test]
    async fn recovery_token_is_single_use() {
        let auth = service();
        let started = auth
            .start_email_auth(StartEmailAuthInput {
                email: "a@b.com".to_string(),
                name: None,
            })
            .await
            .unwrap();
        auth.verify_email_auth(&started.session.id, &started.code)
            .await
            .unwrap();

        let token = auth.start_recovery("a@b.com").await.unwrap();
        let recovered = auth.recover_with_token(&token).await.unwrap();
        assert_eq!(recovered.status, AuthStatus::Verified);

        let second_attempt = auth.recover_with_token(&token).await;
        assert!(second_attempt.is_err());
    }

    #[tokio::test]
    async fn oauth_state_round_trips_through_hmac() {
        let auth = service();
        let started = auth
            .start_oauth_auth("google", Some("a@b.com".to_string()), None)
            .await
            .unwrap();
        let verified = auth
            .verify_oauth_auth(
                &started.session.id,
                &started.state_token,
                "google",
                "subject-1",
                None,
            )
            .await
            .unwrap();
        assert_eq!(verified.status, AuthStatus::Verified);
        assert_eq!(verified.auth_subject.as_deref(), Some("subject-1"));
    }

    #[tokio::test]
    async fn tampered_oauth_state_token_is_rejected() {
        let auth = service();
        let started = auth
            .start_oauth_auth("google", None, None)
            .await
            .unwrap();
        let tampered = format!("{}x", started.state_token);
        let result = auth
            .verify_oauth_auth(&started.session.id, &tampered, "google", "sub", None)
            .await;
        assert!(result.is_err());
    }
}
