// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Authentication
//!
//! Turns the raw credential material of an inbound request into a
//! [`TenantContext`]: extract the credential, verify it in the trust mode its
//! transport implies, then resolve the tenant. Every versioned operation
//! downstream takes the resulting tenant id explicitly.
//!
//! | Transport | Trust mode | On failure |
//! |-----------|------------|------------|
//! | `Authorization: Bearer …` | `Bearer` | 401 problem details |
//! | `id_token` cookie | `Session` | redirect to login |
//! | nothing | - | redirect to login |

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::application::errors::{LedgerError, ProblemDetails};
use crate::application::tenant_resolver::TenantResolver;
use crate::domain::identity::{AuthError, CredentialVerifier, IdentityClaims, TrustMode};
use crate::domain::tenant::TenantId;
use crate::infrastructure::oidc::login::{expire_cookie, set_cookie, AuthorizationCodeClient};

/// Cookie holding the verified ID token of a browser session.
pub const ID_TOKEN_COOKIE: &str = "id_token";
/// Cookie holding the CSRF state of an in-flight login.
pub const OAUTH_STATE_COOKIE: &str = "oauthstate";

pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Lifetime of the `oauthstate` cookie.
const STATE_COOKIE_MAX_AGE_SECS: i64 = 600;

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Session(String),
    Bearer(String),
}

impl Credential {
    /// The `Authorization` header wins over the session cookie.
    pub fn from_request_parts(authorization: Option<&str>, cookie_header: Option<&str>) -> Option<Self> {
        if let Some(token) = authorization.and_then(bearer_token) {
            return Some(Credential::Bearer(token.to_string()));
        }
        cookie_header
            .and_then(|header| cookie_value(header, ID_TOKEN_COOKIE))
            .map(|token| Credential::Session(token.to_string()))
    }

    pub fn mode(&self) -> TrustMode {
        match self {
            Credential::Session(_) => TrustMode::Session,
            Credential::Bearer(_) => TrustMode::Bearer,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Credential::Session(t) | Credential::Bearer(t) => t,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential::{:?}(<redacted>)", self.mode())
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Value of `name` in a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Resolved caller: who they are and which tenant they act in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub principal: IdentityClaims,
}

/// How a rejected request should be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    /// Session transport or no credential: send the browser through login.
    RedirectToLogin { location: String },
    /// Bearer transport: 401 with problem details.
    Unauthorized(ProblemDetails),
    /// Credential was fine but the principal could not be mapped to a tenant.
    Failed(ProblemDetails),
}

impl AuthChallenge {
    pub fn status(&self) -> u16 {
        match self {
            AuthChallenge::RedirectToLogin { .. } => 302,
            AuthChallenge::Unauthorized(p) | AuthChallenge::Failed(p) => p.status,
        }
    }
}

/// Where to send the browser to start a login, and the state cookie to set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub location: String,
    pub state_cookie: String,
}

/// A completed login: the caller's context and the `Set-Cookie` values.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub context: TenantContext,
    pub session_cookie: String,
    pub clear_state_cookie: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logout {
    /// Provider end-session URL, or the local redirect when it has none.
    pub location: String,
    pub clear_session_cookie: String,
}

pub struct AuthenticationService {
    verifier: Arc<dyn CredentialVerifier>,
    resolver: Arc<TenantResolver>,
    login: Option<AuthorizationCodeClient>,
}

impl AuthenticationService {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, resolver: Arc<TenantResolver>) -> Self {
        Self {
            verifier,
            resolver,
            login: None,
        }
    }

    pub fn with_login_client(mut self, login: AuthorizationCodeClient) -> Self {
        self.login = Some(login);
        self
    }

    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        cookie_header: Option<&str>,
    ) -> Result<TenantContext, AuthChallenge> {
        match Credential::from_request_parts(authorization, cookie_header) {
            Some(credential) => self.authenticate_credential(&credential).await,
            None if !self.verifier.requires_credential() => {
                let claims = self
                    .verifier
                    .verify("", TrustMode::Session)
                    .await
                    .map_err(|e| self.reject(TrustMode::Session, e))?;
                self.context_for(claims).await
            }
            None => {
                debug!("No credential presented, redirecting to login");
                Err(self.reject(TrustMode::Session, AuthError::MissingCredential))
            }
        }
    }

    pub async fn authenticate_credential(&self, credential: &Credential) -> Result<TenantContext, AuthChallenge> {
        let claims = self.verify(credential).await?;
        self.context_for(claims).await
    }

    async fn context_for(&self, claims: IdentityClaims) -> Result<TenantContext, AuthChallenge> {
        let tenant_id = self
            .resolver
            .resolve(&claims)
            .await
            .map_err(|e| AuthChallenge::Failed(e.problem()))?;

        Ok(TenantContext {
            tenant_id,
            principal: claims,
        })
    }

    fn login_client(&self) -> Result<&AuthorizationCodeClient, LedgerError> {
        self.login
            .as_ref()
            .ok_or_else(|| LedgerError::DependencyUnavailable("session login is not configured".to_string()))
    }

    /// Start the authorization-code flow.
    pub fn begin_login(&self) -> Result<LoginRedirect, LedgerError> {
        let login = self.login_client()?;
        let state = AuthorizationCodeClient::generate_state();
        let location = login.authorization_url(&state).map_err(LedgerError::from)?;
        Ok(LoginRedirect {
            location,
            state_cookie: set_cookie(OAUTH_STATE_COOKIE, &state, STATE_COOKIE_MAX_AGE_SECS, true),
        })
    }

    /// Handle the provider callback: check `state` against the `oauthstate`
    /// cookie, exchange the code, then verify the ID token in session mode.
    pub async fn complete_login(
        &self,
        code: &str,
        state: &str,
        cookie_header: Option<&str>,
    ) -> Result<EstablishedSession, AuthChallenge> {
        let login = self
            .login_client()
            .map_err(|e| AuthChallenge::Failed(e.problem()))?;

        let expected = cookie_header
            .and_then(|header| cookie_value(header, OAUTH_STATE_COOKIE))
            .unwrap_or_default();
        if !AuthorizationCodeClient::verify_state(expected, state) {
            return Err(self.reject(
                TrustMode::Session,
                AuthError::InvalidCredential("login state mismatch".to_string()),
            ));
        }

        let tokens = login
            .exchange_code(code)
            .await
            .map_err(|e| self.reject(TrustMode::Session, e))?;
        let context = self
            .authenticate_credential(&Credential::Session(tokens.id_token.clone()))
            .await?;

        let max_age = (context.principal.expires_at - Utc::now()).num_seconds().max(0);
        info!(tenant_id = %context.tenant_id, "Established session");
        Ok(EstablishedSession {
            session_cookie: set_cookie(ID_TOKEN_COOKIE, &tokens.id_token, max_age, true),
            clear_state_cookie: expire_cookie(OAUTH_STATE_COOKIE),
            context,
        })
    }

    /// Clear the session cookie and, when possible, end the provider session.
    pub fn logout(&self, cookie_header: Option<&str>, post_logout_redirect: &str) -> Logout {
        let provider_logout = match (&self.login, cookie_header.and_then(|h| cookie_value(h, ID_TOKEN_COOKIE))) {
            (Some(login), Some(id_token)) => login.logout_url(id_token, post_logout_redirect),
            _ => None,
        };
        Logout {
            location: provider_logout.unwrap_or_else(|| post_logout_redirect.to_string()),
            clear_session_cookie: expire_cookie(ID_TOKEN_COOKIE),
        }
    }

    async fn verify(&self, credential: &Credential) -> Result<IdentityClaims, AuthChallenge> {
        self.verifier
            .verify(credential.token(), credential.mode())
            .await
            .map_err(|e| self.reject(credential.mode(), e))
    }

    fn reject(&self, mode: TrustMode, err: AuthError) -> AuthChallenge {
        counter!(
            "evolve_credentials_rejected_total",
            "mode" => mode.as_str(),
            "reason" => err.reason()
        )
        .increment(1);

        if !matches!(err, AuthError::MissingCredential) {
            warn!(mode = mode.as_str(), reason = err.reason(), "Rejected credential");
        }

        match mode {
            TrustMode::Session => AuthChallenge::RedirectToLogin {
                location: DEFAULT_LOGIN_PATH.to_string(),
            },
            TrustMode::Bearer => AuthChallenge::Unauthorized(LedgerError::from(err).problem()),
        }
    }
}
