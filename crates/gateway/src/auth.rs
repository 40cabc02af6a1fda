//! WebSocket client authentication.

use {
    axum::http::{HeaderMap, Uri, header},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    subtle::ConstantTimeEq,
};

use crate::hooks::token::query_param;

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Neither a token nor a password is configured.
    None,
    Token,
    Password,
}

/// Resolved gateway auth configuration.
#[derive(Debug, Clone)]
pub struct ResolvedAuth {
    pub mode: AuthMode,
    pub token: Option<Secret<String>>,
    pub password: Option<Secret<String>>,
}

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub ok: bool,
    pub method: Option<AuthMethod>,
    pub reason: Option<&'static str>,
}

impl AuthResult {
    fn allowed(method: Option<AuthMethod>) -> Self {
        Self {
            ok: true,
            method,
            reason: None,
        }
    }

    fn denied(reason: &'static str) -> Self {
        Self {
            ok: false,
            method: None,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Token,
    Password,
}

/// Credentials a connecting client presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectCredentials {
    pub token: Option<String>,
    pub password: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn safe_equal(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// Resolve auth from environment / config values. A password takes
/// precedence over a token.
pub fn resolve_auth(token: Option<String>, password: Option<String>) -> ResolvedAuth {
    let token = non_empty(token);
    let password = non_empty(password);
    let mode = match (&token, &password) {
        (_, Some(_)) => AuthMode::Password,
        (Some(_), None) => AuthMode::Token,
        (None, None) => AuthMode::None,
    };
    ResolvedAuth {
        mode,
        token: token.map(Secret::new),
        password: password.map(Secret::new),
    }
}

/// Read `?token=` / `?password=`, falling back to a bearer header for the
/// token.
pub fn connect_credentials(headers: &HeaderMap, uri: &Uri) -> ConnectCredentials {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
        .map(str::to_string);
    ConnectCredentials {
        token: non_empty(query_param(uri, "token")).or_else(|| non_empty(bearer)),
        password: non_empty(query_param(uri, "password")),
    }
}

/// Authenticate an incoming WebSocket connect request.
pub fn authorize_connect(auth: &ResolvedAuth, provided: &ConnectCredentials) -> AuthResult {
    match auth.mode {
        AuthMode::None => AuthResult::allowed(None),
        AuthMode::Token => {
            let Some(expected) = auth.token.as_ref() else {
                return AuthResult::denied("token_missing_config");
            };
            let Some(given) = provided.token.as_deref() else {
                return AuthResult::denied("token_missing");
            };
            if !safe_equal(given, expected.expose_secret()) {
                return AuthResult::denied("token_mismatch");
            }
            AuthResult::allowed(Some(AuthMethod::Token))
        },
        AuthMode::Password => {
            let Some(expected) = auth.password.as_ref() else {
                return AuthResult::denied("password_missing_config");
            };
            let Some(given) = provided.password.as_deref() else {
                return AuthResult::denied("password_missing");
            };
            if !safe_equal(given, expected.expose_secret()) {
                return AuthResult::denied("password_mismatch");
            }
            AuthResult::allowed(Some(AuthMethod::Password))
        },
    }
}
