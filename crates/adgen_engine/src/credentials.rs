//! Bearer credential lookup, injected into every client that talks to the service.

use adgen_core::ClientError;

pub const TOKEN_ENV_VAR: &str = "ADGEN_API_TOKEN";

pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, or `None` when signed out.
    fn bearer_token(&self) -> Option<String>;

    fn require_token(&self) -> Result<String, ClientError> {
        self.bearer_token()
            .filter(|token| !token.trim().is_empty())
            .ok_or(ClientError::Unauthenticated)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Reads the token from the environment on every call, so a token exported
/// after startup is picked up.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}
