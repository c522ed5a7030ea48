// Sign-in seam for the `googleAuth` action
// Token issuance itself happens elsewhere; this only has to hand back a bearer credential

use anyhow::{bail, Result};
use async_trait::async_trait;

pub const TOKEN_ENV_VAR: &str = "HIGHLIGHT_SYNC_TOKEN";

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a bearer token from `provider`.
    async fn authenticate(&self, provider: &str) -> Result<String>;
}

/// Hands out a pre-provisioned token from the environment.
#[derive(Debug, Clone)]
pub struct EnvTokenAuthenticator {
    var: String,
}

impl Default for EnvTokenAuthenticator {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl EnvTokenAuthenticator {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl Authenticator for EnvTokenAuthenticator {
    async fn authenticate(&self, provider: &str) -> Result<String> {
        if !provider.eq_ignore_ascii_case("google") {
            bail!("Unsupported sign-in provider: {}", provider);
        }

        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => bail!("Sign-in unavailable: set {} to a valid token", self.var),
        }
    }
}
