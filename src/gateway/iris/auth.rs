//! Credential backends behind one trait, selected by
//! `config::Iris::credential_source`. Both are external collaborators per
//! spec — the gateway defines the trait and the config-driven selection,
//! not a Wallet file format or OAuth's HTTP mechanics.

use crate::gateway::common::{Error, Result};
use crate::gateway::config::{CredentialSource, Iris};

/// Looks up or derives the plaintext IRIS-side password the gateway uses
/// both to authenticate its own pooled connections and to run the SCRAM
/// server side (§A.2/§6) against a connecting client.
pub trait AuthStrategy: Send + Sync {
    fn credential_lookup(&self, username: &str) -> Result<String>;
    fn verify(&self, username: &str, presented_password: &str) -> Result<bool> {
        let expected = self.credential_lookup(username)?;
        Ok(expected == presented_password)
    }
}

/// Static, config-supplied password — the common case for a single
/// service account shared by the gateway's pooled IRIS connections.
pub struct WalletAuth {
    username: String,
    password: String,
}

impl WalletAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl AuthStrategy for WalletAuth {
    fn credential_lookup(&self, username: &str) -> Result<String> {
        if username == self.username {
            Ok(self.password.clone())
        } else {
            Err(Error::auth_error(format!("no wallet credential for user {}", username)))
        }
    }
}

/// OAuth token-exchange stub: the gateway only needs to know this path
/// exists and is selected by config; the actual token exchange is an
/// external HTTP collaborator not modeled here.
pub struct OAuthAuth {
    client_id: String,
}

impl OAuthAuth {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into() }
    }
}

impl AuthStrategy for OAuthAuth {
    fn credential_lookup(&self, _username: &str) -> Result<String> {
        Err(Error::new(format!(
            "OAuth credential exchange (client_id={}) is not implemented by this gateway build",
            self.client_id
        )))
    }
}

pub fn from_config(iris: &Iris) -> Box<dyn AuthStrategy> {
    match iris.credential_source {
        CredentialSource::Password | CredentialSource::Wallet => {
            Box::new(WalletAuth::new(iris.user.clone(), iris.password.clone()))
        }
        CredentialSource::Oauth => {
            Box::new(OAuthAuth::new(iris.oauth_client_id.clone().unwrap_or_default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_verifies_matching_password() {
        let auth = WalletAuth::new("svc", "s3cret");
        assert!(auth.verify("svc", "s3cret").unwrap());
        assert!(!auth.verify("svc", "wrong").unwrap());
    }

    #[test]
    fn wallet_rejects_unknown_user() {
        let auth = WalletAuth::new("svc", "s3cret");
        assert!(auth.credential_lookup("nobody").is_err());
    }
}
