//! Credential building for source and destination repositories.
//!
//! A [`CredentialDescriptor`] is the raw material coming from configuration
//! and the request (username, secret, optional SSH key path). It is turned
//! into an opaque [`AuthCredential`] that the git layer knows how to hand to
//! the `git` binary. Building never touches the network.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::error;

/// Raw credential material for one repository.
#[derive(Clone, Default)]
pub struct CredentialDescriptor {
    pub use_ssh: bool,
    pub username: String,
    pub secret: String,
    pub ssh_key_path: Option<PathBuf>,
}

impl CredentialDescriptor {
    /// Username/token credentials for HTTPS remotes.
    pub fn token(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            use_ssh: false,
            username: username.into(),
            secret: secret.into(),
            ssh_key_path: None,
        }
    }

    /// Private-key credentials for SSH remotes.
    pub fn ssh_key(path: impl Into<PathBuf>) -> Self {
        Self {
            use_ssh: true,
            username: String::new(),
            secret: String::new(),
            ssh_key_path: Some(path.into()),
        }
    }
}

impl fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDescriptor")
            .field("use_ssh", &self.use_ssh)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("ssh_key_path", &self.ssh_key_path)
            .finish()
    }
}

/// Authentication handle usable for clone, pull, push and ls-remote.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthCredential {
    /// HTTP basic authentication (username + password or personal token).
    Token { username: String, secret: String },
    /// SSH authentication with a private key file.
    Key { private_key_path: PathBuf },
}

impl AuthCredential {
    /// Value for git's `http.extraHeader` when using token authentication.
    pub fn basic_auth_header(&self) -> Option<String> {
        match self {
            AuthCredential::Token { username, secret } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, secret));
                Some(format!("Authorization: Basic {}", encoded))
            }
            AuthCredential::Key { .. } => None,
        }
    }

    /// Value for `GIT_SSH_COMMAND` when using key authentication.
    pub fn ssh_command(&self) -> Option<String> {
        match self {
            AuthCredential::Key { private_key_path } => Some(format!(
                "ssh -i '{}' -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                private_key_path.display()
            )),
            AuthCredential::Token { .. } => None,
        }
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthCredential::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
            AuthCredential::Key { private_key_path } => f
                .debug_struct("Key")
                .field("private_key_path", private_key_path)
                .finish(),
        }
    }
}

/// Build an authentication handle from a descriptor.
///
/// Returns `None` when SSH is requested but the key cannot be loaded; the
/// caller must treat that as "authentication unavailable" and not retry.
pub fn build_credential(descriptor: &CredentialDescriptor) -> Option<AuthCredential> {
    if !descriptor.use_ssh {
        return Some(AuthCredential::Token {
            username: descriptor.username.clone(),
            secret: descriptor.secret.clone(),
        });
    }

    let Some(path) = descriptor.ssh_key_path.as_deref() else {
        error!("SSH authentication requested but no key path was provided");
        return None;
    };

    match load_private_key(path) {
        Ok(()) => Some(AuthCredential::Key {
            private_key_path: path.to_path_buf(),
        }),
        Err(message) => {
            error!("Failed to load SSH key {}: {}", path.display(), message);
            None
        }
    }
}

fn load_private_key(path: &Path) -> std::result::Result<(), String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    if content.contains("PRIVATE KEY-----") {
        Ok(())
    } else {
        Err("file does not contain a PEM/OpenSSH private key".to_string())
    }
}
