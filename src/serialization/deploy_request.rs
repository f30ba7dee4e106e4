use std::{fmt, path::PathBuf};

use crate::core::constants::{DEFAULT_PORT, DEFAULT_REMOTE_KEY_PATH};

/// One key deployment, built once from the command line.
#[derive(Clone)]
pub struct DeploymentRequest {
    pub hostname: String,
    pub username: String,
    pub port: u16,
    /// `None` means prompt only if authentication fails.
    pub password: Option<String>,
    pub local_key_path: PathBuf,
    pub remote_key_path: String,
}

impl DeploymentRequest {
    pub fn new(hostname: String, username: String, local_key_path: PathBuf) -> DeploymentRequest {
        DeploymentRequest {
            hostname,
            username,
            port: DEFAULT_PORT,
            password: None,
            local_key_path,
            remote_key_path: DEFAULT_REMOTE_KEY_PATH.to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> DeploymentRequest {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> DeploymentRequest {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_remote_key_path(mut self, remote_key_path: String) -> DeploymentRequest {
        self.remote_key_path = remote_key_path;
        self
    }

    /// The private half of the local key, tried for key-based login.
    pub fn private_key_path(&self) -> Option<PathBuf> {
        let path = self.local_key_path.to_str()?.strip_suffix(".pub")?;
        Some(PathBuf::from(path))
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

impl fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentRequest")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("local_key_path", &self.local_key_path)
            .field("remote_key_path", &self.remote_key_path)
            .finish()
    }
}
