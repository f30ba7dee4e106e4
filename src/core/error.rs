use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a key deployment.
///
/// Only [`DeployError::Auth`] is recovered from (by re-prompting for a
/// password); every other variant surfaces to the top level and ends the
/// process with exit status 1.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("key file '{}' could not be opened: {source}", .path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not generate key pair at '{}': {reason}", .path.display())]
    KeyGeneration { path: PathBuf, reason: String },

    #[error("unrecognized [user@]machine {0}")]
    AmbiguousHost(String),

    #[error("invalid destination '{0}'")]
    InvalidDestination(String),

    #[error("authentication failed for {user}@{host}")]
    Auth { user: String, host: String },

    #[error("could not connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Command failed: {command}\n{stderr}")]
    Command {
        command: String,
        stderr: String,
        exit_status: Option<u32>,
    },

    #[error("config '{}' could not be loaded: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("failed to read password: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("interrupted")]
    Interrupted,
}

impl DeployError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DeployError::Auth { .. })
    }
}
