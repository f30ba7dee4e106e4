//! Authenticated remote sessions.
//!
//! The deploy algorithm only needs to run shell commands one after another,
//! so the SSH transport is hidden behind [`Connector`] and [`RemoteShell`].

use std::{fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use russh::{client, ChannelMsg, Disconnect};
use russh_keys::key;

use crate::core::{constants::MAX_AUTH_ATTEMPTS, error::DeployError};

/// Where to connect.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub host: String,
    pub user: String,
    pub port: u16,
}

/// Credentials for a single connection attempt.
///
/// Without a password, key-based login is tried: the private key at
/// `identity` first, then the SSH agent.
#[derive(Clone, Default, PartialEq)]
pub struct AuthContext {
    pub password: Option<String>,
    pub identity: Option<PathBuf>,
}

impl AuthContext {
    pub fn new(password: Option<String>, identity: Option<PathBuf>) -> AuthContext {
        AuthContext { password, identity }
    }

    fn with_password(self, password: String) -> AuthContext {
        AuthContext {
            password: Some(password),
            ..self
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: u32,
}

#[async_trait]
pub trait RemoteShell: Send {
    /// Run `command` and wait for it to finish. A non-zero exit status is
    /// returned as [`DeployError::Command`].
    async fn run(&mut self, command: &str) -> Result<CommandOutput, DeployError>;

    async fn close(&mut self) {}
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: RemoteShell;

    /// Open an authenticated session. Rejected credentials are reported as
    /// [`DeployError::Auth`], everything else as [`DeployError::Connect`].
    async fn connect(&self, target: &Target, auth: AuthContext) -> Result<Self::Session, DeployError>;
}

#[async_trait]
pub trait PasswordPrompt: Send {
    async fn prompt(&mut self, target: &Target) -> Result<String, DeployError>;
}

/// Connect, asking for a password each time authentication is rejected.
///
/// At most [`MAX_AUTH_ATTEMPTS`] attempts are made in total; the last
/// authentication failure is returned once they are used up. Any other
/// connection error is returned immediately.
pub async fn connect_with_retry<C, P>(
    connector: &C,
    prompt: &mut P,
    target: &Target,
    initial: AuthContext,
) -> Result<C::Session, DeployError>
where
    C: Connector,
    P: PasswordPrompt,
{
    let mut auth = initial;
    let mut attempt = 1;
    loop {
        tracing::debug!(attempt = attempt, host = %target.host, "Connecting");
        match connector.connect(target, auth.clone()).await {
            Ok(session) => return Ok(session),
            Err(e) if e.is_auth_failure() && attempt < MAX_AUTH_ATTEMPTS => {
                tracing::info!(attempt = attempt, "Authentication rejected, asking for password");
                let password = prompt.prompt(target).await?;
                auth = auth.with_password(password);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

struct Client {}

#[async_trait]
impl client::Handler for Client {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(key_type = server_public_key.name(), "Accepting server key");
        Ok(true)
    }
}

/// russh-backed [`Connector`].
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new() -> SshConnector {
        SshConnector {
            config: Arc::new(client::Config::default()),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        SshConnector::new()
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, target: &Target, auth: AuthContext) -> Result<SshSession, DeployError> {
        let connect_error = |reason: String| DeployError::Connect {
            host: target.host.clone(),
            port: target.port,
            reason,
        };

        let mut handle = client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            Client {},
        )
        .await
        .map_err(|e| connect_error(e.to_string()))?;

        let authenticated = match auth.password {
            Some(ref password) => handle
                .authenticate_password(target.user.as_str(), password.as_str())
                .await
                .map_err(|e| connect_error(e.to_string()))?,
            None => authenticate_with_keys(&mut handle, target, &auth)
                .await
                .map_err(|e| connect_error(e.to_string()))?,
        };

        if !authenticated {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            return Err(DeployError::Auth {
                user: target.user.clone(),
                host: target.host.clone(),
            });
        }

        tracing::info!(user = %target.user, host = %target.host, "Authenticated");
        Ok(SshSession { handle })
    }
}

async fn authenticate_with_keys(
    handle: &mut client::Handle<Client>,
    target: &Target,
    auth: &AuthContext,
) -> Result<bool, russh::Error> {
    if let Some(ref identity) = auth.identity {
        match russh_keys::load_secret_key(identity, None) {
            Ok(key_pair) => {
                if handle
                    .authenticate_publickey(target.user.as_str(), Arc::new(key_pair))
                    .await?
                {
                    return Ok(true);
                }
            }
            Err(e) => {
                tracing::debug!(path = %identity.display(), error = %e, "Skipping identity");
            }
        }
    }

    #[cfg(unix)]
    {
        let mut agent = match russh_keys::agent::client::AgentClient::connect_env().await {
            Ok(agent) => agent,
            Err(e) => {
                tracing::debug!(error = %e, "No SSH agent available");
                return Ok(false);
            }
        };
        let identities = match agent.request_identities().await {
            Ok(identities) => identities,
            Err(e) => {
                tracing::debug!(error = %e, "SSH agent did not list identities");
                return Ok(false);
            }
        };
        for public_key in identities {
            let (returned, result) = handle
                .authenticate_future(target.user.as_str(), public_key, agent)
                .await;
            agent = returned;
            match result {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(e) => tracing::debug!(error = %e, "Agent signing failed"),
            }
        }
    }

    Ok(false)
}

/// An authenticated russh session; each command gets its own channel.
pub struct SshSession {
    handle: client::Handle<Client>,
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, DeployError> {
        let command_error = |stderr: String, exit_status: Option<u32>| DeployError::Command {
            command: command.to_string(),
            stderr,
            exit_status,
        };

        tracing::debug!(command = command, "Running remote command");
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| command_error(e.to_string(), None))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| command_error(e.to_string(), None))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status: exit_status.unwrap_or(0),
        };
        match exit_status {
            Some(0) => Ok(output),
            // channel closed without reporting a status
            None => Err(command_error(output.stderr, None)),
            Some(status) => Err(command_error(output.stderr, Some(status))),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!(error = %e, "Disconnect failed");
        }
    }
}
