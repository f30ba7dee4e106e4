use std::path::PathBuf;

use clap::Parser;

use crate::{
    core::{
        constants::{DEFAULT_PORT, DEFAULT_REMOTE_KEY_PATH},
        error::DeployError,
    },
    deployment::keys::resolve_local_key_path,
    serialization::{config::Config, deploy_request::DeploymentRequest},
};

#[derive(Parser, Debug)]
#[command(
    name = "ssh-copy-id",
    version,
    about = "Install your public key in a remote machine's authorized_keys",
    long_about = "Copies a local SSH public key into ~/.ssh/authorized_keys on a remote host.\nA 4096-bit RSA key pair is generated at ~/.ssh/id_rsa when no key exists yet.\nIf key-based login fails you are asked for a password (up to 3 attempts in total).\nRunning it again is harmless: a key that is already installed is not added twice."
)]
pub struct Cli {
    #[arg(value_name = "[user@]hostname", help = "Remote machine, optionally prefixed by the login name")]
    pub destination: String,

    #[arg(
        short = 'i',
        value_name = "identity_file",
        help = "Public key to install [default: ~/.ssh/id_rsa.pub, generated if missing]"
    )]
    pub identity_file: Option<PathBuf>,

    #[arg(
        short = 'p',
        value_name = "port",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "SSH port [default: 22]"
    )]
    pub port: Option<u16>,

    #[arg(
        short = 'P',
        value_name = "password",
        help = "Password to log in with; you are prompted when it is omitted and key login fails"
    )]
    pub password: Option<String>,

    #[arg(
        short = 't',
        long = "target-path",
        value_name = "path",
        help = "Remote authorized keys file [default: ~/.ssh/authorized_keys]"
    )]
    pub target_path: Option<String>,

    #[arg(
        short = 'F',
        long = "config",
        value_name = "file",
        help = "JSON file with defaults for user, port, identityFile and targetPath"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', action = clap::ArgAction::Count, help = "Verbose logging (-v, -vv, -vvv)")]
    pub verbose: u8,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config, DeployError> {
        match self.config {
            Some(ref path) => Config::read_config(path),
            None => Ok(Config::default()),
        }
    }

    /// Build the deployment request: flags over config file over defaults.
    /// The destination is validated before any key is touched.
    pub fn to_request(&self, config: &Config) -> Result<DeploymentRequest, DeployError> {
        let (user, hostname) = parse_destination(&self.destination)?;
        let username = user
            .or_else(|| config.user.clone())
            .unwrap_or_else(current_user);

        let identity = self.identity_file.as_ref().or(config.identity_file.as_ref());
        let local_key_path = resolve_local_key_path(identity.map(|p| p.as_path()), &local_key_comment())?;

        let port = self.port.or(config.port).unwrap_or(DEFAULT_PORT);
        let remote_key_path = self
            .target_path
            .clone()
            .or_else(|| config.target_path.clone())
            .unwrap_or_else(|| DEFAULT_REMOTE_KEY_PATH.to_string());

        Ok(DeploymentRequest::new(hostname, username, local_key_path)
            .with_port(port)
            .with_password(self.password.clone())
            .with_remote_key_path(remote_key_path))
    }
}

/// Split `[user@]hostname`. More than one `@` is rejected.
pub fn parse_destination(destination: &str) -> Result<(Option<String>, String), DeployError> {
    let parts: Vec<&str> = destination.split('@').collect();
    let (user, host) = match parts.as_slice() {
        [host] => (None, *host),
        [user, host] => (Some(*user), *host),
        _ => return Err(DeployError::AmbiguousHost(destination.to_string())),
    };

    if host.is_empty() || user.is_some_and(|u| u.is_empty()) {
        return Err(DeployError::InvalidDestination(destination.to_string()));
    }
    Ok((user.map(str::to_string), host.to_string()))
}

/// Login name of the invoking user.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

/// Comment for a generated key: the local `user@hostname`, as ssh-keygen
/// writes it.
pub fn local_key_comment() -> String {
    format!(
        "{}@{}",
        current_user(),
        gethostname::gethostname().to_string_lossy()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("example.com").unwrap(),
            (None, "example.com".to_string())
        );
        assert_eq!(
            parse_destination("alice@example.com").unwrap(),
            (Some("alice".to_string()), "example.com".to_string())
        );
    }

    #[test]
    fn test_two_at_signs_are_ambiguous() {
        let err = parse_destination("alice@bob@host").unwrap_err();
        assert!(matches!(err, DeployError::AmbiguousHost(ref d) if d == "alice@bob@host"));
    }

    #[test]
    fn test_empty_parts_are_invalid() {
        for destination in ["", "alice@", "@host"] {
            let err = parse_destination(destination).unwrap_err();
            assert!(matches!(err, DeployError::InvalidDestination(_)), "{destination}");
        }
    }

    #[test]
    fn test_local_key_comment() {
        let comment = local_key_comment();
        let (user, host) = comment.split_once('@').unwrap();
        assert_eq!(user, current_user());
        assert_eq!(host, gethostname::gethostname().to_string_lossy());
        assert!(!host.is_empty());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "ssh-copy-id",
            "-i",
            "/keys/deploy.pub",
            "-p",
            "2222",
            "-P",
            "secret",
            "-vv",
            "alice@example.com",
        ])
        .unwrap();

        assert_eq!(cli.destination, "alice@example.com");
        assert_eq!(cli.identity_file, Some(PathBuf::from("/keys/deploy.pub")));
        assert_eq!(cli.port, Some(2222));
        assert_eq!(cli.password.as_deref(), Some("secret"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_port_must_be_positive() {
        assert!(Cli::try_parse_from(["ssh-copy-id", "-p", "0", "host"]).is_err());
        assert!(Cli::try_parse_from(["ssh-copy-id", "-p", "ssh", "host"]).is_err());
    }

    #[test]
    fn test_request_precedence() {
        let cli = Cli::try_parse_from([
            "ssh-copy-id",
            "-i",
            "/keys/deploy.pub",
            "-p",
            "2222",
            "bob@example.com",
        ])
        .unwrap();
        let config = Config {
            user: Some("deploy".to_string()),
            port: Some(2200),
            identity_file: Some(PathBuf::from("/keys/other.pub")),
            target_path: Some("/etc/keys/bob".to_string()),
        };

        let request = cli.to_request(&config).unwrap();
        assert_eq!(request.username, "bob");
        assert_eq!(request.hostname, "example.com");
        assert_eq!(request.port, 2222);
        assert_eq!(request.local_key_path, PathBuf::from("/keys/deploy.pub"));
        assert_eq!(request.remote_key_path, "/etc/keys/bob");
        assert_eq!(request.password, None);
    }

    #[test]
    fn test_request_uses_config_user() {
        let cli = Cli::try_parse_from(["ssh-copy-id", "-i", "/keys/deploy.pub", "example.com"]).unwrap();
        let config = Config {
            user: Some("deploy".to_string()),
            ..Config::default()
        };

        let request = cli.to_request(&config).unwrap();
        assert_eq!(request.username, "deploy");
        assert_eq!(request.port, 22);
        assert_eq!(request.remote_key_path, "~/.ssh/authorized_keys");
    }

    #[test]
    fn test_ambiguous_host_rejected_before_key_resolution() {
        let cli = Cli::try_parse_from(["ssh-copy-id", "-i", "/nonexistent.pub", "alice@bob@host"]).unwrap();
        let err = cli.to_request(&Config::default()).unwrap_err();
        assert!(matches!(err, DeployError::AmbiguousHost(_)));
    }
}
