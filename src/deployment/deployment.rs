use crate::{
    core::error::DeployError,
    deployment::{
        connection::{connect_with_retry, AuthContext, Connector, PasswordPrompt, RemoteShell, Target},
        keys::read_public_key,
    },
    serialization::deploy_request::DeploymentRequest,
};

/// What happened to the remote authorized-keys file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The file did not exist and now holds only the key.
    Created,
    /// The key was appended after a blank line.
    Appended,
    /// The key text was already in the file; nothing was written.
    AlreadyPresent,
}

impl InstallOutcome {
    pub fn copied(&self) -> u32 {
        match self {
            InstallOutcome::Created | InstallOutcome::Appended => 1,
            InstallOutcome::AlreadyPresent => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeployReport {
    pub outcome: InstallOutcome,
    pub copied: u32,
    pub login_hint: String,
}

impl DeployReport {
    pub fn print(&self) {
        println!();
        println!("Number of keys copied: {}", self.copied);
        println!(
            "Now try logging into the machine with: '{}'",
            self.login_hint
        );
    }
}

/// Shell command lines for one remote authorized-keys path.
#[derive(Clone, Debug)]
pub struct RemoteCommands {
    path: String,
    parent_dir: Option<String>,
}

impl RemoteCommands {
    pub fn new(remote_key_path: &str) -> RemoteCommands {
        let parent_dir = match remote_key_path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => Some(quote_remote_path(dir)),
            _ => None,
        };
        RemoteCommands {
            path: quote_remote_path(remote_key_path),
            parent_dir,
        }
    }

    pub fn system_info(&self) -> String {
        "uname -a".to_string()
    }

    pub fn exists(&self) -> String {
        format!("[ -f {} ] && echo 1 || echo 0", self.path)
    }

    pub fn read(&self) -> String {
        format!("cat {}", self.path)
    }

    pub fn append_blank_line(&self) -> String {
        format!("echo >> {}", self.path)
    }

    pub fn append_key(&self, key: &str) -> String {
        format!("echo {} >> {}", shell_escape(key), self.path)
    }

    pub fn create_parent_dir(&self) -> Option<String> {
        self.parent_dir.as_ref().map(|dir| format!("mkdir -p {}", dir))
    }

    pub fn write_key(&self, key: &str) -> String {
        format!("echo {} > {}", shell_escape(key), self.path)
    }

    pub fn restrict_permissions(&self) -> String {
        format!("chmod 600 {}", self.path)
    }
}

/// Quote a string for a POSIX shell. Plain words are left alone.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.' | ',' | ':' | '+' | '='))
    {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Like [`shell_escape`], but a leading `~/` stays bare so the remote
/// shell expands it to the login user's home directory.
pub fn quote_remote_path(path: &str) -> String {
    if path == "~" {
        return path.to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~/".to_string(),
        Some(rest) => format!("~/{}", shell_escape(rest)),
        None => shell_escape(path),
    }
}

/// Make sure `key` is present in the remote authorized-keys file.
///
/// Presence is a plain substring check against the whole file, so a key
/// contained in a longer line counts as installed. Nothing is rolled back
/// when a command fails halfway.
pub async fn install_key<S>(
    shell: &mut S,
    key: &str,
    remote_key_path: &str,
) -> Result<InstallOutcome, DeployError>
where
    S: RemoteShell + ?Sized,
{
    let commands = RemoteCommands::new(remote_key_path);

    let system = shell.run(&commands.system_info()).await?;
    println!("{}", system.stdout.trim_end());

    let exists = shell.run(&commands.exists()).await?;
    if exists.stdout.trim() == "1" {
        let authorized_keys = shell.run(&commands.read()).await?.stdout;
        if authorized_keys.contains(key) {
            println!(
                "WARNING: ssh public key already exists in '{}'",
                remote_key_path
            );
            tracing::info!(path = remote_key_path, "Key already installed");
            return Ok(InstallOutcome::AlreadyPresent);
        }
        shell.run(&commands.append_blank_line()).await?;
        shell.run(&commands.append_key(key)).await?;
        tracing::info!(path = remote_key_path, "Appended key");
        Ok(InstallOutcome::Appended)
    } else {
        if let Some(mkdir) = commands.create_parent_dir() {
            shell.run(&mkdir).await?;
        }
        shell.run(&commands.write_key(key)).await?;
        shell.run(&commands.restrict_permissions()).await?;
        tracing::info!(path = remote_key_path, "Created authorized keys file");
        Ok(InstallOutcome::Created)
    }
}

/// Runs one [`DeploymentRequest`] end to end.
pub struct Deployer {
    request: DeploymentRequest,
}

impl Deployer {
    pub fn new(request: DeploymentRequest) -> Deployer {
        Deployer { request }
    }

    pub fn target(&self) -> Target {
        Target {
            host: self.request.hostname.to_owned(),
            user: self.request.username.to_owned(),
            port: self.request.port,
        }
    }

    /// Read the local key, log in and install it, then print the summary.
    pub async fn deploy_key<C, P>(&self, connector: &C, prompt: &mut P) -> Result<DeployReport, DeployError>
    where
        C: Connector,
        P: PasswordPrompt,
    {
        let key = read_public_key(&self.request.local_key_path)?;
        let target = self.target();
        let auth = AuthContext::new(self.request.password.clone(), self.request.private_key_path());

        let mut session = connect_with_retry(connector, prompt, &target, auth).await?;
        let installed = install_key(&mut session, &key, &self.request.remote_key_path).await;
        session.close().await;
        let outcome = installed?;

        let report = DeployReport {
            outcome,
            copied: outcome.copied(),
            login_hint: self.login_hint(),
        };
        report.print();
        Ok(report)
    }

    fn login_hint(&self) -> String {
        if self.request.port == crate::core::constants::DEFAULT_PORT {
            format!("ssh {}", self.request.destination())
        } else {
            format!("ssh -p {} {}", self.request.port, self.request.destination())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape(""), "''");
        assert_eq!(shell_escape("/etc/ssh/keys"), "/etc/ssh/keys");
        assert_eq!(
            shell_escape("ssh-rsa AAAA+b/c= alice@laptop"),
            "'ssh-rsa AAAA+b/c= alice@laptop'"
        );
        assert_eq!(shell_escape("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_escape("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_tilde_stays_unquoted() {
        assert_eq!(quote_remote_path("~/.ssh/authorized_keys"), "~/.ssh/authorized_keys");
        assert_eq!(quote_remote_path("~/my keys/auth"), "~/'my keys/auth'");
        assert_eq!(quote_remote_path("~"), "~");
        assert_eq!(quote_remote_path("/root/~x"), "'/root/~x'");
    }

    #[test]
    fn test_remote_commands_for_default_path() {
        let commands = RemoteCommands::new("~/.ssh/authorized_keys");
        assert_eq!(
            commands.exists(),
            "[ -f ~/.ssh/authorized_keys ] && echo 1 || echo 0"
        );
        assert_eq!(commands.read(), "cat ~/.ssh/authorized_keys");
        assert_eq!(commands.append_blank_line(), "echo >> ~/.ssh/authorized_keys");
        assert_eq!(
            commands.append_key("ssh-rsa AAAA alice"),
            "echo 'ssh-rsa AAAA alice' >> ~/.ssh/authorized_keys"
        );
        assert_eq!(commands.create_parent_dir().as_deref(), Some("mkdir -p ~/.ssh"));
        assert_eq!(
            commands.write_key("ssh-rsa AAAA alice"),
            "echo 'ssh-rsa AAAA alice' > ~/.ssh/authorized_keys"
        );
        assert_eq!(commands.restrict_permissions(), "chmod 600 ~/.ssh/authorized_keys");
    }

    #[test]
    fn test_no_parent_dir_for_bare_file_name() {
        assert_eq!(RemoteCommands::new("authorized_keys").create_parent_dir(), None);
        assert_eq!(RemoteCommands::new("/authorized_keys").create_parent_dir(), None);
        assert_eq!(
            RemoteCommands::new("/etc/ssh/keys/alice").create_parent_dir().as_deref(),
            Some("mkdir -p /etc/ssh/keys")
        );
    }

    #[test]
    fn test_copied_count() {
        assert_eq!(InstallOutcome::Created.copied(), 1);
        assert_eq!(InstallOutcome::Appended.copied(), 1);
        assert_eq!(InstallOutcome::AlreadyPresent.copied(), 0);
    }
}
