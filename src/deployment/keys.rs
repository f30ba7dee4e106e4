//! Local key material: locating the public key to install and generating
//! an RSA key pair when the default one does not exist yet.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use ssh_key::{
    private::{KeypairData, RsaKeypair},
    HashAlg, LineEnding, PrivateKey,
};

use crate::core::{
    constants::{DEFAULT_PRIVATE_KEY_FILE, DEFAULT_PUBLIC_KEY_FILE, RSA_KEY_BITS},
    error::DeployError,
};

/// A key pair completed on disk: either freshly generated, or an existing
/// private key whose missing public half was written next to it.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// `ssh-rsa <base64> <comment>`
    pub public_key_openssh: String,
    pub fingerprint: String,
    pub private_key_reused: bool,
}

/// `~/.ssh/id_rsa.pub` for the invoking user.
pub fn default_public_key_path() -> Result<PathBuf, DeployError> {
    match dirs::home_dir() {
        Some(home) => Ok(home.join(".ssh").join(DEFAULT_PUBLIC_KEY_FILE)),
        None => Err(DeployError::KeyFile {
            path: PathBuf::from("~/.ssh").join(DEFAULT_PUBLIC_KEY_FILE),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "home directory could not be determined",
            ),
        }),
    }
}

/// Resolve the public key path for a deployment.
///
/// An explicit path is only made absolute. Without one the default
/// `~/.ssh/id_rsa.pub` is used, and a 4096-bit RSA pair is generated
/// there first when it is missing.
pub fn resolve_local_key_path(path: Option<&Path>, comment: &str) -> Result<PathBuf, DeployError> {
    match path {
        Some(path) => std::path::absolute(path).map_err(|source| DeployError::KeyFile {
            path: path.to_path_buf(),
            source,
        }),
        None => ensure_default_key(RSA_KEY_BITS, comment),
    }
}

/// The default public key path, generating a `bits`-sized pair there first
/// when it is missing.
pub(crate) fn ensure_default_key(bits: usize, comment: &str) -> Result<PathBuf, DeployError> {
    let default = default_public_key_path()?;
    if let Some(generated) = ensure_key_pair(&default, bits, comment)? {
        report_generated(&generated);
    }
    Ok(default)
}

/// Resolve the key path and return the trimmed public key text.
pub fn resolve_local_key(path: Option<&Path>, comment: &str) -> Result<String, DeployError> {
    let path = resolve_local_key_path(path, comment)?;
    read_public_key(&path)
}

pub fn read_public_key(path: &Path) -> Result<String, DeployError> {
    let key = fs::read_to_string(path).map_err(|source| DeployError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(key.trim().to_string())
}

/// Make sure a key pair exists at `public_key_path` and its private half
/// (the same path minus `.pub`).
///
/// Existing files are never overwritten. When only the private key is
/// present its public key is written out instead of generating a new pair.
pub fn ensure_key_pair(
    public_key_path: &Path,
    bits: usize,
    comment: &str,
) -> Result<Option<GeneratedKey>, DeployError> {
    if public_key_path.exists() {
        return Ok(None);
    }

    let private_key_path = match public_key_path.to_str().and_then(|p| p.strip_suffix(".pub")) {
        Some(path) => PathBuf::from(path),
        None => public_key_path.with_file_name(DEFAULT_PRIVATE_KEY_FILE),
    };
    if private_key_path.exists() {
        return restore_public_key(&private_key_path, public_key_path).map(Some);
    }
    generate_rsa_keypair(&private_key_path, public_key_path, bits, comment).map(Some)
}

/// Write the public half of an existing OpenSSH private key.
pub fn restore_public_key(
    private_key_path: &Path,
    public_key_path: &Path,
) -> Result<GeneratedKey, DeployError> {
    let keygen_error = |reason: String| DeployError::KeyGeneration {
        path: private_key_path.to_path_buf(),
        reason,
    };

    let private_key = PrivateKey::read_openssh_file(private_key_path)
        .map_err(|e| keygen_error(format!("existing private key is unreadable: {}", e)))?;
    let public_key = private_key.public_key();
    let fingerprint = public_key.fingerprint(HashAlg::Sha256).to_string();
    let public_key_openssh = public_key
        .to_openssh()
        .map_err(|e| keygen_error(e.to_string()))?;

    write_new_file(public_key_path, format!("{}\n", public_key_openssh).as_bytes(), 0o644)
        .map_err(|e| keygen_error(e.to_string()))?;

    tracing::info!(path = %public_key_path.display(), "Restored public key from private key");

    Ok(GeneratedKey {
        private_key_path: private_key_path.to_path_buf(),
        public_key_path: public_key_path.to_path_buf(),
        public_key_openssh,
        fingerprint,
        private_key_reused: true,
    })
}

/// Generate an RSA key pair and write it in OpenSSH format.
///
/// The private key is written with mode 0600 and its parent directory is
/// created with mode 0700 when missing. Fails rather than replace either
/// file if it already exists.
pub fn generate_rsa_keypair(
    private_key_path: &Path,
    public_key_path: &Path,
    bits: usize,
    comment: &str,
) -> Result<GeneratedKey, DeployError> {
    let keygen_error = |reason: String| DeployError::KeyGeneration {
        path: private_key_path.to_path_buf(),
        reason,
    };

    tracing::info!(bits = bits, path = %private_key_path.display(), "Generating RSA key pair");

    let keypair = RsaKeypair::random(&mut rand::thread_rng(), bits)
        .map_err(|e| keygen_error(e.to_string()))?;
    let private_key = PrivateKey::new(KeypairData::from(keypair), comment)
        .map_err(|e| keygen_error(e.to_string()))?;

    let public_key = private_key.public_key();
    let fingerprint = public_key.fingerprint(HashAlg::Sha256).to_string();
    let public_key_openssh = public_key
        .to_openssh()
        .map_err(|e| keygen_error(e.to_string()))?;
    let private_key_pem = private_key
        .to_openssh(LineEnding::LF)
        .map_err(|e| keygen_error(e.to_string()))?;

    if let Some(parent) = private_key_path.parent() {
        create_key_dir(parent).map_err(|e| keygen_error(e.to_string()))?;
    }
    write_new_file(private_key_path, private_key_pem.as_bytes(), 0o600)
        .map_err(|e| keygen_error(e.to_string()))?;
    write_new_file(public_key_path, format!("{}\n", public_key_openssh).as_bytes(), 0o644)
        .map_err(|e| keygen_error(e.to_string()))?;

    tracing::debug!(fingerprint = %fingerprint, "Wrote key pair");

    Ok(GeneratedKey {
        private_key_path: private_key_path.to_path_buf(),
        public_key_path: public_key_path.to_path_buf(),
        public_key_openssh,
        fingerprint,
        private_key_reused: false,
    })
}

fn report_generated(key: &GeneratedKey) {
    if key.private_key_reused {
        println!(
            "Wrote missing public key {} from {}",
            key.public_key_path.display(),
            key.private_key_path.display()
        );
        return;
    }
    println!(
        "Generated new RSA key pair: {} and {}",
        key.private_key_path.display(),
        key.public_key_path.display()
    );
    println!("Key fingerprint is {}", key.fingerprint);
}

fn create_key_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

/// Create `path` with `mode`; an existing file is an error, never truncated.
fn write_new_file(path: &Path, content: &[u8], mode: u32) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options.open(path)?;
    file.write_all(content)
}
