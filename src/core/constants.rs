pub static DEFAULT_PORT: u16 = 22;
pub static DEFAULT_REMOTE_KEY_PATH: &str = "~/.ssh/authorized_keys";
pub static DEFAULT_PUBLIC_KEY_FILE: &str = "id_rsa.pub";
pub static DEFAULT_PRIVATE_KEY_FILE: &str = "id_rsa";
pub static RSA_KEY_BITS: usize = 4096;
// 1 initial attempt + 2 password retries, not configurable
pub static MAX_AUTH_ATTEMPTS: u32 = 3;
