use tracing_subscriber::EnvFilter;

/// Build the log filter for a `-v` count. `RUST_LOG` takes precedence.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("ssh_copy_id=warn"),
            1 => EnvFilter::new("ssh_copy_id=info"),
            // -vv also shows the transport for handshake troubleshooting
            2 => EnvFilter::new("ssh_copy_id=debug,russh=debug"),
            _ => EnvFilter::new("ssh_copy_id=trace,russh=trace,russh_keys=debug"),
        }
    }
}

/// Log to stderr so the user-facing lines on stdout stay readable.
pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
