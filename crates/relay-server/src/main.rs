//! Broadcast relay entry point.
//!
//! Listens on a TCP port and copies every chunk of bytes a client sends to
//! every other connected client.  One thread, one `poll(2)` call per pass.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>                TOML config file
//!   --port <PORT>                  TCP port to listen on [default: 3490]
//!   --bind <ADDR>                  IPv4 address to bind [default: 0.0.0.0]
//!   --buffer-size <BYTES>          Bytes per client read [default: 256]
//!   --initial-capacity <N>         Registry slots reserved at startup [default: 5]
//!   --on-delivery-failure <POLICY> keep | drop [default: keep]
//!   --write-timeout-ms <MS>        Per-destination write timeout
//!   --log-level <FILTER>           Used when RUST_LOG is unset [default: info]
//!   --print-config                 Print the effective config and exit
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the config file, then flags.  Every flag has an
//! environment variable; a flag given on the command line beats the variable.
//!
//! | Variable       | Flag           |
//! |----------------|----------------|
//! | `RELAY_CONFIG` | `--config`     |
//! | `RELAY_PORT`   | `--port`       |
//! | `RELAY_BIND`   | `--bind`       |
//! | `RELAY_LOG`    | `--log-level`  |
//!
//! # Exit status
//!
//! Zero only for `--print-config`.  The relay itself runs until the readiness
//! wait fails or setup fails (invalid config, port in use), and then exits
//! non-zero.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relay_server::application::DeliveryPolicy;
use relay_server::infrastructure::storage::config::{load_config, load_default_config, RelayConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Single-process TCP broadcast relay.
///
/// Every flag is optional.  Unset flags leave the config-file value (or the
/// built-in default) in place.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Relays bytes from each TCP client to every other client",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// Without this flag the relay looks for
    /// `$XDG_CONFIG_HOME/broadcast-relay/relay.toml` and uses built-in
    /// defaults if it does not exist.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// IPv4 address to bind.
    ///
    /// `0.0.0.0` accepts clients on every interface, `127.0.0.1` only local
    /// ones.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Maximum bytes read from one client per pass.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Connection registry slots reserved at startup, listener included.
    #[arg(long)]
    initial_capacity: Option<usize>,

    /// What to do with a destination whose write failed: `keep` or `drop`.
    #[arg(long)]
    on_delivery_failure: Option<DeliveryPolicy>,

    /// Give up on a blocked destination after this many milliseconds.
    #[arg(long)]
    write_timeout_ms: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "RELAY_LOG")]
    log_level: Option<String>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Loads the config file and layers the flags on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged configuration fails validation.
    fn resolve_config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_default_config().context("failed to load default config")?,
        };
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut RelayConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(bind) = &self.bind {
            config.network.bind_address = bind.clone();
        }
        if let Some(ms) = self.write_timeout_ms {
            config.network.write_timeout_ms = Some(ms);
        }
        if let Some(size) = self.buffer_size {
            config.relay.read_buffer_size = size;
        }
        if let Some(capacity) = self.initial_capacity {
            config.relay.initial_capacity = capacity;
        }
        if let Some(policy) = self.on_delivery_failure {
            config.relay.on_delivery_failure = policy;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

/// `RUST_LOG` if set, otherwise `level`, otherwise `info`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    use relay_server::application::Relay;
    use relay_server::infrastructure::network::poll::PollMultiplexer;
    use relay_server::infrastructure::network::tcp::TcpNetwork;
    use tracing::{error, info};

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    init_tracing(&config.logging.level);

    let addr = config.bind_addr()?;
    let network = match TcpNetwork::bind(addr, config.write_timeout()) {
        Ok(network) => network,
        Err(e) => {
            error!("{e}");
            return Err(e).context("relay could not start");
        }
    };
    let local = network
        .local_addr()
        .context("failed to read the listener address")?;
    info!("relay listening on {local}");

    let settings = config.relay_settings();
    info!(
        "read buffer {} bytes, initial capacity {}, on delivery failure: {}",
        settings.read_buffer_size, settings.initial_capacity, settings.delivery_policy
    );

    let mut relay = Relay::new(PollMultiplexer::new(), network, settings);
    match relay.run() {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{e}");
            info!("final counters: {}", relay.stats());
            Err(e).context("relay stopped")
        }
    }
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_tracing(&config.logging.level);
    anyhow::bail!("relay-server needs poll(2) and only runs on Unix-like systems")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["relay-server"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn overridden(args: &[&str]) -> RelayConfig {
        let mut config = RelayConfig::default();
        cli(args).apply_overrides(&mut config);
        config
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_cli_without_flags_overrides_nothing() {
        assert_eq!(overridden(&[]), RelayConfig::default());
    }

    #[test]
    fn test_cli_port_override() {
        let config = overridden(&["--port", "9999"]);
        assert_eq!(config.network.port, 9999);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:9999");
    }

    #[test]
    fn test_cli_bind_override() {
        let config = overridden(&["--bind", "127.0.0.1"]);
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:3490");
    }

    #[test]
    fn test_cli_relay_tunables_override() {
        // Arrange / Act
        let config = overridden(&[
            "--buffer-size",
            "1024",
            "--initial-capacity",
            "64",
            "--on-delivery-failure",
            "drop",
        ]);

        // Assert
        let settings = config.relay_settings();
        assert_eq!(settings.read_buffer_size, 1024);
        assert_eq!(settings.initial_capacity, 64);
        assert_eq!(settings.delivery_policy, DeliveryPolicy::DropPeer);
    }

    #[test]
    fn test_cli_write_timeout_override() {
        let config = overridden(&["--write-timeout-ms", "250"]);
        assert_eq!(config.write_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_cli_log_level_override() {
        let config = overridden(&["--log-level", "debug"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        let result = Cli::try_parse_from(["relay-server", "--on-delivery-failure", "retry"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_out_of_range_port() {
        let result = Cli::try_parse_from(["relay-server", "--port", "70000"]);
        assert!(result.is_err());
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    #[test]
    fn test_resolve_config_flags_beat_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nport = 4000\nbind_address = \"127.0.0.1\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        // Act
        let config = cli(&["--config", &path, "--port", "5000"])
            .resolve_config()
            .unwrap();

        // Assert
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:5000");
    }

    #[test]
    fn test_resolve_config_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let result = cli(&["--config", path.to_str().unwrap()]).resolve_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_config_rejects_ipv6_bind() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nbind_address = \"::1\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = cli(&["--config", &path]).resolve_config().unwrap_err();

        assert!(format!("{err:#}").contains("invalid bind address"));
    }

    #[test]
    fn test_resolve_config_rejects_zero_buffer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let result = cli(&["--config", &path, "--buffer-size", "0"]).resolve_config();

        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_config_rejects_oversized_buffer_and_capacity() {
        // Arrange
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        // Act
        let buffer = cli(&["--config", &path, "--buffer-size", "9000000000000000000"])
            .resolve_config();
        let capacity = cli(&["--config", &path, "--initial-capacity", "9000000000000000000"])
            .resolve_config();

        // Assert: both are reported as configuration errors, before any
        // allocation is attempted.
        let buffer_err = format!("{:#}", buffer.unwrap_err());
        let capacity_err = format!("{:#}", capacity.unwrap_err());
        assert!(buffer_err.contains("above the maximum"), "{buffer_err}");
        assert!(capacity_err.contains("above the maximum"), "{capacity_err}");
    }
}
