use anyhow::bail;
use clap::Parser;
use core::{num::NonZeroUsize, time::Duration};

/// Runtime configuration for the `tablefill-server` binary.
///
/// These settings bound how much work a single request, and the server as a
/// whole, may ask for. All values are parsed from CLI arguments or
/// environment variables (a `.env` file is loaded first), with defaults that
/// are safe to expose on a local network.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tablefill-server",
    version,
    about = "A TCP service that fills tables sequentially and in parallel and reports the timings"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("127.0.0.1:65432"))]
    pub server_addr: String,

    /// Maximum OS threads a single fill may use.
    ///
    /// The thread count in a request only decides how the table is
    /// partitioned. Partitions are executed by at most this many threads, so
    /// a request for a million threads cannot exhaust the host. Defaults to
    /// the number of CPUs.
    ///
    /// Environment variable: `MAX_WORKERS`
    #[arg(long, env = "MAX_WORKERS", default_value_t = num_cpus::get())]
    pub max_workers: usize,

    /// Maximum number of cells (`rows * cols`) per request.
    ///
    /// Environment variable: `MAX_CELLS`
    #[arg(long, env = "MAX_CELLS", default_value_t = 16_777_216)]
    pub max_cells: usize,

    /// Maximum number of fills running at the same time.
    ///
    /// Further requests wait for a slot. Each fill holds two tables in
    /// memory, so this also bounds peak memory at roughly
    /// `2 * max_concurrent_fills * max_cells * 4` bytes.
    ///
    /// Environment variable: `MAX_CONCURRENT_FILLS`
    #[arg(long, env = "MAX_CONCURRENT_FILLS", default_value_t = 64)]
    pub max_concurrent_fills: usize,

    /// Maximum size of an encoded request.
    ///
    /// Environment variable: `MAX_REQUEST_BYTES`
    #[arg(long, env = "MAX_REQUEST_BYTES", default_value_t = 4096)]
    pub max_request_bytes: usize,

    /// Seconds a client has to send a complete request.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Seconds to wait for in-flight connections during shutdown before
    /// cancelling their fills.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub max_workers: NonZeroUsize,
    pub max_cells: usize,
    pub max_concurrent_fills: usize,
    pub max_request_bytes: usize,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some(max_workers) = NonZeroUsize::new(args.max_workers) else {
            bail!("MAX_WORKERS must be greater than 0");
        };

        if args.max_cells == 0 {
            bail!("MAX_CELLS must be greater than 0");
        }

        if args.max_concurrent_fills == 0 {
            bail!("MAX_CONCURRENT_FILLS must be greater than 0");
        }

        // Tokio's semaphore has a hard upper bound on permits.
        if args.max_concurrent_fills > tokio::sync::Semaphore::MAX_PERMITS {
            bail!(
                "MAX_CONCURRENT_FILLS ({}) exceeds the supported maximum ({})",
                args.max_concurrent_fills,
                tokio::sync::Semaphore::MAX_PERMITS
            );
        }

        if args.max_request_bytes == 0 {
            bail!("MAX_REQUEST_BYTES must be greater than 0");
        }

        if args.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            max_workers,
            max_cells: args.max_cells,
            max_concurrent_fills: args.max_concurrent_fills,
            max_request_bytes: args.max_request_bytes,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
impl ServerConfig {
    /// Small limits for handler tests.
    pub fn for_tests() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:0"),
            max_workers: NonZeroUsize::new(4).unwrap(),
            max_cells: 10_000,
            max_concurrent_fills: 4,
            max_request_bytes: 256,
            request_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            std::iter::once("tablefill-server").chain(extra.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = parse(&[
            "--server-addr",
            "0.0.0.0:9000",
            "--max-workers",
            "3",
            "--max-cells",
            "100",
            "--max-concurrent-fills",
            "2",
            "--max-request-bytes",
            "512",
            "--request-timeout-secs",
            "7",
            "--shutdown-timeout",
            "1",
        ])
        .unwrap();

        assert_eq!(config.server_addr, "0.0.0.0:9000");
        assert_eq!(config.max_workers.get(), 3);
        assert_eq!(config.max_cells, 100);
        assert_eq!(config.max_concurrent_fills, 2);
        assert_eq!(config.max_request_bytes, 512);
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_limits_are_rejected() {
        for flag in [
            "--max-workers",
            "--max-cells",
            "--max-concurrent-fills",
            "--max-request-bytes",
            "--request-timeout-secs",
        ] {
            let err = parse(&[flag, "0"]).unwrap_err();
            assert!(
                err.to_string().contains("must be greater than 0"),
                "{flag}: {err}"
            );
        }
    }

    #[test]
    fn non_numeric_limits_fail_to_parse() {
        assert!(parse(&["--max-workers", "lots"]).is_err());
    }
}
