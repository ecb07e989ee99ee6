//! whosurf CLI
//!
//! Fetch a URL through Tor or I2P, then ask Tor for a new circuit.

use std::future::Future;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use whosurf_core::{
    I2pConfig, Network, RetryPolicy, TorConfig,
    DEFAULT_I2P_HTTP_PORT, DEFAULT_I2P_URL, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TOR_CONTROL_PORT, DEFAULT_TOR_SOCKS_PORT, DEFAULT_TOR_URL,
};
use whosurf_net::{renew_identity, HttpFetch, ProxyClient, RenewError, RetryingFetcher};

#[derive(Parser)]
#[command(name = "whosurf")]
#[command(author, version, about = "Fetch a URL over Tor or I2P", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args)]
struct FetchArgs {
    /// Maximum number of fetch attempts
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, global = true)]
    max_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_SECS, global = true)]
    retry_delay: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect via Tor
    Tor {
        /// Tor SOCKS proxy port
        #[arg(long, default_value_t = DEFAULT_TOR_SOCKS_PORT)]
        tor_socks_port: u16,

        /// Tor control port
        #[arg(long, default_value_t = DEFAULT_TOR_CONTROL_PORT)]
        tor_control_port: u16,

        /// URL to fetch via Tor
        #[arg(long, default_value = DEFAULT_TOR_URL)]
        tor_url: String,

        /// Control port password (or set TOR_CONTROL_PASSWORD env var)
        #[arg(long, env = "TOR_CONTROL_PASSWORD", hide_env_values = true)]
        tor_control_password: Option<String>,

        /// Skip requesting a new identity after the fetch
        #[arg(long)]
        no_renew: bool,
    },

    /// Connect via I2P
    I2p {
        /// I2P HTTP proxy port
        #[arg(long, default_value_t = DEFAULT_I2P_HTTP_PORT)]
        i2p_http_port: u16,

        /// URL to fetch via I2P
        #[arg(long, default_value = DEFAULT_I2P_URL)]
        i2p_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    println!("{}\n", banner());

    let retry = RetryPolicy::new(
        cli.fetch.max_attempts,
        Duration::from_secs(cli.fetch.retry_delay),
    )?;

    let (network, proxy, url, timeout, control) = match cli.command {
        Commands::Tor {
            tor_socks_port,
            tor_control_port,
            tor_url,
            tor_control_password,
            no_renew,
        } => {
            let config = TorConfig {
                socks_port: tor_socks_port,
                control_port: tor_control_port,
                control_password: tor_control_password,
                url: tor_url,
                timeout_secs: cli.fetch.timeout,
                retry,
            };
            // Validate the control endpoint before any traffic goes out.
            let control = if no_renew {
                None
            } else {
                Some(config.control_endpoint()?)
            };
            (Network::Tor, config.proxy_endpoint()?, config.url.clone(), config.timeout(), control)
        }
        Commands::I2p {
            i2p_http_port,
            i2p_url,
        } => {
            let config = I2pConfig {
                http_port: i2p_http_port,
                url: i2p_url,
                timeout_secs: cli.fetch.timeout,
                retry,
            };
            (Network::I2p, config.proxy_endpoint()?, config.url.clone(), config.timeout(), None)
        }
    };

    let fetcher = RetryingFetcher::new(ProxyClient::new(proxy, timeout)?, retry);

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, abandoning pending retries");
                token.cancel();
            }
        });
    }

    let renewal = control
        .as_ref()
        .filter(|_| network.supports_renewal())
        .map(renew_identity);

    let ok = run(network, &fetcher, &url, &token, renewal, &mut std::io::stdout()).await?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn banner() -> String {
    format!(
        "   whosurf: v{}.{}",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR")
    )
}

/// Fetch, print the body or failure message, then run the renewal if given.
///
/// Returns whether every step succeeded. Renewal is skipped once `token`
/// has been cancelled.
async fn run<C, R, W>(
    network: Network,
    fetcher: &RetryingFetcher<C>,
    url: &str,
    token: &CancellationToken,
    renewal: Option<R>,
    out: &mut W,
) -> Result<bool>
where
    C: HttpFetch,
    R: Future<Output = Result<(), RenewError>>,
    W: Write,
{
    writeln!(out, "[+] connecting via {}...", network)?;
    let outcome = fetcher.fetch_until_cancelled(url, token).await?;
    writeln!(out, "{}", outcome)?;
    out.flush()?;

    let mut ok = outcome.is_success();

    if let Some(renewal) = renewal.filter(|_| !token.is_cancelled()) {
        writeln!(out, "[+] renewing {} identity...", network)?;
        out.flush()?;
        match renewal.await {
            Ok(()) => writeln!(out, "[+] new {} identity requested", network)?,
            Err(e) => {
                writeln!(out, "[!] failed to renew {} identity: {}", network, e)?;
                ok = false;
            }
        }
    }

    Ok(ok)
}
