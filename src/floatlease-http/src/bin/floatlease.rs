//! Command-line tool for exercising a floating-license server.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use floatlease_core::{ClientConfig, FloatingClient, InMemoryServer, StatusCode};
use floatlease_http::HttpTransport;

#[derive(Parser)]
#[command(name = "floatlease", version, about = "Floating-license client tool")]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a seat-pool demonstration against a built-in server.
    Demo {
        /// Seats in the simulated pool.
        #[arg(long, default_value_t = 2)]
        seats: usize,
        /// Lease duration handed out by the simulated server, seconds.
        #[arg(long, default_value_t = 10)]
        lease_secs: u64,
    },
    /// Lease a seat from a real server, hold it, then drop it.
    Acquire {
        /// Product id registered on the server.
        #[arg(long)]
        product_id: String,
        /// Server url, e.g. http://localhost:8090.
        #[arg(long)]
        host_url: String,
        /// How long to hold the seat before dropping it, seconds.
        #[arg(long, default_value_t = 30)]
        hold_secs: u64,
        /// Request an offline lease of this many seconds instead of an
        /// online one.
        #[arg(long)]
        offline_secs: Option<u64>,
    },
    /// Query server-side configuration for a product without leasing.
    Status {
        /// Product id registered on the server.
        #[arg(long)]
        product_id: String,
        /// Server url, e.g. http://localhost:8090.
        #[arg(long)]
        host_url: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let result = match cli.command {
        Command::Demo { seats, lease_secs } => run_demo(seats, lease_secs),
        Command::Acquire {
            product_id,
            host_url,
            hold_secs,
            offline_secs,
        } => run_acquire(&product_id, &host_url, hold_secs, offline_secs),
        Command::Status {
            product_id,
            host_url,
        } => run_status(&product_id, &host_url),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(status) => {
            error!(status = %status, "command failed");
            ExitCode::FAILURE
        },
    }
}

/// Acquire seats from an in-process pool until it runs dry, then free
/// one and show the freed seat being re-leased.
fn run_demo(seats: usize, lease_secs: u64) -> Result<(), StatusCode> {
    info!(seats, lease_secs, "starting built-in lease server");
    let server = Arc::new(
        InMemoryServer::new()
            .with_seat_limit(seats)
            .with_lease_duration(Duration::from_secs(lease_secs)),
    );

    let clients: Vec<FloatingClient> = (0..seats)
        .map(|i| {
            let client = FloatingClient::new(server.clone());
            client.set_host_product_id("demo-product")?;
            client.set_host_url("http://localhost:8090")?;
            client.set_floating_license_callback(move |status| {
                info!(client = i, status = %status, "renewal callback");
            });
            client.request_floating_license()?;
            info!(client = i, "seat leased");
            Ok(client)
        })
        .collect::<Result<_, StatusCode>>()?;

    info!(leased = server.leased_seats(), "pool exhausted, next acquire must fail");
    let extra = FloatingClient::new(server.clone());
    extra.set_host_product_id("demo-product")?;
    extra.set_host_url("http://localhost:8090")?;
    extra.set_floating_license_callback(|status| {
        info!(client = "extra", status = %status, "renewal callback");
    });
    match extra.request_floating_license() {
        Err(StatusCode::LicenseLimitReached) => {
            info!("acquire over capacity correctly refused");
        },
        Err(status) => return Err(status),
        Ok(()) => {
            warn!("acquire over capacity unexpectedly succeeded");
            return Err(StatusCode::Fail);
        },
    }

    if let Some(first) = clients.first() {
        first.drop_floating_license()?;
        info!("seat 0 dropped, retrying the refused client");
        extra.request_floating_license()?;
        info!("freed seat re-leased");
        extra.drop_floating_license()?;
    }

    for client in &clients[1..] {
        client.drop_floating_license()?;
    }
    info!(leased = server.leased_seats(), "demo finished");
    Ok(())
}

fn run_acquire(
    product_id: &str,
    host_url: &str,
    hold_secs: u64,
    offline_secs: Option<u64>,
) -> Result<(), StatusCode> {
    let transport = Arc::new(HttpTransport::new()?);
    let client = FloatingClient::with_config(transport, ClientConfig::default());
    client.set_host_product_id(product_id)?;
    client.set_host_url(host_url)?;
    client.set_floating_license_callback(|status| {
        if status == StatusCode::Ok {
            info!("lease renewed");
        } else {
            warn!(status = %status, "lease renewal failed");
        }
    });

    match offline_secs {
        Some(duration) => {
            client.request_offline_floating_license(duration)?;
            info!(duration_secs = duration, "offline seat leased");
        },
        None => {
            client.request_floating_license()?;
            info!("seat leased");
        },
    }
    if let Ok(expiry) = client.get_lease_expiry_date() {
        info!(expires_at = ?expiry, "lease expiry");
    }

    info!(hold_secs, "holding seat");
    std::thread::sleep(Duration::from_secs(hold_secs));

    client.drop_floating_license()?;
    info!("seat dropped");
    Ok(())
}

fn run_status(product_id: &str, host_url: &str) -> Result<(), StatusCode> {
    let transport = Arc::new(HttpTransport::new()?);
    let client = FloatingClient::with_config(transport, ClientConfig::default());
    client.set_host_product_id(product_id)?;
    client.set_host_url(host_url)?;

    let config = client.get_host_config()?;
    info!(
        product_id,
        max_offline_lease_secs = config.max_offline_lease_duration,
        client_version = client.library_version(),
        "server reachable"
    );
    Ok(())
}
