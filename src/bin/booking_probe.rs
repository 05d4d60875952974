// Booking backend probe
//
// Read-only diagnostics against the booking backend: reservation lock
// status, resale item availability and trade status. Prints the backend's
// JSON answer to stdout.

use std::io;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stay_booking_client::{
    ClientConfig, LockTarget, ReservationLockApi, ReservationLockClient, TradeApi, TradeClient,
    UsedItemIdx, UsedTradeIdx,
};

#[derive(Parser, Debug)]
#[command(name = "booking_probe")]
#[command(version, about = "Inspect reservation locks and resale trades", long_about = None)]
struct Cli {
    /// Backend base URL (overrides BOOKING_API_BASE_URL)
    #[arg(long, env = "BOOKING_API_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in milliseconds (overrides BOOKING_API_TIMEOUT_MS)
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Current lock state for a room and stay
    LockStatus {
        #[arg(long)]
        content_id: String,
        #[arg(long)]
        room_id: String,
        /// YYYY-MM-DD
        #[arg(long)]
        check_in: String,
        /// YYYY-MM-DD
        #[arg(long)]
        check_out: String,
    },
    /// Whether a resale item can be traded right now
    Availability { used_item_idx: String },
    /// Backend status of a resale trade
    TradeStatus { used_trade_idx: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stay_booking_client=info,booking_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().context("invalid backend configuration")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    info!(base_url = %config.base_url, "probing booking backend");

    let output = match cli.command {
        Command::LockStatus {
            content_id,
            room_id,
            check_in,
            check_out,
        } => {
            let target = LockTarget::parse(content_id, room_id, &check_in, &check_out)?;
            let client = ReservationLockClient::new(&config)?;
            client.lock_status(&target).await?
        }
        Command::Availability { used_item_idx } => {
            let client = TradeClient::new(&config)?;
            let availability = client
                .check_availability(&UsedItemIdx::new(used_item_idx))
                .await?;
            serde_json::to_value(availability)?
        }
        Command::TradeStatus { used_trade_idx } => {
            let client = TradeClient::new(&config)?;
            let trade = client
                .trade_status(&UsedTradeIdx::new(used_trade_idx))
                .await?;
            serde_json::to_value(trade)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
