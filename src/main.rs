use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bitcoin::Amount;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use batchpay::config::{self, Config};
use batchpay::explorer::EsploraApi;
use batchpay::keys::FundingKeys;
use batchpay::payout::{PayoutSession, Recipient};

/// CLI arguments
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the fee rate in sat/vB
    #[arg(long)]
    fee_rate: Option<f64>,

    /// Build and sign the transaction but print it instead of broadcasting
    #[arg(long)]
    no_broadcast: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(args.config.as_deref())?;
    config.validate()?;
    let network = config.network.to_bitcoin_network();

    let addresses = config::read_recipients(&config.recipients_file, network)?;
    let recipients: Vec<Recipient> = addresses
        .into_iter()
        .map(|address| Recipient {
            address,
            amount: Amount::from_sat(config.amount_sats),
        })
        .collect();

    let wif = config::read_wif(&config.wif_file)?;
    let keys = FundingKeys::from_wif(&wif, network, config.scheme)
        .context("deriving funding keys from the configured WIF")?;

    let chain = Arc::new(
        EsploraApi::new(network, config.esplora_url.clone())?.with_timeout(config.timeout_secs),
    );

    let session = PayoutSession::new(keys, chain);
    let fee_rate = args.fee_rate.or(config.fee_rate);

    let final_tx = session
        .run(&recipients, fee_rate, config.selection_order)
        .await?;

    if args.no_broadcast {
        println!("txid: {}", final_tx.txid);
        println!("fee: {} sats ({} vB)", final_tx.fee, final_tx.vsize);
        println!("{}", final_tx.hex);
    } else {
        let txid = session.broadcast(&final_tx).await?;
        println!("broadcast accepted: {}", txid);
    }

    Ok(())
}
