use anyhow::{Context, Result};
use clap::Parser;
use coinprice::{registry, Settings};
use futures::future;
use itertools::join;

#[derive(Parser)]
#[command(name = "coinprice", about = "Resolve token identifiers to USD prices")]
struct Args {
    /// Settings file; defaults to an optional PriceEngine.{toml,json}.
    #[arg(long)]
    config: Option<String>,

    /// Fully qualified token identifiers, e.g. 0x2::sui::SUI
    #[arg(required = true)]
    identifiers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Loading settings")?;
    log::info!("Starting price engine for network {}...", settings.network);
    let engine = registry::engine_from_settings(&settings)
        .await
        .context("Building price engine")?;

    let futures = args.identifiers.iter().map(|id| engine.get_token_price(id));
    let prices = future::join_all(futures).await;
    let report = join(
        args.identifiers
            .iter()
            .zip(prices)
            .map(|(id, price)| match price {
                Some(price) => format!("{}: ${}", id, price),
                None => format!("{}: unavailable", id),
            }),
        "\n",
    );
    println!("{}", report);
    Ok(())
}
