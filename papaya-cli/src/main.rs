//! Command-line host for papaya subscription checkout.
//!
//! # Usage
//!
//! ```bash
//! # Readiness report for an account
//! papaya status --account 0x... --network eip155:137 --payee 0x... --cost 9.99
//!
//! # Run approve, deposit and subscribe with a local key
//! PRIVATE_KEY=0x... papaya subscribe --network 137 --payee 0x... --cost 9.99 --cycle monthly
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `papaya.toml`)
//! - `PRIVATE_KEY` - Payer key for `subscribe`
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use clap::{Args, Parser, Subcommand};
use papaya::chain::{ChainClient, ChainId, parse_caip2};
use papaya::controller::{OrchestrationController, RunOutcome, StepEvent};
use papaya::cycle::PayCycle;
use papaya::fee::FiatPriceSource;
use papaya::terms::SubscriptionTerms;
use papaya::view::{ControllerView, Phase};
use papaya_evm::Eip155ChainClient;
use papaya_http::CoinGeckoPriceSource;

use crate::config::{CliConfig, DEFAULT_CONFIG_PATH, ResolvedNetworks};

#[derive(Debug, Parser)]
#[command(name = "papaya", version, about = "Subscription readiness and checkout")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the readiness verdict, fee quote and next step.
    Status {
        /// Payer account.
        #[arg(long)]
        account: Address,
        #[command(flatten)]
        checkout: CheckoutArgs,
    },
    /// Run every remaining step until the subscription is active.
    Subscribe {
        /// Payer private key (hex).
        #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        #[command(flatten)]
        checkout: CheckoutArgs,
    },
}

#[derive(Debug, Args)]
struct CheckoutArgs {
    /// Chain as `eip155:<id>` or a bare chain ID.
    #[arg(long, value_parser = parse_network)]
    network: ChainId,
    /// Subscription recipient.
    #[arg(long)]
    payee: Address,
    /// Cost per cycle in token units, e.g. `9.99`.
    #[arg(long)]
    cost: String,
    /// Billing period.
    #[arg(long, default_value = "monthly")]
    cycle: PayCycle,
    /// Payment token symbol.
    #[arg(long, default_value = "USDC")]
    token: String,
    /// Project identifier.
    #[arg(long, default_value_t = 0)]
    project_id: u64,
}

impl CheckoutArgs {
    fn terms(&self) -> SubscriptionTerms {
        SubscriptionTerms {
            payee: self.payee,
            cost: self.cost.clone(),
            pay_cycle: self.cycle,
            token: self.token.clone(),
            project_id: self.project_id,
        }
    }
}

fn parse_network(value: &str) -> Result<ChainId, String> {
    parse_caip2(value)
        .or_else(|| value.parse().ok())
        .ok_or_else(|| format!("invalid network {value:?}, expected eip155:<id> or a chain ID"))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    #[cfg(feature = "telemetry")]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("papaya failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::load_from(&cli.config)?;
    let ResolvedNetworks {
        registry,
        endpoints,
    } = config.networks()?;
    tracing::info!(networks = registry.len(), "Loaded configuration");
    if registry.is_empty() {
        tracing::warn!("No networks configured, every checkout will be unsupported");
    }

    let mut prices = CoinGeckoPriceSource::try_from(config.price_api_url())?;
    if let Some(key) = config.price_api_key() {
        prices = prices.with_api_key(key);
    }
    let registry = Arc::new(registry);

    match cli.command {
        Command::Status { account, checkout } => {
            let client = Eip155ChainClient::read_only(endpoints, config.receipt_timeout());
            let controller =
                OrchestrationController::new(client, registry, prices, &config.orchestration);
            start(&controller, account, &checkout).await;
            print_view(&controller.view())?;
            Ok(())
        }
        Command::Subscribe {
            private_key,
            checkout,
        } => {
            let signer: PrivateKeySigner = private_key
                .trim()
                .parse()
                .map_err(|e| format!("Invalid PRIVATE_KEY: {e}"))?;
            let account = signer.address();
            tracing::info!(%account, "Using local signer");
            let wallet = EthereumWallet::from(signer);
            let client = Eip155ChainClient::new(&wallet, endpoints, config.receipt_timeout());
            let controller =
                OrchestrationController::new(client, registry, prices, &config.orchestration);
            start(&controller, account, &checkout).await;

            tokio::select! {
                result = checkout_loop(&controller) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl-C, closing checkout");
                    controller.close();
                    Err("interrupted".into())
                }
            }
        }
    }
}

async fn start<C, P>(
    controller: &OrchestrationController<C, P>,
    account: Address,
    checkout: &CheckoutArgs,
) where
    C: ChainClient,
    P: FiatPriceSource,
{
    controller.set_account(Some(account)).await;
    controller.set_network(Some(checkout.network)).await;
    controller.set_terms(Some(checkout.terms())).await;
    controller.open().await;
}

/// Runs the enabled step until the subscription is active or no step is
/// left.
async fn checkout_loop<C, P>(
    controller: &OrchestrationController<C, P>,
) -> Result<(), Box<dyn std::error::Error>>
where
    C: ChainClient,
    P: FiatPriceSource,
{
    loop {
        let view = controller.view();
        print_view(&view)?;
        if view.phase == Phase::Subscribed {
            tracing::info!("Subscription active");
            return Ok(());
        }
        let Some(step) = view.active_step else {
            return Err(view.banner.map_or_else(
                || "no step can run for this checkout".to_owned(),
                |banner| format!("{}: {}", banner.title, banner.description),
            )
            .into());
        };
        match controller.run_step(step).await {
            RunOutcome::Finished(StepEvent::Succeeded(step)) => {
                tracing::info!(%step, "Step confirmed");
            }
            RunOutcome::Finished(StepEvent::Failed { title, message, .. }) => {
                return Err(format!("{title}: {message}").into());
            }
            RunOutcome::Cancelled => return Err("signature request rejected".into()),
            RunOutcome::Skipped | RunOutcome::Detached => {
                return Err(format!("{step} could not run").into());
            }
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_view(view: &ControllerView) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(())
}
