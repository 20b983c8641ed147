//! Arbitrage Scanner Entry Point.
//!
//! `scan` polls every configured exchange and prints the ranked,
//! fee-adjusted opportunities. `vault` manages the encrypted credential
//! blob that gates private network metadata.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use arb_strategy::{missing_fields, ArbScanner, FeeModel, RetryPolicy, ScanReport, ScanRequest};
use clap::{Parser, Subcommand};
use common::{CredentialSet, ExchangeId};
use credential_vault::CredentialVault;
use exchange_client::build_adapter;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::config::{load_config, ScannerConfig};

#[derive(Parser)]
#[command(name = "arb-scanner", about = "Cross-exchange spot arbitrage scanner")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Vault PIN.
    #[arg(long, global = true, env = "ARB_VAULT_PIN", hide_env_values = true)]
    pin: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan for opportunities, once or on the configured interval.
    Scan {
        #[arg(long)]
        once: bool,

        /// Print each report as JSON instead of a table.
        #[arg(long)]
        json: bool,

        #[arg(long)]
        min_pct: Option<f64>,

        #[arg(long)]
        min_abs: Option<f64>,

        #[arg(long)]
        notional: Option<f64>,

        #[arg(long)]
        quote: Option<String>,
    },

    /// Manage stored exchange credentials.
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Store (or replace) credentials for one exchange.
    Set {
        exchange: ExchangeId,

        #[arg(long)]
        api_key: String,

        #[arg(long)]
        api_secret: String,

        #[arg(long)]
        passphrase: Option<String>,
    },
    /// Forget one exchange's credentials.
    Remove { exchange: ExchangeId },
    /// List stored exchanges and which fields are missing.
    Show,
    /// Delete the vault file.
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "arb_scanner=info,arb_strategy=info,exchange_client=info,credential_vault=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let vault = CredentialVault::new(&cfg.vault_path);
    let pin = cli.pin.map(Zeroizing::new);

    match cli.command {
        Command::Vault { action } => run_vault(&vault, pin.as_deref().map(String::as_str), action),
        Command::Scan {
            once,
            json,
            min_pct,
            min_abs,
            notional,
            quote,
        } => {
            if let Some(v) = min_pct {
                cfg.scan.min_profit_pct = v;
            }
            if let Some(v) = min_abs {
                cfg.scan.min_profit_abs = v;
            }
            if let Some(v) = notional {
                cfg.scan.notional = v;
            }
            if let Some(q) = quote {
                cfg.scan.quote = q.trim().to_ascii_uppercase();
            }
            if let Err(e) = cfg.scan.validate() {
                error!("Config error: {}", e);
                return ExitCode::FAILURE;
            }
            run_scan(&cfg, &vault, pin.as_deref().map(String::as_str), once, json).await
        }
    }
}

fn require_pin(pin: Option<&str>) -> Option<&str> {
    match pin {
        Some(p) if !p.is_empty() => Some(p),
        _ => {
            error!("A vault PIN is required (--pin or ARB_VAULT_PIN)");
            None
        }
    }
}

fn run_vault(vault: &CredentialVault, pin: Option<&str>, action: VaultAction) -> ExitCode {
    let result = match action {
        VaultAction::Clear => vault.clear().map(|()| {
            println!("Vault cleared: {}", vault.path().display());
        }),
        VaultAction::Set {
            exchange,
            api_key,
            api_secret,
            passphrase,
        } => {
            let Some(pin) = require_pin(pin) else {
                return ExitCode::FAILURE;
            };
            vault.load_or_default(pin).and_then(|mut creds| {
                let mut set = CredentialSet::new(exchange, &api_key, &api_secret);
                if let Some(p) = passphrase.as_deref() {
                    set = set.with_passphrase(p);
                }
                creds.insert(set);
                let missing = missing_fields(exchange, &creds);
                if !missing.is_empty() {
                    warn!(
                        "{} will stay gated until these fields are set: {}",
                        exchange,
                        missing.join(", ")
                    );
                }
                vault.save(&creds, pin)?;
                println!("Saved credentials for {}", exchange);
                Ok(())
            })
        }
        VaultAction::Remove { exchange } => {
            let Some(pin) = require_pin(pin) else {
                return ExitCode::FAILURE;
            };
            vault.load(pin).and_then(|mut creds| {
                if creds.remove(exchange) {
                    vault.save(&creds, pin)?;
                    println!("Removed credentials for {}", exchange);
                } else {
                    println!("No credentials stored for {}", exchange);
                }
                Ok(())
            })
        }
        VaultAction::Show => {
            let Some(pin) = require_pin(pin) else {
                return ExitCode::FAILURE;
            };
            vault.load_or_default(pin).map(|creds| {
                for exchange in ExchangeId::ALL {
                    let missing = missing_fields(exchange, &creds);
                    let status = if creds.get(exchange).is_none() {
                        "not set".to_string()
                    } else if missing.is_empty() {
                        "ready".to_string()
                    } else {
                        format!("missing {}", missing.join(", "))
                    };
                    println!("{:<8} {}", exchange.as_str(), status);
                }
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Vault error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_scan(
    cfg: &ScannerConfig,
    vault: &CredentialVault,
    pin: Option<&str>,
    once: bool,
    json: bool,
) -> ExitCode {
    let credentials = match pin.filter(|p| !p.is_empty()) {
        Some(pin) => match vault.load_or_default(pin) {
            Ok(c) => c,
            Err(e) => {
                error!("Vault error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("No vault PIN given; every exchange stays gated");
            Default::default()
        }
    };

    let mut adapters = Vec::with_capacity(cfg.exchanges.len());
    for &id in &cfg.exchanges {
        match build_adapter(id, cfg.timing.request_timeout()) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => {
                error!("Failed to build {} client: {}", id, e);
                return ExitCode::FAILURE;
            }
        }
    }

    let scanner = Arc::new(ArbScanner::new(
        adapters,
        FeeModel::new(&cfg.fees),
        RetryPolicy::from_timing(&cfg.timing),
    ));
    scanner.load_credentials(credentials).await;

    let gated = scanner.gated(&cfg.exchanges).await;
    info!(
        "Scanner ready: {} exchange(s) configured, {} gated, quote={} notional={} min_pct={} min_abs={}",
        cfg.exchanges.len(),
        gated.len(),
        cfg.scan.quote,
        cfg.scan.notional,
        cfg.scan.min_profit_pct,
        cfg.scan.min_profit_abs
    );
    if gated.len() < 2 {
        warn!("Fewer than two exchanges have complete credentials; scans will be empty");
    }

    let request = Arc::new(ScanRequest {
        exchanges: cfg.exchanges.clone(),
        config: cfg.scan.clone(),
    });

    if once {
        if let Some(report) = scanner.scan(&request).await {
            print_report(&report, json);
        }
        return ExitCode::SUCCESS;
    }

    let mut ticker = tokio::time::interval(cfg.timing.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let scanner = Arc::clone(&scanner);
                let request = Arc::clone(&request);
                // A tick that lands on a running scan is dropped inside `scan`.
                tokio::spawn(async move {
                    match scanner.scan(&request).await {
                        Some(report) => print_report(&report, json),
                        None => debug!("Scan already in progress; tick skipped"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_report(report: &ScanReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode report: {}", e),
        }
        return;
    }

    println!("{}", report.status_line());
    if report.opportunities.is_empty() {
        println!("  no opportunities above threshold");
        return;
    }
    println!(
        "  {:<14} {:<22} {:<22} {:<10} {:>8} {:>10}  {}",
        "PAIR", "BUY", "SELL", "CHAIN", "NET %", "NET", "FEES"
    );
    for opp in &report.opportunities {
        println!(
            "  {:<14} {:<22} {:<22} {:<10} {:>8.3} {:>10.2}  {}",
            opp.pair.to_string(),
            format!("{} @ {:.8}", opp.buy_exchange, opp.buy_price),
            format!("{} @ {:.8}", opp.sell_exchange, opp.sell_price),
            opp.chain,
            opp.net_profit_pct,
            opp.net_profit_abs,
            opp.fee_description
        );
    }
}
