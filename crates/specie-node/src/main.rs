//! Specie simulation node: stands up an in-process witness network, runs a
//! randomized transfer workload (including one double-spend attempt), and
//! then either exits or keeps the background sweeps running.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{info, warn};

use specie_core::event::NetworkEvent;
use specie_core::types::now_ms;
use specie_network::network::{Network, NetworkOptions};

#[derive(Debug, Clone)]
struct NodeConfig {
    options: NetworkOptions,
    coins_per_agent: usize,
    transfers: usize,
    seed: Option<u64>,
    serve: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            options: NetworkOptions::default(),
            coins_per_agent: 3,
            transfers: 10,
            seed: None,
            serve: false,
        }
    }
}

fn parse_args() -> NodeConfig {
    let mut config = NodeConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--agents" | "-a" => {
                if let Some(n) = args.next().and_then(|v| v.parse().ok()) {
                    config.options.num_agents = n;
                }
            }
            "--witnesses" | "-w" => {
                if let Some(n) = args.next().and_then(|v| v.parse().ok()) {
                    config.options.required_witnesses = n;
                }
            }
            "--coins" | "-c" => {
                if let Some(n) = args.next().and_then(|v| v.parse().ok()) {
                    config.coins_per_agent = n;
                }
            }
            "--transfers" | "-t" => {
                if let Some(n) = args.next().and_then(|v| v.parse().ok()) {
                    config.transfers = n;
                }
            }
            "--data-dir" | "-d" => {
                if let Some(dir) = args.next() {
                    config.options.data_dir = Some(PathBuf::from(dir));
                }
            }
            "--network-id" | "-n" => {
                if let Some(id) = args.next() {
                    config.options.network_id = id;
                }
            }
            "--seed" | "-s" => {
                config.seed = args.next().and_then(|v| v.parse().ok());
            }
            "--serve" => {
                config.serve = true;
            }
            "--help" | "-h" => {
                eprintln!("Specie simulation node");
                eprintln!();
                eprintln!("USAGE:");
                eprintln!("  specie-node [OPTIONS]");
                eprintln!();
                eprintln!("OPTIONS:");
                eprintln!("  -a, --agents <N>      Roster size (default: 5)");
                eprintln!("  -w, --witnesses <N>   Quorum size (default: 3)");
                eprintln!("  -c, --coins <N>       Seed coins per agent (default: 3)");
                eprintln!("  -t, --transfers <N>   Random transfers to run (default: 10)");
                eprintln!("  -d, --data-dir <DIR>  Persist agent state under DIR");
                eprintln!("  -n, --network-id <ID> Network id (default: main)");
                eprintln!("  -s, --seed <N>        Deterministic lottery seed");
                eprintln!("      --serve           Keep running after the simulation");
                eprintln!("  -h, --help            Show this help");
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

fn log_event(event: &NetworkEvent) {
    match event {
        NetworkEvent::TransactionConfirmed { tx_id, coin_id, witnesses } => {
            info!(%tx_id, %coin_id, ?witnesses, "confirmed");
        }
        NetworkEvent::TransactionInvalid { tx_id, reason, witness_id } => {
            info!(%tx_id, %reason, witness = witness_id, "invalid");
        }
        NetworkEvent::TransactionFailed { tx_id, reason } => {
            warn!(%tx_id, %reason, "failed");
        }
        NetworkEvent::NetworkStats(report) => {
            info!(
                validations = report.validations,
                double_spends_prevented = report.double_spends_prevented,
                pending = report.pending_transactions,
                "stats"
            );
        }
        other => info!(event = ?other, "event"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,specie=debug".into()),
        )
        .init();

    let config = parse_args();
    let num_agents = config.options.num_agents;

    let (mut network, mut event_rx) = match config.seed {
        Some(seed) => Network::with_seed(config.options.clone(), seed),
        None => Network::new(config.options.clone()),
    }
    .context("failed to build the network")?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    network
        .initialize(config.coins_per_agent)
        .context("failed to initialize the network")?;

    // Randomized workload.
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    let mut confirmed = 0usize;
    for _ in 0..config.transfers {
        if num_agents < 2 {
            break;
        }
        let from = rng.gen_range(0..num_agents);
        let to = (from + rng.gen_range(1..num_agents)) % num_agents;
        let holdings = network
            .agent(from)
            .map(|a| a.wallet.coin_count())
            .unwrap_or(0);
        if holdings == 0 {
            continue;
        }
        let coin_index = rng.gen_range(0..holdings);
        let outcome = network.transfer_coin(from, to, coin_index);
        if outcome.success {
            confirmed += 1;
        }
    }
    info!(requested = config.transfers, confirmed, "transfer workload complete");

    // One forged re-spend, expected to be caught by the committee.
    if network.agent(0).map(|a| a.wallet.coin_count()).unwrap_or(0) > 0 {
        let report = network.simulate_double_spend(0, 0);
        info!(
            first_ok = report.first.success,
            second_ok = report.second.success,
            second_reason = report.second.reason.as_deref().unwrap_or("-"),
            "double-spend simulation"
        );
    }

    network.publish_stats(now_ms())?;

    if config.serve {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });
        info!("simulation done; sweeps running until Ctrl+C");
        network.run(shutdown_rx).await?;
    } else {
        network.shutdown()?;
    }

    Ok(())
}
