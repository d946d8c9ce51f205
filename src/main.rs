//! exitq Backend - Withdrawal Queue Services
//!
//! Server-side services:
//! 1. REST API - Submit, track, transfer and claim withdrawal requests
//! 2. Finalization Daemon - Sizes and executes finalization batches against
//!    the latest oracle report
//!
//! Run modes:
//!   cargo run                    - Show usage
//!   cargo run -- api             - Start REST API (with the daemon)
//!   cargo run -- finalizer      - Start the finalization daemon alone
//!   cargo run -- demo            - Run an in-process walkthrough

use std::env;
use std::sync::Arc;

use alloy_primitives::Address;

use exitq::api;
use exitq::config::Config;
use exitq::logging;
use exitq::queue::BatchAccumulator;
use exitq::service::{AccessPolicy, WithdrawalService};
use exitq::storage::SqliteQueueStore;
use exitq::types::units::{ether, wei_to_eth_string, SHARE_RATE_PRECISION};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => run_api_server(&args[2..]).await,
        "finalizer" => run_finalizer().await,
        "demo" => run_demo(),
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("exitq Backend - Withdrawal Queue Services");
    println!();
    println!("Usage:");
    println!("  exitq api [--port <port>]    Start REST API server with the finalization daemon");
    println!("  exitq finalizer              Start the finalization daemon alone");
    println!("  exitq demo                   Run an in-process walkthrough");
    println!();
    println!("Environment Variables:");
    println!("  EXITQ_NETWORK        mainnet | testnet | devnet (default: devnet)");
    println!("  EXITQ_API_PORT       REST API port (default: 3000)");
    println!("  EXITQ_DB_PATH        SQLite database path (default: data/exitq.db)");
    println!("  EXITQ_FINALIZE_ROLE  Comma-separated finalizer addresses");
    println!("  EXITQ_ORACLE_ROLE    Comma-separated oracle addresses");
    println!("  EXITQ_PAUSE_ROLE     Comma-separated pause-authority addresses");
    println!("  EXITQ_LOG_LEVEL      Logging level (default: info)");
    println!();
    println!("See src/config.rs for the full variable list.");
}

fn load_config() -> Option<Config> {
    match Config::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            None
        }
    }
}

/// Open the service with its SQLite store and configured role policy.
async fn open_service(config: &Config) -> Option<Arc<WithdrawalService>> {
    let store = match SqliteQueueStore::new(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.db_path, e);
            return None;
        }
    };

    let policy = AccessPolicy::new(
        config.finalize_role.iter().copied(),
        config.oracle_role.iter().copied(),
        config.pause_role.iter().copied(),
    );

    match WithdrawalService::open(config, store, policy).await {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            eprintln!("Failed to open service: {}", e);
            None
        }
    }
}

/// The address the daemon presents to the role check.
fn daemon_identity(config: &Config) -> Address {
    config.finalize_role.first().copied().unwrap_or(Address::ZERO)
}

/// Start REST API server, with the finalization daemon alongside
async fn run_api_server(args: &[String]) {
    let Some(mut config) = load_config() else { return };
    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Logging error: {}", e);
    }

    // Parse arguments
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.api_port = args[i + 1].parse().unwrap_or(config.api_port);
                i += 2;
            }
            _ => i += 1,
        }
    }

    config.print_summary();

    let Some(service) = open_service(&config).await else { return };

    let daemon = service.clone();
    let finalizer = daemon_identity(&config);
    tokio::spawn(async move {
        daemon.run(finalizer).await;
    });

    if let Err(e) = api::start_server(service, &config.api_host, config.api_port).await {
        eprintln!("API server error: {}", e);
    }
}

async fn run_finalizer() {
    let Some(config) = load_config() else { return };
    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Logging error: {}", e);
    }

    let Some(service) = open_service(&config).await else { return };

    println!("=== exitq Finalization Daemon ===");
    println!();
    println!("Configuration:");
    println!("  Tick Interval: {} seconds", config.finalization_interval_secs);
    println!("  Safe Border: {} seconds", config.safe_border_secs);
    println!("  Scan Allowance: {} requests/tick", config.max_requests_per_tick);
    println!();
    println!("Waiting for oracle reports...");
    println!("Press Ctrl+C to stop");
    println!();

    service.run(daemon_identity(&config)).await;
}

/// In-process walkthrough of the queue lifecycle, no I/O.
fn run_demo() {
    use exitq::queue::{QueueLimits, WithdrawalQueue};
    use exitq::vault::SimulatedVault;

    println!("\n=== exitq Demo ===\n");

    let mut queue = WithdrawalQueue::new(QueueLimits::default());
    let mut vault = SimulatedVault::new();
    let alice = Address::repeat_byte(0xa1);
    let now = chrono::Utc::now().timestamp() as u64;

    // 1. queue two redemptions at rate 1.0
    let first = queue
        .create_request(alice, alice, ether(1), ether(1), now)
        .expect("create");
    let second = queue
        .create_request(alice, alice, ether(2), ether(2), now)
        .expect("create");
    println!("1. Queued requests #{first} (1 ETH) and #{second} (2 ETH)");
    println!("   {}", queue.info(now));
    println!();

    // 2. size batches under a 10 ETH budget at rate 1.0
    let rate = SHARE_RATE_PRECISION;
    let acc = queue
        .calculate_finalization_batches(rate, now + 1, 1000, BatchAccumulator::new(ether(10)))
        .expect("batches");
    println!("2. Batch boundaries under budget: {:?}", acc.boundaries());

    // 3. preview, fund, finalize
    let preview = queue.prefinalize(acc.boundaries(), rate).expect("prefinalize");
    println!(
        "3. Finalization needs {} (burns {} shares)",
        wei_to_eth_string(preview.value_to_lock),
        wei_to_eth_string(preview.shares_to_burn),
    );
    vault.deposit(preview.value_to_lock);
    let summary = queue
        .finalize(acc.boundaries(), rate, preview.value_to_lock, now)
        .expect("finalize");
    println!(
        "   Finalized #{}..#{} ({} checkpoint(s))",
        summary.from_request_id, summary.to_request_id, summary.checkpoints_added
    );
    println!();

    // 4. resolve a hint and claim
    let hint = queue
        .find_checkpoint_hint(first, 1, queue.last_checkpoint_index())
        .expect("hint")
        .expect("covered");
    let receipt = queue.claim(alice, first, hint, &mut vault).expect("claim");
    println!(
        "4. Claimed request #{} for {} (hint {hint})",
        receipt.request_id,
        wei_to_eth_string(receipt.amount),
    );
    println!("   {}", queue.info(now));
    println!();

    println!("=== Demo Complete ===");
}
