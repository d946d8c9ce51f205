//! Withdrawal Queue Ops CLI
//!
//! Operates directly on the service configured via EXITQ_* environment
//! variables (same database as the API server).
//!
//! Usage:
//!   queuectl submit <caller> <amount_eth>
//!   queuectl status <id>
//!   queuectl requests <owner>
//!   queuectl report <caller> <rate> <budget_eth>
//!   queuectl finalize <caller>
//!   queuectl claim <caller> <id>
//!   queuectl transfer <caller> <to> <id>
//!   queuectl info
//!   queuectl pause <caller> <secs>
//!   queuectl resume <caller>

use std::env;
use std::sync::Arc;

use exitq::config::Config;
use exitq::service::{parse_address, AccessPolicy, OracleSnapshot, WithdrawalService};
use exitq::storage::SqliteQueueStore;
use exitq::types::units::{format_share_rate, format_with_commas, parse_eth, wei_to_eth_string};
use exitq::types::ShareRate;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let Some(service) = open_service().await else { return };

    match args[1].as_str() {
        "submit" => cmd_submit(&service, &args[2..]).await,
        "status" => cmd_status(&service, &args[2..]).await,
        "requests" => cmd_requests(&service, &args[2..]).await,
        "report" => cmd_report(&service, &args[2..]).await,
        "finalize" => cmd_finalize(&service, &args[2..]).await,
        "claim" => cmd_claim(&service, &args[2..]).await,
        "transfer" => cmd_transfer(&service, &args[2..]).await,
        "info" => cmd_info(&service).await,
        "pause" => cmd_pause(&service, &args[2..]).await,
        "resume" => cmd_resume(&service, &args[2..]).await,
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("exitq Ops CLI - Withdrawal Queue Operations");
    println!();
    println!("Usage:");
    println!("  queuectl submit <caller> <amount_eth>       Queue a withdrawal request");
    println!("  queuectl status <id>                        Show one request");
    println!("  queuectl requests <owner>                   List requests by owner");
    println!("  queuectl report <caller> <rate> <budget>    Submit an oracle report");
    println!("                                              (rate as decimal, budget in ETH)");
    println!("  queuectl finalize <caller>                  Run one finalization tick");
    println!("  queuectl claim <caller> <id>                Claim a finalized request");
    println!("  queuectl transfer <caller> <to> <id>        Transfer a request");
    println!("  queuectl info                               Queue summary");
    println!("  queuectl pause <caller> <secs>              Pause the queue");
    println!("  queuectl resume <caller>                    Resume the queue");
    println!();
    println!("Examples:");
    println!("  queuectl submit 0x1111...1111 1.5");
    println!("  queuectl report 0x9999...9999 1.05 100");
    println!();
    println!("Environment:");
    println!("  EXITQ_DB_PATH        SQLite database path");
    println!("  EXITQ_FINALIZE_ROLE / EXITQ_ORACLE_ROLE / EXITQ_PAUSE_ROLE");
}

async fn open_service() -> Option<Arc<WithdrawalService>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return None;
        }
    };

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

    match WithdrawalService::open(&config, store, policy).await {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            eprintln!("Failed to open service: {}", e);
            None
        }
    }
}

/// Decimal share rate ("1.05") to E27 fixed point.
fn parse_rate(s: &str) -> Option<ShareRate> {
    parse_eth(s)?.checked_mul(1_000_000_000)
}

async fn cmd_submit(service: &WithdrawalService, args: &[String]) {
    if args.len() < 2 {
        println!("Usage: queuectl submit <caller> <amount_eth>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };
    let Some(amount) = parse_eth(&args[1]) else {
        return println!("Error: invalid amount: {}", args[1]);
    };

    match service.submit_requests(caller, caller, &[amount]).await {
        Ok(ids) => {
            println!("Withdrawal request submitted!");
            println!("  ID: {}", ids[0]);
            println!("  Amount: {}", wei_to_eth_string(amount));
            println!();
            println!("Use 'queuectl status {}' to track it.", ids[0]);
        }
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_status(service: &WithdrawalService, args: &[String]) {
    if args.is_empty() {
        println!("Usage: queuectl status <id>");
        return;
    }

    let id: u64 = match args[0].parse() {
        Ok(id) => id,
        Err(_) => return println!("Error: invalid id"),
    };

    match service.withdrawal_status(&[id]).await {
        Ok(statuses) => {
            let status = &statuses[0];
            println!("Request #{}", status.id);
            println!("  Owner: {}", status.owner);
            println!("  Amount: {}", wei_to_eth_string(status.amount_of_value));
            println!("  Shares: {}", wei_to_eth_string(status.amount_of_shares));
            println!("  Created: {}", format_timestamp(status.created_at));
            println!("  Status: {}", status.phase());
        }
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_requests(service: &WithdrawalService, args: &[String]) {
    if args.is_empty() {
        println!("Usage: queuectl requests <owner>");
        return;
    }

    let owner = match parse_address(&args[0]) {
        Ok(owner) => owner,
        Err(e) => return println!("Error: {}", e),
    };

    let ids = service.requests_by_owner(owner).await;
    if ids.is_empty() {
        println!("No requests owned by {}.", owner);
        return;
    }

    let statuses = match service.withdrawal_status(&ids).await {
        Ok(statuses) => statuses,
        Err(e) => return println!("Error: {}", e),
    };

    println!("=== Requests owned by {} ({}) ===", owner, ids.len());
    println!();
    for status in statuses {
        println!(
            "#{:<6} {:>16}  {:<10} created {}",
            status.id,
            wei_to_eth_string(status.amount_of_value),
            status.phase(),
            format_timestamp(status.created_at),
        );
    }
}

async fn cmd_report(service: &WithdrawalService, args: &[String]) {
    if args.len() < 3 {
        println!("Usage: queuectl report <caller> <rate> <budget_eth>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };
    let Some(share_rate) = parse_rate(&args[1]) else {
        return println!("Error: invalid rate: {}", args[1]);
    };
    let Some(budget) = parse_eth(&args[2]) else {
        return println!("Error: invalid budget: {}", args[2]);
    };

    let report = OracleSnapshot {
        share_rate,
        available_budget: budget,
        is_bunker_mode: false,
        bunker_start_timestamp: 0,
        report_timestamp: chrono::Utc::now().timestamp() as u64 - 1,
    };

    match service.oracle_report(caller, report).await {
        Ok(()) => {
            println!("Oracle report accepted.");
            println!("  Rate: {}", format_share_rate(share_rate));
            println!("  Budget: {}", wei_to_eth_string(budget));
        }
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_finalize(service: &WithdrawalService, args: &[String]) {
    if args.is_empty() {
        println!("Usage: queuectl finalize <caller>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };

    match service.finalize_tick(caller).await {
        Ok(result) if result.has_activity() => {
            println!("Finalization tick complete.");
            println!("  Requests finalized: {}", result.requests_finalized);
            println!("  Checkpoints added: {}", result.checkpoints_added);
            println!("  Value locked: {}", wei_to_eth_string(result.value_locked));
        }
        Ok(_) => println!("Nothing to finalize."),
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_claim(service: &WithdrawalService, args: &[String]) {
    if args.len() < 2 {
        println!("Usage: queuectl claim <caller> <id>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };
    let id: u64 = match args[1].parse() {
        Ok(id) => id,
        Err(_) => return println!("Error: invalid id"),
    };

    match service.claim(caller, id, None).await {
        Ok(receipt) => {
            println!("Claim paid!");
            println!("  Request ID: {}", receipt.request_id);
            println!("  Recipient: {}", receipt.recipient);
            println!("  Amount: {}", wei_to_eth_string(receipt.amount));
        }
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_transfer(service: &WithdrawalService, args: &[String]) {
    if args.len() < 3 {
        println!("Usage: queuectl transfer <caller> <to> <id>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };
    let to = match parse_address(&args[1]) {
        Ok(to) => to,
        Err(e) => return println!("Error: {}", e),
    };
    let id: u64 = match args[2].parse() {
        Ok(id) => id,
        Err(_) => return println!("Error: invalid id"),
    };

    match service.transfer(caller, caller, to, id).await {
        Ok(()) => println!("Request #{} transferred to {}.", id, to),
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_info(service: &WithdrawalService) {
    let info = service.info().await;

    println!("=== Withdrawal Queue ===");
    println!();
    println!(
        "Requests: {} total, {} finalized",
        format_with_commas(info.last_request_id as u128),
        format_with_commas(info.last_finalized_request_id as u128),
    );
    println!(
        "Pending: {} requests ({})",
        info.unfinalized_requests,
        wei_to_eth_string(info.unfinalized_value)
    );
    println!("Locked: {}", wei_to_eth_string(info.locked_value));
    println!("Checkpoints: {}", info.last_checkpoint_index);
    println!("Paused: {}", info.is_paused);
    println!("Bunker mode: {}", info.is_bunker_mode);
    println!("Vault balance: {}", wei_to_eth_string(service.vault_balance().await));
}

async fn cmd_pause(service: &WithdrawalService, args: &[String]) {
    if args.len() < 2 {
        println!("Usage: queuectl pause <caller> <secs>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };
    let secs: u64 = match args[1].parse() {
        Ok(secs) => secs,
        Err(_) => return println!("Error: invalid duration"),
    };

    match service.pause_for(caller, secs).await {
        Ok(()) => println!("Queue paused for {} seconds.", secs),
        Err(e) => println!("Error: {}", e),
    }
}

async fn cmd_resume(service: &WithdrawalService, args: &[String]) {
    if args.is_empty() {
        println!("Usage: queuectl resume <caller>");
        return;
    }

    let caller = match parse_address(&args[0]) {
        Ok(caller) => caller,
        Err(e) => return println!("Error: {}", e),
    };

    match service.resume(caller).await {
        Ok(()) => println!("Queue resumed."),
        Err(e) => println!("Error: {}", e),
    }
}

fn format_timestamp(ts: u64) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
