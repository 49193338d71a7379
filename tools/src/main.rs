//! ledger-runner: command-line front end for the BP_Total ledger.
//!
//! Usage:
//!   ledger-runner --db club.db reconcile
//!   ledger-runner --db club.db balance --player Ada
//!   ledger-runner --db club.db redeem --player Ada --amount 5 --reason "T-shirt"
//!   ledger-runner --db club.db --ipc-mode
//!
//! `--log-audit` sends audit entries to the log instead of `audit_log`.

use anyhow::Result;
use bp_ledger_core::{
    config::LedgerConfig,
    engine::Ledger,
    redemption::{RedemptionRecord, RedemptionRequest},
    types::Points,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Reconcile,
    ReconcileOne { player: String },
    Balance { player: String },
    Breakdown { player: String },
    Redeem { request: RedemptionRequest },
    Adjust { player: String, delta: Points, reason: String },
    History { player: String },
    SourceEdit { table: String, player: String },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config = match flag_value(&args, "--config") {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };

    log::info!("opening ledger at {db}");
    let mut ledger = Ledger::open(db, config)?;
    if args.iter().any(|a| a == "--log-audit") {
        ledger = ledger.without_persistent_audit();
    }

    if ipc_mode {
        return run_ipc_loop(&mut ledger);
    }

    let command = command_name(&args);
    run_command(&mut ledger, command, &args)
}

/// First positional argument that is not a flag's value.
fn command_name(args: &[String]) -> &str {
    args.iter()
        .skip(1)
        .find(|a| !a.starts_with("--") && !is_flag_value(args, a.as_str()))
        .map(String::as_str)
        .unwrap_or("reconcile")
}

fn run_command(ledger: &mut Ledger, command: &str, args: &[String]) -> Result<()> {
    match command {
        "ensure-schema" => {
            ledger.ensure_schema()?;
            println!("schema ok: {} / {}", ledger.config.ledger_table, ledger.config.redemption_table);
        }
        "reconcile" => {
            let summary = ledger.reconcile_all()?;
            println!("=== RECONCILE ===");
            println!("  updated:   {}", summary.updated);
            println!("  inserted:  {}", summary.inserted);
            println!("  unchanged: {}", summary.unchanged);
        }
        "balance" => {
            let name = required(args, "--player")?;
            println!("{name}: {} BP", ledger.get_balance(name)?);
        }
        "breakdown" => {
            let name = required(args, "--player")?;
            let b = if args.iter().any(|a| a == "--refresh") {
                ledger.refreshed_breakdown(name)?
            } else {
                ledger.get_breakdown(name)?
            };
            println!("=== {} ===", b.name);
            println!("  current:    {}", b.current);
            println!("  attendance: {}", b.attendance);
            println!("  flag:       {}", b.flag);
            println!("  dice:       {}", b.dice);
            println!("  historical: {}", b.historical);
            println!("  redeemed:   {}", b.redeemed);
            println!("  overflow:   {}", b.overflow);
            match b.last_updated {
                Some(at) => println!("  updated:    {}", at.to_rfc3339()),
                None => println!("  updated:    never"),
            }
        }
        "balances" => {
            for b in ledger.all_balances()? {
                println!("{:<24} {:>6} BP  (historical {}, redeemed {})", b.name, b.current, b.historical, b.redeemed);
            }
        }
        "redeem" => {
            let mut request = RedemptionRequest::new(
                required(args, "--player")?,
                parse_arg::<Points>(args, "--amount", 0),
                flag_value(args, "--reason").unwrap_or_default(),
            );
            request.category = flag_value(args, "--category").unwrap_or_default().to_string();
            request.event_id = flag_value(args, "--event").unwrap_or_default().to_string();
            request.staff = flag_value(args, "--staff").unwrap_or_default().to_string();
            let record = ledger.record_redemption(request)?;
            print_record(&record);
            println!("  balance now: {}", ledger.get_balance(&record.player_name)?);
        }
        "adjust" => {
            let name = required(args, "--player")?;
            let delta = parse_arg::<Points>(args, "--delta", 0);
            let reason = flag_value(args, "--reason").unwrap_or_default();
            let result = ledger.adjust_historical(name, delta, reason)?;
            println!(
                "{name}: historical {} -> {}, current {}, overflow {}",
                result.previous_historical, result.new_historical, result.new_current, result.new_overflow
            );
        }
        "history" => {
            let records = match flag_value(args, "--player") {
                Some(name) => ledger.redemption_history(name)?,
                None => ledger.recent_redemptions(parse_arg(args, "--limit", 20usize))?,
            };
            if records.is_empty() {
                println!("  (no redemptions)");
            }
            for record in &records {
                print_record(record);
            }
        }
        "edit" => {
            let table = required(args, "--table")?;
            match ledger.handle_source_edit(table, required(args, "--player")?)? {
                Some(outcome) => println!("{outcome:?}"),
                None => println!("'{table}' is not a source table; ignored"),
            }
        }
        other => anyhow::bail!("unknown command: {other}"),
    }
    Ok(())
}

fn run_ipc_loop(ledger: &mut Ledger) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("unparseable IPC command: {e}");
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        // Ledger errors are answered, not fatal: the loop keeps serving.
        let reply = match handle_ipc(ledger, cmd) {
            Ok(value) => value,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_ipc(ledger: &mut Ledger, cmd: IpcCommand) -> Result<serde_json::Value> {
    let value = match cmd {
        IpcCommand::Reconcile => serde_json::to_value(ledger.reconcile_all()?)?,
        IpcCommand::ReconcileOne { player } => serde_json::to_value(ledger.reconcile_one(&player)?)?,
        IpcCommand::Balance { player } => {
            let current = ledger.get_balance(&player)?;
            serde_json::json!({ "player": player, "current": current })
        }
        IpcCommand::Breakdown { player } => serde_json::to_value(ledger.get_breakdown(&player)?)?,
        IpcCommand::Redeem { request } => serde_json::to_value(ledger.record_redemption(request)?)?,
        IpcCommand::Adjust { player, delta, reason } => {
            serde_json::to_value(ledger.adjust_historical(&player, delta, &reason)?)?
        }
        IpcCommand::History { player } => serde_json::to_value(ledger.redemption_history(&player)?)?,
        IpcCommand::SourceEdit { table, player } => {
            serde_json::to_value(ledger.handle_source_edit(&table, &player)?)?
        }
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn print_record(record: &RedemptionRecord) {
    let at = record
        .timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {at} | {:<20} | {:>5} BP | {} | {}",
        record.player_name, record.amount, record.reason, record.row_id
    );
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// Flags that take no value.
const SWITCHES: [&str; 3] = ["--ipc-mode", "--refresh", "--log-audit"];

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    flag_value(args, flag).ok_or_else(|| anyhow::anyhow!("missing {flag}"))
}

/// True when `arg` is the value following some `--flag`.
fn is_flag_value(args: &[String], arg: &str) -> bool {
    args.windows(2).any(|w| {
        w[0].starts_with("--") && !SWITCHES.contains(&w[0].as_str()) && std::ptr::eq(w[1].as_str(), arg)
    })
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn command_follows_flag_values() {
        let args = argv("ledger-runner --db club.db balance --player Ada");
        assert_eq!(command_name(&args), "balance");
        assert!(is_flag_value(&args, args[2].as_str()));
        assert!(!is_flag_value(&args, args[3].as_str()));
    }

    #[test]
    fn switches_take_no_value() {
        let args = argv("ledger-runner --log-audit reconcile");
        assert_eq!(command_name(&args), "reconcile");
        assert!(!is_flag_value(&args, args[2].as_str()));
    }

    #[test]
    fn flag_value_matches_by_position_not_text() {
        // "Ada" is both a flag value and, later, a stray positional.
        let args = argv("ledger-runner --player Ada Ada");
        assert!(is_flag_value(&args, args[2].as_str()));
        assert!(!is_flag_value(&args, args[3].as_str()));
        assert_eq!(command_name(&args), "Ada");
    }

    #[test]
    fn missing_command_defaults_to_reconcile() {
        assert_eq!(command_name(&argv("ledger-runner --db club.db")), "reconcile");
    }
}
