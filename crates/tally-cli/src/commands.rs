use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tally_fraud::{FlagSet, FraudHeuristic, FraudMonitor, NoActivity};
use tally_ledger::{
    Balance, BalanceProjection, EntryDraft, InMemoryLedger, LedgerAuditor, LedgerDump,
    LedgerEntry, LedgerReader, LedgerWriter, MemoryAuditLog, TracingAuditSink, ValidationReport,
};
use tally_settlement::{SettlementCoordinator, SettlementReport};
use tally_types::{AccountId, CurrencyCode, EntryKind, EntryStatus, Reference, SessionId};

use crate::cli::*;
use crate::settings::TallyConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = TallyConfig::load(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Demo(args) => cmd_demo(&config, args, format).await,
        Command::Verify(args) => cmd_verify(&config, &args.dump, format),
        Command::Balance(args) => cmd_balance(&config, args, format),
        Command::History(args) => cmd_history(&config, args, format),
        Command::Fraud(args) => cmd_fraud(&config, args, format),
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_demo(config: &TallyConfig, args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.players < 2 {
        anyhow::bail!("a session needs at least two players");
    }
    let audit = Arc::new(MemoryAuditLog::new());
    let ledger = Arc::new(config.build_ledger(audit.clone())?);
    for currency in &config.currencies {
        ledger.register_currency(currency.clone())?;
    }
    let currency = match &args.currency {
        Some(code) => CurrencyCode::parse(code)?,
        None => config
            .currencies
            .first()
            .map(|c| c.code.clone())
            .context("no currencies configured")?,
    };

    let monitor = FraudMonitor::spawn(
        ledger.clone(),
        ledger.subscribe(),
        Arc::new(NoActivity),
        FraudHeuristic::new(config.fraud.clone())?,
        audit.clone(),
    );

    let players: Vec<AccountId> = (1..=args.players)
        .map(|i| AccountId::new(format!("player-{i}")))
        .collect();
    for player in &players {
        ledger.append(&EntryDraft::new(
            player.clone(),
            currency.clone(),
            args.fee * 5,
            EntryKind::Purchase,
            Reference::purchase(format!("demo-topup-{player}")),
        ))?;
    }

    let coordinator = SettlementCoordinator::new(ledger.clone(), config.settlement.clone())?;

    let played = SessionId::new("demo-match-1");
    coordinator.session_started(&played, &players, args.fee, &currency)?;
    let scores: BTreeMap<AccountId, i64> = players
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), (players.len() - i) as i64 * 10))
        .collect();
    coordinator.session_completed(&played, &players, &scores)?;

    let abandoned = SessionId::new("demo-match-2");
    coordinator.session_started(&abandoned, &players[..2], args.fee, &currency)?;
    coordinator.session_abandoned(&abandoned)?;

    let stats = monitor.shutdown().await?;
    let reports = coordinator.reports()?;
    let mut accounts = players.clone();
    accounts.push(config.settlement.house_account.clone());
    let balances: Vec<Balance> = accounts
        .iter()
        .map(|a| BalanceProjection::get(&*ledger, a, &currency))
        .collect::<Result<_, _>>()?;
    let validation = LedgerAuditor::validate(&*ledger, ledger.integrity_guard())?;

    match format {
        OutputFormat::Json => {
            let out = json!({
                "reports": reports,
                "balances": balances,
                "audit_records": audit.len(),
                "valid": validation.is_valid(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
            println!("\n{}", "Balances".bold());
            for balance in &balances {
                print_balance_line(balance);
            }
            println!(
                "\nFraud monitor: {} entries seen, {} flag sets forwarded",
                stats.events, stats.forwarded
            );
            for record in audit.records() {
                println!("  {} {}", "audit:".yellow(), record);
            }
            print_validation(&validation);
        }
    }

    if let Some(path) = &args.output {
        ledger.export()?.write_to(path)?;
        println!("{} Dump written to {}", "✓".green(), path.display().to_string().bold());
        if config.ledger.integrity_key.is_none() {
            println!(
                "  {} no integrity_key configured: this dump only verifies inside this process",
                "warning:".yellow()
            );
        }
    }
    Ok(())
}

fn restore(config: &TallyConfig, path: &Path) -> anyhow::Result<InMemoryLedger> {
    let dump = LedgerDump::read_from(path).with_context(|| format!("reading {}", path.display()))?;
    if config.ledger.integrity_key.is_none() {
        anyhow::bail!("no ledger.integrity_key configured; a dump verifies only with the key that signed it");
    }
    let ledger = config
        .build_ledger(Arc::new(TracingAuditSink))?
        .restore(&dump)
        .with_context(|| format!("restoring {}", path.display()))?;
    Ok(ledger)
}

fn cmd_verify(config: &TallyConfig, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = restore(config, path)?;
    let validation = LedgerAuditor::validate(&ledger, ledger.integrity_guard())?;
    match format {
        OutputFormat::Json => {
            let violations: Vec<_> = validation
                .violations
                .iter()
                .map(|v| {
                    json!({
                        "key": v.key.to_string(),
                        "entry": v.entry.map(|id| id.to_string()),
                        "kind": format!("{:?}", v.kind),
                        "description": v.description,
                    })
                })
                .collect();
            let out = json!({
                "entries": validation.entry_count,
                "balances": validation.key_count,
                "hashes_valid": validation.hashes_valid,
                "chains_continuous": validation.chains_continuous,
                "reversals_linked": validation.reversals_linked,
                "projection_consistent": validation.projection_consistent,
                "violations": violations,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => print_validation(&validation),
    }
    if !validation.is_valid() {
        anyhow::bail!("{} violation(s) found", validation.violations.len());
    }
    Ok(())
}

fn cmd_balance(config: &TallyConfig, args: BalanceArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = restore(config, &args.dump)?;
    let account = AccountId::parse(&args.account)?;
    let currency = CurrencyCode::parse(&args.currency)?;
    let balance = ledger.verify_projection(&account, &currency)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&balance)?),
        OutputFormat::Text => {
            println!("{}", format!("{account}/{currency}").bold());
            println!("  Current:          {}", balance.current.to_string().bold());
            println!("  Lifetime earned:  {}", balance.lifetime_earned);
            println!("  Lifetime spent:   {}", balance.lifetime_spent);
            match balance.last_reset {
                Some(day) => println!("  Earned on {day}: {}", balance.daily_earned),
                None => println!("  Earned today:     0"),
            }
            println!("  Integrity:        {}", balance.integrity_hash.short_hex().dimmed());
            println!("  Projection:       {}", "matches replay".green());
        }
    }
    Ok(())
}

fn cmd_history(config: &TallyConfig, args: HistoryArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = restore(config, &args.dump)?;
    let account = AccountId::parse(&args.account)?;
    let entries = ledger.entries_for_account(&account)?;
    let shown = &entries[entries.len().saturating_sub(args.limit)..];

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(shown)?),
        OutputFormat::Text => {
            if shown.is_empty() {
                println!("No entries for {}.", account.to_string().bold());
            }
            for entry in shown {
                print_entry(entry);
            }
        }
    }
    Ok(())
}

fn cmd_fraud(config: &TallyConfig, args: FraudArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = restore(config, &args.dump)?;
    let account = AccountId::parse(&args.account)?;
    let at_ms = match args.at_ms {
        Some(at) => at,
        None => ledger
            .entries_for_account(&account)?
            .iter()
            .map(|e| e.created.physical_ms)
            .max()
            .unwrap_or(0),
    };
    let window = args
        .window_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.fraud.window());

    let heuristic = FraudHeuristic::new(config.fraud.clone())?;
    let flags = heuristic.evaluate(&ledger, &NoActivity, &account, window, at_ms)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&flags)?),
        OutputFormat::Text => print_flags(&flags),
    }
    Ok(())
}

fn cmd_config(config: &TallyConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_report(report: &SettlementReport) {
    let state = if report.is_settled() {
        report.state.to_string().green().bold()
    } else {
        report.state.to_string().red().bold()
    };
    println!("Session {} [{}]", report.session.to_string().yellow().bold(), state);
    println!(
        "  Fee {} {} x {} players, collected {}",
        report.entry_fee,
        report.currency,
        report.participants.len(),
        report.collected
    );
    if report.is_settled() {
        println!("  Pool {}, house commission {}", report.pool, report.commission);
        for credit in &report.credits {
            println!("    {} {:<12} +{}", "→".green(), credit.account.to_string(), credit.amount);
        }
    }
    if let Some(reason) = &report.failure {
        println!("  Failed: {reason}");
        println!("  Compensating entries: {}", report.compensations.len());
    }
    if !report.uncompensated.is_empty() {
        println!(
            "  {} {} leg(s) could not be reversed",
            "attention:".red().bold(),
            report.uncompensated.len()
        );
    }
}

fn print_balance_line(balance: &Balance) {
    println!(
        "  {:<12} {:>8} {}",
        balance.account.to_string(),
        balance.current,
        balance.currency.to_string().dimmed()
    );
}

fn print_entry(entry: &LedgerEntry) {
    let when = entry
        .created
        .to_datetime()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.created.to_string());
    let amount = if entry.amount >= 0 {
        format!("+{}", entry.amount).green()
    } else {
        entry.amount.to_string().red()
    };
    let status = match entry.status {
        EntryStatus::Completed => entry.status.to_string().green(),
        EntryStatus::Reversed => entry.status.to_string().yellow(),
        EntryStatus::Failed | EntryStatus::Pending => entry.status.to_string().red(),
    };
    println!(
        "{} {} {:<16} {:>8} {} {:<9} {} {}",
        when.dimmed(),
        entry.id.short_id().yellow(),
        entry.kind.to_string(),
        amount,
        entry.currency,
        status,
        entry.reference,
        entry.memo.as_deref().unwrap_or("").dimmed()
    );
}

fn print_validation(report: &ValidationReport) {
    let mark = |ok: bool| if ok { "✓".green() } else { "✗".red() };
    println!(
        "\n{} entries over {} balances",
        report.entry_count.to_string().bold(),
        report.key_count.to_string().bold()
    );
    println!("  {} Integrity hashes", mark(report.hashes_valid));
    println!("  {} Balance chains", mark(report.chains_continuous));
    println!("  {} Reversal links", mark(report.reversals_linked));
    println!("  {} Projection matches replay", mark(report.projection_consistent));
    for violation in &report.violations {
        let entry = violation.entry.map(|id| id.short_id()).unwrap_or_default();
        println!(
            "    {} {} {} {:?}: {}",
            "✗".red(),
            violation.key,
            entry,
            violation.kind,
            violation.description
        );
    }
}

fn print_flags(flags: &FlagSet) {
    if flags.is_empty() {
        println!(
            "{} No fraud flags for {} over {}s",
            "✓".green(),
            flags.account.to_string().bold(),
            flags.window_secs
        );
        return;
    }
    println!(
        "{} {} flag(s) for {} over {}s",
        "!".red().bold(),
        flags.len(),
        flags.account.to_string().bold(),
        flags.window_secs
    );
    for flag in &flags.flags {
        println!("  {} {}", flag.name().yellow(), flag);
    }
}
