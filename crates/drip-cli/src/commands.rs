use anyhow::Context;
use colored::Colorize;
use serde::Serialize;

use drip_ledger::balance;
use drip_types::{Address, Amount, Stream, StreamId, Timestamp};

use crate::cli::*;
use crate::scenario::{Outcome, Scenario, ScenarioReport};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args, cli.format),
        Command::Quote(args) => cmd_quote(args, cli.format),
    }
}

fn cmd_run(args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let report = crate::scenario::run(&scenario)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{failures} step(s) did not go as expected");
    }
    if !report.audit.is_balanced() {
        anyhow::bail!("custody audit failed");
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    for step in &report.steps {
        let mark = if step.passed {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        let detail = match &step.outcome {
            Outcome::Created { id } => format!("created {}", id.to_string().yellow()),
            Outcome::Withdrew { amount } => format!("withdrew {}", amount.to_string().bold()),
            Outcome::Canceled {
                sender_share,
                recipient_share,
            } => format!(
                "canceled, sender gets {}, recipient gets {}",
                sender_share.to_string().bold(),
                recipient_share.to_string().bold()
            ),
            Outcome::Balance { amount } => format!("balance {}", amount.to_string().bold()),
            Outcome::Failed { kind, message } => {
                format!("{} ({})", message, kind.as_str().dimmed())
            }
        };
        println!(
            "{} [{:>3}] t={:<8} {:<8} {}",
            mark, step.index, step.at, step.op, detail
        );
        for event in &step.events {
            println!("        {}", event.to_string().cyan());
        }
    }

    let audit = &report.audit;
    println!();
    if audit.is_balanced() {
        println!("{} Custody balanced", "✓".green().bold());
    } else {
        println!("{} Custody audit failed", "✗".red().bold());
    }
    println!("  Streams created: {}", report.stream_count);
    println!("  Live streams: {}", audit.stream_count);
    println!("  Held for streams: {}", audit.total_remaining);
    println!(
        "  Deposited: {}, retained: {}, paid out: {}",
        audit.totals.deposited, audit.totals.retained, audit.totals.paid_out
    );
    println!("  Custody account: {}", report.custody);
    for violation in &audit.violations {
        let scope = violation
            .stream
            .map_or_else(|| "ledger".to_string(), |id| id.to_string());
        println!(
            "  {} {:?} on {}: {}",
            "!".red().bold(),
            violation.kind,
            scope,
            violation.description
        );
    }

    println!();
    println!("Accounts:");
    for account in &report.accounts {
        println!(
            "  {:<16} {} {}",
            account.label.bold(),
            account.address.short_id().dimmed(),
            account.balance
        );
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct Quote {
    deposit: Amount,
    start: Timestamp,
    stop: Timestamp,
    duration: Timestamp,
    rate_per_second: Amount,
    streamed_deposit: Amount,
    remainder: Amount,
    at: Timestamp,
    earned: Amount,
}

fn quote(args: &QuoteArgs) -> anyhow::Result<Quote> {
    let stream = Stream::new(
        StreamId::FIRST,
        Address::from_label("sender"),
        Address::from_label("recipient"),
        args.start,
        args.stop,
        args.deposit,
    )?;
    let at = args.at.unwrap_or(args.start);
    Ok(Quote {
        deposit: args.deposit,
        start: args.start,
        stop: args.stop,
        duration: stream.duration(),
        rate_per_second: stream.rate_per_second,
        streamed_deposit: stream.streamed_deposit,
        remainder: stream.remainder().context("remainder exceeds deposit")?,
        at,
        earned: balance::elapsed_earned(&stream, at)?,
    })
}

fn cmd_quote(args: QuoteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let q = quote(&args)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&q)?),
        OutputFormat::Text => {
            println!(
                "Stream of {} over {}s ({} → {})",
                q.deposit.to_string().bold(),
                q.duration,
                q.start,
                q.stop
            );
            println!("  Rate: {}/s", q.rate_per_second.to_string().cyan());
            println!("  Streamed: {}", q.streamed_deposit);
            println!("  Remainder: {}", q.remainder);
            println!("  Earned at {}: {}", q.at, q.earned.to_string().green());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(deposit: Amount, start: Timestamp, stop: Timestamp, at: Option<Timestamp>) -> QuoteArgs {
        QuoteArgs {
            deposit,
            start,
            stop,
            at,
        }
    }

    #[test]
    fn quote_splits_deposit() {
        let q = quote(&args(101, 100, 200, Some(150))).unwrap();
        assert_eq!(q.duration, 100);
        assert_eq!(q.rate_per_second, 1);
        assert_eq!(q.streamed_deposit, 100);
        assert_eq!(q.remainder, 1);
        assert_eq!(q.earned, 50);
    }

    #[test]
    fn quote_defaults_to_start() {
        let q = quote(&args(1_000, 10, 20, None)).unwrap();
        assert_eq!(q.at, 10);
        assert_eq!(q.earned, 0);
    }

    #[test]
    fn quote_rejects_empty_schedule() {
        assert!(quote(&args(100, 50, 50, None)).is_err());
    }

    fn scenario_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn run_succeeds_on_clean_scenario() {
        let file = scenario_file(
            r#"
[accounts]
alice = 500

[[step]]
op = "create"
sender = "alice"
recipient = "bob"
start = 0
stop = 100
deposit = 500

[[step]]
at = 100
op = "withdraw"
stream = 1
caller = "bob"
"#,
        );
        let result = cmd_run(
            RunArgs {
                scenario: file.path().to_path_buf(),
            },
            OutputFormat::Json,
        );
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn run_fails_when_a_step_misbehaves() {
        let file = scenario_file(
            r#"
[[step]]
op = "cancel"
stream = 1
caller = "alice"
"#,
        );
        let err = cmd_run(
            RunArgs {
                scenario: file.path().to_path_buf(),
            },
            OutputFormat::Text,
        )
        .unwrap_err();
        assert!(err.to_string().contains("1 step(s)"));
    }
}
