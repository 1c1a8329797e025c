use std::io::Write;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::ScanResult;
use crate::cli::{Cli, Command};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::types::{Credentials, ScanProgress, SenderKey};

/// Inboxes above this size get a time estimate with the progress line.
const LARGE_INBOX: u64 = 3000;

pub async fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load().context("loading configuration")?;
    let credentials = credentials_from(&cli)?;
    let engine = Engine::new(credentials, config);

    match cli.command {
        Command::Check => {
            engine.check().await.context("connecting to mail server")?;
            println!("Connected successfully.");
        }
        Command::Scan { json, top } => {
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let result = engine
                .scan(print_progress, &cancel)
                .await
                .context("scanning mailbox")?;
            eprintln!();

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_table(&result, top);
            }
        }
        Command::Clean { senders } => {
            let keys: Vec<SenderKey> = senders.iter().map(|s| SenderKey::parse(s)).collect();
            if let Some(bad) = senders.iter().zip(&keys).find(|(_, k)| k.is_unknown()) {
                bail!("not an email address: {}", bad.0);
            }

            eprintln!("This may take a while depending on the number of emails.");
            let (results, outcome) = engine.delete_senders(&keys).await;
            for result in &results {
                println!("Deleted {} emails from {}", result.removed, result.sender);
                for failure in &result.failures {
                    println!("  uid {}: {}", failure.uid, failure.reason);
                }
            }
            if let Err(e) = outcome {
                if let Some(partial) = e.partial_deletion() {
                    println!(
                        "Deleted {} emails from {} before the error",
                        partial.removed, partial.sender
                    );
                }
                return Err(e).context("cleaning up senders");
            }
            info!(senders = results.len(), "Cleanup finished");
            println!("Earlier scan results are now out of date; run `scan` again.");
        }
    }

    Ok(())
}

fn credentials_from(cli: &Cli) -> Result<Credentials> {
    let address = cli
        .address
        .clone()
        .filter(|a| !a.trim().is_empty())
        .context("missing address (--address or CLEANMAIL_ADDRESS)")?;
    let secret = cli
        .app_password
        .clone()
        .filter(|p| !p.is_empty())
        .context("missing app password (CLEANMAIL_APP_PASSWORD)")?;
    if SenderKey::parse(&address).is_unknown() {
        warn!("Address does not look like an email address");
    }
    Ok(Credentials::new(address, secret))
}

fn print_progress(progress: ScanProgress) {
    let mut line = format!(
        "\rProcessing email {}/{} ({:.0}%)",
        progress.processed,
        progress.total,
        progress.fraction() * 100.0
    );
    if progress.total > LARGE_INBOX {
        let minutes = progress.estimated_remaining().as_secs() / 60;
        line.push_str(&format!(", about {minutes} min left"));
    }
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(line.as_bytes());
    let _ = stderr.flush();
}

fn print_table(result: &ScanResult, top: usize) {
    println!("\n{}", "=".repeat(100));
    println!(
        "{} messages from {} senders (scanned {})",
        result.fetched,
        result.len(),
        result.scanned_at.format("%Y-%m-%d %H:%M")
    );
    println!("{}\n", "=".repeat(100));
    println!("{:>6}  {:<40}  {:<28}  Unsubscribe", "Count", "Email", "Sender Name");

    for stat in result.ranked().into_iter().take(top) {
        let name = stat.display_name.as_deref().unwrap_or("");
        let name = if name.chars().count() > 28 {
            let truncated: String = name.chars().take(25).collect();
            format!("{truncated}...")
        } else {
            name.to_string()
        };
        println!(
            "{:>6}  {:<40}  {:<28}  {}",
            stat.count,
            stat.sender.as_str(),
            name,
            stat.unsubscribe_link.as_deref().unwrap_or("-")
        );
    }
}
