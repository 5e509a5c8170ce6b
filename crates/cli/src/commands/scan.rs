use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use colored::Colorize;
use crossbeam_channel::{bounded, select};
use farecard_card::RawCard;
use farecard_scanner::{ScanError, ScanEvent, Scanner, ScannerConfig};
use tracing::info;

enum Next {
    Stop,
    Progress(Option<(usize, usize)>),
    Event(ScanEvent),
}

/// Scan until Ctrl-C, or until the first card with `once`
pub(crate) fn scan_command(
    config: ScannerConfig,
    once: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if let Some(dir) = output {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let scanner = Scanner::discover(config);
    for name in scanner.backend_names() {
        info!(backend = name, "Found reader");
    }

    let (stop_tx, stop_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    let events = scanner.events();
    let progress = scanner.progress();
    scanner.start();
    println!("{}", "Waiting for cards, Ctrl-C to stop".dimmed());

    let result = loop {
        let next = select! {
            recv(stop_rx) -> _ => Next::Stop,
            recv(progress) -> update => Next::Progress(update.ok().flatten()),
            recv(events) -> event => event.map_or(Next::Stop, Next::Event),
        };

        match next {
            Next::Stop => break Ok(()),
            Next::Progress(Some((current, total))) => eprint!("\r  reading {current}/{total}"),
            Next::Progress(None) => eprint!("\r\x1b[K"),
            Next::Event(ScanEvent::Detected {
                backend,
                tag_id,
                family,
            }) => println!(
                "{} {family} {} on {backend}",
                "Detected".cyan().bold(),
                hex::encode(&tag_id),
            ),
            Next::Event(ScanEvent::Read(card)) => {
                print_card(&card)?;
                if let Some(dir) = output {
                    let path = save_card(dir, &card)?;
                    println!("  saved to {}", path.display());
                }
                if once {
                    break Ok(());
                }
            }
            Next::Event(ScanEvent::Error(ScanError::NoBackendAvailable)) => {
                break Err(ScanError::NoBackendAvailable);
            }
            Next::Event(ScanEvent::Error(e)) => println!("{} {e}", "Error".red().bold()),
        }
    };

    scanner.stop();
    if let Err(e) = result {
        bail!("{e}. Connect a PC/SC reader or a PN533 device.");
    }
    Ok(())
}

fn print_card(card: &RawCard) -> anyhow::Result<()> {
    println!(
        "{} {} {}",
        "Read".green().bold(),
        card.card_type(),
        hex::encode(&card.tag_id)
    );
    if card.is_partially_unauthorized() {
        println!("  {}", "some sectors or files could not be unlocked".yellow());
    }
    println!("{}", serde_json::to_string_pretty(&card.parse())?);
    Ok(())
}

fn save_card(dir: &Path, card: &RawCard) -> anyhow::Result<std::path::PathBuf> {
    let name = format!(
        "{}-{}.json",
        hex::encode(&card.tag_id),
        card.scanned_at.format("%Y%m%dT%H%M%SZ")
    );
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(card)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
