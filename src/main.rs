#![warn(
    clippy::all,
    // clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    // clippy::unwrap_used
)]
use clap::Parser;

use cache::FileCache;
use calendar::{CaldavClient, Credentials};
use catalog::{EventCatalog, ParsedEvent, Selection};
use cli::Command;
use identity::Directory;
use logger::LogExt;
use registrar::{AttendeeRegistrar, Registration};
use sync::{SyncEngine, SyncReport};

mod cache;
mod calendar;
mod catalog;
mod cli;
mod config;
mod identity;
mod logger;
mod registrar;
mod sync;

fn main() -> anyhow::Result<()> {
    logger::init();

    let cli = cli::Cli::parse();
    let config = config::init(&cli.config).log_error("Could not load the configuration file")?;

    let client = CaldavClient::new(Credentials::from(&config.caldav), config.caldav.url.clone());
    let mut cache = FileCache::open(config.cache.directory.clone()).log_error("Could not open the cache")?;
    let directory = Directory::new(config.identities.clone());

    log::debug!("Using cache at {}", cache.root().display());

    match cli.command {
        Command::Sync => {
            let report = SyncEngine::new(&client, &mut cache)
                .synchronize()
                .log_error("Synchronization failed")?;

            print_report(&report);
        }
        Command::Events { viewer, filters, all } => {
            if !cli.offline {
                // stale data is still worth showing
                let _ = SyncEngine::new(&client, &mut cache)
                    .synchronize()
                    .log_warn("Synchronization failed, listing cached events");
            }

            let selections = EventCatalog::new(&cache, &directory)
                .select(&viewer, &filters)
                .log_error("Could not read the cached events")?;

            print_selections(&selections, all);
        }
        Command::Register { item, email, leave, name } => {
            if !cli.offline {
                SyncEngine::new(&client, &mut cache)
                    .synchronize()
                    .log_error("Synchronization failed")?;
            }

            let outcome = AttendeeRegistrar::new(&client, &mut cache)
                .register(&item, &email, !leave, name.as_deref())
                .log_error("Registration failed")?;

            match outcome {
                Registration::AlreadyRegistered => println!("{email} already attends {item}"),
                Registration::NotRegistered => println!("{email} does not attend {item}"),
                Registration::Committed { etag } => println!("{item} updated ({etag})"),
                Registration::Reconciled => println!("{item} changed remotely, the local copy was refreshed"),
            }
        }
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.unchanged {
        println!("Agenda is up to date");
        return;
    }

    println!(
        "fetched {}, stored {}, past {}, ignored {}, deleted {}",
        report.fetched, report.stored, report.skipped_past, report.ignored, report.deleted,
    );
}

fn print_selections(selections: &[Selection], all: bool) {
    for selection in selections.iter().filter(|selection| all || selection.keep) {
        let marker = if selection.keep { ' ' } else { '-' };

        println!("{marker} {}", describe(&selection.event));
    }

    let categories = catalog::all_categories(selections);

    if !categories.is_empty() {
        println!();
        println!("categories: {}", categories.into_iter().collect::<Vec<_>>().join(", "));
    }
}

fn describe(event: &ParsedEvent) -> String {
    let mut line = format!(
        "{} {} {}",
        event.start.format("%Y-%m-%d %H:%M"),
        event.name,
        event.summary.as_deref().unwrap_or("(untitled)"),
    );

    if let Some(location) = &event.location {
        line.push_str(&format!(" @ {location}"));
    }

    if let Some(level) = event.level {
        line.push_str(&format!(" [E{level}]"));
    }

    match event.capacity {
        Some(capacity) => line.push_str(&format!(" {}/{capacity}", event.attendees.len())),
        None => line.push_str(&format!(" {} attending", event.attendees.len())),
    }

    if event.is_registered {
        line.push_str(" *");
    }

    line
}
