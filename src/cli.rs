use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::catalog::Filter;

#[derive(Debug, Clone, Parser)]
#[clap(bin_name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Path to the configuration file
    #[clap(name = "config")]
    pub config: PathBuf,

    /// Work on the local cache only, without synchronizing first
    #[clap(long, global = true)]
    pub offline: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Synchronize the local cache with the remote agenda
    Sync,

    /// List upcoming events as seen by a viewer
    Events {
        /// Identity of the viewer
        #[clap(long)]
        viewer: String,

        /// Keep only events matching every filter: my_events, need_volunteers, level:<n> or a category
        #[clap(long = "filter", value_name = "FILTER")]
        filters: Vec<Filter>,

        /// Also list the events the filters dropped
        #[clap(long)]
        all: bool,
    },

    /// Join or leave an event
    Register {
        /// Name of the cached item, e.g. `event.ics`
        item: String,

        /// Email address of the attendee
        email: String,

        /// Remove the attendee instead of adding it
        #[clap(long)]
        leave: bool,

        /// Display name stored next to the email
        #[clap(long)]
        name: Option<String>,
    },
}
