use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_STATE_DIR;

#[derive(Parser, Debug)]
#[command(
    name = "hostfully-import",
    version,
    about = "Imports Hostfully vacation-rental listings into a local booking content store"
)]
pub struct CliArgs {
    /// Directory holding the state file and downloaded media.
    #[arg(long, global = true, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store connection settings and import tuning knobs.
    Configure {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        agency_uid: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        /// Gallery size cap per listing.
        #[arg(long)]
        max_photos: Option<usize>,
        /// How many listings one bulk-start queues at most.
        #[arg(long)]
        bulk_limit: Option<usize>,
        /// Page size for cursor-paginated API calls (1-100).
        #[arg(long)]
        api_page_limit: Option<i64>,
        /// Allow per-listing amenity API calls when the payload has none.
        #[arg(long)]
        allow_enrich_api: Option<bool>,
        /// Per-listing amenity cache lifetime in hours (1-168).
        #[arg(long)]
        amenities_cache_hours: Option<i64>,
        /// Count enabled-amenities entries only when a channel flag is on.
        #[arg(long)]
        require_channel_flag: Option<bool>,
        #[arg(long)]
        verbose_log: Option<bool>,
    },
    /// Refresh the amenity catalog into local taxonomy terms.
    SyncCatalog,
    /// Import a single listing by its remote UID.
    ImportOne {
        #[arg(long)]
        uid: String,
        /// Reimport even if the listing already exists locally.
        #[arg(long)]
        update_existing: bool,
    },
    /// Build a fresh bulk-import queue from the remote property list.
    BulkStart {
        /// Queue listings that are already imported locally too.
        #[arg(long)]
        update_existing: bool,
    },
    /// Import the next queued listing and report progress.
    Tick,
    /// Show queue, progress and import counts.
    Status,
    /// Show the most recent import failure, if any.
    LastError,
    /// Forget the most recent import failure.
    ClearError,
}
