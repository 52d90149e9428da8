//! VidFeed CLI: command-line interface for the render engine.
//!
//! Usage:
//!   vidfeed filters                         List catalog filters
//!   vidfeed probe <URI>                     Show a source's duration
//!   vidfeed trim <URI> --start --end -o     Render one window of a source
//!   vidfeed merge <URI>... -o               Concatenate sources into one video
//!   vidfeed posts                           List locally stored feed posts

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vidfeed_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "vidfeed",
    about = "Filter, trim, and merge videos for the feed",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in filters
    Filters {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a source's duration
    Probe {
        /// Source URI or file path
        uri: String,
    },

    /// Render a trimmed window of one source
    Trim {
        /// Source URI or file path
        uri: String,

        /// Window start (seconds)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Window end (seconds, defaults to the source end)
        #[arg(long)]
        end: Option<f64>,

        /// Catalog filter name
        #[arg(short, long, default_value = "none")]
        filter: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record the result as a feed post with this caption
        #[arg(long)]
        post: Option<String>,
    },

    /// Concatenate several sources into one video
    Merge {
        /// Source URIs or file paths, in order
        #[arg(required = true)]
        uris: Vec<String>,

        /// Catalog filter name
        #[arg(short, long, default_value = "none")]
        filter: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record the result as a feed post with this caption
        #[arg(long)]
        post: Option<String>,
    },

    /// List feed posts in the local store
    Posts {
        /// Delete the post with this id instead of listing
        #[arg(long)]
        delete: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    vidfeed_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Filters { json } => commands::filters::run(json),
        Commands::Probe { uri } => commands::probe::run(uri).await,
        Commands::Trim {
            uri,
            start,
            end,
            filter,
            output,
            post,
        } => {
            let job = commands::render::RenderArgs {
                filter,
                output,
                post,
            };
            commands::render::trim(&config, uri, start, end, job).await
        }
        Commands::Merge {
            uris,
            filter,
            output,
            post,
        } => {
            let job = commands::render::RenderArgs {
                filter,
                output,
                post,
            };
            commands::render::merge(&config, uris, job).await
        }
        Commands::Posts { delete } => commands::posts::run(&config, delete),
    }
}
