use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use convokeep::cli::tag::TagEdit;
use convokeep::cli::{export, import, list, mutate, show, stats, tag};
use convokeep::config::Config;
use convokeep::model::{ConversationFilter, SortOrder, SourceFilter};
use convokeep::store::ArchiveStore;

#[derive(Parser)]
#[command(name = "convokeep")]
#[command(about = "Archive, search and curate exported AI chat conversations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import export files, directories or glob patterns
    Import {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// List conversations
    List {
        /// gpt, claude, all, or an exact source name
        #[arg(short, long, default_value = "all")]
        source: SourceFilter,

        /// Oldest first
        #[arg(long)]
        oldest: bool,

        #[arg(long)]
        starred: bool,

        /// Include only archived conversations
        #[arg(long)]
        archived: bool,

        #[arg(short, long)]
        tag: Option<String>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Print only the number of matches
        #[arg(long)]
        count: bool,
    },

    /// Show a conversation with its messages
    Show { conversation_id: String },

    /// Tag management
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },

    /// Star conversations
    Star {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Remove the star instead
        #[arg(long)]
        off: bool,
    },

    /// Archive conversations
    Archive {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Unarchive instead
        #[arg(long)]
        off: bool,
    },

    /// Delete conversations
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete every conversation
    Clear {
        #[arg(long)]
        yes: bool,
    },

    /// Write every conversation to an export file
    Export { file: PathBuf },

    /// Show statistics
    Stats,
}

#[derive(Subcommand)]
enum TagCommands {
    /// Replace a conversation's tags
    Set {
        conversation_id: String,
        tags: Vec<String>,
    },
    /// Add tags to a conversation
    Add {
        conversation_id: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a conversation
    Remove {
        conversation_id: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// List every tag with its usage count
    List,
    /// Rename a tag everywhere
    Rename { old: String, new: String },
    /// Remove a tag everywhere
    Delete { tag: String },
    /// Find conversations by tag
    Find {
        #[arg(required = true)]
        tags: Vec<String>,
        /// Require every tag instead of any
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Initialize store
    let db_path = config.database_path();
    let mut store = ArchiveStore::open(&db_path)
        .with_context(|| format!("opening archive at {}", db_path.display()))?
        .with_batch_size(config.batch_size());

    match cli.command {
        Commands::Import { paths } => {
            import::run(&mut store, &paths)?;
        }
        Commands::List {
            source,
            oldest,
            starred,
            archived,
            tag,
            offset,
            limit,
            count,
        } => {
            let filter = ConversationFilter {
                offset,
                limit,
                source,
                sort: if oldest {
                    SortOrder::Oldest
                } else {
                    SortOrder::Newest
                },
                starred: starred.then_some(true),
                archived: archived.then_some(true),
                tag,
                count_only: count,
            };
            list::run(&store, &filter)?;
        }
        Commands::Show { conversation_id } => {
            show::run(&store, &conversation_id)?;
        }
        Commands::Tag { command } => match command {
            TagCommands::Set {
                conversation_id,
                tags,
            } => tag::edit(&mut store, &conversation_id, &tags, TagEdit::Set)?,
            TagCommands::Add {
                conversation_id,
                tags,
            } => tag::edit(&mut store, &conversation_id, &tags, TagEdit::Add)?,
            TagCommands::Remove {
                conversation_id,
                tags,
            } => tag::edit(&mut store, &conversation_id, &tags, TagEdit::Remove)?,
            TagCommands::List => tag::list(&store)?,
            TagCommands::Rename { old, new } => tag::rename(&mut store, &old, &new)?,
            TagCommands::Delete { tag: name } => tag::delete(&mut store, &name)?,
            TagCommands::Find { tags, all } => tag::find(&store, &tags, all)?,
        },
        Commands::Star { ids, off } => {
            mutate::star(&mut store, &ids, !off)?;
        }
        Commands::Archive { ids, off } => {
            mutate::archive(&mut store, &ids, !off)?;
        }
        Commands::Delete { ids } => {
            mutate::delete(&mut store, &ids)?;
        }
        Commands::Clear { yes } => {
            mutate::clear(&mut store, yes)?;
        }
        Commands::Export { file } => {
            export::run(&store, &file, config.export.pretty)?;
        }
        Commands::Stats => {
            stats::run(&store, &db_path)?;
        }
    }

    Ok(())
}
