//! reductio CLI: inspection and maintenance over a vault.
//!
//! # Responsibility
//! - Map subcommands onto core service calls.
//! - Render every result as JSON on stdout.
//! - Turn core errors into their stable exit codes.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::warn;
use serde::Serialize;

use reductio_core::{
    default_log_level, init_logging, AuditOptions, ConsolidationService, FsNodeRepository,
    GraphError, GraphResult, Level, MergeRequest, NewNode, NodeService, NodeUpdate,
    PermissiveVocabulary, Status, VaultConfig,
};

#[derive(Parser)]
#[command(name = "reductio", version, about = "Reduction-checked knowledge vault")]
struct Cli {
    /// Vault root directory.
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for rolling log files. Logging stays off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a node.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, value_parser = parse_level)]
        level: Level,
        /// Proposition text.
        #[arg(long, default_value = "")]
        body: String,
        /// Parent slugs (repeatable).
        #[arg(long = "reduces-to")]
        reduces_to: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<Status>,
    },

    /// Change status, tags or reduction edges of a node.
    Update {
        node: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<Status>,
        #[arg(long)]
        add_tag: Vec<String>,
        #[arg(long)]
        remove_tag: Vec<String>,
        #[arg(long)]
        add_reduces_to: Vec<String>,
        #[arg(long)]
        remove_reduces_to: Vec<String>,
    },

    /// Delete a node.
    Delete { node: String },

    /// Scan the vault for integrity issues.
    Audit {
        /// Delete stale tentative nodes with no reductions.
        #[arg(long)]
        fix: bool,
        /// With --fix, report the deletions without performing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the proof chain below a node.
    Chain { node: String },

    /// List validated nodes resting on tentative ancestors.
    Hollow,

    /// Find nodes connected to a slug, tag or title.
    Related {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        hops: Option<usize>,
    },

    /// Manage deduplication groups and merges.
    Groups {
        #[command(subcommand)]
        action: GroupAction,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// List open groups.
    List,
    /// Tag two or more same-level nodes as duplicates.
    Add { nodes: Vec<String> },
    /// Clear a group.
    Clear { group: String },
    /// Replace group members (and/or listed nodes) with one canonical node.
    Merge {
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long)]
        reason: Option<String>,
        nodes: Vec<String>,
    },
    /// Reverse a merge.
    Undo { node: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(message) = init_logging(level, log_dir) {
            eprintln!("reductio: logging disabled: {message}");
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = serde_json::json!({
                "error": err.kind().as_str(),
                "message": err.to_string(),
            });
            eprintln!("{payload}");
            let code = err.kind().exit_code();
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli) -> GraphResult<()> {
    let config = VaultConfig::load(&cli.vault)?;
    match &cli.command {
        Commands::Add {
            title,
            level,
            body,
            reduces_to,
            tags,
            status,
        } => {
            let mut input = NewNode::new(title.as_str(), *level, body.as_str());
            input.reduces_to = reduces_to.clone();
            input.tags = tags.clone();
            input.status = *status;
            print_json(&node_service(&cli.vault, config).create_node(input)?)
        }
        Commands::Update {
            node,
            status,
            add_tag,
            remove_tag,
            add_reduces_to,
            remove_reduces_to,
        } => {
            let update = NodeUpdate {
                status: *status,
                add_tags: add_tag.clone(),
                remove_tags: remove_tag.clone(),
                add_reduces_to: add_reduces_to.clone(),
                remove_reduces_to: remove_reduces_to.clone(),
            };
            print_json(&node_service(&cli.vault, config).update_node(node, update)?)
        }
        Commands::Delete { node } => {
            print_json(&node_service(&cli.vault, config).delete_node(node)?)
        }
        Commands::Audit { fix, dry_run } => {
            let options = AuditOptions {
                fix: *fix,
                dry_run: *dry_run,
            };
            print_json(&node_service(&cli.vault, config).audit(options)?)
        }
        Commands::Chain { node } => print_json(&node_service(&cli.vault, config).chain(node)?),
        Commands::Hollow => print_json(&node_service(&cli.vault, config).hollow_chains()?),
        Commands::Related { query, limit, hops } => {
            print_json(&node_service(&cli.vault, config).related(query, *hops, *limit)?)
        }
        Commands::Groups { action } => {
            let service = ConsolidationService::new(FsNodeRepository::new(&cli.vault), config);
            match action {
                GroupAction::List => print_json(&service.list_groups()?),
                GroupAction::Add { nodes } => print_json(&service.group(nodes)?),
                GroupAction::Clear { group } => print_json(&service.ungroup(group)?),
                GroupAction::Merge {
                    group,
                    title,
                    body,
                    reason,
                    nodes,
                } => print_json(&service.merge(MergeRequest {
                    group: group.clone(),
                    slugs: nodes.clone(),
                    title: title.clone(),
                    proposition: body.clone(),
                    reason: reason.clone(),
                })?),
                GroupAction::Undo { node } => print_json(&service.undo(node)?),
            }
        }
    }
}

fn node_service(vault: &Path, config: VaultConfig) -> NodeService<FsNodeRepository> {
    let repo = FsNodeRepository::new(vault);
    match config.vocabulary() {
        Some(vocabulary) => NodeService::new(repo, config, vocabulary),
        None => {
            warn!("event=vocabulary_load module=cli status=skipped reason=no_tags_configured");
            NodeService::new(repo, config, PermissiveVocabulary)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> GraphResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| GraphError::InvalidInput(format!("cannot render result: {err}")))?;
    println!("{text}");
    Ok(())
}

fn parse_level(value: &str) -> Result<Level, String> {
    Level::parse(value).ok_or_else(|| format!("unknown level `{value}`"))
}

fn parse_status(value: &str) -> Result<Status, String> {
    Status::parse(value).ok_or_else(|| format!("unknown status `{value}`"))
}
