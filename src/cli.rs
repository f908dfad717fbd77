//! zuul-index - CLI for the Zuul configuration index
//!
//! # Usage
//!
//! ```bash
//! # Index a workspace
//! zuul-index index --workspace /path/to/project-config
//!
//! # Effective attributes of a job, with the job that set each one
//! zuul-index resolve tox-py311
//!
//! # Everything that refers to a job
//! zuul-index references tox
//!
//! # Definition of the parent named at line 12, column 13
//! zuul-index definition zuul.d/jobs.yaml 12 13
//! ```
//!
//! Design notes:
//! - `--json` flag outputs machine-readable JSON
//! - Errors go to stderr, results to stdout
//! - Exit codes: 0 = success, 1 = error

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zuul_index::query::{self, HierarchyNode, TextEdit};
use zuul_index::{
    AttributeInheritanceResolver, CollectingSink, Diagnostic, IndexConfig, IndexController,
    IndexReport, IndexStats, Job, Location, ResolvedAttribute,
};

#[derive(Parser)]
#[command(name = "zuul-index")]
#[command(version)]
#[command(about = "Index Zuul job configuration and resolve job inheritance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory to index
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <workspace>/.zuul-index/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not read or write the parse cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Extra file pattern to index (repeatable)
    #[arg(long = "pattern", global = true)]
    patterns: Vec<String>,

    /// Include diagnostics raised while indexing
    #[arg(long, global = true)]
    diagnostics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or rebuild the index
    Index {
        /// Ignore cached parses
        #[arg(long)]
        force: bool,
    },

    /// Show one job
    Job {
        name: String,
    },

    /// List the direct children of a job
    Children {
        name: String,
    },

    /// Show the effective attributes of a job
    Resolve {
        name: String,

        /// Only this attribute (dotted path or last segment)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Find references to a job
    References {
        name: String,
    },

    /// Compute the edits renaming a job
    Rename {
        old: String,
        new: String,
    },

    /// Show the descendant tree of a job
    Hierarchy {
        name: String,
    },

    /// Jump from a `parent:` value to the parent's definition
    Definition {
        /// File, relative to the workspace
        file: PathBuf,
        /// One-based line
        line: usize,
        /// One-based column
        column: usize,
    },

    /// List job definitions
    Symbols {
        /// Only jobs defined in this file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Index, then keep the index updated until interrupted
    #[cfg(feature = "watch")]
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only to stderr to keep stdout clean)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let workspace = cli.workspace.clone();
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    match run_command(&cli, &workspace).await {
        Ok(output) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_human_readable(&output);
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({
                    "error": format!("{:#}", e)
                });
                eprintln!("{}", serde_json::to_string_pretty(&err)?);
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli, workspace: &Path) -> Result<IndexConfig> {
    let mut config = match &cli.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::discover(workspace)?,
    };
    if cli.no_cache {
        config.use_cache = false;
    }
    config.file_patterns.extend(cli.patterns.iter().cloned());
    Ok(config)
}

async fn run_command(cli: &Cli, workspace: &Path) -> Result<Output> {
    let config = load_config(cli, workspace)?;
    let sink = Arc::new(CollectingSink::new());
    let controller = IndexController::with_sink(workspace, config, sink.clone())
        .with_context(|| format!("Failed to open workspace {}", workspace.display()))?;

    let force = matches!(cli.command, Commands::Index { force: true });
    let report = if force {
        controller.rebuild().await?
    } else {
        controller.index_all().await?
    };

    let result: Result<Output> = match &cli.command {
        Commands::Index { .. } => Ok(Output::Index {
            workspace: workspace.display().to_string(),
            report,
            stats: controller.state().stats(),
        }),
        Commands::Job { name } => {
            let jobs = controller.state().jobs.read();
            let templates = controller.state().templates.read();
            let job = jobs.get_by_name(name).with_context(|| unknown_job(name))?;
            Ok(Output::Job(JobResult {
                children: jobs.children_of(name).len(),
                template_references: templates.reference_count(name),
                attributes: job.flattened(),
                ..JobResult::new(job, workspace)
            }))
        }
        Commands::Children { name } => {
            let jobs = controller.state().jobs.read();
            if jobs.get_by_name(name).is_none() {
                bail!(unknown_job(name));
            }
            Ok(Output::Children {
                parent: name.clone(),
                results: jobs
                    .children_of(name)
                    .into_iter()
                    .map(|j| JobResult::new(j, workspace))
                    .collect(),
            })
        }
        Commands::Resolve { name, key } => {
            let jobs = controller.state().jobs.read();
            let resolver = AttributeInheritanceResolver::new(&jobs, controller.sink());
            let resolved = resolver
                .resolve_by_name(name)?
                .with_context(|| unknown_job(name))?;
            let attributes: Vec<ResolvedAttribute> = match key {
                Some(key) => vec![
                    resolved
                        .get(key)
                        .cloned()
                        .with_context(|| format!("Job `{name}` has no attribute `{key}`"))?,
                ],
                None => resolved.iter().cloned().collect(),
            };
            Ok(Output::Resolve {
                job: resolved.job.clone(),
                chain: resolved.chain.clone(),
                truncated: resolved.truncated,
                attributes: attributes
                    .iter()
                    .map(|a| AttributeResult::new(a, workspace))
                    .collect(),
            })
        }
        Commands::References { name } => {
            let jobs = controller.state().jobs.read();
            let templates = controller.state().templates.read();
            if jobs.get_by_name(name).is_none() && templates.reference_count(name) == 0 {
                bail!(unknown_job(name));
            }
            Ok(Output::References {
                job: name.clone(),
                results: query::find_references(&jobs, &templates, name)
                    .iter()
                    .map(|l| LocationResult::new(l, workspace))
                    .collect(),
            })
        }
        Commands::Rename { old, new } => {
            let jobs = controller.state().jobs.read();
            let templates = controller.state().templates.read();
            let edits = query::rename_edits(&jobs, &templates, old, new);
            if edits.is_empty() {
                bail!(unknown_job(old));
            }
            Ok(Output::Rename {
                old: old.clone(),
                new: new.clone(),
                edits,
            })
        }
        Commands::Hierarchy { name } => {
            let jobs = controller.state().jobs.read();
            let tree = query::hierarchy(&jobs, name).with_context(|| unknown_job(name))?;
            Ok(Output::Hierarchy { tree })
        }
        Commands::Definition { file, line, column } => {
            let jobs = controller.state().jobs.read();
            let path = workspace_path(workspace, file);
            let target = query::definition_at(
                &jobs,
                &path,
                line.saturating_sub(1),
                column.saturating_sub(1),
            )
            .with_context(|| {
                format!("No parent reference at {}:{}:{}", file.display(), line, column)
            })?;
            Ok(Output::Definition {
                target: LocationResult::new(&target, workspace),
            })
        }
        Commands::Symbols { file } => {
            let jobs = controller.state().jobs.read();
            let path = file.as_ref().map(|f| workspace_path(workspace, f));
            Ok(Output::Symbols {
                results: query::symbols(&jobs, path.as_deref())
                    .iter()
                    .map(|s| SymbolResult {
                        name: s.name.clone(),
                        location: LocationResult::new(&s.location, workspace),
                    })
                    .collect(),
            })
        }
        #[cfg(feature = "watch")]
        Commands::Watch => {
            let watcher = zuul_index::watch::Watcher::new(
                workspace,
                controller.discovery().clone(),
                controller.config().debounce(),
            )?;
            eprintln!("Watching {} (Ctrl-C to stop)", workspace.display());
            tokio::select! {
                _ = zuul_index::watch::run(&controller, watcher) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            controller.save_cache()?;
            Ok(Output::Index {
                workspace: workspace.display().to_string(),
                report,
                stats: controller.state().stats(),
            })
        }
    };

    let output = result?;
    if cli.diagnostics {
        Ok(Output::WithDiagnostics {
            output: Box::new(output),
            diagnostics: sink.take().iter().map(Diagnostic::to_string).collect(),
        })
    } else {
        Ok(output)
    }
}

fn unknown_job(name: &str) -> String {
    format!("Unknown job `{name}`")
}

fn workspace_path(workspace: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        workspace.join(file)
    }
}

fn relative(path: &Path, workspace: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[derive(serde::Serialize)]
#[serde(tag = "type")]
enum Output {
    Index {
        workspace: String,
        report: IndexReport,
        stats: IndexStats,
    },
    Job(JobResult),
    Children {
        parent: String,
        results: Vec<JobResult>,
    },
    Resolve {
        job: String,
        chain: Vec<String>,
        truncated: bool,
        attributes: Vec<AttributeResult>,
    },
    References {
        job: String,
        results: Vec<LocationResult>,
    },
    Rename {
        old: String,
        new: String,
        edits: Vec<TextEdit>,
    },
    Hierarchy {
        tree: HierarchyNode,
    },
    Definition {
        target: LocationResult,
    },
    Symbols {
        results: Vec<SymbolResult>,
    },
    WithDiagnostics {
        output: Box<Output>,
        diagnostics: Vec<String>,
    },
}

#[derive(serde::Serialize)]
struct JobResult {
    name: String,
    parent: Option<String>,
    file: String,
    line: Option<usize>,
    column: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<(String, String)>,
    children: usize,
    template_references: usize,
}

impl JobResult {
    fn new(job: &Job, workspace: &Path) -> Self {
        let location = job.name_location();
        Self {
            name: job.name().unwrap_or_default().to_string(),
            parent: job.parent().map(str::to_string),
            file: relative(job.source_file(), workspace),
            line: location.map(|l| l.line),
            column: location.map(|l| l.start_col),
            attributes: Vec::new(),
            children: 0,
            template_references: 0,
        }
    }
}

#[derive(serde::Serialize)]
struct AttributeResult {
    path: String,
    value: String,
    provenance: String,
    location: Option<LocationResult>,
}

impl AttributeResult {
    fn new(attr: &ResolvedAttribute, workspace: &Path) -> Self {
        Self {
            path: attr.path.clone(),
            value: attr.value.clone(),
            provenance: attr.provenance.clone(),
            location: attr
                .location
                .as_ref()
                .map(|l| LocationResult::new(l, workspace)),
        }
    }
}

#[derive(serde::Serialize)]
struct LocationResult {
    value: String,
    file: String,
    line: usize,
    start_col: usize,
    end_col: usize,
}

impl LocationResult {
    fn new(location: &Location, workspace: &Path) -> Self {
        Self {
            value: location.value.clone(),
            file: relative(&location.file, workspace),
            line: location.line,
            start_col: location.start_col,
            end_col: location.end_col,
        }
    }
}

#[derive(serde::Serialize)]
struct SymbolResult {
    name: String,
    location: LocationResult,
}

fn print_tree(node: &HierarchyNode, depth: usize) {
    println!("{}{}", "  ".repeat(depth), node.name);
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

// Lines are printed one-based for humans.
fn print_human_readable(output: &Output) {
    match output {
        Output::Index {
            workspace,
            report,
            stats,
        } => {
            println!(
                "Indexed {} files ({} parsed, {} cached, {} failed), {} jobs, {} templates",
                report.total_files,
                report.parsed_files,
                report.cached_files,
                report.failed_files,
                stats.job_count,
                stats.template_count
            );
            println!("Workspace: {}", workspace);
        }
        Output::Job(job) => {
            println!("{} at {}:{}", job.name, job.file, job.line.map_or(0, |l| l + 1));
            if let Some(parent) = &job.parent {
                println!("  parent: {}", parent);
            }
            println!(
                "  {} children, {} template references",
                job.children, job.template_references
            );
            for (path, value) in &job.attributes {
                println!("  {} = {}", path, value);
            }
        }
        Output::Children { parent, results } => {
            println!("Children of \"{}\": {}", parent, results.len());
            for j in results {
                println!("  {} at {}:{}", j.name, j.file, j.line.map_or(0, |l| l + 1));
            }
        }
        Output::Resolve {
            job,
            chain,
            truncated,
            attributes,
        } => {
            println!("{} ({})", job, chain.join(" -> "));
            if *truncated {
                println!("  warning: parent cycle, chain truncated");
            }
            for a in attributes {
                println!("  {} = {}  [{}]", a.path, a.value, a.provenance);
            }
        }
        Output::References { job, results } => {
            println!("References to \"{}\": {}", job, results.len());
            for l in results {
                println!("  {}:{}:{}", l.file, l.line + 1, l.start_col + 1);
            }
        }
        Output::Rename { old, new, edits } => {
            println!("Rename \"{}\" -> \"{}\": {} edits", old, new, edits.len());
            for e in edits {
                println!("  {}:{}:{}", e.file.display(), e.line + 1, e.start_col + 1);
            }
        }
        Output::Hierarchy { tree } => print_tree(tree, 0),
        Output::Definition { target } => {
            println!(
                "{} at {}:{}:{}",
                target.value,
                target.file,
                target.line + 1,
                target.start_col + 1
            );
        }
        Output::Symbols { results } => {
            println!("Jobs: {}", results.len());
            for s in results {
                println!("  {} at {}:{}", s.name, s.location.file, s.location.line + 1);
            }
        }
        Output::WithDiagnostics {
            output,
            diagnostics,
        } => {
            print_human_readable(output);
            if !diagnostics.is_empty() {
                println!("Diagnostics:");
                for d in diagnostics {
                    println!("  {}", d);
                }
            }
        }
    }
}
