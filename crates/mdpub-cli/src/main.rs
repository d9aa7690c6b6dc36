use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdpub_config::Config;
use mdpub_engine::{
    DemoteStyle, DiffEngine, ExtractOptions, Exporter, Extractor, FileRepository, OutputFormat,
    ParserPreset, Pipeline, PipelineOptions, Repository, Status, VersionTracker, discover_sources,
};

#[derive(Parser)]
#[command(
    name = "mdpub",
    version,
    about = "Publish markdown and MDX with versioned, hash-tracked history"
)]
struct Cli {
    /// Config file (defaults to ./mdpub.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Deepest heading level that opens a section
    #[arg(long, global = true)]
    max_nesting: Option<u8>,

    /// Output format: md or mdx
    #[arg(long, global = true)]
    format: Option<String>,

    /// Parser preset: commonmark or gfm-like
    #[arg(long, global = true)]
    preset: Option<String>,

    /// Version store directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, version and export a file or directory tree
    Build {
        path: PathBuf,

        /// Export root (overrides output_dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Export unchanged documents too
        #[arg(long)]
        force: bool,

        /// Write a unified diff next to every updated document
        #[arg(long)]
        diff: bool,
    },

    /// Print the JSON sidecar of one document without storing anything
    Extract { path: PathBuf },

    /// List the stored versions of a document
    History { identity: String },

    /// Unified diff between two stored versions
    Diff {
        identity: String,
        from: u32,
        to: u32,

        /// Context lines around each change
        #[arg(long)]
        context: Option<usize>,
    },

    /// Make an earlier version the latest again
    Revert { identity: String, version: u32 },

    /// List stored documents grouped by collection
    List,
}

/// Effective settings: config file and environment, then CLI flags.
struct Settings {
    config: Config,
    extract: ExtractOptions,
    exporter: Exporter,
}

impl Settings {
    fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
        if let Some(max_nesting) = cli.max_nesting {
            config.max_nesting = max_nesting;
        }
        if let Some(format) = &cli.format {
            config.output_format = format.clone();
        }
        if let Some(preset) = &cli.preset {
            config.parser_preset = preset.clone();
        }
        if let Some(store_dir) = &cli.store_dir {
            config.store_dir = store_dir.clone();
        }

        let format: OutputFormat = config.output_format.parse()?;
        let demote_style: DemoteStyle = config.demote_style.parse()?;
        let preset: ParserPreset = config.parser_preset.parse()?;

        Ok(Self {
            extract: ExtractOptions {
                max_nesting: config.max_nesting,
                preset,
            },
            exporter: Exporter::new(format, demote_style),
            config,
        })
    }

    fn repository(&self) -> FileRepository {
        FileRepository::new(&self.config.store_dir)
            .with_timeout(Duration::from_millis(self.config.repository_timeout_ms))
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let settings = Settings::resolve(&cli)?;
    log::debug!("store: {}", settings.config.store_dir.display());

    match cli.command {
        Command::Build {
            path,
            out_dir,
            force,
            diff,
        } => build(&settings, &path, out_dir, force, diff),
        Command::Extract { path } => extract(&settings, &path),
        Command::History { identity } => history(&settings, &identity),
        Command::Diff {
            identity,
            from,
            to,
            context,
        } => {
            let context = context.unwrap_or(settings.config.diff_context);
            diff(&settings, &identity, from, to, context)
        }
        Command::Revert { identity, version } => revert(&settings, &identity, version),
        Command::List => list(&settings),
    }
}

fn build(
    settings: &Settings,
    path: &Path,
    out_dir: Option<PathBuf>,
    force: bool,
    write_diffs: bool,
) -> Result<i32> {
    let output_dir = out_dir.unwrap_or_else(|| settings.config.output_dir.clone());
    let exclude = [output_dir.clone(), settings.config.store_dir.clone()];
    let sources = discover_sources(path, &exclude)
        .with_context(|| format!("Failed to find sources in {}", path.display()))?;
    log::info!(
        "building {} documents from {}",
        sources.files.len(),
        sources.root.display()
    );

    let repo = settings.repository();
    let options = PipelineOptions {
        extract: settings.extract,
        exporter: settings.exporter,
        output_dir,
        workers: settings.config.workers,
        reconcile_retries: settings.config.reconcile_retries,
        force_export: force,
        write_diffs,
        diff_context: settings.config.diff_context,
    };
    let report = Pipeline::new(&repo, options).run(&sources);

    for document in &report.documents {
        let outcome = document
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        match document.status {
            Status::Error => println!(
                "error    {}: {}",
                document.path,
                document.error.as_deref().unwrap_or("unknown error")
            ),
            Status::Warning => println!(
                "warning  {} ({outcome}, {} warnings)",
                document.path,
                document.warnings.len()
            ),
            Status::Success => println!("ok       {} ({outcome})", document.path),
        }
    }
    println!(
        "{} ok, {} with warnings, {} failed",
        report.count(Status::Success),
        report.count(Status::Warning),
        report.count(Status::Error)
    );

    Ok(report.exit_code())
}

fn extract(settings: &Settings, path: &Path) -> Result<i32> {
    let sources = discover_sources(path, &[])
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let Some(file) = sources.files.first() else {
        anyhow::bail!("No markdown source found at {}", path.display());
    };

    let model = Extractor::new(settings.extract)
        .extract_file(file, &sources.root)
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    println!("{}", settings.exporter.sidecar(&model, &[])?);
    Ok(0)
}

fn history(settings: &Settings, identity: &str) -> Result<i32> {
    let versions = settings
        .repository()
        .history(identity)
        .with_context(|| format!("Failed to read history of {identity}"))?;
    if versions.is_empty() {
        anyhow::bail!("No versions stored for {identity}");
    }

    println!("document {}", versions[0].document_id);
    for version in &versions {
        println!(
            "{:>4}  {}  {}",
            version.label(),
            version.created_at.to_rfc3339(),
            version.hash
        );
    }
    Ok(0)
}

fn diff(settings: &Settings, identity: &str, from: u32, to: u32, context: usize) -> Result<i32> {
    let (lines, summary) = DiffEngine::new(context)
        .diff_versions(&settings.repository(), identity, from, to)
        .with_context(|| format!("Failed to diff {identity} v{from}..v{to}"))?;

    for line in &lines {
        println!("{line}");
    }
    log::info!(
        "{} added, {} deleted, {} unchanged",
        summary.added,
        summary.deleted,
        summary.unchanged
    );
    Ok(0)
}

fn revert(settings: &Settings, identity: &str, version: u32) -> Result<i32> {
    let outcome = VersionTracker::new(settings.exporter)
        .revert(identity, version, &settings.repository())
        .with_context(|| format!("Failed to revert {identity} to v{version}"))?;
    println!("{identity}: {outcome}");
    Ok(0)
}

fn list(settings: &Settings) -> Result<i32> {
    let identities = settings
        .repository()
        .identities()
        .context("Failed to list stored documents")?;

    for (collection, members) in collections(&identities) {
        println!("{collection}/");
        for identity in members {
            println!("  {identity}");
        }
    }
    Ok(0)
}

/// Group identities by their top-level directory; top-level files go under
/// `.`.
fn collections(identities: &[String]) -> BTreeMap<&str, Vec<&str>> {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for identity in identities {
        let collection = match identity.split_once('/') {
            Some((dir, _)) => dir,
            None => ".",
        };
        groups.entry(collection).or_default().push(identity);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "mdpub", "--max-nesting", "2", "build", "docs", "--out-dir", "site", "--force",
        ])
        .unwrap();

        assert_eq!(cli.max_nesting, Some(2));
        match cli.command {
            Command::Build {
                path,
                out_dir,
                force,
                diff,
            } => {
                assert_eq!(path, PathBuf::from("docs"));
                assert_eq!(out_dir, Some(PathBuf::from("site")));
                assert!(force);
                assert!(!diff);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("mdpub.toml");
        std::fs::write(&config_file, "max_nesting = 4\noutput_format = \"mdx\"\n").unwrap();
        let config_arg = config_file.to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "mdpub",
            "--config",
            config_arg.as_str(),
            "--format",
            "md",
            "list",
        ])
        .unwrap();
        let settings = Settings::resolve(&cli).unwrap();

        assert_eq!(settings.extract.max_nesting, 4);
        assert_eq!(settings.exporter.format(), OutputFormat::Md);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let cli = Cli::try_parse_from(["mdpub", "--format", "html", "list"]).unwrap();
        assert!(Settings::resolve(&cli).is_err());
    }

    #[test]
    fn test_collections_group_by_top_level_directory() {
        let identities = vec![
            "guides/install.md".to_string(),
            "guides/usage/flags.md".to_string(),
            "index.md".to_string(),
        ];

        let groups = collections(&identities);

        assert_eq!(groups["."], vec!["index.md"]);
        assert_eq!(
            groups["guides"],
            vec!["guides/install.md", "guides/usage/flags.md"]
        );
    }

    #[test]
    fn test_build_then_history_round_trip() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.md"), "# A\n\nbody\n").unwrap();
        let store = work.path().join("store");
        let out = work.path().join("dist");
        let missing = work.path().join("missing.toml").to_string_lossy().into_owned();
        let store_arg = store.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "mdpub",
            "--config",
            missing.as_str(),
            "--store-dir",
            store_arg.as_str(),
            "list",
        ])
        .unwrap();
        let settings = Settings::resolve(&cli).unwrap();

        let code = build(&settings, src.path(), Some(out.clone()), false, false).unwrap();

        assert_eq!(code, 0);
        assert!(out.join("a.mdx").is_file());
        assert_eq!(settings.repository().identities().unwrap(), vec!["a.md"]);
        assert_eq!(history(&settings, "a.md").unwrap(), 0);
    }
}
