use std::collections::BTreeMap;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use psst_data::analysis::DataAnalysis;
use psst_data::domain::{Split, Task};
use psst_data::downloader::{Downloader, ProgressSink};
use psst_data::error::PsstError;
use psst_data::loading;
use psst_data::networking::{ReqwestTransport, Session, TerminalPrompt};
use psst_data::output::{ConsoleProgress, JsonOutput, OutputMode};
use psst_data::remote::DataServer;
use psst_data::settings::SettingsStore;
use psst_data::versioning::{SplitFiles, Version, VersionLedger};

#[derive(Parser)]
#[command(name = "psst-data")]
#[command(about = "Download and load versions of the PSST aphasia speech dataset")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve a data version and download whatever is missing")]
    Fetch(VersionArgs),
    #[command(about = "List the versions available in the local cache")]
    Versions(CacheArgs),
    #[command(about = "Load a task's manifests and summarize them by severity")]
    Load(LoadArgs),
    #[command(about = "Show the settings file location and its non-secret values")]
    Settings,
}

#[derive(Args, Clone)]
struct CacheArgs {
    /// Cache root; defaults to `local_dir` from the settings file.
    #[arg(long)]
    local_dir: Option<Utf8PathBuf>,
}

#[derive(Args, Clone)]
struct VersionArgs {
    /// Version to resolve; the latest remote version when omitted.
    #[arg(long)]
    version_id: Option<String>,

    #[command(flatten)]
    cache: CacheArgs,
}

#[derive(Args, Clone)]
struct LoadArgs {
    #[arg(long, value_enum, default_value_t = Task::PhonemeRecognition)]
    task: Task,

    #[command(flatten)]
    version: VersionArgs,
}

#[derive(Serialize)]
struct VersionReport<'a> {
    version_id: &'a str,
    local_dir: Option<String>,
    files: &'a SplitFiles,
    comment: &'a str,
}

impl<'a> From<&'a Version> for VersionReport<'a> {
    fn from(version: &'a Version) -> Self {
        Self {
            version_id: &version.version_id,
            local_dir: version.local_dir().ok().map(|dir| dir.to_string()),
            files: &version.files,
            comment: &version.comment,
        }
    }
}

#[derive(Serialize)]
struct LoadReport<'a> {
    version: VersionReport<'a>,
    task: Task,
    test_is_placeholder: bool,
    splits: BTreeMap<Split, DataAnalysis>,
}

#[derive(Serialize)]
struct SettingsReport {
    path: String,
    local_dir: String,
    base_url: String,
    auth_server: String,
    has_credentials: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PsstError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PsstError) -> u8 {
    match error {
        PsstError::VersionNotFound { .. } | PsstError::EmptyLedger => 2,
        PsstError::Connectivity { .. }
        | PsstError::Unauthorized { .. }
        | PsstError::HttpStatus { .. }
        | PsstError::Unavailable { .. }
        | PsstError::SplitDownload { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let settings = SettingsStore::new()?;

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, settings, output_mode),
        Commands::Versions(args) => run_versions(args, settings, output_mode),
        Commands::Load(args) => run_load(args, settings, output_mode),
        Commands::Settings => run_settings(settings),
    }
}

type HttpDownloader = Downloader<DataServer<ReqwestTransport, TerminalPrompt>>;

fn build_downloader(settings: SettingsStore) -> miette::Result<HttpDownloader> {
    let transport = ReqwestTransport::new()?;
    let session = Session::new(transport, TerminalPrompt, settings);
    Ok(Downloader::new(DataServer::new(session)))
}

fn cache_root(args: &CacheArgs, settings: &SettingsStore) -> miette::Result<Utf8PathBuf> {
    match &args.local_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(settings.load()?.local_dir_path()?),
    }
}

fn sink_for(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Interactive => Box::new(ConsoleProgress),
        OutputMode::NonInteractive => Box::new(JsonOutput),
    }
}

fn run_fetch(
    args: VersionArgs,
    settings: SettingsStore,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let root = cache_root(&args.cache, &settings)?;
    let downloader = build_downloader(settings)?;
    let sink = sink_for(output_mode);
    let version = downloader.resolve(&root, args.version_id.as_deref(), sink.as_ref())?;

    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print(&VersionReport::from(&version)).into_diagnostic()?;
        }
        OutputMode::Interactive => print_version_summary(&version),
    }
    Ok(())
}

fn run_versions(
    args: CacheArgs,
    settings: SettingsStore,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let root = cache_root(&args, &settings)?;
    let ledger = VersionLedger::load_local(&root);

    match output_mode {
        OutputMode::NonInteractive => {
            let reports = ledger.iter().map(VersionReport::from).collect::<Vec<_>>();
            JsonOutput::print(&reports).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            if ledger.is_empty() {
                println!("No local versions in {root}");
            }
            for version in ledger.iter() {
                print_version_summary(version);
            }
        }
    }
    Ok(())
}

fn run_load(args: LoadArgs, settings: SettingsStore, output_mode: OutputMode) -> miette::Result<()> {
    let root = cache_root(&args.version.cache, &settings)?;
    let downloader = build_downloader(settings)?;
    let sink = sink_for(output_mode);
    let data = loading::load(
        &downloader,
        args.task,
        &root,
        args.version.version_id.as_deref(),
        sink.as_ref(),
    )?;

    let mut splits = BTreeMap::new();
    for (split, utterances) in data.iter() {
        splits.insert(split, DataAnalysis::compute(utterances)?);
    }
    let report = LoadReport {
        version: VersionReport::from(&data.version),
        task: args.task,
        test_is_placeholder: data.test_is_placeholder,
        splits,
    };
    JsonOutput::print(&report).into_diagnostic()?;
    Ok(())
}

fn run_settings(settings: SettingsStore) -> miette::Result<()> {
    let current = settings.load()?;
    JsonOutput::print(&SettingsReport {
        path: settings.path().to_string(),
        local_dir: current.local_dir.clone(),
        base_url: current.base_url.clone(),
        auth_server: current.auth_server.clone(),
        has_credentials: current.has_credentials(),
    })
    .into_diagnostic()?;
    Ok(())
}

fn print_version_summary(version: &Version) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    println!("{green}version {}{reset}", version.version_id);
    if let Ok(dir) = version.local_dir() {
        println!("   dir: {dir}");
    }
    for (split, file) in version.files.iter() {
        match file {
            Some(file) => println!("   {split}: {file}"),
            None => println!("{yellow}   {split}: not released{reset}"),
        }
    }
    if !version.comment.is_empty() {
        println!("   {}", version.comment);
    }
}
