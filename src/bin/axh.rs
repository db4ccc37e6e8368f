use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use arxiv_harvester::app::{App, ProgressSink};
use arxiv_harvester::archive::ArchiveMerger;
use arxiv_harvester::arxiv::ArxivHttpClient;
use arxiv_harvester::config::{ConfigLoader, Settings};
use arxiv_harvester::domain::{Condition, QueryPayload};
use arxiv_harvester::download::{BatchDownloader, BatchReport, DownloadItem, HttpPdfTransport};
use arxiv_harvester::error::HarvestError;
use arxiv_harvester::output::{JsonOutput, OutputMode, TextOutput};
use arxiv_harvester::paths::{AppDirs, PathResolver};
use arxiv_harvester::presets::{JsonPresetStore, NewPreset};
use arxiv_harvester::query::DEFAULT_MAX_RESULTS;

type HttpApp = App<ArxivHttpClient, HttpPdfTransport, JsonPresetStore>;

#[derive(Parser)]
#[command(name = "axh")]
#[command(about = "Search arXiv, keep saved searches, archive crawls and download PDFs")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Print machine-readable JSON on stdout")]
    json: bool,

    #[arg(long, global = true, help = "Settings file (defaults to arxiv-harvester.json in the config directory)")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Query arXiv and print the results")]
    Search(SearchArgs),
    #[command(about = "Manage saved searches")]
    Preset(PresetArgs),
    #[command(about = "Run a saved search and merge the results into its archive")]
    Crawl(CrawlArgs),
    #[command(about = "Inspect or import archives")]
    Archive(ArchiveArgs),
    #[command(about = "Download PDFs")]
    Download(DownloadArgs),
    #[command(about = "Show or change the archive and download directories")]
    Dirs(DirsArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[command(subcommand)]
    command: SearchCommand,
}

#[derive(Subcommand)]
enum SearchCommand {
    #[command(about = "Search with field conditions, e.g. -c ti:transformer -c \"OR au:vaswani\"")]
    Simple(SimpleQueryArgs),
    #[command(about = "Search with a raw arXiv query string")]
    Advanced(AdvancedQueryArgs),
}

#[derive(Args, Clone)]
struct SimpleQueryArgs {
    #[arg(
        short = 'c',
        long = "condition",
        required = true,
        help = "[AND|OR|ANDNOT ]field:keyword; text without a field searches everything"
    )]
    conditions: Vec<String>,

    #[arg(long, default_value_t = 0)]
    start: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    max: u32,
}

#[derive(Args, Clone)]
struct AdvancedQueryArgs {
    query: String,

    #[arg(long, default_value_t = 0)]
    start: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    max: u32,
}

#[derive(Args)]
struct PresetArgs {
    #[command(subcommand)]
    command: PresetCommand,
}

#[derive(Subcommand)]
enum PresetCommand {
    #[command(about = "List saved searches")]
    List,
    #[command(about = "Show one saved search")]
    Show { name: String },
    #[command(about = "Save a condition-based search")]
    AddSimple {
        name: String,
        #[arg(short = 'c', long = "condition", required = true)]
        conditions: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max: u32,
    },
    #[command(about = "Save a raw-query search")]
    AddAdvanced {
        name: String,
        query: String,
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max: u32,
    },
    #[command(about = "Replace a saved search with a condition-based one")]
    EditSimple {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(short = 'c', long = "condition", required = true)]
        conditions: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max: u32,
    },
    #[command(about = "Replace a saved search with a raw-query one")]
    EditAdvanced {
        name: String,
        query: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max: u32,
    },
    #[command(about = "Delete a saved search")]
    Remove { name: String },
}

#[derive(Args)]
struct CrawlArgs {
    #[arg(help = "Saved search to run")]
    name: String,
}

#[derive(Args)]
struct ArchiveArgs {
    #[command(subcommand)]
    command: ArchiveCommand,
}

#[derive(Subcommand)]
enum ArchiveCommand {
    #[command(about = "List archives in the archive directory")]
    List,
    #[command(about = "Show the papers stored for a search")]
    Show { name: String },
    #[command(about = "Merge a JSON array of papers into an archive")]
    Import { name: String, file: String },
}

#[derive(Args)]
struct DownloadArgs {
    #[command(subcommand)]
    command: DownloadCommand,
}

#[derive(Subcommand)]
enum DownloadCommand {
    #[command(about = "Download the PDFs of papers stored in an archive")]
    Archive {
        name: String,
        #[arg(long = "id", help = "Only these arXiv ids (repeatable)")]
        ids: Vec<String>,
    },
    #[command(about = "Download a single PDF by URL")]
    Url {
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Args)]
struct DirsArgs {
    #[command(subcommand)]
    command: DirsCommand,
}

#[derive(Subcommand)]
enum DirsCommand {
    #[command(about = "Show configured directories")]
    Show,
    #[command(about = "Set the archive directory (a trailing `data` folder is added)")]
    SetArchive { path: String },
    #[command(about = "Set the download directory (a trailing `downloads` folder is added)")]
    SetDownload { path: String },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        err if err.is_validation() => 2,
        HarvestError::PresetNotFound(_) | HarvestError::ArchiveNotFound(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let dirs = AppDirs::discover()?;
    let settings = ConfigLoader::resolve(cli.config.as_deref(), &dirs)?;
    let app = build_app(&settings, &dirs)?;

    match cli.command {
        Commands::Search(args) => run_search(args.command, &app, output_mode),
        Commands::Preset(args) => run_preset(args.command, &app, output_mode),
        Commands::Crawl(args) => run_crawl(args, &app, output_mode),
        Commands::Archive(args) => run_archive(args.command, &app, output_mode),
        Commands::Download(args) => run_download(args.command, &app, output_mode),
        Commands::Dirs(args) => run_dirs(args.command, &app, output_mode),
    }
}

fn build_app(settings: &Settings, dirs: &AppDirs) -> Result<HttpApp, HarvestError> {
    let arxiv = ArxivHttpClient::new(settings)?;
    let transport = HttpPdfTransport::new(settings)?;
    let archives = ArchiveMerger::new(PathResolver::archive(dirs, settings.run_mode));
    let downloader = BatchDownloader::new(
        PathResolver::download(dirs, settings.run_mode),
        transport,
        settings.download_workers,
    );
    let presets = JsonPresetStore::in_dir(dirs.config_dir());
    Ok(App::new(arxiv, archives, downloader, presets))
}

fn sink(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &TextOutput,
    }
}

fn report_failure(output_mode: OutputMode, error: HarvestError) -> miette::Result<()> {
    if output_mode == OutputMode::Json {
        JsonOutput::print_failure(&error).into_diagnostic()?;
    }
    Err(error.into())
}

fn parse_conditions(raw: &[String]) -> Result<Vec<Condition>, HarvestError> {
    raw.iter().map(|value| value.parse::<Condition>()).collect()
}

fn simple_payload(conditions: &[String], max: u32) -> Result<QueryPayload, HarvestError> {
    Ok(QueryPayload::Simple {
        conditions: parse_conditions(conditions)?,
        max_results: max,
    })
}

fn run_search(command: SearchCommand, app: &HttpApp, output_mode: OutputMode) -> miette::Result<()> {
    let (payload, start) = match command {
        SearchCommand::Simple(args) => match simple_payload(&args.conditions, args.max) {
            Ok(payload) => (payload, args.start),
            Err(err) => return report_failure(output_mode, err),
        },
        SearchCommand::Advanced(args) => (
            QueryPayload::Advanced {
                query: args.query,
                max_results: args.max,
            },
            args.start,
        ),
    };

    match app.search(&payload, start, sink(output_mode)) {
        Ok(result) => {
            match output_mode {
                OutputMode::Json => JsonOutput::print_search(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_search(&result),
            }
            Ok(())
        }
        Err(err) => report_failure(output_mode, err),
    }
}

fn run_preset(command: PresetCommand, app: &HttpApp, output_mode: OutputMode) -> miette::Result<()> {
    let preset = match command {
        PresetCommand::List => {
            let presets = app.list_presets()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_presets(&presets).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_presets(&presets),
            }
            return Ok(());
        }
        PresetCommand::Show { name } => app.find_preset(&name)?,
        PresetCommand::AddSimple {
            name,
            conditions,
            max,
        } => app.add_preset(NewPreset::new(name, simple_payload(&conditions, max)?))?,
        PresetCommand::AddAdvanced { name, query, max } => app.add_preset(NewPreset::new(
            name,
            QueryPayload::Advanced {
                query,
                max_results: max,
            },
        ))?,
        PresetCommand::EditSimple {
            name,
            rename,
            conditions,
            max,
        } => {
            let payload = simple_payload(&conditions, max)?;
            let new_name = rename.unwrap_or_else(|| name.clone());
            app.edit_preset(&name, NewPreset::new(new_name, payload))?
        }
        PresetCommand::EditAdvanced {
            name,
            query,
            rename,
            max,
        } => {
            let new_name = rename.unwrap_or_else(|| name.clone());
            let payload = QueryPayload::Advanced {
                query,
                max_results: max,
            };
            app.edit_preset(&name, NewPreset::new(new_name, payload))?
        }
        PresetCommand::Remove { name } => app.remove_preset(&name)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_preset(&preset).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_preset(&preset),
    }
    Ok(())
}

fn run_crawl(args: CrawlArgs, app: &HttpApp, output_mode: OutputMode) -> miette::Result<()> {
    match app.crawl(&args.name, sink(output_mode)) {
        Ok(result) => {
            match output_mode {
                OutputMode::Json => JsonOutput::print_crawl(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_crawl(&result),
            }
            Ok(())
        }
        Err(err) => report_failure(output_mode, err),
    }
}

fn run_archive(command: ArchiveCommand, app: &HttpApp, output_mode: OutputMode) -> miette::Result<()> {
    match command {
        ArchiveCommand::List => {
            let archives = app.list_archives()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_archives(&archives).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_archives(&archives),
            }
        }
        ArchiveCommand::Show { name } => {
            let archive = app.load_archive(&name)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_archive(&archive).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_archive(&archive),
            }
        }
        ArchiveCommand::Import { name, file } => {
            let imported = read_papers_file(&file)
                .and_then(|papers| app.import_json(&name, papers, sink(output_mode)));
            match imported {
                Ok(report) => match output_mode {
                    OutputMode::Json => JsonOutput::print_merge(&report).into_diagnostic()?,
                    OutputMode::Text => TextOutput::print_merge(&report),
                },
                Err(err) => return report_failure(output_mode, err),
            }
        }
    }
    Ok(())
}

fn read_papers_file(file: &str) -> Result<serde_json::Value, HarvestError> {
    let content = std::fs::read_to_string(file)
        .map_err(|err| HarvestError::Persistence(format!("read {file}: {err}")))?;
    serde_json::from_str(&content).map_err(|err| HarvestError::InvalidInput(format!("{file}: {err}")))
}

fn run_download(command: DownloadCommand, app: &HttpApp, output_mode: OutputMode) -> miette::Result<()> {
    let report = match command {
        DownloadCommand::Archive { name, ids } => {
            app.download_archive(&name, &ids, sink(output_mode))?
        }
        DownloadCommand::Url { url, title } => {
            let item = DownloadItem {
                identifier: url.clone(),
                title: title.unwrap_or_default(),
                download_url: Some(url),
                row_key: None,
            };
            app.download_batch(&[item], sink(output_mode))?
        }
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_batch(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_batch(&report),
    }
    batch_outcome(&report)
}

fn batch_outcome(report: &BatchReport) -> miette::Result<()> {
    if report.success {
        return Ok(());
    }
    Err(miette::miette!(
        "{} of {} downloads failed",
        report.failed.len(),
        report.failed.len() + report.downloaded.len()
    ))
}

fn run_dirs(command: DirsCommand, app: &HttpApp, output_mode: OutputMode) -> miette::Result<()> {
    match command {
        DirsCommand::Show => {}
        DirsCommand::SetArchive { path } => {
            app.set_archive_dir(&path)?;
        }
        DirsCommand::SetDownload { path } => {
            app.set_download_dir(&path)?;
        }
    }

    let dirs = app.current_dirs();
    match output_mode {
        OutputMode::Json => JsonOutput::print_dirs(&dirs).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_dirs(&dirs),
    }
    Ok(())
}
