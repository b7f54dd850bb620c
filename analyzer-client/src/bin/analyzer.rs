//! Analyzer CLI - run and compare document analyses from the terminal
//!
//! Usage: analyzer [--config PATH] [--base-url URL] [-v] [-q] <COMMAND>

use analyzer::controller::AnalysisController;
use analyzer::export::{ExportFormat, SystemClipboard};
use analyzer::template::{VARIABLE_HINTS, parse_variables};
use analyzer::upload::Uploader;
use analyzer::notify::TracingNotifier;
use analyzer::selection::{SelectOutcome, Slot};
use analyzer::view::{TerminalNotifier, TerminalView, View};
use analyzer::{AnalyzerBackend, AnalyzerConfig, HttpBackend, Notifier};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "analyzer")]
#[command(about = "Run, compare and export document analyses", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analysis service URL (overrides config and ANALYZER_API_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Send notifications to the log instead of the terminal
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a PDF or text document (max 5MB)
    Upload {
        file: PathBuf,
    },

    /// List uploaded documents
    Documents,

    /// List prompt templates
    Templates,

    /// List past analyses
    History {
        /// Only analyses whose prompt contains this text
        #[arg(long)]
        search: Option<String>,
    },

    /// Analyze a document
    Run {
        /// Document id
        #[arg(long)]
        document: String,

        /// Start from this prompt template
        #[arg(long)]
        template: Option<String>,

        /// Prompt text (replaces the template's)
        #[arg(long)]
        prompt: Option<String>,

        /// Show processing progress while the analysis runs
        #[arg(long)]
        watch: bool,

        /// Save the result through /save-analysis (explicit_save mode)
        #[arg(long)]
        save: bool,

        /// Write the result as json or md
        #[arg(long)]
        export: Option<ExportFormat>,

        /// Export directory (defaults to export_dir)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Copy the result to the clipboard
        #[arg(long)]
        copy: bool,
    },

    /// Show two past analyses side by side
    Compare {
        /// Analyses to select, in order (a third one follows selection_policy)
        ids: Vec<String>,

        /// Put this analysis in slot A
        #[arg(long = "a", value_name = "ID")]
        slot_a: Option<String>,

        /// Put this analysis in slot B
        #[arg(long = "b", value_name = "ID")]
        slot_b: Option<String>,
    },

    /// Show a template with variables filled in
    Preview {
        #[arg(long)]
        template: String,

        /// key=value, repeatable
        #[arg(long = "var")]
        vars: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    Ok(config)
}

fn init_logging(config: &AnalyzerConfig, verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => config.tracing_level(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config, cli.verbose)?;

    debug!(base_url = %config.base_url, "Loaded configuration");

    let backend: Arc<dyn AnalyzerBackend> = Arc::new(
        HttpBackend::from_config(&config).context("Failed to create HTTP client")?,
    );
    let notifier: Arc<dyn Notifier> = if cli.quiet {
        Arc::new(TracingNotifier)
    } else {
        Arc::new(TerminalNotifier)
    };

    let ok = match cli.command {
        Commands::Upload { file } => upload(backend, notifier, file).await,
        Commands::Run {
            document,
            template,
            prompt,
            watch,
            save,
            export,
            out,
            copy,
        } => {
            let options = RunOptions {
                document,
                template,
                prompt,
                watch,
                save,
                export,
                out,
                copy,
            };
            run(backend, notifier, &config, options).await?
        }
        command => browse(backend, notifier, &config, command).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn upload(
    backend: Arc<dyn AnalyzerBackend>,
    notifier: Arc<dyn Notifier>,
    file: PathBuf,
) -> bool {
    let uploader = Uploader::new(backend, notifier);
    match uploader.upload_path(Some(&file)).await {
        Ok(receipt) => {
            println!("{}", receipt.file_id);
            true
        }
        Err(_) => false,
    }
}

/// Read-only commands over the loaded catalog
async fn browse(
    backend: Arc<dyn AnalyzerBackend>,
    notifier: Arc<dyn Notifier>,
    config: &AnalyzerConfig,
    command: Commands,
) -> Result<bool> {
    let mut controller = AnalysisController::new(backend, notifier.clone(), config);
    controller.mount().await;
    let mut view = TerminalView::stdout();

    match command {
        Commands::Documents => view.render_documents(&controller.catalog().documents)?,
        Commands::Templates => view.render_templates(&controller.catalog().templates)?,
        Commands::History { search } => {
            let analyses = controller.history(search.as_deref().unwrap_or_default());
            view.render_history(&analyses)?;
        }
        Commands::Compare {
            ids,
            slot_a,
            slot_b,
        } => {
            for id in &ids {
                if controller.toggle_compare(id) == SelectOutcome::PairFull {
                    debug!(analysis_id = %id, "Skipped; use --a or --b to replace a slot");
                }
            }
            for (slot, id) in [(Slot::A, slot_a), (Slot::B, slot_b)] {
                if let Some(id) = id {
                    controller.assign_compare(slot, &id);
                }
            }
            let Some(comparison) = controller.comparison() else {
                notifier.error("Select two different analyses to compare.");
                return Ok(false);
            };
            for side in [&comparison.a, &comparison.b] {
                if !side.found {
                    notifier.info(&format!("Analysis '{}' not found.", side.id));
                }
            }
            view.render_comparison(&comparison)?;
        }
        Commands::Preview { template, vars } => {
            controller.select_template(Some(&template));
            if controller.template().is_none() {
                notifier.error(&format!("Template '{}' not found.", template));
                return Ok(false);
            }
            let variables = parse_variables(vars.iter().map(String::as_str));
            println!("{}", controller.preview(&variables));
            eprintln!(
                "{} {}",
                "Available variables:".dimmed(),
                VARIABLE_HINTS.join(", ").dimmed()
            );
        }
        Commands::Upload { .. } | Commands::Run { .. } => {}
    }
    Ok(true)
}

struct RunOptions {
    document: String,
    template: Option<String>,
    prompt: Option<String>,
    watch: bool,
    save: bool,
    export: Option<ExportFormat>,
    out: Option<PathBuf>,
    copy: bool,
}

async fn run(
    backend: Arc<dyn AnalyzerBackend>,
    notifier: Arc<dyn Notifier>,
    config: &AnalyzerConfig,
    options: RunOptions,
) -> Result<bool> {
    let mut controller = AnalysisController::new(backend, notifier.clone(), config);
    controller.mount().await;

    controller.select_document(Some(&options.document));
    if let Some(template) = &options.template {
        controller.select_template(Some(template));
    }
    if let Some(prompt) = options.prompt {
        controller.set_prompt(prompt);
    }

    let renderer = options.watch.then(|| {
        let mut updates = controller.progress_updates();
        tokio::spawn(async move {
            let mut view = TerminalView::new(std::io::stderr());
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                if view.render_progress(&state).is_err() || !state.active {
                    break;
                }
            }
        })
    });

    let result = controller.run(options.watch).await;
    if let Some(renderer) = renderer {
        renderer.abort();
    }

    let mut ok = match result {
        Ok(response) => {
            TerminalView::stdout().render_response(response)?;
            true
        }
        Err(_) => return Ok(false),
    };

    if options.save && controller.save().await.is_err() {
        ok = false;
    }

    if let Some(format) = options.export
        && let Some(file) = controller.export(format)
    {
        let dir = options.out.unwrap_or_else(|| config.export_dir.clone());
        let path = file
            .write_to(&dir)
            .with_context(|| format!("Failed to export to {}", dir.display()))?;
        info!(path = %path.display(), "Export written");
        notifier.success(&format!("Exported {}", path.display()));
    }

    if options.copy {
        let mut clipboard = SystemClipboard::new().context("Failed to open clipboard")?;
        controller
            .copy_response(&mut clipboard)
            .context("Failed to copy response")?;
    }

    Ok(ok)
}
