mod audit;
mod cache_file;
mod checksum;
mod cli;
mod config;
mod diff;
mod dir_list;
mod engine;
mod exempt;
mod layout;
mod manifest;
mod options;
mod record;
mod remediation;
mod report;
mod startup;
mod suppression;
mod tree;
mod util;

use audit::{AuditEvent, AuditLog, AuditSink, Severity};
use cli::{Cli, Command, LogLevel, SettingsArgs, SuppressionsCommand};
use config::{Config, Overrides};
use diff::DiffRenderer;
use engine::{Reconciliation, ReconciliationEngine};
use exempt::PathClassifier;
use layout::InstallLayout;
use manifest::{DirectoryManifestProvider, TimeoutManifestProvider};
use options::OptionStore;
use remediation::{Action, BatchRequest, RemediationController};
use report::ReportOptions;
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use suppression::SuppressionStore;
use tracing::{Event, Level, Subscriber, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tree::TreeBuilder;
use util::hashing::path_key;
use util::paths::normalize_relative;

/// Namespace of the suppression cache inside the state directory.
const SUPPRESSION_NAMESPACE: &str = "integrity";

/// Raised by SIGINT while a batch runs.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

struct CorewardExitCode;

impl CorewardExitCode {
    /// Exit code used when actionable discrepancies were found.
    fn status_unclean() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for other errors (I/O errors, unavailable manifest,
    /// invalid requests, etc.).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_level);

    // Change working directory if -C was specified
    if let Some(directory) = &cli.directory
        && let Err(e) = std::env::set_current_dir(directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return CorewardExitCode::any_error();
    }

    let result = Config::load(Path::new("."), &overrides_from(cli.settings))
        .map_err(anyhow::Error::from)
        .and_then(|config| run(cli.command, &config));

    match result {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            CorewardExitCode::any_error()
        }
    }
}

fn overrides_from(settings: SettingsArgs) -> Overrides {
    Overrides {
        config: settings.config,
        release: settings.release,
        manifest_dir: settings.manifest_dir,
        state_dir: settings.state_dir,
        audit_log: settings.audit_log,
        workers: settings.workers,
        timeout_secs: settings.timeout,
    }
}

fn run(command: Command, config: &Config) -> anyhow::Result<ExitCode> {
    let services = Services::new(config)?;

    match command {
        Command::Status {
            all,
            show_suppressed,
        } => handle_status(
            config,
            &services,
            ReportOptions {
                all,
                show_suppressed,
            },
        ),
        Command::Scan => handle_scan(config, &services),
        Command::Apply {
            action,
            confirm,
            entries,
        } => handle_apply(config, &services, action.as_deref(), confirm, &entries),
        Command::Diff { path } => handle_diff(config, &services, &path),
        Command::Suppressions { command } => handle_suppressions(&services, command),
    }
}

/// Collaborators shared by all commands.
struct Services {
    layout: InstallLayout,
    provider: TimeoutManifestProvider,
    store: SuppressionStore,
    options: OptionStore,
    audit: AuditLog,
}

impl Services {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let directory = DirectoryManifestProvider::new(&config.manifest_dir);

        Ok(Services {
            layout: config.layout(),
            provider: TimeoutManifestProvider::new(Arc::new(directory), config.request_timeout),
            store: SuppressionStore::open(&config.state_dir, SUPPRESSION_NAMESPACE),
            options: OptionStore::open(&config.state_dir),
            audit: AuditLog::new(config.audit_log.clone()),
        })
    }

    fn reconcile(&self, config: &Config) -> anyhow::Result<Reconciliation> {
        let release = config.require_release()?;

        startup::apply_startup_suppressions(
            &self.layout,
            &self.store,
            &self.options,
            &config.locale,
        );

        let classifier = PathClassifier::new(self.layout.content_dir_name())?;
        let trees = TreeBuilder::new(config.algorithm, config.workers)?;
        let engine = ReconciliationEngine::new(
            &self.layout,
            &self.provider,
            &classifier,
            &trees,
            &self.store,
            &config.locale,
        );

        Ok(engine.reconcile(release)?)
    }
}

fn handle_status(
    config: &Config,
    services: &Services,
    options: ReportOptions,
) -> anyhow::Result<ExitCode> {
    let result = services.reconcile(config)?;

    report::print_reconciliation(&result, options);

    let summary = result.summary();
    if result.is_clean() {
        info!(
            "No discrepancies: {} files match the release ({} suppressed)",
            summary.stable, summary.suppressed
        );
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        "{} added, {} removed, {} modified ({} suppressed)",
        summary.added, summary.removed, summary.modified, summary.suppressed
    );
    info!("Run 'coreward apply --action <restore|delete|fixed> --confirm <ENTRY>...' to remediate.");

    Ok(CorewardExitCode::status_unclean())
}

fn handle_scan(config: &Config, services: &Services) -> anyhow::Result<ExitCode> {
    let result = match services.reconcile(config) {
        Ok(result) => result,
        Err(err) => {
            services.audit.report(AuditEvent::new(
                Severity::Error,
                format!("Integrity scan failed: {err}"),
            ));
            return Err(err);
        }
    };

    let summary = result.summary();
    if result.is_clean() {
        info!("Integrity scan found no discrepancies");
        return Ok(ExitCode::SUCCESS);
    }

    services.audit.report(AuditEvent::new(
        Severity::Warning,
        format!(
            "Integrity scan found {} discrepancies in release {}: {} added, {} removed, {} modified",
            summary.actionable(),
            config.require_release()?,
            summary.added,
            summary.removed,
            summary.modified
        ),
    ));

    Ok(CorewardExitCode::status_unclean())
}

fn handle_apply(
    config: &Config,
    services: &Services,
    action: Option<&str>,
    confirm: bool,
    entries: &[String],
) -> anyhow::Result<ExitCode> {
    let request = BatchRequest::parse(action, confirm, entries)?;

    // Deleting and suppressing work without knowing the release.
    let release = match request.action {
        Action::Restore => config.require_release()?.to_string(),
        Action::Delete | Action::MarkFixed => config.release.clone().unwrap_or_default(),
    };

    install_interrupt_handler();

    let outcome = RemediationController::new(
        &services.layout,
        &services.provider,
        &services.store,
        &services.audit,
        release,
    )
    .with_cancellation(&INTERRUPTED)
    .apply(&request);

    for path in &outcome.affected_paths {
        println!("{}: {}", request.action, path);
    }
    println!(
        "{} out of {} files were successfully processed.",
        outcome.processed, outcome.selected
    );

    if outcome.cancelled {
        warn!("Interrupted, remaining entries were not processed");
        return Ok(CorewardExitCode::any_error());
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_diff(config: &Config, services: &Services, path: &str) -> anyhow::Result<ExitCode> {
    let release = config.require_release()?;

    let rendered = DiffRenderer::new(&services.layout, &services.provider, &config.locale)
        .diff(path, release)?;

    if rendered.is_empty() {
        info!("{} matches release {}", path, release);
    } else {
        print!("{}", rendered);
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_suppressions(
    services: &Services,
    command: SuppressionsCommand,
) -> anyhow::Result<ExitCode> {
    match command {
        SuppressionsCommand::List => {
            let mut entries: Vec<_> = services.store.get_all()?.into_values().collect();
            entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

            for entry in entries {
                let at = chrono::DateTime::from_timestamp(entry.suppressed_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| entry.suppressed_at.to_string());
                println!(
                    "{:<2} {} (since {})",
                    entry.classification.code(),
                    entry.relative_path,
                    at
                );
            }
        }
        SuppressionsCommand::Remove { paths } => {
            for path in paths {
                let path = normalize_relative(&path);
                if services.store.remove(&path_key(&path))? {
                    info!("{} is reported again", path);
                } else {
                    warn!("{} was not suppressed", path);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        warn!("Cannot install interrupt handler: {}", e);
    }
}

fn init_tracing(verbose: u8, log_level: Option<LogLevel>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let explicit = match (log_level, verbose) {
        (Some(level), _) => Some(level.as_str()),
        (None, 0) => None,
        (None, 1) => Some("info"),
        (None, _) => Some("debug"),
    };

    let filter = match explicit {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "ðŸ” ")?,
                Level::INFO => write!(writer, "â„¹ï¸ ")?,
                Level::WARN => write!(writer, "âš ï¸  ")?,
                Level::ERROR => write!(writer, "âŒï¸ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
