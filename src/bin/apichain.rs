//! apichain CLI - run generated API test suites and analyze API descriptions.

use anyhow::{anyhow, Context, Result};
use apichain::{
    loader::load_api_description, CaseStatus, DependencyAnalyzer, DependencyReport, EngineConfig,
    ReqwestClient, SuiteExecutor, SuiteLoader, SuiteResult, TestSuite, VariableStore,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Dependency-aware API test chain runner.
#[derive(Parser, Debug)]
#[command(name = "apichain", version, about)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute test suites against a live target.
    Run(RunArgs),
    /// Infer operation dependencies from an OpenAPI document.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Suite file or directory path.
    #[arg(short = 'p', long = "path")]
    suite_path: Option<String>,

    /// Filter suites by id or name (partial match).
    #[arg(short = 'f', long = "filter")]
    suite_filter: Option<String>,

    /// Engine configuration file (YAML or JSON).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Base URL of the target API.
    #[arg(short = 'b', long = "base-url", env = "APICHAIN_BASE_URL")]
    base_url: Option<String>,

    /// Timeout in seconds per request attempt.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Retries per request for retryable failures.
    #[arg(long = "retries")]
    retries: Option<u32>,

    /// Keep running later cases after a case fails.
    #[arg(long = "continue-on-failure")]
    continue_on_failure: bool,

    /// Directory to save report files.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<String>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// OpenAPI / Swagger document (YAML or JSON).
    #[arg(short = 's', long = "spec")]
    spec: PathBuf,

    /// Output format.
    #[arg(long = "format", default_value = "json")]
    format: ReportFormat,

    /// Only print edges at or above this confidence.
    #[arg(long = "min-confidence", default_value_t = 0.0)]
    min_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
    Text,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    if tracing::dispatcher::has_been_set() {
        return;
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn status_label(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Passed => "\x1b[32mPASS\x1b[0m",
        CaseStatus::Failed => "\x1b[31mFAIL\x1b[0m",
        CaseStatus::Error => "\x1b[31mERROR\x1b[0m",
        CaseStatus::Timeout => "\x1b[31mTIMEOUT\x1b[0m",
        CaseStatus::Pending | CaseStatus::Running => "\x1b[33mSKIP\x1b[0m",
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...(truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

fn print_suite_result(result: &SuiteResult, verbose: bool) {
    let status = if result.success {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!(
        "{} suite: {} ({} ms)",
        status, result.suite_id, result.duration_ms
    );

    for case in &result.case_results {
        info!(
            "  {} case: {} ({} ms)",
            status_label(case.status),
            case.case_id,
            case.duration_ms
        );
        if let Some(message) = &case.error_message {
            error!("     \x1b[31m{}\x1b[0m", message);
        }

        for step in &case.step_results {
            let mark = if step.passed {
                "\x1b[32m✓\x1b[0m"
            } else {
                "\x1b[31m✗\x1b[0m"
            };
            let status = step
                .status_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "-".to_string());
            info!(
                "    {}. {} {} {} -> {} ({} ms)",
                step.sequence,
                mark,
                step.request.method,
                step.request.path,
                status,
                step.response_time_ms
            );

            if verbose {
                debug!("       Request: {} {}", step.request.method, step.request.url);
                if let Some(body) = &step.request.body {
                    debug!("       Request body: {}", truncate(&body.to_string(), 500));
                }
                debug!(
                    "       Response body: {}",
                    truncate(&step.response_body.to_string(), 500)
                );
                if !step.extracted_values.is_empty() {
                    debug!("       Extracted: {:?}", step.extracted_values);
                }
            }
        }
    }
}

fn save_suite_report(
    result: &SuiteResult,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();
    let sanitized_name = result.suite_id.replace([' ', '/'], "_");

    let (filename, content) = match format {
        ReportFormat::Json => (
            format!("{sanitized_name}-{timestamp}.json"),
            serde_json::to_string_pretty(result)?,
        ),
        ReportFormat::Yaml => (
            format!("{sanitized_name}-{timestamp}.yaml"),
            serde_yaml::to_string(result)?,
        ),
        ReportFormat::Text => {
            let mut content = String::new();
            content.push_str(&format!("Suite: {} ({})\n", result.suite_id, result.name));
            content.push_str(&format!(
                "Status: {}\n",
                if result.success { "PASS" } else { "FAIL" }
            ));
            content.push_str(&format!("Duration: {} ms\n\n", result.duration_ms));
            content.push_str("Cases:\n");
            for case in &result.case_results {
                content.push_str(&format!("  {} ({:?})\n", case.case_id, case.status));
                if let Some(message) = &case.error_message {
                    content.push_str(&format!("     Error: {message}\n"));
                }
                for step in &case.step_results {
                    content.push_str(&format!(
                        "     {}. {} {} -> {} ({})\n",
                        step.sequence,
                        step.request.method,
                        step.request.path,
                        step.status_code
                            .map(|code| code.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        if step.passed { "PASS" } else { "FAIL" }
                    ));
                }
            }
            (format!("{sanitized_name}-{timestamp}.txt"), content)
        }
    };

    let file_path = report_dir.join(filename);
    let mut file = File::create(&file_path)?;
    file.write_all(content.as_bytes())?;

    Ok(file_path)
}

fn load_engine_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read config: {}", path.display()))?;
            EngineConfig::from_yaml(&content)
                .context(format!("Failed to parse config: {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = timeout.saturating_mul(1000);
    }
    if let Some(retries) = args.retries {
        config.retry.max_retries = retries;
    }
    if args.continue_on_failure {
        config.continue_on_case_failure = true;
    }
    Ok(config)
}

fn prepare_suites(suite_path: Option<&str>) -> Result<Vec<TestSuite>> {
    let mut loader = SuiteLoader::new();
    for path in ["tests/suites", "suites"] {
        if Path::new(path).exists() {
            loader.add_path(path);
        }
    }

    let suites = match suite_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(anyhow!("Path does not exist: {}", path.display()));
            }
            if path.is_file() {
                vec![loader
                    .load_suite(&path)
                    .context(format!("Failed to load suite: {}", path.display()))?]
            } else {
                loader.load_suites_from_dir(&path).context(format!(
                    "Failed to load suites from directory: {}",
                    path.display()
                ))?
            }
        }
        None => loader.load_all_suites()?,
    };

    if suites.is_empty() {
        return Err(anyhow!("No test suites found"));
    }
    Ok(suites)
}

async fn run_all_suites(args: RunArgs, verbose: bool) -> Result<bool> {
    let config = load_engine_config(&args)?;
    let suites = prepare_suites(args.suite_path.as_deref())?;

    let filtered: Vec<TestSuite> = match &args.suite_filter {
        Some(filter) => {
            let filter = filter.to_lowercase();
            suites
                .into_iter()
                .filter(|s| {
                    s.id.to_lowercase().contains(&filter) || s.name.to_lowercase().contains(&filter)
                })
                .collect()
        }
        None => suites,
    };
    if filtered.is_empty() {
        return Err(anyhow!("No suites matching the filter were found"));
    }

    let client = ReqwestClient::new();
    let executor = SuiteExecutor::new(&config);
    let report_dir = args.report_dir.map(PathBuf::from);
    let total_start = Instant::now();
    let mut all_success = true;
    let (mut passed, mut failed) = (0, 0);

    info!("Running {} suite(s)...", filtered.len());

    for (idx, suite) in filtered.iter().enumerate() {
        info!("Suite {}/{}: {}", idx + 1, filtered.len(), suite.id);
        // every suite run owns its own store
        let mut store = VariableStore::new().with_max_depth(config.max_template_depth);

        match executor.execute(suite, &mut store, &client).await {
            Ok(result) => {
                print_suite_result(&result, verbose);
                if let Some(dir) = &report_dir {
                    match save_suite_report(&result, dir, args.report_format) {
                        Ok(path) => info!("Report saved: {}", path.display()),
                        Err(e) => error!("Failed to save report: {}", e),
                    }
                }
                if result.success {
                    passed += 1;
                } else {
                    all_success = false;
                    failed += 1;
                }
            }
            Err(e) => {
                error!("\x1b[31mInvalid suite: {} - {}\x1b[0m", suite.id, e);
                all_success = false;
                failed += 1;
            }
        }
    }

    info!(
        "Summary:\n  Total: {}\n  \x1b[32mPassed: {}\x1b[0m\n  \x1b[31mFailed: {}\x1b[0m\n  Duration: {} ms",
        passed + failed,
        passed,
        failed,
        total_start.elapsed().as_millis()
    );

    Ok(all_success)
}

fn render_report(report: &DependencyReport, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)?,
        ReportFormat::Yaml => serde_yaml::to_string(report)?,
        ReportFormat::Text => {
            let mut out = String::new();
            for dep in &report.dependencies {
                out.push_str(&format!(
                    "{:<18} {} -> {} [{:?}, {:.2}]{}\n",
                    format!("{:?}", dep.dependency_type),
                    dep.source,
                    dep.target,
                    dep.strength,
                    dep.confidence,
                    dep.field
                        .as_deref()
                        .map(|field| format!(" field={field}"))
                        .unwrap_or_default()
                ));
            }
            for cycle in &report.cycles {
                out.push_str(&format!("cycle: {}\n", cycle.join(" -> ")));
            }
            for reference in &report.circular_refs {
                out.push_str(&format!("circular $ref: {reference}\n"));
            }
            for reference in &report.unresolved_refs {
                out.push_str(&format!("unresolved $ref: {reference}\n"));
            }
            out
        }
    })
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let api = load_api_description(&args.spec)?;
    info!(
        "Loaded {} operation(s) from {}",
        api.endpoints().len(),
        args.spec.display()
    );

    let mut report = DependencyAnalyzer::default().analyze(&api);
    report
        .dependencies
        .retain(|dep| dep.confidence >= args.min_confidence);
    if !report.cycles.is_empty() {
        warn!("{} dependency cycle(s) found", report.cycles.len());
    }

    println!("{}", render_report(&report, args.format)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => {
            if !run_all_suites(args, cli.verbose).await? {
                exit(1);
            }
        }
        Command::Analyze(args) => analyze(args)?,
    }

    Ok(())
}
