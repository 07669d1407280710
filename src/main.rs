//! CLI entry point for `mailconvert`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailconvert::config::{self, Config};
use mailconvert::convert::{ConversionRequest, Converter, TargetFormat};
use mailconvert::model::outcome::{ConversionFailure, ConversionResult};
use mailconvert::render::pdf::PdfOptions;

#[derive(Parser)]
#[command(name = "mailconvert", version, about = "Convert email messages to EML, HTML or PDF")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a message file
    Convert {
        /// The .eml file to convert
        path: PathBuf,
        /// Target format: eml, html or pdf
        #[arg(short, long, default_value = "pdf")]
        format: String,
        /// Output file (defaults to <FILE>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Extract attachments into <OUTPUT>-attachments
        #[arg(short = 'a', long)]
        extract_attachments: bool,
        /// Also extract attachments of embedded messages
        #[arg(short, long, requires = "extract_attachments")]
        recursive: bool,
        #[command(flatten)]
        pdf: PdfArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the decoded display headers
    Headers {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the file names attachments would be extracted to
    Attachments {
        path: PathBuf,
        /// Format used to name embedded messages
        #[arg(short, long, default_value = "pdf")]
        format: String,
        #[arg(long)]
        json: bool,
    },
    /// Write a configuration file with default values
    ConfigInit,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// PDF page overrides; unset values come from the configuration.
#[derive(clap::Args)]
struct PdfArgs {
    /// Page size, e.g. A4 or Letter
    #[arg(long)]
    page_size: Option<String>,
    #[arg(long)]
    margin_top: Option<String>,
    #[arg(long)]
    margin_bottom: Option<String>,
    #[arg(long)]
    margin_left: Option<String>,
    #[arg(long)]
    margin_right: Option<String>,
    #[arg(long)]
    dpi: Option<u32>,
}

impl From<PdfArgs> for PdfOptions {
    fn from(args: PdfArgs) -> Self {
        Self {
            page_size: args.page_size,
            margin_top: args.margin_top,
            margin_bottom: args.margin_bottom,
            margin_left: args.margin_left,
            margin_right: args.margin_right,
            dpi: args.dpi,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Convert {
            path,
            format,
            output,
            extract_attachments,
            recursive,
            pdf,
            json,
        } => {
            let request = ConversionRequest {
                format,
                extract_attachments,
                recursive,
                pdf: pdf.into(),
            };
            cmd_convert(&path, output, &request, json, &config)
        }
        Commands::Headers { path, json } => cmd_headers(&path, json, &config),
        Commands::Attachments { path, format, json } => {
            cmd_attachments(&path, &format, json, &config)
        }
        Commands::ConfigInit => cmd_config_init(),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_name = log_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mailconvert.log".into());
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Open `path` with the configured collaborators.
fn open_converter(path: &Path, config: &Config) -> mailconvert::error::Result<Converter<'static>> {
    Ok(Converter::open(path)?
        .with_renderer(config.renderer())
        .with_normalizer(config.normalizer())
        .with_page_defaults(config.pdf.page.clone()))
}

/// Default output path: the input path with the format's extension appended.
fn default_output(path: &Path, format: &str) -> PathBuf {
    let ext = format
        .parse::<TargetFormat>()
        .map(|f| f.extension().to_string())
        .unwrap_or_else(|_| format.to_ascii_lowercase());
    let mut out = path.as_os_str().to_owned();
    out.push(".");
    out.push(ext);
    PathBuf::from(out)
}

/// Convert one message and report the result.
fn cmd_convert(
    path: &Path,
    output: Option<PathBuf>,
    request: &ConversionRequest,
    json: bool,
    config: &Config,
) -> anyhow::Result<ExitCode> {
    let target = output.unwrap_or_else(|| default_output(path, &request.format));

    let spinner = if json {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        pb.set_message(format!("Converting {}", path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let start = Instant::now();
    let result = match open_converter(path, config) {
        Ok(converter) => converter.convert(&target, request),
        Err(e) => ConversionResult::failed(&e),
    };
    let elapsed = start.elapsed();

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result_table(&result, elapsed);
    }

    Ok(exit_code(result.error.as_ref()))
}

/// Print the decoded display headers.
fn cmd_headers(path: &Path, json: bool, config: &Config) -> anyhow::Result<ExitCode> {
    let converter = match open_converter(path, config) {
        Ok(c) => c,
        Err(e) => return report_failure(&ConversionFailure::from_error(&e), json),
    };
    let headers = converter.headers();

    if json {
        println!("{}", serde_json::to_string_pretty(headers)?);
    } else {
        println!();
        for (name, value) in headers.iter() {
            println!("  {:<10} {}", name, value);
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

/// List planned attachment file names without writing anything.
fn cmd_attachments(
    path: &Path,
    format: &str,
    json: bool,
    config: &Config,
) -> anyhow::Result<ExitCode> {
    let converter = match open_converter(path, config) {
        Ok(c) => c,
        Err(e) => return report_failure(&ConversionFailure::from_error(&e), json),
    };
    let names = converter.attachment_names(format);

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if let Some(err) = &names.error {
        eprintln!("  Error: {}", err.message);
    } else {
        println!();
        if names.attachments.is_empty() {
            println!("  No attachments found.");
        }
        for name in &names.attachments {
            println!("  {name}");
        }
        for warning in &names.warnings {
            println!("  Warning: {warning}");
        }
        println!();
    }
    Ok(exit_code(names.error.as_ref()))
}

/// Write the default configuration to the standard location.
fn cmd_config_init() -> anyhow::Result<ExitCode> {
    let path = config::save_config(&Config::default())?;
    println!("  Wrote default configuration to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<ExitCode> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailconvert", &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<ExitCode> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(ExitCode::SUCCESS)
}

fn exit_code(error: Option<&ConversionFailure>) -> ExitCode {
    if error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn report_failure(failure: &ConversionFailure, json: bool) -> anyhow::Result<ExitCode> {
    if json {
        println!("{}", serde_json::json!({ "error": failure }));
    } else {
        eprintln!("  Error: {}", failure.message);
        for cause in &failure.trace {
            eprintln!("    caused by: {cause}");
        }
    }
    Ok(ExitCode::FAILURE)
}

/// Print a conversion result as a human-readable table.
fn print_result_table(result: &ConversionResult, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    println!();
    for file in &result.files {
        let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        println!("  {:>10}  {}", format_size(size, BINARY), file.display());
    }
    for warning in &result.warnings {
        println!("  Warning: {warning}");
    }
    if let Some(err) = &result.error {
        println!("  Error: {}", err.message);
        for cause in &err.trace {
            println!("    caused by: {cause}");
        }
    }
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);
    println!();
}
