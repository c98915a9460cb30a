//! `relaycfg` command line.
//!
//! ```text
//! relaycfg fetch bastion ops - 10.148.62.10,10.148.62.11 netadmin - --generate
//! relaycfg generate configs/sw-floor2.txt --output-dir configs
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Local;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info, warn};
use secrecy::SecretString;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use relaycfg::device::{ConfigGenerator, ConfigParser};
use relaycfg::output::{self, OutputWriter, error_marker, saved_marker};
use relaycfg::{
    RetrievalMode, RetrievalRequest, RetrievalResult, Retriever, Settings, SshConnector,
    TargetOutcome, VendorFamily,
};

const JUMP_PASSWORD_ENV: &str = "RELAYCFG_JUMP_PASSWORD";
const TARGET_PASSWORD_ENV: &str = "RELAYCFG_TARGET_PASSWORD";

#[derive(Parser, Debug)]
#[command(
    name = "relaycfg",
    version,
    about = "Retrieve switch configuration through an SSH jump host",
    after_help = "Passwords given as '-' are read from RELAYCFG_JUMP_PASSWORD and RELAYCFG_TARGET_PASSWORD."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (TOML)
    #[arg(long, global = true, env = "RELAYCFG_SETTINGS")]
    settings: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve configuration from one or more targets
    Fetch(FetchArgs),

    /// Generate 802.1X configuration from a saved configuration file
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Jump host address
    jump_host: String,

    /// Jump host user
    jump_user: String,

    /// Jump host password ('-' to read it from the environment)
    jump_password: String,

    /// Target address or comma-separated list of addresses
    targets: String,

    /// Target device user
    target_user: String,

    /// Target device password ('-' to read it from the environment)
    target_password: Option<String>,

    /// Directory for saved configuration files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Retrieval mode: shell or probe
    #[arg(long)]
    mode: Option<RetrievalMode>,

    /// Vendor hint: juniper or cisco
    #[arg(long)]
    vendor: Option<VendorFamily>,

    /// Targets retrieved at the same time
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Print the result as JSON instead of markers
    #[arg(long)]
    json: bool,

    /// Also write the 802.1X document for each Junos device
    #[arg(long)]
    generate: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Saved configuration (Junos set format)
    file: PathBuf,

    /// Write `<hostname>_ISE_config.txt` here instead of printing
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// RADIUS source address (default: detected management address)
    #[arg(long)]
    source_address: Option<Ipv4Addr>,

    /// Render `wildcard range` statements over port ranges
    #[arg(long)]
    wildcard: bool,
}

/// JSON report: the retrieval result plus the files written.
#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    result: &'a RetrievalResult,
    saved: Vec<PathBuf>,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "relaycfg=info",
        2 => "relaycfg=debug,russh=info",
        _ => "relaycfg=trace,russh=debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn password(value: &str, env: &str) -> Option<SecretString> {
    let value = if value == "-" {
        std::env::var(env).ok()?
    } else {
        value.to_string()
    };
    (!value.is_empty()).then(|| SecretString::from(value))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match &cli.settings {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    match cli.command {
        Command::Fetch(args) => fetch(args, settings).await,
        Command::Generate(args) => generate(args, &settings),
    }
}

async fn fetch(args: FetchArgs, mut settings: Settings) -> ExitCode {
    if let Some(mode) = args.mode {
        settings.relay.mode = mode;
    }
    if let Some(n) = args.max_concurrent {
        settings.relay.max_concurrent = n;
    }

    let Some(jump_password) = password(&args.jump_password, JUMP_PASSWORD_ENV) else {
        eprintln!("error: no jump host password (set {JUMP_PASSWORD_ENV} when passing '-')");
        return ExitCode::FAILURE;
    };
    let target_password = args
        .target_password
        .as_deref()
        .and_then(|p| password(p, TARGET_PASSWORD_ENV));

    let request = match RetrievalRequest::new(
        args.jump_host,
        args.jump_user,
        jump_password,
        &args.targets,
        args.target_user,
        target_password,
    ) {
        Ok(request) => request.with_vendor(args.vendor),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling retrievals");
            on_signal.cancel();
        }
    });

    let retriever = Retriever::new(&SshConnector, &settings, cancel);
    let result = retriever.retrieve(&request).await;

    let writer = OutputWriter::new(&args.output_dir);
    let identity = request.relay_identity();
    let mut saved = Vec::new();
    let mut markers = Vec::new();

    for outcome in &result.targets {
        if !outcome.is_success() {
            markers.push(error_marker(&outcome.target, &outcome.reason()));
            continue;
        }
        match persist(&writer, outcome, &identity, &settings, args.generate) {
            Ok(paths) => {
                markers.extend(paths.iter().map(|p| saved_marker(p)));
                saved.extend(paths);
            }
            Err(e) => {
                error!("[{}] saving failed: {}", outcome.target, e);
                markers.push(error_marker(&outcome.target, &format!("{}: {}", e.kind(), e)));
            }
        }
    }

    if args.json {
        let report = Report {
            result: &result,
            saved: saved.clone(),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("serializing result: {}", e),
        }
    } else {
        for marker in &markers {
            println!("{marker}");
        }
    }

    if saved.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Save the configuration and, when asked, the generated 802.1X document.
fn persist(
    writer: &OutputWriter,
    outcome: &TargetOutcome,
    identity: &str,
    settings: &Settings,
    generate: bool,
) -> relaycfg::Result<Vec<PathBuf>> {
    let now = Local::now().naive_local();
    let mut paths = Vec::new();
    let Some(path) = writer.save(outcome, identity, now)? else {
        return Ok(paths);
    };
    paths.push(path);

    let junos = outcome
        .captured
        .as_ref()
        .is_some_and(|c| c.family == VendorFamily::Juniper);
    if generate && junos {
        if let Some(config) = &outcome.config {
            let device = ConfigParser::new(&settings.parser).parse(config);
            if device.access_count() == 0 {
                warn!("[{}] no access interface found, 802.1X document not written", outcome.target);
            } else {
                let generated = ConfigGenerator::new(&settings.radius)
                    .with_options(&settings.generator)
                    .generate(&device, device.management_ip());
                let stem = output::file_stem(outcome.hostname.as_deref(), &outcome.target);
                paths.push(writer.save_generated(&generated, &stem, now)?);
            }
        }
    }
    Ok(paths)
}

fn generate(args: GenerateArgs, settings: &Settings) -> ExitCode {
    let text = match std::fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let device = ConfigParser::new(&settings.parser).parse(&text);
    info!(
        "{}: hostname {:?}, management address {:?}, {} access interface(s)",
        args.file.display(),
        device.hostname(),
        device.management_ip(),
        device.access_count()
    );
    if device.access_count() == 0 {
        warn!("no access interface found in {}", args.file.display());
    }

    let source = args.source_address.or(device.management_ip());
    let mut options = settings.generator.clone();
    options.wildcard |= args.wildcard;
    let generated = ConfigGenerator::new(&settings.radius)
        .with_options(&options)
        .generate(&device, source);
    let now = Local::now().naive_local();

    match args.output_dir {
        Some(dir) => {
            let stem = match device.hostname() {
                Some(hostname) => output::file_stem(Some(hostname), ""),
                None => file_name(&args.file),
            };
            match OutputWriter::new(dir).save_generated(&generated, &stem, now) {
                Ok(path) => {
                    println!("{}", saved_marker(&path));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        None => {
            print!("{}", generated.render_document(now));
            ExitCode::SUCCESS
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
