//! Purpose: `hellodev` CLI entry point: registers the greeting device and drives it.
//! Role: Binary crate root; parses args, installs logging, runs one command, maps exit codes.
//! Invariants: Command output goes to stdout; logs and errors go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: The device is unregistered before the process exits.
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod shell;

use hellodev::api::{
    DEFAULT_DEVICE_NAME, DEFAULT_MAJOR, DEFAULT_MINOR, DeviceIdentity, Error, ErrorKind,
    to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run `hellodev --help` for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    let host = HostArgs {
        lock_dir: cli.lock_dir,
        identity: DeviceIdentity::new(cli.device_name, cli.major, cli.minor),
    };

    command_dispatch::dispatch_command(cli.command, host).map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .next()
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

/// Where and under which number the device is published.
#[derive(Clone, Debug)]
struct HostArgs {
    lock_dir: Option<PathBuf>,
    identity: DeviceIdentity,
}

#[derive(Parser)]
#[command(
    name = "hellodev",
    version,
    about = "A greeting pseudo-device you can write a name to and read back",
    long_about = None,
    before_help = r#"The device holds one shared buffer: "Hello, <name>!".
Writes replace the name (at most 100 bytes); every open reads with its own cursor."#,
    after_help = r#"EXAMPLES
  $ hellodev greet                       # Hello, World!
  $ hellodev greet Bari                  # Hello, Bari!
  $ hellodev greet Bari --chunk 4 --json
  $ printf 'open\nwrite 1 Ana\nread 1 64\n' | hellodev shell

NOTES
  - Set RUST_LOG=info to see device registration logs on stderr.
  - --lock-dir claims the device number across processes."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Claim the device number with a lock file in this directory",
        value_hint = ValueHint::DirPath
    )]
    lock_dir: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_DEVICE_NAME, help = "Device name")]
    device_name: String,
    #[arg(long, default_value_t = DEFAULT_MAJOR, help = "Device major number")]
    major: u32,
    #[arg(long, default_value_t = DEFAULT_MINOR, help = "Device minor number")]
    minor: u32,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize human-readable output"
    )]
    color: ColorMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Optionally write a name, then read the greeting back",
        after_help = r#"EXAMPLES
  $ hellodev greet
  $ hellodev greet Bari
  $ hellodev greet "$(head -c 200 /dev/zero | tr '\0' x)"   # truncated to 100 bytes"#
    )]
    Greet {
        #[arg(help = "Name to write before reading (any bytes)")]
        name: Option<OsString>,
        #[arg(long, default_value_t = 64, help = "Bytes requested per read call")]
        chunk: usize,
        #[arg(long, help = "Emit a JSON summary instead of the greeting text")]
        json: bool,
    },
    #[command(
        about = "Drive the device with line commands (one JSON reply per line)",
        long_about = r#"Drive the device with line commands read from stdin or --script.

Commands:
  open                    open a session (cursor 0)
  close <id>              close a session
  write <id> [name]       replace the name (rest of line, raw bytes, may be empty)
  read <id> <want>        read up to <want> bytes at the session cursor
  cat <id> [chunk]        read until end of stream
  info                    device identity and current greeting

Blank lines and lines starting with '#' are ignored.
Read replies carry the exact bytes in `raw` next to the lossy `bytes` text."#,
        after_help = r#"EXAMPLES
  $ printf 'open\nopen\nread 1 5\nwrite 2 Bari\nread 1 64\n' | hellodev shell"#
    )]
    Shell {
        #[arg(long, help = "Read commands from a file instead of stdin", value_hint = ValueHint::FilePath)]
        script: Option<PathBuf>,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_jsonl(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(identity) = err.identity() {
        inner.insert("device".to_string(), json!(identity));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(identity) = err.identity() {
        lines.push(format!(
            "{} {identity}",
            colorize_label("device:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}
