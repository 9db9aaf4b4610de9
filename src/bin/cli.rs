use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser as ClapParser};
use tracing_subscriber::EnvFilter;

use h1stream::{
    Collector, Engine, MessageType, Outcome, ParserConfig, format_debug, format_events,
    format_headers_only, format_json,
};

/// h1stream CLI: incremental HTTP/1.x parser.
///
/// Reads raw HTTP bytes from a file, --raw string, or stdin, feeds them to a
/// parsing session in chunks, and prints the parsed messages (or the raw
/// event stream) in the chosen format.
///
/// Escape sequences (\r, \n, \t, \\) in the --raw value are interpreted so
/// you can pass a full HTTP message as a single shell argument.
///
/// Set RUST_LOG (e.g. RUST_LOG=h1stream=trace) to see parser tracing.
#[derive(ClapParser)]
#[command(name = "h1stream-cli", version, about, long_about = None)]
struct Cli {
    /// Path to a file containing raw HTTP messages.
    /// Reads from stdin when neither FILE nor --raw is given.
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Raw HTTP string (escape sequences \r \n \t \\ are expanded).
    #[arg(long)]
    raw: Option<String>,

    /// Parse responses instead of requests.
    #[arg(long)]
    response: bool,

    /// Feed the input to the parser this many bytes at a time.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: Option<u64>,

    /// Output format.
    #[arg(short, long, default_value = "json", value_enum)]
    format: OutputFormat,

    /// Pretty-print JSON output (ignored for debug/headers formats).
    #[arg(short, long)]
    pretty: bool,

    /// Maximum number of headers allowed per message.
    #[arg(long, default_value = "128")]
    max_headers: usize,

    /// Maximum length of a header value in bytes.
    #[arg(long, default_value = "8192")]
    max_header_value_len: usize,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    /// JSON array of messages
    Json,
    /// Human-readable debug output
    Debug,
    /// Start line + headers only
    Headers,
    /// JSON array of parser events
    Events,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // When no input source is provided and stdin is a terminal (not piped),
    // show help instead of blocking.
    if cli.file.is_none() && cli.raw.is_none() && std::io::stdin().is_terminal() {
        Cli::command().print_help().ok();
        println!();
        process::exit(0);
    }

    let data = match read_input(&cli) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading input: {e}");
            process::exit(1);
        }
    };

    if data.is_empty() {
        eprintln!("Error: empty input");
        process::exit(1);
    }

    let kind = if cli.response {
        MessageType::Response
    } else {
        MessageType::Request
    };
    let config = ParserConfig {
        max_headers_count: cli.max_headers,
        max_header_value_len: cli.max_header_value_len,
        ..ParserConfig::default()
    };

    let mut collector = Collector::new(kind);
    if matches!(cli.format, OutputFormat::Events) {
        collector = collector.with_events();
    }
    let mut session = Engine::with_config(config).session(kind, collector);

    let chunk_size = cli
        .chunk_size
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(data.len());

    let mut upgraded = false;
    for chunk in data.chunks(chunk_size) {
        match session.execute(chunk) {
            Ok(Outcome::Ok) => {}
            Ok(Outcome::Upgrade { offset }) => {
                eprintln!(
                    "Connection upgraded; {} byte(s) left unparsed",
                    chunk.len() - offset
                );
                upgraded = true;
                break;
            }
            // The collector never pauses.
            Ok(Outcome::Paused { .. }) => {}
            Err(e) => {
                eprintln!("Parse error: {e}");
                process::exit(2);
            }
        }
    }
    if !upgraded {
        if let Err(e) = session.finish() {
            eprintln!("Parse error: {e}");
            process::exit(2);
        }
    }

    let collector = session.into_handler();
    let output = match cli.format {
        OutputFormat::Json => format_json(collector.messages(), cli.pretty),
        OutputFormat::Events => format_events(collector.events(), cli.pretty),
        OutputFormat::Debug => collector.messages().iter().map(format_debug).collect(),
        OutputFormat::Headers => collector
            .messages()
            .iter()
            .map(format_headers_only)
            .collect::<Vec<_>>()
            .join("\n"),
    };

    print!("{output}");
    if matches!(cli.format, OutputFormat::Json | OutputFormat::Events) {
        println!();
    }
}

/// Read raw HTTP bytes from --raw, a file, or stdin.
fn read_input(cli: &Cli) -> Result<Vec<u8>, std::io::Error> {
    if let Some(raw) = &cli.raw {
        return Ok(unescape(raw).into_bytes());
    }
    match &cli.file {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Expand `\r`, `\n`, `\t` and `\\`; any other `\X` is kept as-is.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
