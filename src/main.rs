use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use loglens_logs::{
    AppendOptions, JsonSettingsFile, LogEntry, LogParser, LogStore, LogView, MemorySettings, SearchText,
    Signature, StandardFilters, entry_mdc_pairs, parse_duration, search_match_positions,
};
use loglens_types::parse_timestamp;

mod config;

use config::Config;

/// loglens - inspect, filter and mark structured log files
#[derive(Parser, Debug)]
#[command(name = "loglens")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log files to load (JSON lines or plain text)
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Config file (default: ~/.config/loglens/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Level, exact match
    #[arg(long)]
    level: Option<String>,

    /// Logger substring
    #[arg(long)]
    logger: Option<String>,

    /// Thread substring
    #[arg(long)]
    thread: Option<String>,

    /// Message expression: `a & b`, `a | b`, `!a`
    #[arg(long)]
    message: Option<String>,

    /// Diagnostic-context filter, `key` or `key=value` (repeatable)
    #[arg(long = "mdc", value_name = "KEY[=VALUE]")]
    mdc: Vec<String>,

    /// Keep remote entries from the last DURATION (e.g. 15m, 1h30m)
    #[arg(long, value_name = "DURATION", conflicts_with_all = ["from", "to"])]
    last: Option<String>,

    /// Keep remote entries from the configured default window (view.default_relative)
    #[arg(long, conflicts_with_all = ["last", "from", "to"])]
    recent: bool,

    /// Keep remote entries at or after this time
    #[arg(long, value_name = "TIME")]
    from: Option<String>,

    /// Keep remote entries at or before this time
    #[arg(long, value_name = "TIME")]
    to: Option<String>,

    /// Show marked entries only (persisted)
    #[arg(long)]
    only_marked: bool,

    /// Mark every entry with this signature (`timestamp|logger|message`)
    #[arg(long = "mark", value_name = "SIGNATURE=COLOR")]
    mark: Vec<String>,

    /// Remove the mark of a signature
    #[arg(long = "unmark", value_name = "SIGNATURE")]
    unmark: Vec<String>,

    /// Print the diagnostic context of each entry
    #[arg(long)]
    show_mdc: bool,

    /// Keep the field filters but switch them off
    #[arg(long)]
    no_std_filters: bool,

    /// Flag entries containing TEXT
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,

    /// Write every loaded entry as JSON lines instead of the filtered view
    #[arg(long)]
    export: bool,

    /// Print the remote search request for INDEX and exit
    #[arg(long, value_name = "INDEX")]
    print_search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing for debugging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;

    if let Some(index) = &args.print_search {
        return print_search(&config, &args, index);
    }

    let mut view = open_view(&config);
    apply_marks(&mut view, &args)?;
    apply_filters(&mut view, &config, &args)?;

    for path in &args.files {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let batch = LogParser::parse_lines(&content, &path.display().to_string());
        let offered = batch.len();
        let accepted = view.append(batch, AppendOptions::default());
        tracing::info!(file = %path.display(), offered, accepted, "loaded file");
    }

    let mut out = std::io::stdout().lock();
    if args.export {
        writeln!(out, "{}", view.store().export_raw())?;
    } else {
        let search = SearchText::new(args.search.as_deref().unwrap_or_default());
        print_view(&mut out, &mut view, &search, args.show_mdc)?;
    }

    if let Some(msg) = view.error_message() {
        eprintln!("Warning: {msg}");
    }
    Ok(())
}

/// View backed by the settings file, or by memory if the file is unreadable
fn open_view(config: &Config) -> LogView {
    let settings = JsonSettingsFile::new(config.settings_path());
    match LogView::load(Arc::new(settings)) {
        Ok(view) => view,
        Err(err) => {
            tracing::warn!(%err, "settings unavailable, marks will not be saved");
            let mut view = LogView::new(LogStore::new(), Arc::new(MemorySettings::default()));
            view.show_error(format!("Settings not loaded: {err}"));
            view
        }
    }
}

fn apply_marks(view: &mut LogView, args: &Args) -> Result<()> {
    for arg in &args.mark {
        // Signatures may contain '=', colors never do
        let (signature, color) = arg
            .rsplit_once('=')
            .with_context(|| format!("--mark expects SIGNATURE=COLOR, got '{arg}'"))?;
        view.set_mark(Signature::from(signature), Some(color.trim().to_string()));
    }
    for signature in &args.unmark {
        view.set_mark(Signature::from(signature.as_str()), None);
    }
    Ok(())
}

fn apply_filters(view: &mut LogView, config: &Config, args: &Args) -> Result<()> {
    if args.only_marked || config.view.only_marked {
        view.set_only_marked(true);
    }

    view.set_standard_filters(StandardFilters {
        level: args.level.clone().unwrap_or_default(),
        logger: args.logger.clone().unwrap_or_default(),
        thread: args.thread.clone().unwrap_or_default(),
        message: args.message.clone().unwrap_or_default(),
        enabled: !args.no_std_filters,
    });

    for arg in &args.mdc {
        match arg.split_once('=') {
            Some((key, value)) => view.dc_filter_mut().add_entry(key, Some(value)),
            None => view.dc_filter_mut().add_entry(arg, None),
        }
    }

    let time = view.time_filter_mut();
    if let Some(window) = parse_duration(&config.view.default_relative) {
        time.set_relative(window);
    }
    if let Some(last) = &args.last {
        let duration = parse_duration(last).with_context(|| format!("--last: '{last}' is not a duration"))?;
        time.set_relative(duration);
        time.set_enabled(true);
    } else if args.from.is_some() || args.to.is_some() {
        let from = args.from.as_deref().map(parse_time).transpose()?;
        let to = args.to.as_deref().map(parse_time).transpose()?;
        time.set_absolute(from, to);
        time.set_enabled(true);
    } else if args.recent {
        time.set_enabled(true);
    }
    Ok(())
}

fn parse_time(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_timestamp(raw).with_context(|| format!("'{raw}' is not a timestamp"))
}

fn print_search(config: &Config, args: &Args, index: &str) -> Result<()> {
    let mut options = config.search_options(index);
    options.level = args.level.clone();
    options.logger = args.logger.clone();
    if args.last.is_some() {
        options.duration = args.last.clone();
    }
    if args.from.is_some() || args.to.is_some() {
        options.duration = None;
        options.from = args.from.clone();
        options.to = args.to.clone();
    }

    let request = serde_json::json!({
        "budget": config.search.budget,
        "request": options,
    });
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

fn print_view(out: &mut impl Write, view: &mut LogView, search: &SearchText, show_mdc: bool) -> Result<()> {
    let visible = view.visible().to_vec();
    let entries = view.entries().to_vec();
    let hits = search_match_positions(&entries, &visible, search);

    for (pos, &global) in visible.iter().enumerate() {
        let Some(entry) = entries.get(global) else {
            continue;
        };
        let hit = hits.binary_search(&pos).is_ok();
        writeln!(out, "{}", format_entry(entry, hit, show_mdc))?;
    }

    if !search.is_empty() {
        writeln!(out, "-- {} of {} entries match '{}'", hits.len(), visible.len(), search.pattern())?;
    }
    Ok(())
}

fn format_entry(entry: &LogEntry, hit: bool, show_mdc: bool) -> String {
    let mut line = String::new();
    line.push_str(if hit { "> " } else { "  " });
    if let Some(color) = &entry.mark {
        line.push_str(&format!("[{color}] "));
    }
    line.push_str(&format!(
        "{} {:<5} ",
        entry.timestamp.as_deref().unwrap_or("-"),
        entry.level
    ));
    if !entry.thread.is_empty() {
        line.push_str(&format!("[{}] ", entry.thread));
    }
    if !entry.logger.is_empty() {
        line.push_str(&format!("{} - ", entry.logger));
    }
    line.push_str(&entry.message);

    if show_mdc {
        let pairs = entry_mdc_pairs(entry.mdc.as_ref());
        if !pairs.is_empty() {
            let rendered: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            line.push_str(&format!(" {{{}}}", rendered.join(", ")));
        }
    }
    if let Some(stack) = &entry.stack_trace {
        line.push('\n');
        line.push_str(stack);
    }
    line
}
