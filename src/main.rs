//! asnlog - summarize the networks behind the IP addresses in a log file.
//!
//! This is the command-line interface for the asnlog library.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use asnlog::extract::{read_lines, LineExtractor, Separator};
use asnlog::pipeline::{resolve_and_tally, HitCounts};
use asnlog::stats::PhaseStats;
use asnlog::{Aggregator, AsnSummary, RegistryClient, Resolver, ResolverConfig, SortKey, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Lines between rate reports while reading the log
const LINE_REPORT_INTERVAL: u64 = 100_000;
/// Lookups between rate reports while resolving
const LOOKUP_REPORT_INTERVAL: u64 = 100;

/// Get the version string for asnlog
fn get_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(env!("CARGO_PKG_VERSION"), "-UNRELEASED")
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Command-line arguments
#[derive(clap::Parser, Debug)]
#[clap(author, version = get_version(), about = "Resolve IP addresses in a log file to their owning ASN", long_about = None)]
struct Args {
    /// Log file to read
    log_file: PathBuf,

    /// Regular expression selecting the lines to inspect
    regex: String,

    /// Field separator (a single space splits on any run of whitespace)
    #[clap(long, default_value = " ")]
    separator: String,

    /// 0-based column holding the IP address
    #[clap(short, long)]
    column: usize,

    /// Text to strip from the start of the column value
    #[clap(long)]
    lstrip: Option<String>,

    /// Text to strip from the end of the column value
    #[clap(long)]
    rstrip: Option<String>,

    /// Only process the last N lines of the file (0 reads everything)
    #[clap(short, long, default_value_t = 0)]
    tail: usize,

    /// Column to sort the summary by
    #[clap(long, value_enum, default_value_t = SortArg::IpCount)]
    sort_by: SortArg,

    /// Write the report as JSON to this file instead of printing a table
    #[clap(long)]
    json: Option<PathBuf>,

    /// Subnet cache file, created if missing (memory-only when omitted)
    #[clap(long, alias = "ripedb")]
    cache: Option<PathBuf>,

    /// Discard the cache file when it is older than this many days
    #[clap(long, default_value_t = asnlog::config::DEFAULT_MAX_AGE_DAYS)]
    max_age_days: u32,

    /// Maximum number of lookups in flight
    #[clap(long, default_value_t = asnlog::config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Print processing statistics
    #[clap(long)]
    stats: bool,

    /// Enable verbose logging (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SortArg {
    Asn,
    IpCount,
    TotalHits,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Asn => SortKey::Asn,
            SortArg::IpCount => SortKey::UniqueIps,
            SortArg::TotalHits => SortKey::TotalHits,
        }
    }
}

fn main() {
    let args = <Args as clap::Parser>::parse();
    init_logging(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    if let Err(e) = runtime.block_on(async_main(args)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main(args: Args) -> Result<()> {
    let mut builder = ResolverConfig::builder()
        .max_age_days(args.max_age_days)
        .concurrency(args.concurrency);
    if let Some(path) = &args.cache {
        builder = builder.cache_path(path);
    }
    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid configuration - {}", e))?;

    let mut extractor = LineExtractor::new(&args.regex, Separator::parse(&args.separator), args.column)
        .with_context(|| format!("Invalid regex {:?}", args.regex))?;
    if let Some(prefix) = &args.lstrip {
        extractor = extractor.lstrip(prefix.as_str());
    }
    if let Some(suffix) = &args.rstrip {
        extractor = extractor.rstrip(suffix.as_str());
    }

    // Corrupt caches abort here, before any work is done
    let store = Arc::new(Store::open(&config).context("Failed to load cache")?);
    let registry =
        Arc::new(RegistryClient::new(&config.registry).context("Failed to create registry client")?);
    let resolver = Resolver::with_concurrency(Arc::clone(&store), registry, config.concurrency);

    // Phase 1: collect addresses
    tracing::info!("Phase 1: collecting IP addresses");
    let lines = read_lines(&args.log_file, args.tail)
        .with_context(|| format!("Failed to read {}", args.log_file.display()))?;
    let mut line_stats = PhaseStats::start("Line processing", LINE_REPORT_INTERVAL);
    let mut hits = HitCounts::new();
    for line in &lines {
        line_stats.tick();
        if let Some(ip) = extractor.extract(line) {
            hits.add(&ip.to_string());
        }
    }
    line_stats.finish();

    // Phase 2: resolve
    tracing::info!("Phase 2: performing ASN lookups for {} addresses", hits.len());
    let aggregator = Aggregator::new();
    let mut lookup_stats = PhaseStats::start("IP lookup", LOOKUP_REPORT_INTERVAL);
    let resolved = resolve_and_tally(&resolver, &hits, &aggregator, Some(&mut lookup_stats)).await;
    lookup_stats.finish();
    tracing::info!("Resolved {} of {} addresses", resolved, hits.len());

    if let Some(path) = &args.json {
        let report = serde_json::to_string_pretty(&aggregator.report())?;
        std::fs::write(path, report)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("JSON output written to {}", path.display());
    } else {
        println!(
            "Found {} unique IPs with {} total hits",
            hits.len(),
            hits.total()
        );
        display_table(&aggregator.summarize(args.sort_by.into()));
    }

    if args.stats {
        display_stats(&line_stats, &lookup_stats);
    }

    if store.save().context("Failed to save cache")? {
        if let Some(path) = store.path() {
            tracing::info!("Cache saved to {} with {} ASNs", path.display(), store.asn_count());
        }
    }
    Ok(())
}

/// Print the summary as an aligned table
fn display_table(rows: &[AsnSummary]) {
    if rows.is_empty() {
        println!("No matching data found.");
        return;
    }

    let headers = ["BGP ASN", "BGP Description", "IP Count", "Total Entries", "Sample IPs"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            [
                or_dash(&row.asn),
                or_dash(&row.description),
                row.unique_ip_count.to_string(),
                row.total_hits.to_string(),
                row.sample_ips.join(", "),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let rule: String = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    println!("+{}+", rule);
    println!(
        "| {:<w0$} | {:<w1$} | {:>w2$} | {:>w3$} | {:<w4$} |",
        headers[0],
        headers[1],
        headers[2],
        headers[3],
        headers[4],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
        w4 = widths[4]
    );
    println!("+{}+", rule);
    for row in &cells {
        println!(
            "| {:<w0$} | {:<w1$} | {:>w2$} | {:>w3$} | {:<w4$} |",
            row[0],
            row[1],
            row[2],
            row[3],
            row[4],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
            w4 = widths[4]
        );
    }
    println!("+{}+", rule);
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Print phase statistics
fn display_stats(lines: &PhaseStats, lookups: &PhaseStats) {
    let lines = lines.summary();
    let lookups = lookups.summary();
    println!("\nLine Processing Statistics:");
    println!("Total time: {} seconds", lines.total_time_seconds);
    println!("Total lines: {}", lines.items);
    println!("Average rate: {} lines/second", lines.average_rate);
    println!("\nLookup Processing Statistics:");
    println!("Total time: {} seconds", lookups.total_time_seconds);
    println!("Total lookups: {}", lookups.items);
    println!("Average rate: {} lookups/second", lookups.average_rate);
}
