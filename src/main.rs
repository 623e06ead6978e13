use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use event_aggregator::config::AppConfig;
use event_aggregator::observability::{init_logging, metrics};
use event_aggregator::pipeline::processing::normalize::timestamp::wall_clock_to_utc;
use event_aggregator::types::{CityContext, DateWindow};
use event_aggregator::EventAggregator;

#[derive(Parser)]
#[command(name = "aggregate-events")]
#[command(about = "Aggregate city events from calendar feeds and ticketing APIs")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    /// Print the Prometheus metric snapshot to stderr when done
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured cities
    Cities,
    /// Print deduplicated events grouped by local day
    Events(RangeArgs),
    /// Print per-day summaries for a calendar grid
    Summary(RangeArgs),
}

#[derive(clap::Args)]
struct RangeArgs {
    /// City key from the configuration
    #[arg(long)]
    city: String,
    /// Range start, RFC 3339 or YYYY-MM-DD in the city's zone (default: now)
    #[arg(long)]
    from: Option<String>,
    /// Range end, RFC 3339 or YYYY-MM-DD in the city's zone (default: 90 days after start)
    #[arg(long)]
    to: Option<String>,
}

#[derive(Serialize)]
struct CityListing<'a> {
    key: &'a str,
    name: &'a str,
    time_zone: &'a str,
    calendar_feeds: usize,
}

/// RFC 3339 instant, or a local date; `end_of_day` selects the last second of that date
fn parse_instant(raw: &str, zone: Tz, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{}' is neither RFC 3339 nor YYYY-MM-DD", raw))?;
    let day = if end_of_day { date.succ_opt().unwrap_or(date) } else { date };
    let midnight = wall_clock_to_utc(day.and_time(NaiveTime::MIN), Some(zone.name()))
        .ok_or_else(|| anyhow!("cannot place '{}' in {}", raw, zone.name()))?;
    Ok(if end_of_day { midnight - Duration::seconds(1) } else { midnight })
}

fn resolve_window(args: &RangeArgs, city: &CityContext) -> Result<DateWindow> {
    let start = match &args.from {
        Some(raw) => parse_instant(raw, city.time_zone, false)?,
        None => Utc::now(),
    };
    Ok(match &args.to {
        Some(raw) => DateWindow::new(start, parse_instant(raw, city.time_zone, true)?),
        None => DateWindow::with_default_span(start),
    })
}

fn fill_credentials_from_env(config: &mut AppConfig) {
    let ticketing = &mut config.providers.ticketing;
    if ticketing.api_key.is_none() {
        ticketing.api_key = std::env::var("TICKETMASTER_KEY").ok();
    }
    let keyword_search = &mut config.providers.keyword_search;
    if keyword_search.token.is_none() {
        keyword_search.token = std::env::var("EVENTBRITE_TOKEN").ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    if cli.print_metrics {
        metrics::init();
    }

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    fill_credentials_from_env(&mut config);

    match &cli.command {
        Commands::Cities => {
            let listing: Vec<CityListing> = config
                .cities
                .iter()
                .map(|c| CityListing {
                    key: &c.key,
                    name: &c.name,
                    time_zone: c.time_zone.name(),
                    calendar_feeds: c.calendar_feeds.len(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Events(args) | Commands::Summary(args) => {
            let city = config
                .city(&args.city)
                .ok_or_else(|| anyhow!("unknown city '{}'", args.city))?;
            let window = resolve_window(args, &city)?;
            info!(city = %city.key, start = %window.start, end = %window.end, "Aggregating");

            let aggregator = EventAggregator::new(&config.providers);
            let output = if matches!(cli.command, Commands::Events(_)) {
                let buckets = aggregator.aggregate_events(&city, window.start, window.end).await;
                serde_json::to_string_pretty(&buckets)?
            } else {
                let summaries = aggregator.aggregate_summaries(&city, window.start, window.end).await;
                serde_json::to_string_pretty(&summaries)?
            };
            println!("{}", output);
        }
    }

    if cli.print_metrics {
        if let Some(snapshot) = metrics::render() {
            eprintln!("{}", snapshot);
        }
    }
    Ok(())
}
