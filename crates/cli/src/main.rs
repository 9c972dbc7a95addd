use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use growwise_core::{IntentResponder, WeatherLookup};
use growwise_observability::{init_tracing, AppMetrics};
use growwise_services::imaging::is_allowed_filename;
use growwise_services::market::DEFAULT_CACHE_PATH;
use growwise_services::weather::OPENWEATHER_URL;
use growwise_services::{FarmAssistant, MarketPriceCache, WeatherClient};
use growwise_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "growwise")]
#[command(about = "GrowWise farming assistant CLI")]
struct Cli {
    /// SQLite URL for history; omitted means an in-memory store.
    #[arg(long, env = "GROWWISE_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "GROWWISE_MARKET_CACHE", default_value = DEFAULT_CACHE_PATH)]
    market_cache: PathBuf,

    #[arg(long, env = "GROWWISE_RESPONDER_TABLES")]
    responder_tables: Option<PathBuf>,

    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    weather_api_key: Option<String>,

    #[arg(long, env = "GROWWISE_WEATHER_BASE_URL", default_value = OPENWEATHER_URL)]
    weather_base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer a single farming question.
    Ask { query: String },
    /// Interactive question loop.
    Chat,
    /// Features and sample questions.
    Help,
    Prices {
        #[arg(long, default_value = "all")]
        category: String,
    },
    /// Heuristic disease check of a leaf photo.
    Diagnose { image: PathBuf },
    Weather {
        #[arg(long, conflicts_with_all = ["lat", "lon"])]
        city: Option<String>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    Stats,
    History {
        kind: HistoryKind,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HistoryKind {
    Voice,
    Predictions,
    Weather,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("growwise_cli");
    let cli = Cli::parse();

    let assistant = build_assistant(&cli).await?;

    match cli.command {
        Command::Ask { query } => {
            let query = query.trim();
            if query.is_empty() {
                bail!("query is required");
            }
            let reply = assistant.ask(query).await?;
            println!("{}", reply.response);
        }
        Command::Chat => run_chat(&assistant).await?,
        Command::Help => print_json(assistant.help_info())?,
        Command::Prices { category } => print_json(&assistant.market_prices(&category).await?)?,
        Command::Diagnose { image } => {
            let bytes = read_image(&image).await?;
            print_json(&assistant.diagnose(&bytes).await?)?;
        }
        Command::Weather { city, lat, lon } => {
            let report = assistant
                .lookup_weather(WeatherLookup { city, lat, lon })
                .await?;
            print_json(&report)?;
        }
        Command::Stats => print_json(&assistant.stats().await?)?,
        Command::History { kind, limit } => match kind {
            HistoryKind::Voice => print_json(&assistant.voice_history(limit).await?)?,
            HistoryKind::Predictions => print_json(&assistant.prediction_history(limit).await?)?,
            HistoryKind::Weather => print_json(&assistant.weather_history(limit).await?)?,
        },
    }

    Ok(())
}

async fn run_chat(assistant: &FarmAssistant<Store>) -> Result<()> {
    println!("GrowWise chat mode. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let reply = assistant.ask(message).await?;
        println!("\n{}\n", reply.response);
    }

    Ok(())
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if !is_allowed_filename(filename) {
        bail!("unsupported image type {}; use png, jpg, jpeg or gif", path.display());
    }

    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_assistant(cli: &Cli) -> Result<FarmAssistant<Store>> {
    let responder = match cli.responder_tables.as_ref() {
        Some(path) => IntentResponder::from_json_file(path)?,
        None => IntentResponder::builtin(),
    };

    let store = match cli.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };

    let prices = MarketPriceCache::new(&cli.market_cache);
    prices.ensure_seeded().await?;

    Ok(FarmAssistant::new(
        Arc::new(responder),
        WeatherClient::new(cli.weather_api_key.clone(), cli.weather_base_url.clone())?,
        prices,
        Arc::new(store),
        AppMetrics::shared(),
    ))
}
