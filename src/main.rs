use std::path::PathBuf;
use std::time::Duration;

use crate::api::HttpBackend;
use crate::coordinator::{InputCoordinator, StatusKind};
use crate::error::InputError;
use crate::format::{FieldFormatter, Locale, Sentiment};
use crate::views::{ChartView, DetailView, TableView};

use clap::{arg, ArgGroup, ArgMatches, Command};
use colored::Colorize;
use eyre::{bail, WrapErr};
use serde::Deserialize;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod api;
mod coordinator;
mod error;
mod fields;
mod format;
mod normalize;
mod state;
mod tui;
mod views;

const APP_NAME: &str = "fundamentus_dash";

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    api_url: String,
    locale: String,
    currency: String,
    request_timeout_secs: u64,
    default_indicator: String,
    log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            locale: "pt-BR".to_string(),
            currency: "BRL".to_string(),
            request_timeout_secs: 30,
            default_indicator: "cotacao".to_string(),
            log_dir: "./logs".to_string(),
        }
    }
}

impl Config {
    fn locale(&self) -> Locale {
        Locale::from_tag(&self.locale).unwrap_or_else(|| {
            warn!(locale = %self.locale, "unknown locale, falling back to pt-BR");
            Locale::PtBr
        })
    }

    fn formatter(&self) -> FieldFormatter {
        FieldFormatter::new(self.locale(), &self.currency)
    }

    fn coordinator(&self) -> eyre::Result<InputCoordinator<HttpBackend>> {
        let backend = HttpBackend::new(
            &self.api_url,
            Duration::from_secs(self.request_timeout_secs),
        )?;
        let indicator = fields::clamp_indicator(&self.default_indicator);
        Ok(InputCoordinator::new(backend, indicator))
    }
}

fn source_args(command: Command, required: bool) -> Command {
    command
        .arg(arg!(--tickers <TEXT> "Comma-separated tickers, e.g. \"BBAS3, PETR4\""))
        .arg(arg!(--portfolio <NAME> "A saved portfolio"))
        .arg(arg!(--file <PATH> "A .csv, .xls or .xlsx file to extract tickers from"))
        .group(
            ArgGroup::new("source")
                .args(["tickers", "portfolio", "file"])
                .required(required),
        )
}

fn cli() -> Command {
    Command::new(APP_NAME)
        .about("Fundamentalist valuation dashboard")
        .arg_required_else_help(true)
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(source_args(
            Command::new("tui").about("Open the interactive dashboard"),
            false,
        ))
        .subcommand(
            source_args(
                Command::new("table").about("Print the valuation table for a set of tickers"),
                true,
            )
            .arg(arg!(--detail <TICKER> "Also print every field of one loaded ticker")),
        )
        .subcommand(Command::new("portfolios").about("List saved portfolios"))
        .subcommand(
            Command::new("save")
                .about("Save the tickers the backend knows as a portfolio")
                .arg(arg!(<NAME> "Portfolio name"))
                .arg(arg!(--tickers <TEXT> "Comma-separated tickers").required(true)),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a saved portfolio")
                .arg(arg!(<NAME> "Portfolio name")),
        )
        .subcommand(
            Command::new("history")
                .about("Summarize the price history of a ticker")
                .arg(arg!(<TICKER> "Ticker to chart"))
                .arg(arg!(--indicator <KEY> "Field overlaid on the price series")),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Tickers(String),
    Portfolio(String),
    File(String),
}

fn source_from(matches: &ArgMatches) -> Option<Source> {
    if let Some(text) = matches.get_one::<String>("tickers") {
        return Some(Source::Tickers(text.clone()));
    }
    if let Some(name) = matches.get_one::<String>("portfolio") {
        return Some(Source::Portfolio(name.clone()));
    }
    matches
        .get_one::<String>("file")
        .map(|path| Source::File(path.clone()))
}

async fn load_source(coordinator: &mut InputCoordinator<HttpBackend>, source: &Source) {
    match source {
        Source::Tickers(text) => coordinator.load_manual(text).await,
        Source::Portfolio(name) => {
            coordinator.refresh_portfolios().await;
            coordinator.load_portfolio(name).await;
        }
        Source::File(path) => coordinator.load_file(path).await,
    }
}

// The coordinator reports failures through its status line.
fn ensure_ok<B>(coordinator: &InputCoordinator<B>) -> eyre::Result<()> {
    let status = coordinator.status();
    if status.kind == StatusKind::Error {
        bail!("{}", status.message);
    }
    Ok(())
}

fn init_logging(log_dir: Option<&str>) -> eyre::Result<Option<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fundamentus_dash=info"))
    };

    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    // The TUI owns the terminal, so everything goes to a file
    let log_dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::never(&log_dir, "fundamentus_dash.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter())
        .init();
    info!(?log_dir, "logging initialized");
    Ok(Some(guard))
}

fn sentiment_color(sentiment: Sentiment) -> Option<comfy_table::Color> {
    match sentiment {
        Sentiment::Positive => Some(comfy_table::Color::Green),
        Sentiment::Negative => Some(comfy_table::Color::Red),
        Sentiment::None => None,
    }
}

fn print_table(view: &TableView) {
    use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(160);
    table.set_header(
        view.headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );

    for row in &view.rows {
        table.add_row(row.cells.iter().enumerate().map(|(i, value)| {
            let mut cell = Cell::new(&value.text);
            if i == 0 {
                cell = cell.add_attribute(Attribute::Bold);
            } else {
                cell = cell.set_alignment(CellAlignment::Right);
            }
            match sentiment_color(value.sentiment) {
                Some(color) => cell.fg(color),
                None => cell,
            }
        }));
    }

    println!("{table}");
}

fn print_detail(view: &DetailView) {
    use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, Table};

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new(&view.ticker).add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);
    for entry in view.entries.iter().skip(1) {
        let value = Cell::new(&entry.value.text).set_alignment(CellAlignment::Right);
        table.add_row(vec![
            Cell::new(entry.label),
            match sentiment_color(entry.value.sentiment) {
                Some(color) => value.fg(color),
                None => value,
            },
        ]);
    }
    println!("{table}");
}

fn print_chart_summary(view: &ChartView, formatter: &FieldFormatter) {
    println!("{}", view.ticker.bold());
    if let (Some(first), Some(last)) = (&view.first_date, &view.last_date) {
        println!("Range: {first} to {last}");
    }
    let price = |p: Option<&(f64, f64)>| {
        p.map(|(_, y)| formatter.currency_text(*y))
            .unwrap_or_else(|| format::PLACEHOLDER.to_string())
    };
    println!(
        "{}: {} -> {}",
        view.price.name,
        price(view.price.points.first()),
        price(view.price.points.last())
    );
    match &view.overlay {
        Some(overlay) => {
            let last = overlay
                .last()
                .map(|y| format!("{y:.2}"))
                .unwrap_or_else(|| format::PLACEHOLDER.to_string());
            println!("{}: last {last}", overlay.name);
        }
        None => println!("{}", "No indicator series".dimmed()),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load(APP_NAME, "config")?;

    let matches = cli().get_matches();

    let interactive = matches.subcommand_name() == Some("tui");
    let _guard = init_logging(interactive.then_some(cfg.log_dir.as_str()))?;

    match matches.subcommand() {
        Some(("config", _)) => {
            println!(
                "Your config file is located here: \n{}",
                confy::get_configuration_file_path(APP_NAME, "config")?.display()
            );
        }
        Some(("tui", sub)) => {
            let mut coordinator = cfg.coordinator()?;
            if let Some(source) = source_from(sub) {
                load_source(&mut coordinator, &source).await;
            }
            tui::run_tui(tui::App::new(coordinator, cfg.formatter())).await?;
        }
        Some(("table", sub)) => {
            let formatter = cfg.formatter();
            let mut coordinator = cfg.coordinator()?;
            if let Some(source) = source_from(sub) {
                load_source(&mut coordinator, &source).await;
            }
            ensure_ok(&coordinator)?;
            print_table(&TableView::project(coordinator.state(), &formatter));

            if let Some(ticker) = sub.get_one::<String>("detail") {
                let ticker = ticker.trim().to_uppercase();
                if coordinator.select_ticker(&ticker).is_none()
                    && coordinator.state().selected_ticker() != Some(ticker.as_str())
                {
                    bail!(InputError::TickerNotLoaded(ticker));
                }
                if let Some(detail) = DetailView::project(coordinator.state(), &formatter) {
                    print_detail(&detail);
                }
            }
        }
        Some(("portfolios", _)) => {
            let mut coordinator = cfg.coordinator()?;
            coordinator.refresh_portfolios().await;
            ensure_ok(&coordinator)?;
            if coordinator.registry().is_empty() {
                println!("{}", "No portfolios saved".dimmed());
            }
            for (name, tickers) in coordinator.registry() {
                println!("{}: {}", name.bold(), tickers.join(", "));
            }
        }
        Some(("save", sub)) => {
            let mut coordinator = cfg.coordinator()?;
            if let Some(text) = sub.get_one::<String>("tickers") {
                coordinator.load_manual(text).await;
            }
            ensure_ok(&coordinator)?;
            if let Some(name) = sub.get_one::<String>("NAME") {
                coordinator.save_current(name).await;
            }
            ensure_ok(&coordinator)?;
            println!("{}", coordinator.status().message.green());
        }
        Some(("delete", sub)) => {
            let mut coordinator = cfg.coordinator()?;
            coordinator.refresh_portfolios().await;
            ensure_ok(&coordinator)?;
            if let Some(name) = sub.get_one::<String>("NAME") {
                coordinator.delete_portfolio(name).await;
            }
            ensure_ok(&coordinator)?;
            println!("{}", coordinator.status().message.green());
        }
        Some(("history", sub)) => {
            let formatter = cfg.formatter();
            let mut coordinator = cfg.coordinator()?;
            let ticker = sub
                .get_one::<String>("TICKER")
                .map(|t| t.trim().to_uppercase())
                .unwrap_or_default();
            coordinator.load_manual(&ticker).await;
            ensure_ok(&coordinator)?;

            if let Some(key) = sub.get_one::<String>("indicator") {
                if fields::field(key).is_none() {
                    bail!("Unknown indicator: {key}");
                }
                coordinator.select_indicator(key);
            }
            coordinator.select_and_chart(&ticker).await?;
            ensure_ok(&coordinator)?;

            match ChartView::project(coordinator.state(), coordinator.history(), &formatter) {
                Some(view) => print_chart_summary(&view, &formatter),
                None => println!("{}", "No history available".dimmed()),
            }
        }
        _ => {
            cli().print_help()?;
        }
    }

    Ok(())
}
