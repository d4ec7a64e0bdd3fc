mod config;
mod models;
mod report;
mod session;
mod sources;
mod storage;
mod utils;
mod vacancy;
mod valuation;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::models::{GradeAxis, RegionVacancyRow, StoredInputs};
use crate::report::{ReportPayload, SurveyNotes};
use crate::session::form::{FormField, FormState};
use crate::sources::{base_rate, BaseRateSource, BokScraper, KosisClient};
use crate::storage::{resolve_data_dir, HistoryStore};
use crate::vacancy::VacancyLookup;

#[derive(Parser)]
#[command(
    name = "cns-valuator",
    about = "Commercial real-estate valuation (income capitalization)",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive valuation session (default)
    Session,

    /// Value one property from flags and record it
    Value(ValueArgs),

    /// Inspect or edit the valuation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Query the KOSIS regional vacancy feed
    Vacancy {
        #[command(subcommand)]
        action: VacancyAction,
    },

    /// Show the Bank of Korea base rate
    BaseRate,
}

#[derive(Args)]
struct ValueArgs {
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    address: String,
    /// Monthly rent (won)
    #[arg(long, default_value = "")]
    rent: String,
    #[arg(long, default_value = "")]
    deposit: String,
    #[arg(long, default_value = "")]
    ad: String,
    #[arg(long, default_value = "")]
    parking: String,
    #[arg(long, default_value = "")]
    other: String,
    /// Monthly facility management costs (won)
    #[arg(long, default_value = "")]
    facility_costs: String,
    /// Management return rate (%)
    #[arg(long, default_value = "")]
    mgmt_rate: String,
    /// Cap rate (%)
    #[arg(long, default_value = "4.3")]
    cap_rate: String,
    #[arg(long, default_value = "1")]
    location: String,
    #[arg(long, default_value = "2")]
    stability: String,
    #[arg(long, default_value = "3")]
    accessibility: String,
    #[arg(long, default_value = "3")]
    facility: String,
    /// Current vacancy (%)
    #[arg(long, default_value = "0")]
    vacancy: String,
    /// Regional vacancy (%), overrides --auto-vacancy
    #[arg(long)]
    regional_vacancy: Option<f64>,
    /// Match the address against the KOSIS feed
    #[arg(long)]
    auto_vacancy: bool,
    /// Write the report here (PDF, or plain text for a .txt path)
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long, default_value = "")]
    investigator: String,
    /// Do not record the result in history
    #[arg(long)]
    no_save: bool,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recorded valuations
    List,
    /// Recompute and show one record from its saved inputs
    Show { uid: String },
    Delete {
        #[arg(required = true)]
        uids: Vec<String>,
    },
    Clear,
    /// Write the history CSV to another path
    Export { path: PathBuf },
}

#[derive(Subcommand)]
enum VacancyAction {
    /// Best regional match for an address
    Lookup { address: String },
    /// Regions whose name contains the query
    List {
        #[arg(default_value = "")]
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "cns_valuator=info,warn",
        1 => "cns_valuator=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Session) {
        Command::Session => session::run(config).await?,
        Command::Value(args) => run_value(&config, args).await?,
        Command::History { action } => run_history(&config, action)?,
        Command::Vacancy { action } => run_vacancy(&config, action).await?,
        Command::BaseRate => {
            let scraper = BokScraper::new(&config.base_rate)?;
            println!("{}", base_rate::display(scraper.fetch_rate().await));
        }
    }

    Ok(())
}

fn open_history(config: &AppConfig) -> Result<HistoryStore> {
    let dir = resolve_data_dir(&config.storage);
    let mut store =
        HistoryStore::open(&dir).with_context(|| format!("Failed to open history in {:?}", dir))?;
    store.reload().context("Failed to read history")?;
    info!("History file {:?}", store.paths().rows);
    Ok(store)
}

fn vacancy_lookup(config: &AppConfig) -> Result<VacancyLookup> {
    let client = KosisClient::new(&config.kosis)?;
    Ok(VacancyLookup::new(
        Arc::new(client),
        Duration::from_secs(config.kosis.cache_ttl_secs),
    ))
}

async fn run_value(config: &AppConfig, args: ValueArgs) -> Result<()> {
    let mut form = FormState::default();
    for (field, value) in [
        (FormField::PropertyName, &args.name),
        (FormField::PropertyAddress, &args.address),
        (FormField::MonthlyRent, &args.rent),
        (FormField::Deposit, &args.deposit),
        (FormField::AdIncome, &args.ad),
        (FormField::ParkingIncome, &args.parking),
        (FormField::OtherIncome, &args.other),
        (FormField::FacilityCosts, &args.facility_costs),
        (FormField::ManagementRate, &args.mgmt_rate),
        (FormField::CapRate, &args.cap_rate),
        (FormField::CurrentVacancy, &args.vacancy),
    ] {
        form.set(field, value);
    }
    for (axis, raw) in [
        (GradeAxis::Location, &args.location),
        (GradeAxis::Stability, &args.stability),
        (GradeAxis::Accessibility, &args.accessibility),
        (GradeAxis::Facility, &args.facility),
    ] {
        form.set_grade(axis, raw)?;
    }

    match args.regional_vacancy {
        Some(pct) if pct > 0.0 => form.apply_region(RegionVacancyRow {
            region: "직접 입력".into(),
            vacancy: pct,
            period: String::new(),
            group: String::new(),
        }),
        Some(_) => {}
        None if args.auto_vacancy => {
            let _t = utils::Timer::start("Regional vacancy lookup");
            match vacancy_lookup(config)?.fetch(false).await {
                Ok(rows) => match vacancy::auto_match(&rows, &form.property_address) {
                    Some(row) => {
                        info!("Regional vacancy {}% from {} ({})", row.vacancy, row.region, row.period);
                        form.apply_region(row);
                    }
                    None => warn!("No confident region match for {:?}, using N/A", form.property_address),
                },
                Err(e) => warn!("Regional vacancy unavailable, using N/A: {}", e),
            }
        }
        None => {}
    }

    let input = form.to_input().context("모든 값을 올바르게 입력하세요.")?;
    let result = valuation::evaluate(&input)?;
    println!("{}", report::render_summary(&input, &result));

    if !args.no_save {
        let mut store = open_history(config)?;
        let appended = store.append(
            storage::record_for(&input, &result),
            Some(StoredInputs::capture(&input, &result)),
        );
        match appended.autosave {
            Ok(()) => println!("저장: {}", appended.uid),
            Err(e) => warn!("History autosave failed: {}", e),
        }
    }

    if let Some(path) = args.report {
        let mut notes = SurveyNotes {
            investigator: args.investigator,
            ..Default::default()
        };
        notes.fill_date(Local::now().date_naive());
        let payload = ReportPayload::from_result(&input, &result).with_survey(&notes);
        report::write_report(&path, &payload, config.report.font_path.as_deref())?;
        println!("보고서: {}", path.display());
    }
    Ok(())
}

fn run_history(config: &AppConfig, action: HistoryAction) -> Result<()> {
    let mut store = open_history(config)?;

    match action {
        HistoryAction::List => print!("{}", session::render_history(&store)),
        HistoryAction::Show { uid } => {
            let record = store
                .get(&uid)
                .with_context(|| format!("No history record {}", uid))?;
            let Some(inputs) = store.inputs_for(&uid) else {
                println!("{}", session::render_history_row(record));
                println!("이 항목에는 저장된 입력값 정보가 없습니다.");
                return Ok(());
            };
            let input = inputs.to_input(Some(record));
            let result = valuation::evaluate(&input)?;
            println!("{}  {}", record.uid, record.timestamp);
            println!("{}", report::render_summary(&input, &result));
        }
        HistoryAction::Delete { uids } => {
            let removed = store.remove(&uids)?;
            println!("{} record(s) removed", removed);
        }
        HistoryAction::Clear => {
            store.clear()?;
            println!("History cleared.");
        }
        HistoryAction::Export { path } => export_history(&store, &path)?,
    }
    Ok(())
}

fn export_history(store: &HistoryStore, path: &Path) -> Result<()> {
    let n = store
        .export_to(path)
        .with_context(|| format!("Export to {:?} failed", path))?;
    println!("{} record(s) exported to {}", n, path.display());
    Ok(())
}

async fn run_vacancy(config: &AppConfig, action: VacancyAction) -> Result<()> {
    let timer = utils::Timer::start("KOSIS vacancy fetch");
    let rows = vacancy_lookup(config)?
        .fetch(true)
        .await
        .context("Regional vacancy feed unavailable")?;
    info!("{} feed rows in {:.2?}", rows.len(), timer.elapsed());

    match action {
        VacancyAction::Lookup { address } => match vacancy::auto_match(&rows, &address) {
            Some(row) => println!(
                "{}  {}  {}  [{}]",
                row.region,
                utils::fmt_vacancy(row.vacancy),
                row.period,
                row.group
            ),
            None => println!("N/A (no confident match for {:?})", address),
        },
        VacancyAction::List { query } => {
            let candidates = vacancy::select_candidates(&rows, &query);
            println!("{} region(s):", candidates.len());
            for row in &candidates {
                println!(
                    "  {:<24} {:>7}  {}",
                    row.region,
                    utils::fmt_vacancy(row.vacancy),
                    row.period
                );
            }
        }
    }
    Ok(())
}
