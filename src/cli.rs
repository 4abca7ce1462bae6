//! Command-line front end over the async command layer. Every command prints pretty JSON.

use crate::commands::{db, forecast, ledger, settings, surveillance, watcher};
use crate::models::catalog::{CatalogEntry, CatalogKind, PaymentRequest, PricingParams};
use crate::models::transaction::{NewTransaction, TransactionStatus, TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

/// RevenueLens - municipal revenue ledger with rule-based surveillance
#[derive(Parser, Debug)]
#[command(name = "revenuelens", author, version, about)]
pub struct Cli {
    /// Directory holding `.revenuelens/` (ledger database and settings)
    #[arg(short = 'd', long, default_value = ".", global = true)]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a free-form transaction and assess it
    Record {
        /// Type code, e.g. TAXE_FONCIERE
        type_code: String,
        label: String,
        amount: Decimal,
        #[command(flatten)]
        meta: TransactionArgs,
        /// Record as failed (kept out of revenue totals)
        #[arg(long)]
        failed: bool,
    },

    /// Record a payment against a catalog entry
    Pay {
        catalog_id: i64,
        amount: Decimal,
        /// Base amount for percentage taxes
        #[arg(long)]
        base: Option<Decimal>,
        /// Number of units for rentals
        #[arg(long)]
        duration: Option<u32>,
        /// First day of a rental (YYYY-MM-DD), defaults to the payment day
        #[arg(long)]
        start: Option<NaiveDate>,
        #[command(flatten)]
        meta: TransactionArgs,
    },

    /// Rental bookings, latest start first
    Reservations {
        /// Only bookings for this catalog entry
        #[arg(long)]
        catalog: Option<i64>,
    },

    /// Re-run the rules against a stored transaction
    Assess { id: i64 },

    /// Compare today's revenue with the trailing week
    Sweep,

    /// Detect per-agent fraud patterns
    Patterns,

    /// Daily sweep plus pattern detection
    Cycle,

    /// Composite integrity score
    Integrity,

    /// Revenue trend and 30-day projection
    Forecast,

    /// Days until a declining level series reaches zero
    Depletion {
        /// Daily levels, oldest first (comma separated)
        #[arg(value_delimiter = ',', required = true)]
        levels: Vec<f64>,
    },

    /// Revenue and alert counters
    Dashboard,

    /// Per-category totals for one day
    Report {
        /// Day to report (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Inspect and resolve alerts
    #[command(subcommand)]
    Alerts(AlertsCommand),

    /// Manage the tariff catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Show or update settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Print dashboard statistics every refresh interval
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct TransactionArgs {
    /// Recording agent id
    #[arg(long)]
    pub agent: Option<i64>,
    #[arg(long)]
    pub payer: Option<String>,
    #[arg(long)]
    pub payer_number: Option<String>,
    #[arg(long)]
    pub citizen: Option<i64>,
    /// Payment mode, defaults to Espèces
    #[arg(long)]
    pub mode: Option<String>,
    /// Timestamp override, "YYYY-MM-DD HH:MM:SS"
    #[arg(long, value_parser = parse_timestamp)]
    pub at: Option<NaiveDateTime>,
}

#[derive(Subcommand, Debug)]
pub enum AlertsCommand {
    /// Pending alerts, critical first
    List,
    /// Most recent alerts, resolved included
    History,
    Show { id: i64 },
    Resolve { id: i64 },
    ResolveAll,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    List,
    Show { id: i64 },
    Add {
        /// tax, form or rental
        #[arg(value_parser = parse_kind)]
        kind: CatalogKind,
        name: String,
        #[arg(long)]
        variant: Option<String>,
        #[arg(long)]
        fixed: Option<Decimal>,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Deactivate an entry
    Remove { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    Show,
    /// Merge a JSON object into the saved settings
    Set { json: String },
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM:SS\": {e}"))
}

fn parse_kind(raw: &str) -> Result<CatalogKind, String> {
    CatalogKind::parse(&raw.to_lowercase()).ok_or_else(|| format!("unknown catalog kind {raw:?}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{raw}");
    Ok(())
}

impl TransactionArgs {
    fn apply(self, mut tx: NewTransaction) -> NewTransaction {
        tx.agent_id = self.agent;
        tx.payer_name = self.payer;
        tx.payer_number = self.payer_number;
        tx.citizen_id = self.citizen;
        if let Some(mode) = self.mode {
            tx.payment_mode = mode;
        }
        tx.created_at = self.at;
        tx
    }
}

pub async fn dispatch(cli: Cli) -> Result<(), String> {
    let data_dir = cli.data_dir;

    match cli.command {
        Command::Record {
            type_code,
            label,
            amount,
            meta,
            failed,
        } => {
            let mut tx = meta.apply(NewTransaction::new(&type_code, &label, amount));
            if failed {
                tx.status = TransactionStatus::Failed;
            }
            print_json(&ledger::record_transaction(data_dir, tx).await?)
        }
        Command::Pay {
            catalog_id,
            amount,
            base,
            duration,
            start,
            meta,
        } => {
            let payment = PaymentRequest {
                pricing: PricingParams {
                    base_amount: base,
                    duration,
                    start_date: start,
                },
                payer_name: meta.payer,
                payer_number: meta.payer_number,
                citizen_id: meta.citizen,
                agent_id: meta.agent,
                payment_mode: meta.mode,
                created_at: meta.at,
                ..PaymentRequest::new(catalog_id, amount)
            };
            print_json(&ledger::record_payment(data_dir, payment).await?)
        }
        Command::Reservations { catalog } => print_json(&ledger::get_reservations(data_dir, catalog).await?),
        Command::Assess { id } => print_json(&ledger::assess_transaction(data_dir, id).await?),
        Command::Sweep => print_json(&surveillance::run_daily_sweep(data_dir).await?),
        Command::Patterns => print_json(&surveillance::detect_fraud_patterns(data_dir).await?),
        Command::Cycle => print_json(&surveillance::run_surveillance_cycle(data_dir).await?),
        Command::Integrity => print_json(&surveillance::get_integrity_score(data_dir).await?),
        Command::Forecast => print_json(&forecast::get_revenue_forecast(data_dir).await?),
        Command::Depletion { levels } => print_json(&forecast::get_depletion_estimate(levels).await?),
        Command::Dashboard => print_json(&surveillance::get_dashboard_stats(data_dir).await?),
        Command::Report { date } => print_json(&surveillance::get_daily_report(data_dir, date).await?),
        Command::Alerts(command) => {
            let (operation, id) = match command {
                AlertsCommand::List => ("list", None),
                AlertsCommand::History => ("history", None),
                AlertsCommand::Show { id } => ("read", Some(id)),
                AlertsCommand::Resolve { id } => ("resolve", Some(id)),
                AlertsCommand::ResolveAll => ("resolve_all", None),
            };
            print_json(&db::alerts_crud(data_dir, operation.to_string(), id).await?)
        }
        Command::Catalog(command) => {
            let (operation, item, id) = match command {
                CatalogCommand::List => ("list", None, None),
                CatalogCommand::Show { id } => ("read", None, Some(id)),
                CatalogCommand::Add {
                    kind,
                    name,
                    variant,
                    fixed,
                    rate,
                    unit,
                    description,
                } => {
                    let entry = CatalogEntry {
                        id: 0,
                        kind,
                        name,
                        variant,
                        fixed_amount: fixed,
                        rate_percent: rate,
                        unit,
                        description,
                        active: true,
                    };
                    ("create", Some(entry), None)
                }
                CatalogCommand::Remove { id } => ("delete", None, Some(id)),
            };
            print_json(&db::catalog_crud(data_dir, operation.to_string(), item, id).await?)
        }
        Command::Settings(SettingsCommand::Show) => print_json(&settings::get_settings(data_dir).await?),
        Command::Settings(SettingsCommand::Set { json }) => {
            let incoming: serde_json::Value =
                serde_json::from_str(&json).map_err(|e| format!("Invalid settings JSON: {e}"))?;
            print_json(&settings::save_settings(data_dir, incoming).await?)
        }
        Command::Watch { ticks } => {
            let handle = watcher::start_refresh_loop(data_dir, ticks, |stats| {
                if let Err(e) = print_json(&stats) {
                    log::warn!("{e}");
                }
            })
            .await?;
            handle.await.map_err(|e| format!("Refresh loop stopped: {e}"))
        }
    }
}
