use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use flock_ledger::chart::{owner_comparison, Metric};
use flock_ledger::config::Config;
use flock_ledger::db::{self, PgRecordStore};
use flock_ledger::filter::{RecordFilter, ReportWindow, Requirement};
use flock_ledger::format;
use flock_ledger::models::{DailyEntry, IncomeEntry, IncomeType, Profile, RecordKind};
use flock_ledger::photos::{LocalPhotoStorage, PhotoUpload};
use flock_ledger::report::render_text;
use flock_ledger::session::local_today;
use flock_ledger::views::{ProducerView, ReportOptions, ReportRequest, SupervisorView};

#[derive(Parser)]
#[command(name = "flock-ledger")]
#[command(about = "Poultry flock records, routing and supervisor reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Identity of the producer acting on the command line.
#[derive(Args)]
struct ProducerArgs {
    #[arg(long)]
    owner_id: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    farm: String,
    #[arg(long, default_value = "")]
    email: String,
}

impl ProducerArgs {
    fn profile(&self) -> Profile {
        Profile {
            uid: self.owner_id.clone(),
            full_name: self.name.clone(),
            farm_name: self.farm.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Args)]
struct SupervisorArgs {
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "Supervisor")]
    name: String,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    owner: Option<String>,
    #[arg(long)]
    batch: Option<String>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    /// eggs, mortality, feed, vaccination or medicine; repeatable
    #[arg(long = "require")]
    requirements: Vec<Requirement>,
}

impl FilterArgs {
    fn filter(&self) -> RecordFilter {
        let mut filter = RecordFilter::default().between(self.from, self.to);
        if let Some(owner) = &self.owner {
            filter = filter.owner(owner.clone());
        }
        if let Some(batch) = &self.batch {
            filter = filter.batch(batch.clone());
        }
        for requirement in &self.requirements {
            filter = filter.require(*requirement);
        }
        filter
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Daily,
    Income,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Daily => RecordKind::Daily,
            KindArg::Income => RecordKind::Income,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WindowArg {
    All,
    Weekly,
    Monthly,
    Range,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import daily records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Save a daily flock record
    Record {
        #[command(flatten)]
        producer: ProducerArgs,
        #[arg(long)]
        batch: String,
        #[arg(long, default_value_t = 1)]
        batch_number: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 0)]
        eggs: u32,
        #[arg(long, default_value_t = 0)]
        mortality: u32,
        #[arg(long, default_value_t = 0.0)]
        feed: f64,
        #[arg(long)]
        vaccination: Option<String>,
        #[arg(long)]
        medicine: Option<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Save an egg or meat sale
    Income {
        #[command(flatten)]
        producer: ProducerArgs,
        #[arg(long, default_value = "egg_sale")]
        income_type: IncomeType,
        #[arg(long)]
        batch: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        quantity: f64,
        #[arg(long, default_value = "trays")]
        unit: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Send a batch's records for one day to a supervisor
    Send {
        #[command(flatten)]
        producer: ProducerArgs,
        #[arg(long, value_enum, default_value_t = KindArg::Daily)]
        kind: KindArg,
        #[arg(long)]
        batch: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        to: String,
    },
    /// List a producer's own records, most recent first
    History {
        #[command(flatten)]
        producer: ProducerArgs,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = KindArg::Daily)]
        kind: KindArg,
    },
    /// Summarize records routed to a supervisor
    Review {
        #[command(flatten)]
        supervisor: SupervisorArgs,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Write a paginated text report
    Report {
        #[command(flatten)]
        supervisor: SupervisorArgs,
        #[arg(long, value_enum, default_value_t = WindowArg::Weekly)]
        window: WindowArg,
        #[arg(long, required_if_eq("window", "range"))]
        range_from: Option<NaiveDate>,
        #[arg(long, required_if_eq("window", "range"))]
        range_to: Option<NaiveDate>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long, value_enum, default_value_t = KindArg::Daily)]
        kind: KindArg,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print per-owner comparison series as JSON
    Chart {
        #[command(flatten)]
        supervisor: SupervisorArgs,
        #[arg(long, default_value = "eggs")]
        metric: Metric,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let database_url = config.require_database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgRecordStore::new(pool);

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&store).await?;
            println!("Seed data inserted ({inserted} records).");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&store, &csv).await?;
            println!("Inserted {inserted} records from {}.", csv.display());
        }
        Commands::Record {
            producer,
            batch,
            batch_number,
            date,
            eggs,
            mortality,
            feed,
            vaccination,
            medicine,
            photo,
        } => {
            let photo = match photo {
                Some(path) => Some(PhotoUpload {
                    filename: path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    bytes: tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("failed to read photo {}", path.display()))?,
                }),
                None => None,
            };
            let entry = DailyEntry {
                batch_id: batch,
                batch_number,
                date: date.unwrap_or_else(local_today),
                egg_count: eggs,
                mortality,
                feed,
                vaccination,
                medicine,
            };

            let storage = LocalPhotoStorage::new(&config.photo_dir);
            let mut view = ProducerView::open(&store, producer.profile()).await?;
            let outcome = view.save_daily_record(&store, &storage, entry, photo).await?;
            println!("Saved daily record {}.", outcome.id);
            for warning in [outcome.photo_warning, outcome.refresh_warning]
                .into_iter()
                .flatten()
            {
                println!("Warning: {warning}");
            }
        }
        Commands::Income {
            producer,
            income_type,
            batch,
            date,
            quantity,
            unit,
            amount,
            notes,
        } => {
            let entry = IncomeEntry {
                income_type,
                date: date.unwrap_or_else(local_today),
                batch_id: batch,
                quantity,
                unit,
                amount,
                notes,
            };
            let mut view = ProducerView::open(&store, producer.profile()).await?;
            let outcome = view.save_income_record(&store, entry).await?;
            println!("Saved income record {}.", outcome.id);
            if let Some(warning) = outcome.refresh_warning {
                println!("Warning: {warning}");
            }
        }
        Commands::Send {
            producer,
            kind,
            batch,
            date,
            to,
        } => {
            let mut view = ProducerView::open(&store, producer.profile()).await?;
            let outcome = view
                .send_to_supervisor(&store, kind.into(), &batch, date, &to)
                .await?;
            println!(
                "Sent {} record(s) to {} at {}.",
                outcome.route.routed,
                outcome.route.destination,
                format::timestamp(outcome.route.routed_at)
            );
            if let Some(warning) = outcome.refresh_warning {
                println!("Warning: {warning}");
            }
        }
        Commands::History {
            producer,
            batch,
            date,
            kind,
        } => {
            let view = ProducerView::open(&store, producer.profile()).await?;
            let mut filter = RecordFilter::default();
            if let Some(batch) = batch {
                filter = filter.batch(batch);
            }
            if let Some(date) = date {
                filter = filter.on(date);
            }

            match RecordKind::from(kind) {
                RecordKind::Daily => {
                    let rows = view.history(&filter);
                    if rows.is_empty() {
                        println!("No records found.");
                    }
                    for row in rows {
                        let record = &row.record;
                        println!(
                            "- {} batch {} eggs {} mortality {} feed {} kg [{}] {}",
                            format::date(record.date),
                            record.batch_id,
                            record.egg_count,
                            record.mortality,
                            format::feed(record.feed),
                            format::treatment_label(record),
                            row.status
                        );
                    }
                }
                RecordKind::Income => {
                    let rows = view.income_history(&filter);
                    if rows.is_empty() {
                        println!("No records found.");
                    }
                    for row in rows {
                        let record = &row.record;
                        println!(
                            "- {} batch {} {} {} {} for {} {}",
                            format::date(record.date),
                            record.batch_id,
                            record.income_type,
                            format::quantity(record.quantity),
                            record.unit,
                            format::currency(record.amount),
                            row.status
                        );
                    }
                }
            }
        }
        Commands::Review { supervisor, filter } => {
            let view = SupervisorView::open(&store, &supervisor.email, supervisor.name).await?;
            let dashboard = view.dashboard(&filter.filter(), local_today());

            if dashboard.batches.is_empty() && dashboard.income.is_empty() {
                println!("No records have been sent to {}.", supervisor.email);
                return Ok(());
            }

            let headline = &dashboard.headline;
            println!(
                "Users {} | Batches {} | Today: {} eggs, {} mortality, {}",
                headline.users,
                headline.batches,
                headline.today_eggs,
                headline.today_mortality,
                format::feed_total(headline.today_feed)
            );
            for (owner, leaf) in dashboard.batches.leaves() {
                println!(
                    "- {} ({}) batch {}: {} records, {} eggs, {} mortality, {}",
                    owner.owner_name,
                    owner.farm_name,
                    leaf.key,
                    leaf.stats.record_count,
                    leaf.stats.total_eggs,
                    leaf.stats.total_mortality,
                    format::feed_total(leaf.stats.total_feed)
                );
            }
            for (owner, leaf) in dashboard.income.leaves() {
                println!(
                    "- {} ({}) batch {} income: {}",
                    owner.owner_name,
                    owner.farm_name,
                    leaf.key,
                    format::currency(leaf.stats.total_amount)
                );
            }
        }
        Commands::Report {
            supervisor,
            window,
            range_from,
            range_to,
            owner,
            batch,
            kind,
            out_dir,
        } => {
            let window = match window {
                WindowArg::All => ReportWindow::All,
                WindowArg::Weekly => ReportWindow::Weekly,
                WindowArg::Monthly => ReportWindow::Monthly,
                WindowArg::Range => match (range_from, range_to) {
                    (Some(from), Some(to)) => ReportWindow::Range { from, to },
                    _ => bail!("--range-from and --range-to are required for a range report"),
                },
            };
            let mut filter = RecordFilter::default();
            if let Some(owner) = owner {
                filter = filter.owner(owner);
            }
            if let Some(batch) = batch {
                filter = filter.batch(batch);
            }

            let view = SupervisorView::open(&store, &supervisor.email, supervisor.name).await?;
            let request = ReportRequest {
                window,
                filter,
                today: local_today(),
                generated_at: Utc::now(),
            };
            let options = ReportOptions::from(&config);
            let plan = match RecordKind::from(kind) {
                RecordKind::Daily => view.report(&request, &options)?,
                RecordKind::Income => view.income_report(&request, &options)?,
            };

            let out = out_dir.join(plan.file_name("txt"));
            tokio::fs::write(&out, render_text(&plan))
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Report written to {} ({} page(s)).",
                out.display(),
                plan.page_count()
            );
        }
        Commands::Chart {
            supervisor,
            metric,
            filter,
        } => {
            let view = SupervisorView::open(&store, &supervisor.email, supervisor.name).await?;
            let chart = owner_comparison(&view.session().daily_matching(&filter.filter()), metric);
            println!("{}", serde_json::to_string_pretty(&chart)?);
        }
    }

    Ok(())
}
