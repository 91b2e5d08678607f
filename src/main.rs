//! realty-crm: client tier of a residential real-estate CRM.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches one CLI command against the backend. Every command ends in
//! a success or error notice.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

use realty_crm::api::leads::{check_move, group_by_status};
use realty_crm::api::{
    ComplexApi, ComplexFiles, CrmClient, FavoriteRequest, FinanceApi, InterestEventKind, LeadApi,
    LeadRequestCreate, LeadRequestKind, MiniAppApi, NewLead, UserInit,
};
use realty_crm::config::AppConfig;
use realty_crm::grid::{ChessBoard, GridEditor};
use realty_crm::notify::Notifier;
use realty_crm::pricing::schedule::InstallmentWindow;
use realty_crm::pricing::selection::submit_lead;
use realty_crm::pricing::{PaymentPlan, PricingCalculator, PricingInput};
use realty_crm::storage;
use realty_crm::tracker::{InterestTracker, PageSignal};
use realty_crm::types::{parse_area, LeadState, LeadStatus, PriceTiers, UnitStatus};

#[derive(Parser)]
#[command(name = "realty-crm")]
#[command(about = "realty-crm - sales, pricing and interest tracking for residential complexes", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List residential complexes
    Complexes,

    /// Show the sales chess board of a complex
    Board { complex: String },

    /// Price an apartment from the board, optionally submitting a lead
    Quote {
        complex: String,
        #[arg(long)]
        block: String,
        #[arg(long)]
        unit: String,
        /// full, installment-30/50/70, hybrid-20/30
        #[arg(long)]
        plan: Option<String>,
        /// Buyer name; with --phone, confirms the plan and creates the lead
        #[arg(long, requires = "phone")]
        name: Option<String>,
        #[arg(long, requires = "name")]
        phone: Option<String>,
    },

    /// Price from typed-in figures without the backend
    QuoteOffline {
        /// Area in m² ("55,67" accepted)
        #[arg(long)]
        area: String,
        #[arg(long)]
        price_100: Decimal,
        #[arg(long)]
        price_70: Option<Decimal>,
        #[arg(long)]
        price_50: Option<Decimal>,
        #[arg(long)]
        price_30: Option<Decimal>,
        /// Months left; computed from the configured installment window if absent
        #[arg(long)]
        months: Option<u32>,
        #[arg(long)]
        plan: Option<String>,
    },

    /// Admin chess grid
    #[command(subcommand)]
    Grid(GridCommand),

    /// Leads and the Kanban board
    #[command(subcommand)]
    Leads(LeadCommand),

    /// Telegram Mini App actions
    #[command(subcommand)]
    Miniapp(MiniAppCommand),

    /// Track viewing interest for one apartment until Ctrl+C.
    /// Reads `hide` / `show` lines from stdin; any other line counts as activity.
    Track {
        complex: String,
        #[arg(long)]
        block: String,
        #[arg(long)]
        unit: String,
        #[arg(long)]
        telegram_id: i64,
        /// Interest events to record once the session starts (payment_view, map_view)
        #[arg(long, value_delimiter = ',')]
        events: Vec<String>,
    },

    /// Finance dashboard counters
    Stats,

    /// Show or toggle the landing language
    Lang {
        #[arg(long)]
        toggle: bool,
    },
}

#[derive(Subcommand)]
enum GridCommand {
    /// List complexes that have spreadsheet grids
    Complexes,
    /// List and categorise a complex's files
    Files { complex: String },
    /// Print the grid
    Show { complex: String },
    /// Stage and save status changes: `--set 12=продана --set "Блок А/14=бронь"`
    Set {
        complex: String,
        #[arg(long = "set", value_name = "[BLOCK/]UNIT=STATUS", required = true)]
        changes: Vec<String>,
    },
}

#[derive(Subcommand)]
enum LeadCommand {
    /// Search leads by name or phone
    Search { query: String },
    /// A user's leads grouped into Kanban columns
    Board { user_id: i64 },
    /// Create a lead with contact details only
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Move a lead to another column
    Move {
        id: i64,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[derive(Subcommand)]
enum MiniAppCommand {
    /// Register a Mini App user from Telegram initData
    Init {
        #[arg(long)]
        init_data: String,
        #[arg(long)]
        start_param: Option<String>,
    },
    /// Add (or with --remove, drop) an apartment from favorites
    Favorite {
        complex: String,
        #[arg(long)]
        block: String,
        #[arg(long)]
        unit: String,
        #[arg(long)]
        telegram_id: i64,
        #[arg(long)]
        remove: bool,
    },
    /// Leave a request (leave_request, book, question)
    Request {
        #[arg(long)]
        telegram_id: i64,
        #[arg(long, default_value = "leave_request")]
        kind: String,
        #[arg(long, requires_all = ["block", "unit"])]
        complex: Option<String>,
        #[arg(long)]
        block: Option<String>,
        #[arg(long)]
        unit: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load_or_default(&cli.config)?;

    init_logging();
    debug!(base_url = %cfg.backend.base_url, "Configuration loaded");

    let client = CrmClient::new(&cfg.backend, cfg.api_token())?;
    let mut notifier = Notifier::new(&cfg.notifications);

    let result = run(cli.command, &cfg, &client).await;
    let failed = result.is_err();
    match result {
        Ok(message) => {
            notifier.success(message);
        }
        Err(e) => {
            notifier.error(format!("{e:#}"));
        }
    }
    if let Some(notice) = notifier.current(Utc::now()) {
        println!("{notice}");
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one command; the returned text becomes the success notice.
async fn run(command: Commands, cfg: &AppConfig, client: &CrmClient) -> Result<String> {
    match command {
        Commands::Complexes => {
            let (complexes, with_grid) =
                futures::try_join!(client.list_complexes(), client.list_grid_complexes())?;
            for c in &complexes {
                let grid = if with_grid.contains(&c.name) { " [grid]" } else { "" };
                match &c.address {
                    Some(addr) => println!("{}{grid}  ({addr})", c.name),
                    None => println!("{}{grid}", c.name),
                }
            }
            Ok(format!("{} complexes", complexes.len()))
        }

        Commands::Board { complex } => {
            let board = ChessBoard::load(client, &complex).await?;
            print!("{}", board.render());
            Ok(format!("{}: {} units", complex, board.units().len()))
        }

        Commands::Quote {
            complex,
            block,
            unit,
            plan,
            name,
            phone,
        } => {
            let calculator = PricingCalculator::new(cfg.pricing.hybrid_final_percent);
            let board = ChessBoard::load(client, &complex).await?;
            let mut selection = board.open_unit(client, &block, &unit).await?;
            println!("{}", selection.apartment());

            let Some(plan) = plan else {
                for quote in selection.quote_offered(&calculator)? {
                    println!("  {quote}");
                }
                return Ok("Quoted all plans".to_string());
            };

            let quote = selection.select(&calculator, PaymentPlan::parse(&plan)?)?;
            println!("  {quote}");

            let (Some(name), Some(phone)) = (name, phone) else {
                return Ok("Plan selected".to_string());
            };
            let confirmed = selection.confirm()?;
            let lead = confirmed.apply_to(NewLead::contact(&name, &phone));
            lead.validate()?;
            let created = submit_lead(client, client, &lead, Utc::now()).await?;
            Ok(format!("Lead #{} created for {}", created.id, confirmed.apartment))
        }

        Commands::QuoteOffline {
            area,
            price_100,
            price_70,
            price_50,
            price_30,
            months,
            plan,
        } => {
            let area = parse_area(&area).ok_or_else(|| anyhow!("area is not a number: {area}"))?;
            let price_30 = price_30.unwrap_or(price_100);
            let months_left = months.unwrap_or_else(|| {
                InstallmentWindow::new(cfg.pricing.installment_start, cfg.pricing.installment_months)
                    .months_left(Local::now().date_naive())
            });
            let input = PricingInput {
                tiers: PriceTiers {
                    per_sqm_100: price_100,
                    per_sqm_70: price_70.unwrap_or(price_30),
                    per_sqm_50: price_50.unwrap_or(price_30),
                    per_sqm_30: price_30,
                },
                area_sqm: area,
                months_left,
                list_total: None,
            };
            let calculator = PricingCalculator::new(cfg.pricing.hybrid_final_percent);
            match plan {
                Some(plan) => println!("{}", calculator.quote(PaymentPlan::parse(&plan)?, &input)?),
                None => {
                    for quote in calculator.quote_all(&input)? {
                        println!("{quote}");
                    }
                }
            }
            Ok(format!("Quoted with {months_left} months left"))
        }

        Commands::Grid(cmd) => run_grid(cmd, client).await,
        Commands::Leads(cmd) => run_leads(cmd, client).await,
        Commands::Miniapp(cmd) => run_miniapp(cmd, client).await,

        Commands::Track {
            complex,
            block,
            unit,
            telegram_id,
            events,
        } => {
            let events = events
                .iter()
                .map(|e| parse_event(e))
                .collect::<Result<Vec<_>>>()?;
            track(cfg, client, &complex, &block, &unit, telegram_id, &events).await
        }

        Commands::Stats => {
            let stats = client.stats().await?;
            println!(
                "Overdue payments: {} (previously {})",
                stats.overdue_payments, stats.previous_overdue_payments
            );
            println!(
                "Timely payments:  {} (previously {})",
                stats.timely_payments, stats.previous_timely_payments
            );
            Ok("Finance stats loaded".to_string())
        }

        Commands::Lang { toggle } => {
            let path = Some(cfg.preferences.path.as_str());
            let language = if toggle {
                storage::toggle_language(path)?
            } else {
                storage::load_preferences(path)?.language
            };
            println!("{language}");
            Ok(format!("Language: {language}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand groups
// ---------------------------------------------------------------------------

async fn run_grid(cmd: GridCommand, client: &CrmClient) -> Result<String> {
    match cmd {
        GridCommand::Complexes => {
            let names = client.list_grid_complexes().await?;
            for name in &names {
                println!("{name}");
            }
            Ok(format!("{} complexes with grids", names.len()))
        }
        GridCommand::Files { complex } => {
            let files = ComplexFiles::categorize(client.list_complex_files(&complex).await?);
            for (label, list) in [
                ("data", &files.data),
                ("prices", &files.prices),
                ("templates", &files.templates),
                ("other", &files.other),
            ] {
                println!("{label}: {}", list.join(", "));
            }
            Ok(format!("Files of {complex}"))
        }
        GridCommand::Show { complex } => {
            let editor = GridEditor::load(client, &complex).await?;
            print!("{}", editor.render());
            Ok(format!("{}: {} rows", complex, editor.rows().len()))
        }
        GridCommand::Set { complex, changes } => {
            let mut editor = GridEditor::load(client, &complex).await?;
            for change in &changes {
                let (target, status) = change
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected [BLOCK/]UNIT=STATUS, got {change}"))?;
                let status = UnitStatus::from_str(status)?;
                match target.rsplit_once('/') {
                    Some((block, unit)) => editor.stage_unit(unit.trim(), Some(block.trim()), status)?,
                    None => editor.stage_unit(target.trim(), None, status)?,
                }
            }
            let sent = editor.submit(client).await?;
            if sent == 0 {
                return Ok("Nothing to save".to_string());
            }
            Ok(format!("Saved {sent} status changes"))
        }
    }
}

async fn run_leads(cmd: LeadCommand, client: &CrmClient) -> Result<String> {
    match cmd {
        LeadCommand::Search { query } => {
            let leads = client.search_leads(&query).await?;
            for lead in &leads {
                println!("#{} {} {} [{}]", lead.id, lead.full_name, lead.phone, lead.status);
            }
            Ok(format!("{} leads found", leads.len()))
        }
        LeadCommand::Board { user_id } => {
            let columns = group_by_status(client.leads_for_user(user_id).await?);
            for (status, leads) in &columns {
                println!("{status} ({})", leads.len());
                for lead in leads {
                    println!("  #{} {} {}", lead.id, lead.full_name, lead.phone);
                }
            }
            Ok("Kanban loaded".to_string())
        }
        LeadCommand::Create {
            name,
            phone,
            source,
            user_id,
        } => {
            let mut lead = NewLead::contact(&name, &phone);
            lead.contact_source = source;
            lead.user_id = user_id;
            let created = client.create_lead(&lead).await?;
            Ok(format!("Lead #{} created", created.id))
        }
        LeadCommand::Move { id, from, to } => {
            let from = LeadStatus::from_str(&from)?;
            let to = LeadStatus::from_str(&to)?;
            check_move(from, to)?;
            let lead = client
                .update_lead_status(id, to, LeadState::Processed)
                .await?;
            Ok(format!("Lead #{} moved to {}", lead.id, lead.status))
        }
    }
}

async fn run_miniapp(cmd: MiniAppCommand, client: &CrmClient) -> Result<String> {
    match cmd {
        MiniAppCommand::Init {
            init_data,
            start_param,
        } => {
            let user = client
                .init_user(&UserInit {
                    init_data,
                    start_param,
                })
                .await?;
            Ok(format!(
                "User {} (telegram {}) from {}",
                user.id, user.telegram_id, user.source_payload
            ))
        }
        MiniAppCommand::Favorite {
            complex,
            block,
            unit,
            telegram_id,
            remove,
        } => {
            let board = ChessBoard::load(client, &complex).await?;
            let found = board
                .find(&block, &unit)
                .ok_or_else(|| anyhow!("unit {unit} not found in block {block}"))?;
            let req = FavoriteRequest::new(telegram_id, &found.to_apartment(&complex), found.shown_price());
            let ack = if remove {
                client.remove_favorite(&req).await?
            } else {
                client.add_favorite(&req).await?
            };
            Ok(format!(
                "Favorite {} (score {})",
                if ack.is_favorite { "added" } else { "removed" },
                ack.total_score
            ))
        }
        MiniAppCommand::Request {
            telegram_id,
            kind,
            complex,
            block,
            unit,
        } => {
            let kind: LeadRequestKind = serde_json::from_value(serde_json::Value::String(kind.clone()))
                .with_context(|| format!("unknown request kind: {kind}"))?;
            let req = match (complex, block, unit) {
                (Some(complex), Some(block), Some(unit)) => {
                    let board = ChessBoard::load(client, &complex).await?;
                    let found = board
                        .find(&block, &unit)
                        .ok_or_else(|| anyhow!("unit {unit} not found in block {block}"))?;
                    LeadRequestCreate::for_apartment(telegram_id, kind, &found.to_apartment(&complex))
                }
                _ => LeadRequestCreate::general(telegram_id, kind),
            };
            let record = client.create_lead_request(&req).await?;
            Ok(format!("Request #{} ({})", record.id, record.status))
        }
    }
}

// ---------------------------------------------------------------------------
// Interest tracking
// ---------------------------------------------------------------------------

fn parse_event(raw: &str) -> Result<InterestEventKind> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_string()))
        .with_context(|| format!("unknown interest event: {raw}"))
}

async fn track(
    cfg: &AppConfig,
    client: &CrmClient,
    complex: &str,
    block: &str,
    unit: &str,
    telegram_id: i64,
    events: &[InterestEventKind],
) -> Result<String> {
    let board = ChessBoard::load(client, complex).await?;
    let apartment = board
        .find(block, unit)
        .ok_or_else(|| anyhow!("unit {unit} not found in block {block}"))?
        .to_apartment(complex);

    let mut tracker = InterestTracker::new(client.clone(), telegram_id, cfg.tracker.clone());
    tracker.start_session(apartment).await?;
    for event in events {
        tracker.record_event(*event).await?;
    }

    let (tx, rx) = watch::channel(PageSignal::default());
    let stdin_task = tokio::spawn(read_page_signals(tx));

    info!("Tracking. Press Ctrl+C to stop.");
    let summary = tracker
        .run(rx, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    stdin_task.abort();

    Ok(match summary {
        Some(s) => format!(
            "Session ended: {} s viewed, score {}",
            s.total_time_seconds, s.total_score
        ),
        None => "Session ended".to_string(),
    })
}

/// Turn stdin lines into page signals. Keeps the channel open after EOF.
async fn read_page_signals(tx: watch::Sender<PageSignal>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut signal = PageSignal::default();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "hide" => signal.visible = false,
            "show" => signal.visible = true,
            _ => signal.activity += 1,
        }
        if tx.send(signal).is_err() {
            return;
        }
    }
    std::future::pending::<()>().await;
}

/// Initialise the `tracing` subscriber. Logs go to stderr in both
/// formats so stdout carries only command output.
fn init_logging() {
    use tracing_subscriber::util::SubscriberInitExt;

    let json_logging = std::env::var("REALTY_CRM_LOG_JSON").is_ok();
    log_subscriber(json_logging, std::io::stderr).init();
}

fn log_subscriber<W>(json: bool, writer: W) -> Box<dyn tracing::Subscriber + Send + Sync>
where
    W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("realty_crm=info"));

    if json {
        Box::new(
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(writer)
                .finish(),
        )
    } else {
        Box::new(
            fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(writer)
                .finish(),
        )
    }
}
