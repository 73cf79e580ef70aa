use std::process::ExitCode;

use cc_optimizer::auth::SessionManager;
use cc_optimizer::catalog::{default_cards, find_card};
use cc_optimizer::config::{DbArgs, init_tracing};
use cc_optimizer::db;
use cc_optimizer::error::{AppError, StoreError};
use cc_optimizer::models::{
    AllocationRow, BonusTier, Card, DEFAULT_MIN_SPEND_PERIOD, DEFAULT_POINT_VALUE,
    DEFAULT_REWARD_MULTIPLIER, DEFAULT_REWARD_RATE, PartnerBonus, SpecialCategory,
};
use cc_optimizer::optimizer::{self, AllocationSummary};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tabled::Table;

/// Credit Card Rewards Optimizer — split a purchase across your cards for the most value
#[derive(Parser)]
#[command(name = "cc-optimizer", version, about)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Sign in to an existing account
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Sign out of the current session
    SignOut,

    /// Show who is signed in
    Whoami,

    /// Add a new credit card
    AddCard {
        /// Card name (e.g. "Chase Sapphire Preferred")
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0.0)]
        annual_fee: f64,
        /// Spend required to earn the welcome bonus
        #[arg(long, default_value_t = 0.0)]
        min_spend: f64,
        /// Days allowed to reach the minimum spend
        #[arg(long, default_value_t = DEFAULT_MIN_SPEND_PERIOD)]
        min_spend_period: u32,
        /// Welcome bonus in points
        #[arg(long, default_value_t = 0.0)]
        welcome_bonus: f64,
        /// Points earned per dollar
        #[arg(long, default_value_t = DEFAULT_REWARD_RATE)]
        reward_rate: f64,
        #[arg(long, default_value_t = DEFAULT_REWARD_MULTIPLIER)]
        reward_multiplier: f64,
        /// Dollar value of one point
        #[arg(long, default_value_t = DEFAULT_POINT_VALUE)]
        point_value: f64,
        /// Category bonus as CATEGORY:RATE[:MIN[:MAX]] (repeatable)
        #[arg(long = "special")]
        special_categories: Vec<SpecialCategory>,
        /// Tiered bonus as MIN:MAX:POINT_VALUE (repeatable)
        #[arg(long = "tier")]
        bonus_tiers: Vec<BonusTier>,
        /// Partner bonus as NAME:RATE:DESCRIPTION (repeatable)
        #[arg(long = "partner")]
        partner_bonuses: Vec<PartnerBonus>,
    },

    /// Add one of the built-in catalog cards to your account
    AddFromCatalog {
        /// Catalog card name (case-insensitive)
        #[arg(long)]
        name: String,
    },

    /// List all saved credit cards
    ListCards,

    /// Remove a credit card by ID
    RemoveCard {
        /// Card ID to remove
        #[arg(long)]
        id: i64,
    },

    /// Show the built-in catalog cards
    Catalog,

    /// Recommend how to split a purchase across your cards
    Optimize {
        /// Purchase amount in dollars
        #[arg(long)]
        amount: f64,
        /// Spending category (e.g. "dining")
        #[arg(long)]
        category: Option<String>,
        /// Partner merchant (e.g. "Lyft")
        #[arg(long)]
        partner: Option<String>,
        /// Use the built-in catalog instead of your saved cards
        #[arg(long)]
        catalog: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing("warn");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Store(StoreError::Unauthenticated)) => {
            eprintln!("Not signed in. Run: cc-optimizer sign-in --email ... --password ...");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let conn = db::init_db(&cli.db.db_path)?;
    let sessions = SessionManager::resume(&conn)?;

    match cli.command {
        Commands::SignUp { email, password } => {
            let session = sessions.sign_up(&conn, &email, &password)?;
            println!("Signed up and signed in as {}", session.email);
        }

        Commands::SignIn { email, password } => {
            let session = sessions.sign_in(&conn, &email, &password)?;
            println!("Signed in as {}", session.email);
        }

        Commands::SignOut => {
            sessions.sign_out(&conn)?;
            println!("Signed out");
        }

        Commands::Whoami => match sessions.current() {
            Some(session) => println!("{}", session.email),
            None => println!("Not signed in"),
        },

        Commands::AddCard {
            name,
            annual_fee,
            min_spend,
            min_spend_period,
            welcome_bonus,
            reward_rate,
            reward_multiplier,
            point_value,
            special_categories,
            bonus_tiers,
            partner_bonuses,
        } => {
            let card = Card {
                annual_fee,
                min_spend,
                min_spend_period,
                welcome_bonus,
                reward_rate,
                reward_multiplier,
                point_value,
                special_categories,
                bonus_tiers,
                partner_bonuses,
                ..Card::new(name)
            };
            save_card(&conn, &sessions, &card)?;
        }

        Commands::AddFromCatalog { name } => {
            let card = find_card(&name)
                .ok_or_else(|| AppError::Usage(format!("No catalog card named '{name}'")))?;
            save_card(&conn, &sessions, &card)?;
        }

        Commands::ListCards => {
            let session = sessions.require()?;
            let cards = db::list_cards(&conn, &session)?;
            if cards.is_empty() {
                println!(
                    "No cards found. Add one with: cc-optimizer add-card --name \"...\" --min-spend 4000"
                );
            } else {
                println!("{}", Table::new(&cards));
            }
        }

        Commands::RemoveCard { id } => {
            let session = sessions.require()?;
            if db::remove_card(&conn, &session, id)? {
                println!("Removed card with ID {}", id);
            } else {
                println!("No card found with ID {}", id);
            }
        }

        Commands::Catalog => {
            println!("{}", Table::new(default_cards()));
        }

        Commands::Optimize {
            amount,
            category,
            partner,
            catalog,
        } => {
            let cards = if catalog {
                default_cards()
            } else {
                let session = sessions.require()?;
                db::list_cards(&conn, &session)?
            };
            let results =
                optimizer::allocate(amount, &cards, category.as_deref(), partner.as_deref())?;
            print_summary(&AllocationSummary::new(results));
        }
    }

    Ok(())
}

fn save_card(conn: &Connection, sessions: &SessionManager, card: &Card) -> Result<(), AppError> {
    optimizer::validate_card(card)?;
    let session = sessions.require()?;
    let id = db::add_card(conn, &session, card)?;
    println!("Added card '{}' with ID {}", card.name, id);
    Ok(())
}

fn print_summary(summary: &AllocationSummary) {
    if summary.results.is_empty() {
        println!("None of your cards has a minimum spend to allocate against.");
        return;
    }

    println!("Optimal strategy:");
    let rows: Vec<AllocationRow> = summary.results.iter().map(AllocationRow::from).collect();
    println!("{}", Table::new(&rows));

    for result in &summary.results {
        for bonus in &result.special_bonuses {
            println!(
                "  {}: {} ({}) +{} points, +${:.2}",
                result.card.name,
                bonus.description,
                bonus.source,
                bonus.additional_points.round(),
                bonus.additional_value
            );
        }
        println!(
            "  {}: minimum spend ${:.2} in {} days",
            result.card.name, result.card.min_spend, result.card.min_spend_period
        );
    }

    println!();
    println!("Total purchase amount: ${:.2}", summary.total_spend);
    println!("Total net benefit:     ${:.2}", summary.total_net_benefit);
}
