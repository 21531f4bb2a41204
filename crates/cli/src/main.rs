//! Vide-Grenier Kamer CLI - Database migrations, accounts and scheduled jobs.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! vgk-cli migrate
//!
//! # Create back-office accounts
//! vgk-cli admin create -e admin@videgrenierkamer.cm -p 677123456 \
//!     --first-name Aline --last-name Mbarga --city Yaounde
//! vgk-cli staff create -e relais@videgrenierkamer.cm -p 699000111 \
//!     --first-name Paul --last-name Etoa --city Douala
//!
//! # Scheduled jobs
//! vgk-cli recommendations refresh [--user <uuid>]
//! vgk-cli products expire
//! vgk-cli installments sweep
//! vgk-cli escrow release-due
//! vgk-cli stock report
//! vgk-cli newsletter send <uuid>
//! vgk-cli newsletter send-pending
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};

use vide_grenier_core::{NewsletterId, UserId, UserType};

mod commands;

use commands::accounts::AccountForm;

#[derive(Parser)]
#[command(name = "vgk-cli")]
#[command(author, version, about = "Vide-Grenier Kamer CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Manage pickup-point staff accounts
    Staff {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Persisted recommendations
    Recommendations {
        #[command(subcommand)]
        action: RecommendationAction,
    },
    /// Listing maintenance
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Installment plan maintenance
    Installments {
        #[command(subcommand)]
        action: InstallmentAction,
    },
    /// Escrow maintenance
    Escrow {
        #[command(subcommand)]
        action: EscrowAction,
    },
    /// Platform stock
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
    /// Newsletter campaigns
    Newsletter {
        #[command(subcommand)]
        action: NewsletterAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Create a new account
    Create(AccountArgs),
}

#[derive(Args)]
struct AccountArgs {
    /// Email address
    #[arg(short, long)]
    email: String,

    /// Cameroonian mobile number
    #[arg(short, long)]
    phone: String,

    /// Password (min 8 characters)
    #[arg(long, env = "VGK_ACCOUNT_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    /// One of Douala, Yaounde, Bafoussam, Garoua, Bamenda
    #[arg(long, default_value = "Douala")]
    city: String,
}

impl AccountArgs {
    fn form(&self) -> AccountForm<'_> {
        AccountForm {
            email: &self.email,
            phone: &self.phone,
            password: &self.password,
            first_name: &self.first_name,
            last_name: &self.last_name,
            city: &self.city,
        }
    }
}

#[derive(Subcommand)]
enum RecommendationAction {
    /// Recompute recommendations
    Refresh {
        /// Only this user
        #[arg(long)]
        user: Option<UserId>,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Expire listings past their expiry date
    Expire,
}

#[derive(Subcommand)]
enum InstallmentAction {
    /// Mark overdue installments
    Sweep,
}

#[derive(Subcommand)]
enum EscrowAction {
    /// Release funded escrows whose holding period is over
    ReleaseDue,
}

#[derive(Subcommand)]
enum StockAction {
    /// Log velocity, forecast and reorder advice for every stock line
    Report,
}

#[derive(Subcommand)]
enum NewsletterAction {
    /// Send one campaign now
    Send {
        /// Campaign ID
        id: NewsletterId,
    },
    /// Send every scheduled campaign that is due
    SendPending,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin {
            action: AccountAction::Create(args),
        } => {
            commands::accounts::create(&args.form(), UserType::Admin).await?;
        }
        Commands::Staff {
            action: AccountAction::Create(args),
        } => {
            commands::accounts::create(&args.form(), UserType::Staff).await?;
        }
        Commands::Recommendations {
            action: RecommendationAction::Refresh { user },
        } => commands::jobs::refresh_recommendations(user).await?,
        Commands::Products {
            action: ProductAction::Expire,
        } => commands::jobs::expire_products().await?,
        Commands::Installments {
            action: InstallmentAction::Sweep,
        } => commands::jobs::sweep_installments().await?,
        Commands::Escrow {
            action: EscrowAction::ReleaseDue,
        } => commands::jobs::release_due_escrows().await?,
        Commands::Stock {
            action: StockAction::Report,
        } => commands::jobs::stock_report().await?,
        Commands::Newsletter { action } => match action {
            NewsletterAction::Send { id } => commands::jobs::send_newsletter(id).await?,
            NewsletterAction::SendPending => commands::jobs::send_pending_newsletters().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_staff_create() {
        let cli = Cli::try_parse_from([
            "vgk-cli",
            "staff",
            "create",
            "-e",
            "relais@videgrenierkamer.cm",
            "-p",
            "699000111",
            "--password",
            "Relais-Akwa-2026",
            "--first-name",
            "Paul",
            "--last-name",
            "Etoa",
        ])
        .unwrap();
        let Commands::Staff {
            action: AccountAction::Create(args),
        } = cli.command
        else {
            panic!("expected staff create");
        };
        assert_eq!(args.city, "Douala");
        assert_eq!(args.form().first_name, "Paul");
    }

    #[test]
    fn test_rejects_malformed_newsletter_id() {
        assert!(Cli::try_parse_from(["vgk-cli", "newsletter", "send", "not-a-uuid"]).is_err());
    }
}
