mod args;
mod poller;

pub use args::{Args, Commands, CreateAdminArgs, PollStatusArgs};
pub use poller::{HttpStatusSource, PollOutcome, StatusSource, poll_until_terminal};

use std::time::Duration;

use clap::Parser;
use common::{Database, User, normalize_email};

/// Runs the CLI command parser and executes the selected command.
/// Returns true if a CLI command was handled, false otherwise.
pub async fn run_cli() -> bool {
    let args = Args::parse();
    match &args.command {
        Some(Commands::CreateAdmin(admin_args)) => {
            if let Err(e) = create_admin(
                &admin_args.full_name,
                &admin_args.email,
                &admin_args.password,
            )
            .await
            {
                eprintln!("Failed to create admin: {e:#}");
            }
            true
        }
        Some(Commands::PollStatus(poll_args)) => {
            if let Err(e) = poll_status(poll_args).await {
                eprintln!("Failed to poll payment status: {e:#}");
            }
            true
        }
        None => false,
    }
}

/// Validates input, hashes the password, checks for duplicates and saves the admin.
async fn create_admin(full_name: &str, email: &str, password: &str) -> anyhow::Result<()> {
    let user = User::new_admin(full_name, email, password)
        .map_err(|e| anyhow::anyhow!("Validation error: {e}"))?;

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
    let db = Database::new(&database_url).await?;

    if db.get_user_by_email(&normalize_email(email)).await?.is_some() {
        db.close().await;
        return Err(anyhow::anyhow!(
            "A user with email '{}' already exists.",
            email
        ));
    }

    let saved = db.create_user_with_subscription(&user).await;
    db.close().await;
    saved?;

    println!("Admin '{}' created successfully.", user.email);
    Ok(())
}

async fn poll_status(args: &PollStatusArgs) -> anyhow::Result<()> {
    let source = HttpStatusSource::login(&args.server, &args.email, &args.password).await?;
    let cancel = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match poll_until_terminal(
        &source,
        &args.reference,
        &args.transaction_id,
        Duration::from_secs(args.interval_secs.max(1)),
        cancel,
    )
    .await
    {
        PollOutcome::Settled(status) => {
            println!(
                "Transaction {} is {}",
                status.transaction_id, status.status
            );
        }
        PollOutcome::Cancelled => println!("Polling stopped."),
    }
    Ok(())
}
