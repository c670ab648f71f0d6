use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "XCoin transfer CLI - manage admins and follow payments")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an admin account
    CreateAdmin(CreateAdminArgs),

    /// Poll a payment until it succeeds or fails
    ///
    /// Logs in against a running server and asks for the transaction status
    /// at a fixed interval. Ctrl-C stops polling.
    PollStatus(PollStatusArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CreateAdminArgs {
    #[arg(short, long, help = "Full name of the admin")]
    pub full_name: String,

    #[arg(short, long, help = "Email address of the admin")]
    pub email: String,

    #[arg(short, long, help = "Password for the admin")]
    pub password: String,
}

#[derive(ClapArgs, Debug)]
pub struct PollStatusArgs {
    #[arg(
        short,
        long,
        default_value = "http://127.0.0.1:3000",
        help = "Base URL of the server"
    )]
    pub server: String,

    #[arg(short, long, help = "Account email")]
    pub email: String,

    #[arg(short, long, help = "Account password")]
    pub password: String,

    #[arg(short, long, help = "Provider reference of the payment")]
    pub reference: String,

    #[arg(short, long, help = "Id of the local transaction")]
    pub transaction_id: String,

    #[arg(short, long, default_value_t = 5, help = "Seconds between polls")]
    pub interval_secs: u64,
}
