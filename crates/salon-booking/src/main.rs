#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use salon_booking::{config::Config, run_server};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "salon-booking", version, about = "Nail salon booking API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create the database and load sample services and slots, then exit
    InitData,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(cfg).await,
        Command::InitData => {
            salon_booking::telemetry::init_tracing();
            let database = salon_booking::server::open_database(&cfg)?;
            let today = chrono::Local::now().date_naive();
            match salon_booking::seed::seed_sample_data(&database, today, &cfg.operating_hours())? {
                Some(report) => println!(
                    "Created {} services and {} time slots",
                    report.services_created, report.slots_created
                ),
                None => println!("Database already has services; nothing to do"),
            }
            Ok(())
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
