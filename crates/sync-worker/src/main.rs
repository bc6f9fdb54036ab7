use clap::{Parser, Subcommand};
use usersync_result::BoxedErr;
use usersync_worker::server::SyncWorkerServer;

/// Syncs SAM users into Agillic from Pub/Sub events
#[derive(Parser)]
#[command(name = "usersync-worker")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve Pub/Sub push deliveries (default)
  Serve,
  /// Dispatch one synthetic event and exit
  Test {
    /// Event name
    #[arg(long, default_value = "users.created")]
    name: String,
    /// User id carried by the payload
    #[arg(long, default_value = "542")]
    id: String,
  },
}

#[tokio::main]
async fn main() -> Result<(), BoxedErr> {
  let cli = Cli::parse();
  let server = SyncWorkerServer::new().await?;

  match cli.command.unwrap_or(Commands::Serve) {
    Commands::Serve => server.run().await,
    Commands::Test { name, id } => server.run_once(&name, &id).await,
  }
}
