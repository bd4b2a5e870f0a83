use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, clap::Parser)]
#[command(
  name = "deye-scan",
  about = "Scan the network for compatible dataloggers"
)]
struct Args {
  /// Network broadcast address
  broadcast: IpAddr,

  /// How long to keep listening after the last reply, in milliseconds
  #[arg(long, default_value_t = 1000)]
  timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  deye_controller_cli::init_tracing();
  let args = Args::parse();

  let loggers = deye_controller_cli::scan::discover(
    args.broadcast,
    Duration::from_millis(args.timeout),
  )
  .await?;

  if loggers.is_empty() {
    println!("No dataloggers answered");
    return Ok(());
  }

  for logger in &loggers {
    println!("{logger}\n");
  }

  Ok(())
}
