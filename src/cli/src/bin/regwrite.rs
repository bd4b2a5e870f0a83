use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use deye_controller::modbus::{writable, Connection, Destination};

#[derive(Debug, Clone, clap::Parser)]
#[command(
  name = "deye-regwrite",
  about = "Validate and write one register value"
)]
struct Args {
  /// Datalogger IP address
  address: IpAddr,

  /// Writable register name from the catalog
  register: String,

  /// Value to write, in the register's own unit
  value: String,

  /// Modbus TCP port of the datalogger bridge
  #[arg(long, default_value_t = 8899)]
  port: u16,

  /// Modbus unit id behind the datalogger
  #[arg(long, default_value_t = 1)]
  unit: u8,

  /// Request timeout in milliseconds
  #[arg(long, default_value_t = 10_000)]
  timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  deye_controller_cli::init_tracing();
  let args = Args::parse();

  let mut register = writable::lookup_writable(&args.register)?;
  register.set(&args.value)?;
  let record = register.record()?;

  let destination = Destination {
    address: SocketAddr::new(args.address, args.port),
    slave: args.unit,
  };
  let mut connection = Connection::connect(destination).await?;
  let timeout = chrono::Duration::milliseconds(args.timeout as i64);
  connection.simple_write(&record, timeout).await?;

  println!(
    "Wrote {} word(s) to {} at {}",
    record.values.len(),
    register.name,
    register.address
  );

  Ok(())
}
