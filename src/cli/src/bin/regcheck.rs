use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use deye_controller::modbus::{
  registry, Connection, Destination, SimpleSpan, SpanParser,
};

#[derive(Debug, Clone, clap::Parser)]
#[command(
  name = "deye-regcheck",
  about = "Look up and read a single register"
)]
struct Args {
  /// Datalogger IP address
  address: IpAddr,

  /// Register name from the catalog, or a numeric address for a raw dump
  register: String,

  /// Modbus TCP port of the datalogger bridge
  #[arg(long, default_value_t = 8899)]
  port: u16,

  /// Modbus unit id behind the datalogger
  #[arg(long, default_value_t = 1)]
  unit: u8,

  /// Words to read when the register is a numeric address
  #[arg(long, default_value_t = 1)]
  quantity: u16,

  /// Request timeout in milliseconds
  #[arg(long, default_value_t = 10_000)]
  timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  deye_controller_cli::init_tracing();
  let args = Args::parse();

  let destination = Destination {
    address: SocketAddr::new(args.address, args.port),
    slave: args.unit,
  };
  let mut connection = Connection::connect(destination).await?;
  let timeout = chrono::Duration::milliseconds(args.timeout as i64);

  match args.register.parse::<u16>() {
    Ok(address) => {
      let span = SimpleSpan {
        address,
        quantity: args.quantity,
      };
      let response = connection.simple_read(&span, timeout).await?;
      let words = response
        .iter()
        .map(|word| format!("0x{word:04X}"))
        .collect::<Vec<_>>()
        .join(" ");
      println!("[{}..{}]: {}", address, address + args.quantity, words);
    }
    Err(_) => {
      let register = registry::lookup(&args.register)?;
      let response = connection.simple_read(&register, timeout).await?;
      let value = register.parse(response)?;
      println!(
        "[{:>35}]: {} {}",
        value.name, value.storage, value.suffix
      );
    }
  }

  Ok(())
}
