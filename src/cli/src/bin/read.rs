use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use deye_controller::modbus::{
  batch_spans, registry, serialize_registers, Connection, Destination,
  HoldingRegister, RegisterKindStorage, SpanParser, MAX_READ_QUANTITY,
};

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "deye-read", about = "Dump DEYE inverter holding registers")]
struct Args {
  /// Datalogger IP address
  address: IpAddr,

  /// Modbus TCP port of the datalogger bridge
  #[arg(long, default_value_t = 8899)]
  port: u16,

  /// Modbus unit id behind the datalogger
  #[arg(long, default_value_t = 1)]
  unit: u8,

  /// Read only battery related parameters
  #[arg(long)]
  battery: bool,

  /// Read only total power related parameters
  #[arg(long)]
  power: bool,

  /// Read only power and battery related parameters
  #[arg(long)]
  combo: bool,

  /// Largest address hole one batched read may bridge
  #[arg(long, default_value_t = 0)]
  tolerance: u16,

  /// Print one JSON object instead of one line per register
  #[arg(long)]
  json: bool,

  /// Request timeout in milliseconds
  #[arg(long, default_value_t = 10_000)]
  timeout: u64,
}

fn combo() -> Vec<HoldingRegister<RegisterKindStorage>> {
  let mut registers = registry::battery();
  for register in registry::total_power() {
    if !registers.iter().any(|known| known.name == register.name) {
      registers.push(register);
    }
  }
  registers
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  deye_controller_cli::init_tracing();
  let args = Args::parse();

  let registers = if args.battery {
    registry::battery()
  } else if args.power {
    registry::total_power()
  } else if args.combo {
    combo()
  } else {
    registry::holding()
  };

  let batches = batch_spans(registers, args.tolerance, MAX_READ_QUANTITY);
  let destination = Destination {
    address: SocketAddr::new(args.address, args.port),
    slave: args.unit,
  };
  let mut connection = Connection::connect(destination).await?;
  let timeout = chrono::Duration::milliseconds(args.timeout as i64);

  let mut decoded = Vec::new();
  for batch in &batches {
    let response = connection.simple_read(batch, timeout).await?;
    let parsed = batch.parse(response)?;
    decoded.extend(parsed.spans);
  }

  if args.json {
    println!(
      "{}",
      serde_json::to_string_pretty(&serialize_registers(decoded))?
    );
  } else {
    for register in &decoded {
      println!(
        "[{:>35}]: {} {}",
        register.name, register.storage, register.suffix
      );
    }
  }

  Ok(())
}
