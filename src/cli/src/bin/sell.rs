use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use deye_controller::modbus::{Connection, Destination};
use deye_controller::sell::{SellProgram, SlotTime, SlotUpdate};
use rust_decimal::Decimal;

#[derive(Debug, Clone, clap::Parser)]
#[command(
  name = "deye-sell",
  about = "Show and edit the sell mode time of use program"
)]
struct Args {
  /// Datalogger IP address
  address: IpAddr,

  /// Modbus TCP port of the datalogger bridge
  #[arg(long, default_value_t = 8899)]
  port: u16,

  /// Modbus unit id behind the datalogger
  #[arg(long, default_value_t = 1)]
  unit: u8,

  /// Program slot to update, 0 through 5
  #[arg(long)]
  slot: Option<usize>,

  /// New start time for the slot, HH:MM
  #[arg(long)]
  start: Option<String>,

  /// New discharge power limit in watts
  #[arg(long)]
  power: Option<u16>,

  /// New state of charge threshold in percent
  #[arg(long)]
  soc: Option<u16>,

  /// New battery voltage threshold in volts
  #[arg(long)]
  voltage: Option<Decimal>,

  /// Enable or disable grid charging for the slot
  #[arg(long)]
  grid: Option<bool>,

  /// Enable or disable generator charging for the slot
  #[arg(long)]
  generator: Option<bool>,

  /// Write the program back to the inverter
  #[arg(long)]
  upload: bool,

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

  let response = connection
    .simple_read(&SellProgram::span(), timeout)
    .await?;
  let mut program = SellProgram::load(&response)?;

  let update = SlotUpdate {
    start: args.start.as_deref().map(SlotTime::parse).transpose()?,
    power: args.power,
    voltage: args.voltage,
    soc: args.soc,
    grid_charge: args.grid,
    generator_charge: args.generator,
  };
  let has_changes = update.start.is_some()
    || update.power.is_some()
    || update.voltage.is_some()
    || update.soc.is_some()
    || update.grid_charge.is_some()
    || update.generator_charge.is_some();

  match args.slot {
    Some(slot) => program.update_slot(slot, update)?,
    None if has_changes => {
      anyhow::bail!("pass --slot to say which program to change")
    }
    None => {}
  }

  println!("{}", program.render());

  if args.upload {
    connection.simple_write(&program.record(), timeout).await?;
    program.mark_synced();
    println!("Program uploaded");
  } else if program.is_dirty() {
    println!("Changes not uploaded, pass --upload to write them");
  }

  Ok(())
}
