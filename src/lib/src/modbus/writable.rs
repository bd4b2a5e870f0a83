use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_modbus::Address;

use super::record::SimpleRecord;
use super::registry::LookupError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WritableKindStorage {
  Int {
    low: u16,
    high: Option<u16>,
  },
  Float {
    scale: i64,
    low: i64,
    high: i64,
  },
  Bool,
  /// Packed hour by minute time of day, hour * 100 + minute.
  Time,
  /// Bit 0 grid charge, bit 1 generator charge.
  ChargeFlags,
  /// Device clock, three words of packed calendar bytes.
  DateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritableRegister {
  pub address: Address,
  pub storage: WritableKindStorage,
  pub name: &'static str,
  value: Option<Vec<u16>>,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
  #[error("register {0} has no value loaded")]
  NotLoaded(&'static str),

  #[error("cannot parse {input} for register {name}")]
  Parse { name: &'static str, input: String },

  #[error("value {input} out of range for register {name}")]
  OutOfRange { name: &'static str, input: String },
}

impl WritableRegister {
  fn parse_error(&self, input: &str) -> EncodeError {
    EncodeError::Parse {
      name: self.name,
      input: input.to_owned(),
    }
  }

  fn range_error(&self, input: &str) -> EncodeError {
    EncodeError::OutOfRange {
      name: self.name,
      input: input.to_owned(),
    }
  }

  /// Parse and validate a value for this register, keeping the encoded
  /// words until `record` builds the write payload.
  pub fn set(&mut self, input: &str) -> Result<&[u16], EncodeError> {
    let words = match self.storage {
      WritableKindStorage::Int { low, high } => {
        let value = input
          .trim()
          .parse::<u16>()
          .map_err(|_| self.parse_error(input))?;
        if value < low || high.is_some_and(|high| value > high) {
          return Err(self.range_error(input));
        }
        vec![value]
      }
      WritableKindStorage::Float { scale, low, high } => {
        let value = input
          .trim()
          .parse::<Decimal>()
          .map_err(|_| self.parse_error(input))?;
        if value < Decimal::from(low) || value > Decimal::from(high) {
          return Err(self.range_error(input));
        }
        let word = (value.round_dp(2) * Decimal::from(scale))
          .round()
          .to_u16()
          .ok_or_else(|| self.range_error(input))?;
        vec![word]
      }
      WritableKindStorage::Bool => {
        let value = match input.trim().to_lowercase().as_str() {
          "on" | "true" | "1" => 1,
          "off" | "false" | "0" => 0,
          _ => return Err(self.parse_error(input)),
        };
        vec![value]
      }
      WritableKindStorage::Time => {
        let (hour, minute) = input
          .trim()
          .split_once(':')
          .ok_or_else(|| self.parse_error(input))?;
        let hour = hour
          .parse::<u16>()
          .map_err(|_| self.parse_error(input))?;
        let minute = minute
          .parse::<u16>()
          .map_err(|_| self.parse_error(input))?;
        if hour > 23 || minute > 59 {
          return Err(self.range_error(input));
        }
        vec![hour * 100 + minute]
      }
      WritableKindStorage::ChargeFlags => {
        let value = match input.trim().to_lowercase().as_str() {
          "none" => 0,
          "grid" => 1,
          "gen" | "generator" => 2,
          "grid+gen" | "gen+grid" | "both" => 3,
          other => other
            .parse::<u16>()
            .ok()
            .filter(|value| *value <= 3)
            .ok_or_else(|| self.parse_error(input))?,
        };
        vec![value]
      }
      WritableKindStorage::DateTime => {
        let timestamp = chrono::NaiveDateTime::parse_from_str(
          input.trim(),
          "%Y-%m-%d %H:%M:%S",
        )
        .map_err(|_| self.parse_error(input))?;
        let date = timestamp.date();
        let time = timestamp.time();
        let year = chrono::Datelike::year(&date) - 2000;
        if !(0..=255).contains(&year) {
          return Err(self.range_error(input));
        }
        vec![
          ((year as u16) << 8) | chrono::Datelike::month(&date) as u16,
          ((chrono::Datelike::day(&date) as u16) << 8)
            | chrono::Timelike::hour(&time) as u16,
          ((chrono::Timelike::minute(&time) as u16) << 8)
            | chrono::Timelike::second(&time) as u16,
        ]
      }
    };

    self.value = Some(words);
    Ok(self.value.as_deref().unwrap_or(&[]))
  }

  /// The write payload. Fails until a value has been set.
  pub fn record(&self) -> Result<SimpleRecord, EncodeError> {
    let values = self
      .value
      .clone()
      .ok_or(EncodeError::NotLoaded(self.name))?;
    Ok(SimpleRecord {
      address: self.address,
      values,
    })
  }
}

fn writable(
  address: Address,
  storage: WritableKindStorage,
  name: &'static str,
) -> WritableRegister {
  WritableRegister {
    address,
    storage,
    name,
    value: None,
  }
}

fn int_w(
  address: Address,
  name: &'static str,
  low: u16,
  high: Option<u16>,
) -> WritableRegister {
  writable(address, WritableKindStorage::Int { low, high }, name)
}

fn float_w(
  address: Address,
  name: &'static str,
  scale: i64,
  low: i64,
  high: i64,
) -> WritableRegister {
  writable(address, WritableKindStorage::Float { scale, low, high }, name)
}

fn bool_w(address: Address, name: &'static str) -> WritableRegister {
  writable(address, WritableKindStorage::Bool, name)
}

fn time_w(address: Address, name: &'static str) -> WritableRegister {
  writable(address, WritableKindStorage::Time, name)
}

fn flags_w(address: Address, name: &'static str) -> WritableRegister {
  writable(address, WritableKindStorage::ChargeFlags, name)
}

static WRITABLE: Lazy<Vec<WritableRegister>> = Lazy::new(|| {
  vec![
    writable(62, WritableKindStorage::DateTime, "inverter_time"),
    float_w(77, "active_power_regulation", 10, 0, 120),
    float_w(78, "reactive_power_regulation", 10, 0, 120),
    float_w(79, "apparent_power_regulation", 10, 0, 120),
    bool_w(80, "switch_on_off"),
    int_w(98, "control_mode", 0, Some(1)),
    float_w(99, "batt_equalization_v", 100, 38, 61),
    float_w(100, "batt_absorbtion_v", 100, 38, 61),
    float_w(101, "batt_float_v", 100, 38, 61),
    int_w(102, "batt_capacity", 0, Some(2000)),
    float_w(103, "batt_empty_v", 100, 38, 61),
    int_w(104, "zero_export_power", 20, Some(12_000)),
    int_w(105, "equalization_days_cycle", 0, Some(90)),
    // Resolution is 30 minutes, so 20 means 10 hours.
    int_w(106, "equalization_time", 0, Some(20)),
    int_w(107, "TEMPCO", 0, Some(50)),
    int_w(108, "max_charge_amps", 0, Some(185)),
    int_w(109, "max_discharge_amps", 0, Some(185)),
    int_w(111, "battery_control_mode", 0, Some(2)),
    int_w(114, "battery_charging_eff", 0, Some(100)),
    int_w(115, "battery_shutdown_capacity", 0, Some(100)),
    int_w(116, "battery_recovery_capacity", 0, Some(100)),
    int_w(117, "battery_low_capacity", 0, Some(100)),
    float_w(118, "battery_shutdown_voltage", 100, 38, 63),
    float_w(119, "battery_restart_voltage", 100, 38, 63),
    float_w(120, "battery_low_voltage", 100, 38, 63),
    float_w(121, "gen_max_working_time", 10, 0, 23),
    float_w(122, "gen_cooling_time", 10, 0, 23),
    float_w(123, "gen_charge_start_voltage", 100, 0, 63),
    float_w(124, "gen_charge_start_soc", 100, 0, 63),
    int_w(125, "gen_charge_current", 0, Some(185)),
    float_w(126, "grid_charge_start_voltage", 100, 38, 61),
    int_w(127, "grid_charge_start_soc", 0, Some(100)),
    int_w(128, "grid_charge_current", 0, Some(185)),
    int_w(133, "gen_port_use", 0, Some(2)),
    float_w(134, "smart_load_off_voltage", 100, 38, 63),
    int_w(135, "smart_load_off_capacity", 0, Some(100)),
    float_w(136, "smart_load_on_voltage", 100, 38, 63),
    int_w(137, "smart_load_on_capacity", 0, Some(100)),
    int_w(142, "work_mode", 0, Some(2)),
    int_w(143, "grid_max_output_pwr", 0, Some(15_000)),
    bool_w(145, "solar_sell"),
    time_w(148, "sell_point_t1"),
    time_w(149, "sell_point_t2"),
    time_w(150, "sell_point_t3"),
    time_w(151, "sell_point_t4"),
    time_w(152, "sell_point_t5"),
    time_w(153, "sell_point_t6"),
    int_w(154, "sell_point_t1_watts", 0, None),
    int_w(155, "sell_point_t2_watts", 0, None),
    int_w(156, "sell_point_t3_watts", 0, None),
    int_w(157, "sell_point_t4_watts", 0, None),
    int_w(158, "sell_point_t5_watts", 0, None),
    int_w(159, "sell_point_t6_watts", 0, None),
    float_w(160, "sell_point_t1_volts", 100, 0, 63),
    float_w(161, "sell_point_t2_volts", 100, 0, 63),
    float_w(162, "sell_point_t3_volts", 100, 0, 63),
    float_w(163, "sell_point_t4_volts", 100, 0, 63),
    float_w(164, "sell_point_t5_volts", 100, 0, 63),
    float_w(165, "sell_point_t6_volts", 100, 0, 63),
    int_w(166, "sell_point_t1_soc", 0, Some(100)),
    int_w(167, "sell_point_t2_soc", 0, Some(100)),
    int_w(168, "sell_point_t3_soc", 0, Some(100)),
    int_w(169, "sell_point_t4_soc", 0, Some(100)),
    int_w(170, "sell_point_t5_soc", 0, Some(100)),
    int_w(171, "sell_point_t6_soc", 0, Some(100)),
    flags_w(172, "charge_point_t1"),
    flags_w(173, "charge_point_t2"),
    flags_w(174, "charge_point_t3"),
    flags_w(175, "charge_point_t4"),
    flags_w(176, "charge_point_t5"),
    flags_w(177, "charge_point_t6"),
    int_w(180, "restore_connection_time", 10, Some(300)),
    int_w(183, "grid_freq_selection", 0, Some(1)),
    int_w(184, "grid_type", 0, Some(2)),
    float_w(185, "grid_high_voltage", 10, 180, 270),
    float_w(186, "grid_low_voltage", 10, 180, 270),
    float_w(187, "grid_high_frequency", 100, 45, 65),
    float_w(188, "grid_low_frequency", 100, 45, 65),
    int_w(191, "grid_peak_shaving_pwr", 0, Some(16_000)),
  ]
});

pub fn writables() -> Vec<WritableRegister> {
  WRITABLE.clone()
}

pub fn lookup_writable(name: &str) -> Result<WritableRegister, LookupError> {
  WRITABLE
    .iter()
    .find(|register| register.name == name)
    .cloned()
    .ok_or_else(|| LookupError::NotFound(name.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use super::*;

  #[test]
  fn record_before_set_is_not_loaded() {
    let register = lookup_writable("zero_export_power").unwrap();
    assert!(matches!(
      register.record(),
      Err(EncodeError::NotLoaded("zero_export_power"))
    ));
  }

  #[test]
  fn int_values_validate_their_limits() {
    let mut register = lookup_writable("zero_export_power").unwrap();
    assert!(register.set("19").is_err());
    assert!(register.set("20000").is_err());
    assert_eq!(register.set("100").unwrap(), &[100]);
    assert_eq!(register.record().unwrap().values, vec![100]);
  }

  #[test]
  fn float_values_scale_into_words() {
    let mut register = lookup_writable("batt_float_v").unwrap();
    assert_eq!(register.set("55.4").unwrap(), &[5540]);
    assert!(register.set("70").is_err());
  }

  #[test]
  fn times_pack_hour_and_minute() {
    let mut register = lookup_writable("sell_point_t3").unwrap();
    assert_eq!(register.set("06:30").unwrap(), &[630]);
    assert!(register.set("24:00").is_err());
    assert!(register.set("630").is_err());
  }

  #[test]
  fn charge_flags_accept_names_and_numbers() {
    let mut register = lookup_writable("charge_point_t1").unwrap();
    assert_eq!(register.set("grid").unwrap(), &[1]);
    assert_eq!(register.set("both").unwrap(), &[3]);
    assert_eq!(register.set("2").unwrap(), &[2]);
    assert!(register.set("4").is_err());
  }

  #[test]
  fn device_clock_packs_three_words() {
    let mut register = lookup_writable("inverter_time").unwrap();
    let words = register.set("2024-03-05 13:30:25").unwrap();
    assert_eq!(words, &[(24 << 8) | 3, (5 << 8) | 13, (30 << 8) | 25]);
  }
}
