use std::fmt::Display;
use std::ops::RangeInclusive;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_modbus::{Address, Quantity};

use crate::modbus::{SimpleRecord, SimpleSpan};

/// First word of the program block.
pub const PROGRAM_ADDRESS: Address = 148;
/// Six slots, five stripes: times, watts, volts, SOC, charge flags.
pub const PROGRAM_QUANTITY: Quantity = 30;

pub const SLOT_COUNT: usize = 6;

/// The inverter keeps slot boundaries on half hours.
const STEP_MINUTES: u16 = 30;
const DEFAULT_POWER_LIMIT: RangeInclusive<u16> = 0..=12_000;
const MAX_VOLTAGE: u8 = 63;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotTime {
  pub hour: u8,
  pub minute: u8,
}

impl SlotTime {
  pub fn new(hour: u8, minute: u8) -> Result<Self, ScheduleError> {
    if hour > 23 || minute > 59 {
      return Err(ScheduleError::Time(format!("{hour:02}:{minute:02}")));
    }
    Ok(Self { hour, minute })
  }

  pub fn parse(text: &str) -> Result<Self, ScheduleError> {
    let error = || ScheduleError::Time(text.to_owned());
    let (hour, minute) = text.trim().split_once(':').ok_or_else(error)?;
    Self::new(
      hour.parse().map_err(|_| error())?,
      minute.parse().map_err(|_| error())?,
    )
  }

  pub const MIDNIGHT: SlotTime = SlotTime { hour: 0, minute: 0 };

  /// Wire form, hour * 100 + minute. Decoding is deliberately lenient so
  /// whatever the device reports survives a round trip.
  pub fn from_packed(word: u16) -> Self {
    Self {
      hour: (word / 100) as u8,
      minute: (word % 100) as u8,
    }
  }

  pub fn packed(self) -> u16 {
    u16::from(self.hour) * 100 + u16::from(self.minute)
  }

  fn minutes(self) -> u16 {
    u16::from(self.hour) * 60 + u16::from(self.minute)
  }
}

impl Display for SlotTime {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> Result<(), std::fmt::Error> {
    write!(f, "{:02}:{:02}", self.hour, self.minute)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SellSlot {
  pub index: usize,
  pub start: SlotTime,
  pub power: u16,
  pub voltage: Decimal,
  pub soc: u16,
  pub grid_charge: bool,
  pub generator_charge: bool,
}

/// One slot's worth of changes. Unset fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct SlotUpdate {
  pub start: Option<SlotTime>,
  pub power: Option<u16>,
  pub voltage: Option<Decimal>,
  pub soc: Option<u16>,
  pub grid_charge: Option<bool>,
  pub generator_charge: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
  #[error("expected {expected} program words, got {got}")]
  Truncated { expected: usize, got: usize },

  #[error("no program slot {0}")]
  Slot(usize),

  #[error("invalid time {0}")]
  Time(String),

  #[error("time {time} is not on the {step} minute grid")]
  OffGrid { time: SlotTime, step: u16 },

  #[error("slot {index} start {start} conflicts with slot {neighbour} at {boundary}")]
  Conflict {
    index: usize,
    start: SlotTime,
    neighbour: usize,
    boundary: SlotTime,
  },

  #[error("slot {index} power {power} W outside {low}..={high} W")]
  Power {
    index: usize,
    power: u16,
    low: u16,
    high: u16,
  },

  #[error("slot {index} state of charge {soc} % above 100 %")]
  Soc { index: usize, soc: u16 },

  #[error("slot {index} voltage {voltage} V outside 0..={high} V")]
  Voltage {
    index: usize,
    voltage: Decimal,
    high: u8,
  },
}

/// The six daily charge and discharge programs of the inverter, held in
/// memory between an explicit load from the device and an explicit upload.
#[derive(Clone, Debug, PartialEq)]
pub struct SellProgram {
  slots: [SellSlot; SLOT_COUNT],
  power_limit: RangeInclusive<u16>,
  dirty: bool,
}

impl SellProgram {
  /// Decode the packed program block. The device's state is taken as is;
  /// invariants are only enforced when a slot changes.
  pub fn load(raw: &[u16]) -> Result<Self, ScheduleError> {
    if raw.len() < PROGRAM_QUANTITY as usize {
      return Err(ScheduleError::Truncated {
        expected: PROGRAM_QUANTITY as usize,
        got: raw.len(),
      });
    }

    let slots = core::array::from_fn(|index| SellSlot {
      index,
      start: SlotTime::from_packed(raw[index]),
      power: raw[SLOT_COUNT + index],
      voltage: Decimal::from(raw[2 * SLOT_COUNT + index])
        / Decimal::from(100),
      soc: raw[3 * SLOT_COUNT + index],
      grid_charge: raw[4 * SLOT_COUNT + index] & 0b01 != 0,
      generator_charge: raw[4 * SLOT_COUNT + index] & 0b10 != 0,
    });

    Ok(Self {
      slots,
      power_limit: DEFAULT_POWER_LIMIT,
      dirty: false,
    })
  }

  /// Override the watt range accepted for slot power, e.g. for a bigger
  /// device family.
  pub fn with_power_limit(mut self, limit: RangeInclusive<u16>) -> Self {
    self.power_limit = limit;
    self
  }

  pub fn slots(&self) -> &[SellSlot] {
    &self.slots
  }

  pub fn slot(&self, index: usize) -> Result<&SellSlot, ScheduleError> {
    self.slots.get(index).ok_or(ScheduleError::Slot(index))
  }

  /// A slot runs until the next slot starts; the last one wraps to
  /// midnight.
  pub fn end_of(&self, index: usize) -> SlotTime {
    self.slots[(index + 1) % SLOT_COUNT].start
  }

  /// True once any slot changed and the program no longer matches what the
  /// device last reported.
  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Call after a successful upload.
  pub fn mark_synced(&mut self) {
    self.dirty = false;
  }

  /// Change one slot. Everything validates before anything mutates, so a
  /// rejected update leaves the program untouched. Moving a start time
  /// implicitly moves the previous slot's end; it must stay strictly
  /// between both neighbours' starts and conflicts reject instead of
  /// cascading into further slots. Slot 0 always starts at midnight.
  pub fn update_slot(
    &mut self,
    index: usize,
    update: SlotUpdate,
  ) -> Result<(), ScheduleError> {
    if index >= SLOT_COUNT {
      return Err(ScheduleError::Slot(index));
    }

    if let Some(start) = update.start {
      if start.minutes() % STEP_MINUTES != 0 {
        return Err(ScheduleError::OffGrid {
          time: start,
          step: STEP_MINUTES,
        });
      }
      if index == 0 {
        if start != SlotTime::MIDNIGHT {
          return Err(ScheduleError::Conflict {
            index,
            start,
            neighbour: SLOT_COUNT - 1,
            boundary: SlotTime::MIDNIGHT,
          });
        }
      } else {
        let previous = self.slots[index - 1].start;
        if start <= previous {
          return Err(ScheduleError::Conflict {
            index,
            start,
            neighbour: index - 1,
            boundary: previous,
          });
        }
        if index < SLOT_COUNT - 1 {
          let next = self.slots[index + 1].start;
          if start >= next {
            return Err(ScheduleError::Conflict {
              index,
              start,
              neighbour: index + 1,
              boundary: next,
            });
          }
        }
      }
    }

    if let Some(power) = update.power {
      if !self.power_limit.contains(&power) {
        return Err(ScheduleError::Power {
          index,
          power,
          low: *self.power_limit.start(),
          high: *self.power_limit.end(),
        });
      }
    }

    if let Some(soc) = update.soc {
      if soc > 100 {
        return Err(ScheduleError::Soc { index, soc });
      }
    }

    if let Some(voltage) = update.voltage {
      if voltage < Decimal::ZERO || voltage > Decimal::from(MAX_VOLTAGE) {
        return Err(ScheduleError::Voltage {
          index,
          voltage,
          high: MAX_VOLTAGE,
        });
      }
    }

    let slot = &mut self.slots[index];
    if let Some(start) = update.start {
      slot.start = start;
    }
    if let Some(power) = update.power {
      slot.power = power;
    }
    if let Some(voltage) = update.voltage {
      slot.voltage = voltage;
    }
    if let Some(soc) = update.soc {
      slot.soc = soc;
    }
    if let Some(grid_charge) = update.grid_charge {
      slot.grid_charge = grid_charge;
    }
    if let Some(generator_charge) = update.generator_charge {
      slot.generator_charge = generator_charge;
    }
    self.dirty = true;

    Ok(())
  }

  /// The exact inverse of `load`: times, watts, volts, SOC, then charge
  /// flags, one word per slot per stripe.
  pub fn encode(&self) -> Vec<u16> {
    let mut words = Vec::with_capacity(PROGRAM_QUANTITY as usize);
    words.extend(self.slots.iter().map(|slot| slot.start.packed()));
    words.extend(self.slots.iter().map(|slot| slot.power));
    words.extend(self.slots.iter().map(|slot| {
      (slot.voltage * Decimal::from(100))
        .round()
        .to_u16()
        .unwrap_or(0)
    }));
    words.extend(self.slots.iter().map(|slot| slot.soc));
    words.extend(self.slots.iter().map(|slot| {
      u16::from(slot.grid_charge) | (u16::from(slot.generator_charge) << 1)
    }));
    words
  }

  pub fn span() -> SimpleSpan {
    SimpleSpan {
      address: PROGRAM_ADDRESS,
      quantity: PROGRAM_QUANTITY,
    }
  }

  /// The batched write payload for an upload.
  pub fn record(&self) -> SimpleRecord {
    SimpleRecord {
      address: PROGRAM_ADDRESS,
      values: self.encode(),
    }
  }

  /// The schedule the way the inverter screen shows it.
  pub fn render(&self) -> String {
    let mut screen = String::new();
    screen.push_str(&"_".repeat(52));
    screen.push('\n');
    screen.push_str(&format!(
      "| {:^5} | {:^5} |  {:^12} | {:^8} | {:^5}% |\n",
      "Grid", "Gen", "Time", "Pwr", "SOC"
    ));
    for slot in &self.slots {
      let grid = if slot.grid_charge { "✓" } else { "" };
      let generator = if slot.generator_charge { "✓" } else { "" };
      screen.push_str(&format!(
        "| {:^5} | {:^5} | {:>5} | {:>5} | {:>8} | {:>5}% |\n",
        grid,
        generator,
        slot.start.to_string(),
        self.end_of(slot.index).to_string(),
        slot.power,
        slot.soc
      ));
    }
    screen.push_str(&"-".repeat(52));
    screen
  }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  // 00:00 03:00 04:00 05:00 10:00 23:00, one flag word per slot.
  fn words() -> Vec<u16> {
    let mut words = vec![0, 300, 400, 500, 1000, 2300];
    words.extend([3500u16; 6]);
    words.extend([4900u16; 6]);
    words.extend([100, 30, 30, 30, 100, 30]);
    words.extend([0, 0, 0, 0, 1, 2]);
    words
  }

  #[test]
  fn load_decodes_every_stripe() {
    let program = SellProgram::load(&words()).unwrap();
    let slot = program.slot(4).unwrap();
    assert_eq!(slot.start, SlotTime::new(10, 0).unwrap());
    assert_eq!(slot.power, 3500);
    assert_eq!(slot.voltage, dec!(49));
    assert_eq!(slot.soc, 100);
    assert!(slot.grid_charge);
    assert!(!slot.generator_charge);
    assert!(program.slot(5).unwrap().generator_charge);
    assert!(!program.is_dirty());
  }

  #[test]
  fn load_rejects_short_blocks() {
    assert!(matches!(
      SellProgram::load(&words()[..20]),
      Err(ScheduleError::Truncated { .. })
    ));
  }

  #[test]
  fn encode_round_trips() {
    let raw = words();
    let program = SellProgram::load(&raw).unwrap();
    assert_eq!(program.encode(), raw);
    assert_eq!(SellProgram::load(&program.encode()).unwrap(), program);
  }

  #[test]
  fn moving_a_start_moves_the_previous_slots_end() {
    let mut program = SellProgram::load(&words()).unwrap();
    assert_eq!(program.end_of(2), SlotTime::new(5, 0).unwrap());

    let update = SlotUpdate {
      start: Some(SlotTime::parse("06:30").unwrap()),
      ..SlotUpdate::default()
    };
    program.update_slot(3, update).unwrap();

    assert_eq!(program.end_of(2), SlotTime::new(6, 30).unwrap());
    assert_eq!(
      program.slot(3).unwrap().start,
      SlotTime::new(6, 30).unwrap()
    );
    assert_eq!(
      program.slot(4).unwrap().start,
      SlotTime::new(10, 0).unwrap()
    );
    assert!(program.is_dirty());
  }

  #[test]
  fn conflicting_start_rejects_and_leaves_the_program_alone() {
    let mut program = SellProgram::load(&words()).unwrap();
    let before = program.clone();

    let update = SlotUpdate {
      start: Some(SlotTime::parse("10:30").unwrap()),
      power: Some(2000),
      ..SlotUpdate::default()
    };
    assert!(matches!(
      program.update_slot(3, update),
      Err(ScheduleError::Conflict { neighbour: 4, .. })
    ));
    assert_eq!(program, before);
    assert!(!program.is_dirty());
  }

  #[test]
  fn slot_zero_start_is_pinned_to_midnight() {
    let mut program = SellProgram::load(&words()).unwrap();
    let update = SlotUpdate {
      start: Some(SlotTime::parse("01:00").unwrap()),
      ..SlotUpdate::default()
    };
    assert!(program.update_slot(0, update).is_err());
  }

  #[test]
  fn off_grid_times_reject() {
    let mut program = SellProgram::load(&words()).unwrap();
    let update = SlotUpdate {
      start: Some(SlotTime::parse("06:15").unwrap()),
      ..SlotUpdate::default()
    };
    assert!(matches!(
      program.update_slot(3, update),
      Err(ScheduleError::OffGrid { .. })
    ));
  }

  #[test]
  fn power_and_soc_limits_hold() {
    let mut program = SellProgram::load(&words()).unwrap();
    let update = SlotUpdate {
      power: Some(13_000),
      ..SlotUpdate::default()
    };
    assert!(matches!(
      program.update_slot(1, update),
      Err(ScheduleError::Power { .. })
    ));

    let update = SlotUpdate {
      soc: Some(101),
      ..SlotUpdate::default()
    };
    assert!(matches!(
      program.update_slot(1, update),
      Err(ScheduleError::Soc { .. })
    ));

    let mut program = program.with_power_limit(0..=16_000);
    let update = SlotUpdate {
      power: Some(13_000),
      ..SlotUpdate::default()
    };
    assert!(program.update_slot(1, update).is_ok());
  }

  #[test]
  fn flag_updates_touch_only_their_slot() {
    let mut program = SellProgram::load(&words()).unwrap();
    let update = SlotUpdate {
      grid_charge: Some(true),
      generator_charge: Some(true),
      ..SlotUpdate::default()
    };
    program.update_slot(2, update).unwrap();
    assert!(program.slot(2).unwrap().grid_charge);
    assert!(program.slot(2).unwrap().generator_charge);
    assert!(!program.slot(1).unwrap().grid_charge);
    assert_eq!(program.encode()[4 * SLOT_COUNT + 2], 3);
  }

  #[test]
  fn upload_payload_targets_the_program_block() {
    let mut program = SellProgram::load(&words()).unwrap();
    let update = SlotUpdate {
      power: Some(2500),
      ..SlotUpdate::default()
    };
    program.update_slot(3, update).unwrap();

    let record = program.record();
    assert_eq!(record.address, PROGRAM_ADDRESS);
    assert_eq!(record.values.len(), PROGRAM_QUANTITY as usize);

    program.mark_synced();
    assert!(!program.is_dirty());
  }

  #[test]
  fn render_shows_windows_and_checkmarks() {
    let program = SellProgram::load(&words()).unwrap();
    let screen = program.render();
    assert!(screen.contains("| 05:00 | 10:00 |"));
    assert!(screen.contains("| 23:00 | 00:00 |"));
    assert!(screen.contains('✓'));
  }
}
