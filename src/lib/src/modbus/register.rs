use std::fmt::Display;

use rust_decimal::Decimal;
use tokio_modbus::Quantity;

use super::span::*;

pub trait RegisterStorage {
  fn quantity(&self) -> Quantity;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRegisterKind {
  /// Divisor applied to the raw value, e.g. 10 turns 800 into 80.
  pub scale: Option<Decimal>,
  /// Subtracted from the raw value before scaling.
  pub offset: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringRegisterKind {
  pub length: Quantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumRegisterKind {
  pub names: &'static [(u16, &'static str)],
  pub fallback: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsRegisterKind {
  pub flags: &'static [(u8, &'static str)],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterKindStorage {
  U16(NumericRegisterKind),
  S16(NumericRegisterKind),
  U32(NumericRegisterKind),
  S32(NumericRegisterKind),
  Bool,
  Enum16(EnumRegisterKind),
  Bits(BitsRegisterKind),
  /// Packed hour by minute time of day, hour * 100 + minute.
  TimePoint,
  String(StringRegisterKind),
  /// Device clock, three words of packed calendar bytes.
  Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterValue<T> {
  pub value: T,
  pub raw: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValueStorage {
  U16(RegisterValue<Decimal>),
  S16(RegisterValue<Decimal>),
  U32(RegisterValue<Decimal>),
  S32(RegisterValue<Decimal>),
  Bool(RegisterValue<bool>),
  Enum16(RegisterValue<&'static str>),
  Bits(RegisterValue<Vec<(&'static str, bool)>>),
  TimePoint(RegisterValue<String>),
  String(RegisterValue<String>),
  Time(RegisterValue<chrono::NaiveDateTime>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingRegister<T: RegisterStorage> {
  pub address: tokio_modbus::Address,
  pub storage: T,
  pub name: &'static str,
  pub suffix: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
  #[error("register {0} does not hold a numeric value")]
  NotNumeric(&'static str),
}

impl NumericRegisterKind {
  pub const PLAIN: NumericRegisterKind = NumericRegisterKind {
    scale: None,
    offset: None,
  };

  fn apply(&self, value: Decimal) -> Decimal {
    let value = match self.offset {
      Some(offset) => value - offset,
      None => value,
    };
    match self.scale {
      Some(scale) if scale != Decimal::ONE => (value / scale).round_dp(2),
      _ => value,
    }
  }
}

impl RegisterStorage for RegisterKindStorage {
  fn quantity(&self) -> Quantity {
    match self {
      RegisterKindStorage::U16(_) => 1,
      RegisterKindStorage::S16(_) => 1,
      RegisterKindStorage::U32(_) => 2,
      RegisterKindStorage::S32(_) => 2,
      RegisterKindStorage::Bool => 1,
      RegisterKindStorage::Enum16(_) => 1,
      RegisterKindStorage::Bits(_) => 1,
      RegisterKindStorage::TimePoint => 1,
      RegisterKindStorage::String(StringRegisterKind { length }) => *length,
      RegisterKindStorage::Time => 3,
    }
  }
}

impl RegisterValueStorage {
  pub fn raw(&self) -> &[u16] {
    match self {
      RegisterValueStorage::U16(storage) => &storage.raw,
      RegisterValueStorage::S16(storage) => &storage.raw,
      RegisterValueStorage::U32(storage) => &storage.raw,
      RegisterValueStorage::S32(storage) => &storage.raw,
      RegisterValueStorage::Bool(storage) => &storage.raw,
      RegisterValueStorage::Enum16(storage) => &storage.raw,
      RegisterValueStorage::Bits(storage) => &storage.raw,
      RegisterValueStorage::TimePoint(storage) => &storage.raw,
      RegisterValueStorage::String(storage) => &storage.raw,
      RegisterValueStorage::Time(storage) => &storage.raw,
    }
  }

  pub fn scaled(&self) -> Option<Decimal> {
    match self {
      RegisterValueStorage::U16(storage) => Some(storage.value),
      RegisterValueStorage::S16(storage) => Some(storage.value),
      RegisterValueStorage::U32(storage) => Some(storage.value),
      RegisterValueStorage::S32(storage) => Some(storage.value),
      _ => None,
    }
  }

  pub fn serialize(&self) -> serde_json::Value {
    match self {
      RegisterValueStorage::U16(storage) => serde_json::json!(storage.value),
      RegisterValueStorage::S16(storage) => serde_json::json!(storage.value),
      RegisterValueStorage::U32(storage) => serde_json::json!(storage.value),
      RegisterValueStorage::S32(storage) => serde_json::json!(storage.value),
      RegisterValueStorage::Bool(storage) => serde_json::json!(storage.value),
      RegisterValueStorage::Enum16(storage) => {
        serde_json::json!(storage.value)
      }
      RegisterValueStorage::Bits(storage) => serde_json::Value::Object(
        storage
          .value
          .iter()
          .map(|(flag, set)| ((*flag).to_owned(), serde_json::json!(set)))
          .collect::<serde_json::Map<_, _>>(),
      ),
      RegisterValueStorage::TimePoint(storage) => {
        serde_json::json!(storage.value)
      }
      RegisterValueStorage::String(storage) => {
        serde_json::json!(storage.value)
      }
      RegisterValueStorage::Time(storage) => {
        serde_json::json!(storage.value.to_string())
      }
    }
  }
}

impl RegisterStorage for RegisterValueStorage {
  fn quantity(&self) -> Quantity {
    self.raw().len() as Quantity
  }
}

impl Display for RegisterValueStorage {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> Result<(), std::fmt::Error> {
    match self {
      RegisterValueStorage::U16(storage) => Display::fmt(&storage.value, f),
      RegisterValueStorage::S16(storage) => Display::fmt(&storage.value, f),
      RegisterValueStorage::U32(storage) => Display::fmt(&storage.value, f),
      RegisterValueStorage::S32(storage) => Display::fmt(&storage.value, f),
      RegisterValueStorage::Bool(storage) => {
        f.write_str(if storage.value { "Active" } else { "Inactive" })
      }
      RegisterValueStorage::Enum16(storage) => f.write_str(storage.value),
      RegisterValueStorage::Bits(storage) => {
        let flags = storage
          .value
          .iter()
          .map(|(flag, set)| {
            format!("{}: {}", flag, if *set { "On" } else { "Off" })
          })
          .collect::<Vec<_>>()
          .join(", ");
        f.write_str(flags.as_str())
      }
      RegisterValueStorage::TimePoint(storage) => {
        f.write_str(storage.value.as_str())
      }
      RegisterValueStorage::String(storage) => {
        f.write_str(storage.value.as_str())
      }
      RegisterValueStorage::Time(storage) => Display::fmt(&storage.value, f),
    }
  }
}

impl<T: RegisterStorage> Span for HoldingRegister<T> {
  fn address(&self) -> tokio_modbus::Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    self.storage.quantity()
  }
}

impl Display for HoldingRegister<RegisterValueStorage> {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> Result<(), std::fmt::Error> {
    Display::fmt(&self.storage, f)
  }
}

/// Low word sits at the lower address, high word above it.
fn combine_words(raw: &[u16]) -> u32 {
  raw
    .iter()
    .enumerate()
    .fold(0u32, |acc, (index, word)| {
      acc | (u32::from(*word) << (16 * index))
    })
}

/// Each word carries two ASCII bytes, high byte first.
fn word_bytes(raw: &[u16]) -> Vec<u8> {
  raw
    .iter()
    .flat_map(|word| [(word >> 8) as u8, (word & 0xFF) as u8])
    .collect()
}

fn packed_time(word: u16) -> String {
  format!("{:02}:{:02}", word / 100, word % 100)
}

impl SpanParser<HoldingRegister<RegisterValueStorage>>
  for HoldingRegister<RegisterKindStorage>
{
  fn parse<TIntoIterator>(
    &self,
    data: TIntoIterator,
  ) -> anyhow::Result<HoldingRegister<RegisterValueStorage>>
  where
    TIntoIterator: IntoIterator<Item = u16>,
  {
    let quantity = self.storage.quantity() as usize;
    let raw = data.into_iter().take(quantity).collect::<Vec<_>>();
    if raw.len() != quantity {
      return Err(anyhow::anyhow!(
        "register {} at {} expected {} words, got {}",
        self.name,
        self.address,
        quantity,
        raw.len()
      ));
    }

    let storage = match self.storage {
      RegisterKindStorage::U16(kind) => {
        RegisterValueStorage::U16(RegisterValue {
          value: kind.apply(Decimal::from(raw[0])),
          raw,
        })
      }
      RegisterKindStorage::S16(kind) => {
        RegisterValueStorage::S16(RegisterValue {
          value: kind.apply(Decimal::from(raw[0] as i16)),
          raw,
        })
      }
      RegisterKindStorage::U32(kind) => {
        RegisterValueStorage::U32(RegisterValue {
          value: kind.apply(Decimal::from(combine_words(&raw))),
          raw,
        })
      }
      RegisterKindStorage::S32(kind) => {
        RegisterValueStorage::S32(RegisterValue {
          value: kind.apply(Decimal::from(combine_words(&raw) as i32)),
          raw,
        })
      }
      RegisterKindStorage::Bool => RegisterValueStorage::Bool(RegisterValue {
        value: raw[0] == 1,
        raw,
      }),
      RegisterKindStorage::Enum16(kind) => {
        let value = kind
          .names
          .iter()
          .find(|(discriminant, _)| *discriminant == raw[0])
          .map(|(_, name)| *name)
          .unwrap_or(kind.fallback);
        RegisterValueStorage::Enum16(RegisterValue { value, raw })
      }
      RegisterKindStorage::Bits(kind) => {
        let value = kind
          .flags
          .iter()
          .map(|(bit, flag)| (*flag, raw[0] & (1 << bit) != 0))
          .collect::<Vec<_>>();
        RegisterValueStorage::Bits(RegisterValue { value, raw })
      }
      RegisterKindStorage::TimePoint => {
        RegisterValueStorage::TimePoint(RegisterValue {
          value: packed_time(raw[0]),
          raw,
        })
      }
      RegisterKindStorage::String(_) => {
        let value = String::from_utf8(word_bytes(&raw))?;
        RegisterValueStorage::String(RegisterValue { value, raw })
      }
      RegisterKindStorage::Time => {
        let bytes = word_bytes(&raw);
        let value = chrono::NaiveDate::from_ymd_opt(
          2000 + i32::from(bytes[0]),
          u32::from(bytes[1]),
          u32::from(bytes[2]),
        )
        .and_then(|date| {
          date.and_hms_opt(
            u32::from(bytes[3]),
            u32::from(bytes[4]),
            u32::from(bytes[5]),
          )
        })
        .unwrap_or_default();
        RegisterValueStorage::Time(RegisterValue { value, raw })
      }
    };

    Ok(HoldingRegister {
      address: self.address,
      storage,
      name: self.name,
      suffix: self.suffix,
    })
  }
}

impl SpanParser<HoldingRegister<RegisterValueStorage>>
  for &HoldingRegister<RegisterKindStorage>
{
  fn parse<TIntoIterator>(
    &self,
    data: TIntoIterator,
  ) -> anyhow::Result<HoldingRegister<RegisterValueStorage>>
  where
    TIntoIterator: IntoIterator<Item = u16>,
  {
    <HoldingRegister<RegisterKindStorage> as SpanParser<
      HoldingRegister<RegisterValueStorage>,
    >>::parse(*self, data)
  }
}

impl HoldingRegister<RegisterValueStorage> {
  /// Redisplay the raw value with an alternate divisor and unit prefix,
  /// e.g. divide watts by 1000 and prefix the suffix with `k`. The stored
  /// value stays untouched.
  pub fn rescaled(
    &self,
    scale: Decimal,
    prefix: &str,
  ) -> Result<(Decimal, String), FormatError> {
    let unscaled = match &self.storage {
      RegisterValueStorage::U16(storage) => Decimal::from(storage.raw[0]),
      RegisterValueStorage::S16(storage) => {
        Decimal::from(storage.raw[0] as i16)
      }
      RegisterValueStorage::U32(storage) => {
        Decimal::from(combine_words(&storage.raw))
      }
      RegisterValueStorage::S32(storage) => {
        Decimal::from(combine_words(&storage.raw) as i32)
      }
      _ => return Err(FormatError::NotNumeric(self.name)),
    };

    Ok((
      (unscaled / scale).round_dp(3),
      format!("{prefix}{}", self.suffix),
    ))
  }
}

pub fn serialize_registers<
  TIntoIterator: IntoIterator<Item = HoldingRegister<RegisterValueStorage>>,
>(
  registers: TIntoIterator,
) -> serde_json::Value {
  serde_json::Value::Object(
    registers
      .into_iter()
      .map(|register| {
        (register.name.to_owned(), register.storage.serialize())
      })
      .collect::<serde_json::Map<String, serde_json::Value>>(),
  )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  fn register(
    storage: RegisterKindStorage,
  ) -> HoldingRegister<RegisterKindStorage> {
    HoldingRegister {
      address: 590,
      storage,
      name: "battery_out_power",
      suffix: "W",
    }
  }

  #[test]
  fn scaled_u16_divides_by_ten() {
    let kind = register(RegisterKindStorage::U16(NumericRegisterKind {
      scale: Some(dec!(10)),
      offset: None,
    }));
    let value = kind.parse([800u16]).unwrap();
    assert_eq!(value.storage.scaled(), Some(dec!(80.0)));
  }

  #[test]
  fn rescaled_overrides_scale_and_prefixes_suffix() {
    let kind = register(RegisterKindStorage::U16(NumericRegisterKind {
      scale: Some(dec!(10)),
      offset: None,
    }));
    let value = kind.parse([800u16]).unwrap();
    let (rescaled, suffix) = value.rescaled(dec!(1000), "k").unwrap();
    assert_eq!(rescaled, dec!(0.8));
    assert_eq!(suffix, "kW");
  }

  #[test]
  fn rescaled_rejects_non_numeric_kinds() {
    let kind = register(RegisterKindStorage::Bool);
    let value = kind.parse([1u16]).unwrap();
    assert!(value.rescaled(dec!(1000), "k").is_err());
  }

  #[test]
  fn signed_word_uses_twos_complement() {
    let kind =
      register(RegisterKindStorage::S16(NumericRegisterKind::PLAIN));
    let value = kind.parse([0xFFD9u16]).unwrap();
    assert_eq!(value.storage.scaled(), Some(dec!(-39)));
  }

  #[test]
  fn signed_double_word_combines_low_word_first() {
    let kind =
      register(RegisterKindStorage::S32(NumericRegisterKind::PLAIN));
    let value = kind.parse([0xFFD9u16, 0xFFFFu16]).unwrap();
    assert_eq!(value.storage.scaled(), Some(dec!(-39)));
  }

  #[test]
  fn unsigned_double_word_combines_low_word_first() {
    let kind = register(RegisterKindStorage::U32(NumericRegisterKind {
      scale: Some(dec!(10)),
      offset: None,
    }));
    let value = kind.parse([0x0001u16, 0x0001u16]).unwrap();
    assert_eq!(value.storage.scaled(), Some(dec!(6553.7)));
  }

  #[test]
  fn offset_applies_before_scale() {
    let kind = register(RegisterKindStorage::U16(NumericRegisterKind {
      scale: Some(dec!(10)),
      offset: Some(dec!(1000)),
    }));
    let value = kind.parse([1253u16]).unwrap();
    assert_eq!(value.storage.scaled(), Some(dec!(25.3)));
  }

  #[test]
  fn string_register_unpacks_two_chars_per_word() {
    let kind = register(RegisterKindStorage::String(StringRegisterKind {
      length: 2,
    }));
    let value = kind.parse([0x3231u16, 0x3334u16]).unwrap();
    assert_eq!(value.storage.to_string(), "2134");
  }

  #[test]
  fn time_point_formats_packed_hour_minute() {
    let kind = register(RegisterKindStorage::TimePoint);
    let value = kind.parse([630u16]).unwrap();
    assert_eq!(value.storage.to_string(), "06:30");
  }

  #[test]
  fn short_response_is_an_error() {
    let kind =
      register(RegisterKindStorage::S32(NumericRegisterKind::PLAIN));
    assert!(kind.parse([0xFFFFu16]).is_err());
  }
}
