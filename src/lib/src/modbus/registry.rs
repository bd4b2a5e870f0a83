use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use tokio_modbus::Address;

use super::register::*;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
  #[error("no register named {0}")]
  NotFound(String),
}

const INVERTER_TYPE: EnumRegisterKind = EnumRegisterKind {
  names: &[
    (2, "Inverter"),
    (3, "Hybrid"),
    (4, "Microinverter"),
    (5, "Hybrid3Phase"),
  ],
  fallback: "Unknown",
};

const INVERTER_STATE: EnumRegisterKind = EnumRegisterKind {
  names: &[
    (0, "StandBy"),
    (1, "SelfCheck"),
    (2, "Normal"),
    (3, "Alarm"),
    (4, "Fault"),
  ],
  fallback: "Fault",
};

const CONTROL_MODE: EnumRegisterKind = EnumRegisterKind {
  names: &[(0, "LeadBattery"), (1, "LithiumBattery")],
  fallback: "LeadBattery",
};

const BATTERY_CONTROL_MODE: EnumRegisterKind = EnumRegisterKind {
  names: &[(0, "ByVoltage"), (1, "ByCapacity"), (2, "NoBattery")],
  fallback: "Error",
};

const BMS_MODE: EnumRegisterKind = EnumRegisterKind {
  names: &[
    (0, "PYLONTech_CAN"),
    (1, "SACRED_SUN_FOXX"),
    (2, "KOK"),
    (3, "Keith"),
    (4, "TopPay"),
    (5, "PYLONTech_485"),
    (13, "VISIONGroup_CAN"),
    (14, "WattSonic"),
  ],
  fallback: "PYLONTech_CAN",
};

const GEN_PORT_MODE: EnumRegisterKind = EnumRegisterKind {
  names: &[(0, "GenInput"), (1, "SmartLoad"), (2, "MicroInverter")],
  fallback: "GenInput",
};

const WORK_MODE: EnumRegisterKind = EnumRegisterKind {
  names: &[
    (0, "SellingFirst"),
    (1, "ZeroExportToLoad"),
    (2, "ZeroExportToCT"),
  ],
  fallback: "SellingFirst",
};

const GRID_FREQUENCY: EnumRegisterKind = EnumRegisterKind {
  names: &[(0, "50"), (1, "60")],
  fallback: "50",
};

const CHARGE_GRID_GEN: EnumRegisterKind = EnumRegisterKind {
  names: &[
    (0, "Disabled"),
    (1, "Grid"),
    (2, "Generator"),
    (3, "GridAndGenerator"),
  ],
  fallback: "Disabled",
};

const TIME_OF_USE: BitsRegisterKind = BitsRegisterKind {
  flags: &[
    (0, "Enabled"),
    (1, "Monday"),
    (2, "Tuesday"),
    (3, "Wednesday"),
    (4, "Thursday"),
    (5, "Friday"),
    (6, "Saturday"),
    (7, "Sunday"),
  ],
};

const EXPORT_CUTOFF: BitsRegisterKind = BitsRegisterKind {
  flags: &[
    (0, "Enabled"),
    (2, "GeneratorPeakShaving"),
    (4, "GridPeakShaving"),
    (6, "OnGridAlwaysOn"),
    (8, "ExternalRelay"),
    (10, "ReportLossOfLithium"),
  ],
};

const AC_RELAYS: BitsRegisterKind = BitsRegisterKind {
  flags: &[
    (0, "Inverter"),
    (2, "Grid"),
    (3, "Generator"),
    (4, "GridPower"),
    (7, "DryContact-1"),
    (8, "DryContact-2"),
  ],
};

const WARN_1: BitsRegisterKind = BitsRegisterKind {
  flags: &[(1, "Fan-Warning"), (2, "Wrong-Phase")],
};

const WARN_2: BitsRegisterKind = BitsRegisterKind {
  flags: &[(14, "BMS-COMM-Lost"), (15, "Parallel-COMM-Lost")],
};

type KindRegister = HoldingRegister<RegisterKindStorage>;

fn register(
  address: Address,
  storage: RegisterKindStorage,
  name: &'static str,
  suffix: &'static str,
) -> KindRegister {
  HoldingRegister {
    address,
    storage,
    name,
    suffix,
  }
}

fn int(
  address: Address,
  name: &'static str,
  suffix: &'static str,
) -> KindRegister {
  register(
    address,
    RegisterKindStorage::U16(NumericRegisterKind::PLAIN),
    name,
    suffix,
  )
}

fn int_signed(
  address: Address,
  name: &'static str,
  suffix: &'static str,
) -> KindRegister {
  register(
    address,
    RegisterKindStorage::S16(NumericRegisterKind::PLAIN),
    name,
    suffix,
  )
}

fn float(
  address: Address,
  name: &'static str,
  scale: i64,
  suffix: &'static str,
) -> KindRegister {
  register(
    address,
    RegisterKindStorage::U16(NumericRegisterKind {
      scale: Some(Decimal::from(scale)),
      offset: None,
    }),
    name,
    suffix,
  )
}

fn float_signed(
  address: Address,
  name: &'static str,
  scale: i64,
  suffix: &'static str,
) -> KindRegister {
  register(
    address,
    RegisterKindStorage::S16(NumericRegisterKind {
      scale: Some(Decimal::from(scale)),
      offset: None,
    }),
    name,
    suffix,
  )
}

fn long_unsigned(
  address: Address,
  name: &'static str,
  scale: i64,
  suffix: &'static str,
) -> KindRegister {
  register(
    address,
    RegisterKindStorage::U32(NumericRegisterKind {
      scale: Some(Decimal::from(scale)),
      offset: None,
    }),
    name,
    suffix,
  )
}

/// Temperatures report with a fixed offset of 100.0 degrees.
fn temperature(address: Address, name: &'static str) -> KindRegister {
  register(
    address,
    RegisterKindStorage::U16(NumericRegisterKind {
      scale: Some(Decimal::from(10)),
      offset: Some(Decimal::from(1000)),
    }),
    name,
    "°C",
  )
}

fn boolean(address: Address, name: &'static str) -> KindRegister {
  register(address, RegisterKindStorage::Bool, name, "")
}

fn enum16(
  address: Address,
  name: &'static str,
  kind: EnumRegisterKind,
  suffix: &'static str,
) -> KindRegister {
  register(address, RegisterKindStorage::Enum16(kind), name, suffix)
}

fn bits(
  address: Address,
  name: &'static str,
  kind: BitsRegisterKind,
) -> KindRegister {
  register(address, RegisterKindStorage::Bits(kind), name, "")
}

fn time_point(address: Address, name: &'static str) -> KindRegister {
  register(address, RegisterKindStorage::TimePoint, name, "")
}

static HOLDING: Lazy<Vec<KindRegister>> = Lazy::new(|| {
  vec![
    enum16(0, "device_type", INVERTER_TYPE, ""),
    int(1, "modbus_address", ""),
    register(
      3,
      RegisterKindStorage::String(StringRegisterKind { length: 5 }),
      "inverter_serial",
      "",
    ),
    int(8, "rated_power", ""),
    register(62, RegisterKindStorage::Time, "inverter_time", ""),
    int(74, "comm_address", ""),
    boolean(80, "switch_on_off"),
    enum16(98, "control_mode", CONTROL_MODE, ""),
    float(99, "batt_equalization_v", 100, "V"),
    float(100, "batt_absorbtion_v", 100, "V"),
    float(101, "batt_float_v", 100, "V"),
    int(102, "batt_capacity", "Ah"),
    float(103, "batt_empty_v", 100, "V"),
    int(104, "zero_export_power", "W"),
    int(107, "TEMPCO", "mV/*C"),
    int(108, "max_charge_amps", "A"),
    int(109, "max_discharge_amps", "A"),
    enum16(111, "battery_control_mode", BATTERY_CONTROL_MODE, ""),
    boolean(112, "battery_wake_up"),
    int(113, "battery_resistance", "mOhm"),
    float(114, "battery_charging_eff", 10, "%"),
    int(115, "battery_shutdown_capacity", "%"),
    int(116, "battery_recovery_capacity", "%"),
    int(117, "battery_low_capacity", "%"),
    float(118, "battery_shutdown_voltage", 100, "V"),
    float(119, "battery_restart_voltage", 100, "V"),
    float(120, "battery_low_voltage", 100, "V"),
    float(121, "gen_max_working_time", 10, "h"),
    float(122, "gen_cooling_time", 10, "h"),
    float(123, "gen_charge_start_voltage", 100, "V"),
    float(124, "gen_charge_start_soc", 100, "%"),
    int(125, "gen_charge_current", "A"),
    float(126, "grid_charge_start_voltage", 100, "V"),
    int(127, "grid_charge_start_soc", "%"),
    int(128, "grid_charge_current", "A"),
    enum16(133, "gen_port_use", GEN_PORT_MODE, ""),
    enum16(142, "work_mode", WORK_MODE, ""),
    int(143, "grid_max_output_pwr", "W"),
    boolean(145, "solar_sell"),
    bits(146, "sell_time_of_use", TIME_OF_USE),
    time_point(148, "sell_point_t1"),
    time_point(149, "sell_point_t2"),
    time_point(150, "sell_point_t3"),
    time_point(151, "sell_point_t4"),
    time_point(152, "sell_point_t5"),
    time_point(153, "sell_point_t6"),
    int(154, "sell_point_t1_watts", "W"),
    int(155, "sell_point_t2_watts", "W"),
    int(156, "sell_point_t3_watts", "W"),
    int(157, "sell_point_t4_watts", "W"),
    int(158, "sell_point_t5_watts", "W"),
    int(159, "sell_point_t6_watts", "W"),
    float(160, "sell_point_t1_volts", 100, "V"),
    float(161, "sell_point_t2_volts", 100, "V"),
    float(162, "sell_point_t3_volts", 100, "V"),
    float(163, "sell_point_t4_volts", 100, "V"),
    float(164, "sell_point_t5_volts", 100, "V"),
    float(165, "sell_point_t6_volts", 100, "V"),
    int(166, "sell_point_t1_soc", "%"),
    int(167, "sell_point_t2_soc", "%"),
    int(168, "sell_point_t3_soc", "%"),
    int(169, "sell_point_t4_soc", "%"),
    int(170, "sell_point_t5_soc", "%"),
    int(171, "sell_point_t6_soc", "%"),
    enum16(172, "charge_point_t1", CHARGE_GRID_GEN, ""),
    enum16(173, "charge_point_t2", CHARGE_GRID_GEN, ""),
    enum16(174, "charge_point_t3", CHARGE_GRID_GEN, ""),
    enum16(175, "charge_point_t4", CHARGE_GRID_GEN, ""),
    enum16(176, "charge_point_t5", CHARGE_GRID_GEN, ""),
    enum16(177, "charge_point_t6", CHARGE_GRID_GEN, ""),
    bits(178, "export_to_grid_cutoff", EXPORT_CUTOFF),
    enum16(183, "grid_freq_selection", GRID_FREQUENCY, "Hz"),
    float(185, "grid_high_voltage", 10, "V"),
    float(186, "grid_low_voltage", 10, "V"),
    float(187, "grid_high_frequency", 100, "Hz"),
    float(188, "grid_low_frequency", 100, "Hz"),
    boolean(189, "generator_to_grid"),
    int(190, "gen_peak_shaving_pwr", "W"),
    int(191, "grid_peak_shaving_pwr", "W"),
    int(192, "smart_load_open_delay", "Minutes"),
    float(193, "output_power_factor", 10, "%"),
    float(210, "bms_charged_voltage", 100, "V"),
    float(211, "bms_discharged_voltage", 100, "V"),
    int(212, "bms_charge_current_limit", "A"),
    int(213, "bms_discharge_current_limit", "A"),
    int(214, "bms_battery_SOC", "%"),
    float(215, "bms_battery_voltage", 100, "V"),
    int_signed(216, "bms_battery_current", "A"),
    temperature(217, "bms_battery_temp"),
    int(218, "bms_max_charge_current", "A"),
    int(219, "bms_max_discharge_current", "A"),
    boolean(220, "bms_battery_alarm"),
    int(221, "bms_battery_fault_location", ""),
    int(222, "bms_battery_symbol_2", ""),
    enum16(223, "bms_type", BMS_MODE, ""),
    int_signed(224, "bms_battery_soh", ""),
    int(340, "max_solar_sell_pwr", "W"),
    enum16(500, "inverter_state", INVERTER_STATE, ""),
    float(501, "active_power_today", 10, "kWh"),
    float(502, "reactive_power_today", 10, "kVarh"),
    float(503, "grid_connection_today", 60, "minutes"),
    float(514, "battery_charge_today", 10, "kWh"),
    float(515, "battery_discharge_today", 10, "kWh"),
    long_unsigned(516, "battery_charge_total", 10, "kWh"),
    long_unsigned(518, "battery_discharge_total", 10, "kWh"),
    float(520, "today_bought_from_grid", 10, "kWh"),
    float(521, "today_sold_to_grid", 10, "kWh"),
    long_unsigned(522, "total_bought_from_grid", 10, "kWh"),
    long_unsigned(524, "total_sold_to_grid", 10, "kWh"),
    float(526, "today_to_load", 10, "kWh"),
    long_unsigned(527, "total_to_load", 10, "kWh"),
    float(529, "today_from_pv", 10, "kWh"),
    float(530, "today_from_pv_s1", 10, "kWh"),
    float(531, "today_from_pv_s2", 10, "kWh"),
    float(532, "today_from_pv_s3", 10, "kWh"),
    float(533, "today_from_pv_s4", 10, "kWh"),
    long_unsigned(534, "total_from_pv", 10, "kWh"),
    float(536, "today_from_generator", 10, "kWh"),
    long_unsigned(537, "total_from_generator", 10, "kWh"),
    float(539, "generator_worktime_today", 10, "hours"),
    temperature(540, "dc_transformer_temp"),
    temperature(541, "heatsink_temp"),
    long_unsigned(545, "load_annual_consumption", 10, "kWh"),
    bits(552, "ac_relays", AC_RELAYS),
    bits(553, "warn_1", WARN_1),
    bits(554, "warn_2", WARN_2),
    float(586, "battery_temperature", 100, "°C"),
    float(587, "battery_voltage", 100, "V"),
    float(588, "battery_soc", 1, "%"),
    int_signed(590, "battery_out_power", "W"),
    float_signed(591, "battery_out_current", 100, "A"),
    int(592, "battery_corrected_ah", "Ah"),
    float(598, "grid_phase_A_volt", 10, "V"),
    float(599, "grid_phase_B_volt", 10, "V"),
    float(600, "grid_phase_C_volt", 10, "V"),
    float(601, "grid_phase_AB_volt", 10, "V"),
    float(602, "grid_phase_BC_volt", 10, "V"),
    float(603, "grid_phase_CA_volt", 10, "V"),
    int_signed(604, "grid_phase_A_in_power", "W"),
    int_signed(605, "grid_phase_B_in_power", "W"),
    int_signed(606, "grid_phase_C_in_power", "W"),
    int_signed(607, "grid_active_side_side_in_power", "W"),
    int_signed(608, "grid_active_side_side_apparent_power", "W"),
    float(609, "grid_in_frequency", 100, "Hz"),
    float_signed(610, "grid_phase_A_in_current", 100, "A"),
    float_signed(611, "grid_phase_B_in_current", 100, "A"),
    float_signed(612, "grid_phase_C_in_current", 100, "A"),
    float_signed(613, "grid_phase_A_out_of_grid_current", 100, "A"),
    float_signed(614, "grid_phase_B_out_of_grid_current", 100, "A"),
    float_signed(615, "grid_phase_C_out_of_grid_current", 100, "A"),
    int_signed(616, "grid_phase_A_out_of_grid_power", "W"),
    int_signed(617, "grid_phase_B_out_of_grid_power", "W"),
    int_signed(618, "grid_phase_C_out_of_grid_power", "W"),
    int_signed(619, "grid_total_out_of_grid_power", "W"),
    int_signed(620, "grid_total_out_of_grid_apparent_power", "W"),
    int_signed(622, "grid_phase_A__power", "W"),
    int_signed(623, "grid_phase_B__power", "W"),
    int_signed(624, "grid_phase_C__power", "W"),
    int_signed(625, "grid_total_power", "W"),
    float(627, "grid_phase_A_volt_out", 10, "V"),
    float(628, "grid_phase_B_volt_out", 10, "V"),
    float(629, "grid_phase_C_volt_out", 10, "V"),
    float_signed(630, "inverter_phase_A_out_current", 100, "A"),
    float_signed(631, "inverter_phase_B_out_current", 100, "A"),
    float_signed(632, "inverter_phase_C_out_current", 100, "A"),
    int_signed(633, "inverter_phase_A_out_power", "W"),
    int_signed(634, "inverter_phase_B_out_power", "W"),
    int_signed(635, "inverter_phase_C_out_power", "W"),
    int_signed(636, "inverter_total_out_power", "W"),
    int_signed(637, "inverter_total_apparent_out_power", "W"),
    float(638, "inverter_out_frequency", 100, "Hz"),
    int(640, "ups_phase_A_power", "W"),
    int(641, "ups_phase_B_power", "W"),
    int(642, "ups_phase_C_power", "W"),
    int(643, "ups_total_power", "W"),
    float(644, "load_phase_A_volt", 10, "V"),
    float(645, "load_phase_B_volt", 10, "V"),
    float(646, "load_phase_C_volt", 10, "V"),
    float_signed(647, "load_phase_A_current", 100, "A"),
    float_signed(648, "load_phase_B_current", 100, "A"),
    float_signed(649, "load_phase_C_current", 100, "A"),
    int_signed(650, "load_phase_A_power", "W"),
    int_signed(651, "load_phase_B_power", "W"),
    int_signed(652, "load_phase_C_power", "W"),
    int_signed(653, "load_total_power", "W"),
    float(661, "gen_phase_A_volt", 10, "V"),
    float(662, "gen_phase_B_volt", 10, "V"),
    float(663, "gen_phase_C_volt", 10, "V"),
    int_signed(664, "gen_phase_A_power", "W"),
    int_signed(665, "gen_phase_B_power", "W"),
    int_signed(666, "gen_phase_C_power", "W"),
    int_signed(667, "gen_total_power", "W"),
    int(672, "pv1_in_power", "W"),
    int(673, "pv2_in_power", "W"),
    int(674, "pv3_in_power", "W"),
    int(675, "pv4_in_power", "W"),
    float(676, "pv1_volt", 10, "V"),
    float(677, "pv1_current", 10, "A"),
    float(678, "pv2_volt", 10, "V"),
    float(679, "pv2_current", 10, "A"),
    float(680, "pv3_volt", 10, "V"),
    float(681, "pv3_current", 10, "A"),
    float(682, "pv4_volt", 10, "V"),
    float(683, "pv4_current", 10, "A"),
  ]
});

static BATTERY_NAMES: &[&str] = &[
  "control_mode",
  "battery_control_mode",
  "battery_resistance",
  "battery_charging_eff",
  "battery_shutdown_capacity",
  "battery_recovery_capacity",
  "battery_low_capacity",
  "battery_shutdown_voltage",
  "battery_restart_voltage",
  "battery_low_voltage",
  "battery_charge_today",
  "battery_discharge_today",
  "battery_temperature",
  "battery_voltage",
  "battery_out_power",
  "battery_out_current",
  "battery_corrected_ah",
  "battery_soc",
  "bms_type",
  "bms_battery_SOC",
  "bms_battery_soh",
  "bms_battery_temp",
  "bms_battery_voltage",
];

static TOTAL_POWER_NAMES: &[&str] = &[
  "grid_active_side_side_in_power",
  "grid_active_side_side_apparent_power",
  "grid_total_power",
  "battery_out_power",
  "load_total_power",
  "inverter_total_out_power",
  "pv1_in_power",
  "pv2_in_power",
];

fn by_names(names: &[&str]) -> Vec<KindRegister> {
  HOLDING
    .iter()
    .filter(|register| names.contains(&register.name))
    .cloned()
    .collect()
}

/// The full holding register table.
pub fn holding() -> Vec<KindRegister> {
  HOLDING.clone()
}

/// Battery and BMS related registers only.
pub fn battery() -> Vec<KindRegister> {
  by_names(BATTERY_NAMES)
}

/// The handful of registers that sum up power flow through the system.
pub fn total_power() -> Vec<KindRegister> {
  by_names(TOTAL_POWER_NAMES)
}

pub fn lookup(name: &str) -> Result<KindRegister, LookupError> {
  HOLDING
    .iter()
    .find(|register| register.name == name)
    .cloned()
    .ok_or_else(|| LookupError::NotFound(name.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use super::*;
  use crate::modbus::span::Span;

  #[test]
  fn lookup_finds_registers_by_name() {
    let register = lookup("battery_soc").unwrap();
    assert_eq!(register.address, 588);
  }

  #[test]
  fn lookup_rejects_unknown_names() {
    assert!(matches!(
      lookup("not_a_register"),
      Err(LookupError::NotFound(_))
    ));
  }

  #[test]
  fn serial_number_spans_five_words() {
    let register = lookup("inverter_serial").unwrap();
    assert_eq!(register.quantity(), 5);
  }

  #[test]
  fn subsets_draw_from_the_main_table() {
    let battery = battery();
    assert_eq!(battery.len(), BATTERY_NAMES.len());
    assert!(battery.iter().any(|register| register.name == "battery_soc"));

    let power = total_power();
    assert_eq!(power.len(), TOTAL_POWER_NAMES.len());
  }

  #[test]
  fn catalog_has_no_duplicate_names() {
    let mut names =
      HOLDING.iter().map(|register| register.name).collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), HOLDING.len());
  }
}
