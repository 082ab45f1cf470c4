//! Atess PCS / PBD battery inverters
//!
//! Register map per the Atess Modbus RTU protocol v3.22. The holding-register
//! block is shared by every model; input registers differ between the PCS
//! (battery inverter) line and the PBD/HPS hybrids.

use crate::core::codec::{self, RegisterCodec};
use crate::core::types::{
    DataType, DeviceClass, Parameter, ParameterMap, Value, WriteParameter, WriteParameterMap,
};
use crate::error::{RegSrvError, Result};
use crate::profiles::{table, write_table, ProfileDelta};

use crate::core::types::DataType::{I16, I8High, I8Low, Utf8, U16, U32};

pub const MANUFACTURER: &str = "Atess";
pub const SUPPORTED_MODELS: &[&str] = &["PCS150", "PCS500", "PBD250"];
pub const PROBE_PARAMETER: &str = "Device On/Off";
pub const MODEL_PARAMETER: &str = "Device Type Code";
pub const SERIAL_PARAMETER: &str = "Serial Number";

/// Write parameters only present on PCS models
const PCS_ONLY_WRITES: &[&str] = &["Bypass Cabinet Enable", "BMS Communication Enable"];

const MODE_OPTIONS: &[&str] = &[
    "Load First",
    "Battery First",
    "Economy Mode",
    "Peak Shaving",
    "Time Schedule",
    "Manual Dispatch",
    "Battery Protect",
    "Backup Power Management",
    "Constant Power Discharge",
    "Forced Charging",
    "Smart Meter Mode",
    "Bat-Smart Meter",
];

/// Atess wire encoding.
///
/// I16 treats bit 12 (0x1000) as the sign: a set bit fills the upper half
/// with ones before the value is read as a 32-bit signed integer. This matches
/// deployed units and is kept as-is; words with bit 15 set but bit 12 clear
/// decode as large positive numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtessCodec;

impl RegisterCodec for AtessCodec {
    fn decode(words: &[u16], data_type: DataType) -> Result<Value> {
        match (data_type, words.first()) {
            (DataType::I16, Some(&word)) => {
                let sign: u32 = if word & 0x1000 != 0 { 0xFFFF } else { 0 };
                Ok(Value::Int(i64::from(((sign << 16) | u32::from(word)) as i32)))
            },
            _ => codec::decode(words, data_type),
        }
    }

    fn encode(value: f64, data_type: DataType) -> Result<Vec<u16>> {
        codec::encode(value, data_type)
    }
}

/// Device Type Code register value to model name
pub fn model_name(code: u16) -> Option<&'static str> {
    let name = match code {
        22001 => "HPS30",
        22002 => "HPS50",
        22003 => "HPS100",
        22004 => "HPS120",
        22005 => "HPS150",
        22006 => "HPS250",
        22007 => "HPS7500TL",
        22008 => "HPS20KTL",
        22009 => "HPS10KTL",
        22010 => "HPS10KTLS",
        22011 => "HPS7500TLS",
        22012 => "HPS5KTLS",
        22013 => "HPS3500TLS",
        22014 => "HPS20KTLS",
        22015 => "HPS15KTL",
        22016 => "HPS30KTL",
        22017 => "HPS40KTL",
        21016 | 21028 => "PCS50",
        21017 | 21029 => "PCS50TL",
        21018 | 21030 => "PCS50U",
        21019 | 21031 => "PCS100",
        21020 | 21032 => "PCS100TL",
        21021 | 21033 => "PCS100U",
        21022 | 21034 => "PCS250",
        21023 | 21035 => "PCS250TL",
        21024 | 21036 => "PCS250U",
        21025 | 21037 => "PCS500",
        21026 | 21038 => "PCS500TL",
        21027 | 21039 => "PCS500U",
        21040 => "PCS630",
        23001 | 23002 => "PBD350",
        23003 => "PBD250",
        _ => return None,
    };
    Some(name)
}

/// Model from the decoded Device Type Code
pub fn model_from_value(value: &Value) -> Result<String> {
    let code = match value {
        Value::Int(code) => u16::try_from(*code)
            .map_err(|_| RegSrvError::model(format!("Device type code {} out of range", code)))?,
        other => {
            return Err(RegSrvError::model(format!(
                "Device type code is not numeric: {}",
                other
            )))
        },
    };

    model_name(code)
        .map(str::to_string)
        .ok_or_else(|| RegSrvError::model(format!("Unknown Atess device type code {}", code)))
}

/// Parameters every Atess model exposes
pub fn parameters() -> ParameterMap {
    table([
        ("Serial Number", Parameter::holding(180 + 1, 5, Utf8)),
        ("Device Type Code", Parameter::holding(43 + 1, 1, U16)),
        ("Device On/Off", Parameter::holding(1, 1, U16)),
        (
            "PV Voltage",
            Parameter::holding(80 + 1, 1, U16)
                .scale(0.1)
                .unit("V")
                .class(DeviceClass::Voltage),
        ),
        (
            "PV Current",
            Parameter::holding(83 + 1, 1, U16)
                .scale(0.1)
                .unit("A")
                .class(DeviceClass::Current),
        ),
        (
            "Battery Power",
            Parameter::input(17 + 1, 1, I16)
                .scale(0.1)
                .unit("kW")
                .class(DeviceClass::Power),
        ),
        (
            "Battery SOC",
            Parameter::input(47 + 1, 1, U16)
                .unit("%")
                .class(DeviceClass::Battery),
        ),
        ("Hardware Version", Parameter::input(270 + 1, 10, Utf8)),
        (
            "Battery Voltage",
            Parameter::input(1 + 1, 1, I16)
                .scale(0.1)
                .unit("V")
                .class(DeviceClass::Voltage),
        ),
        (
            "Battery Current",
            Parameter::input(2 + 1, 1, I16)
                .scale(0.1)
                .unit("A")
                .class(DeviceClass::Current),
        ),
        (
            "Ambient temperature",
            Parameter::input(36 + 1, 1, I16)
                .scale(0.1)
                .unit("°C")
                .class(DeviceClass::Temperature),
        ),
        (
            "BMS Max. Temperature",
            Parameter::input(171 + 1, 1, I8High)
                .unit("°C")
                .class(DeviceClass::Temperature),
        ),
        (
            "BMS Min. Temperature",
            Parameter::input(171 + 1, 1, I8Low)
                .unit("°C")
                .class(DeviceClass::Temperature),
        ),
        (
            "BMS Max. Cell Voltage",
            Parameter::input(174 + 1, 1, U16)
                .unit("mV")
                .class(DeviceClass::Voltage),
        ),
        (
            "BMS Min. Cell Voltage",
            Parameter::input(175 + 1, 1, U16)
                .unit("mV")
                .class(DeviceClass::Voltage),
        ),
        (
            "Total Battery Discharge Energy",
            Parameter::input(68 + 1, 2, U32)
                .scale(0.1)
                .unit("kWh")
                .class(DeviceClass::Energy),
        ),
        (
            "Total Battery Charge Energy",
            Parameter::input(72 + 1, 2, U32)
                .scale(0.1)
                .unit("kWh")
                .class(DeviceClass::Energy),
        ),
    ])
}

fn voltage(address: u16) -> Parameter {
    Parameter::input(address, 1, U16)
        .scale(0.1)
        .unit("V")
        .class(DeviceClass::Voltage)
}

fn current(address: u16, data_type: DataType) -> Parameter {
    Parameter::input(address, 1, data_type)
        .scale(0.1)
        .unit("A")
        .class(DeviceClass::Current)
}

fn power(address: u16, data_type: DataType) -> Parameter {
    Parameter::input(address, 1, data_type)
        .scale(0.1)
        .unit("kW")
        .class(DeviceClass::Power)
}

fn energy(address: u16) -> Parameter {
    Parameter::input(address, 1, U16)
        .scale(0.1)
        .unit("kWh")
        .class(DeviceClass::Energy)
}

/// PCS (battery inverter) parameters
pub fn pcs_parameters() -> ParameterMap {
    table([
        ("System battery current", current(162 + 1, I16)),
        ("System battery power", power(228 + 1, I16)),
        (
            "Transformer temperature",
            Parameter::input(35 + 1, 1, I16)
                .scale(0.1)
                .unit("°C")
                .class(DeviceClass::Temperature),
        ),
        ("Frequency Shift Enable", Parameter::holding(79 + 1, 1, U16)),
        ("Power factor symbol", Parameter::input(22 + 1, 1, U16)),
        (
            "Power factor",
            Parameter::input(23 + 1, 1, U16).scale(0.001).rounding(3),
        ),
        (
            "Charge Cutoff SOC",
            Parameter::holding(178 + 1, 1, U16)
                .unit("%")
                .class(DeviceClass::Battery),
        ),
        ("Output Voltage UV", voltage(4 + 1)),
        ("Output Voltage VW", voltage(5 + 1)),
        ("Output Voltage WU", voltage(6 + 1)),
        ("Bypass Current U", current(7 + 1, U16)),
        ("Bypass Current V", current(8 + 1, U16)),
        ("Bypass Current W", current(9 + 1, U16)),
        ("Inductance Current A", current(10 + 1, U16)),
        ("Inductance Current B", current(11 + 1, U16)),
        ("Inductance Current C", current(12 + 1, U16)),
        ("Grid Bypass Voltage UV", voltage(13 + 1)),
        ("Grid Bypass Voltage VW", voltage(14 + 1)),
        ("Grid Bypass Voltage WU", voltage(15 + 1)),
        (
            "Bypass Frequency",
            Parameter::input(81 + 1, 1, U16)
                .scale(0.01)
                .unit("Hz")
                .class(DeviceClass::Frequency),
        ),
        (
            "Output Frequency",
            Parameter::input(16 + 1, 1, U16)
                .scale(0.01)
                .unit("Hz")
                .class(DeviceClass::Frequency),
        ),
        (
            "Bypass Apparent Power",
            Parameter::input(18 + 1, 1, U16)
                .scale(0.1)
                .unit("kVA")
                .class(DeviceClass::ApparentPower),
        ),
        ("Bypass Active Power", power(19 + 1, I16)),
        (
            "Bypass Reactive Power",
            Parameter::input(20 + 1, 1, I16)
                .scale(0.1)
                .unit("kvar")
                .class(DeviceClass::ReactivePower),
        ),
        (
            "Grid Frequency",
            Parameter::input(21 + 1, 1, U16)
                .scale(0.01)
                .unit("Hz")
                .class(DeviceClass::Frequency),
        ),
        ("Grid State", Parameter::input(28 + 1, 1, U16)),
        (
            "Output Apparent Power",
            Parameter::input(78 + 1, 1, U16)
                .scale(0.1)
                .unit("kVA")
                .class(DeviceClass::ApparentPower),
        ),
        ("Output Active Power", power(79 + 1, I16)),
        (
            "Output Reactive Power",
            Parameter::input(80 + 1, 1, I16)
                .scale(0.1)
                .unit("kvar")
                .class(DeviceClass::ReactivePower),
        ),
        ("Daily Power Consumption", energy(82 + 1)),
        ("Daily Power From Grid", energy(88 + 1)),
        ("Daily Power To Grid", energy(94 + 1)),
        ("Output Current U", current(135 + 1, I16)),
        ("Output Current V", current(136 + 1, I16)),
        ("Output Current W", current(137 + 1, I16)),
        (
            "Load Apparent Power",
            Parameter::input(48 + 1, 1, U16)
                .scale(0.1)
                .unit("kVA")
                .class(DeviceClass::ApparentPower),
        ),
        ("Load Active Power", power(49 + 1, U16)),
        (
            "Load Reactive Power",
            Parameter::input(50 + 1, 1, I16)
                .scale(0.1)
                .unit("kvar")
                .class(DeviceClass::ReactivePower),
        ),
        (
            "Load Power Factor",
            Parameter::input(52 + 1, 1, U16)
                .scale(0.001)
                .class(DeviceClass::PowerFactor),
        ),
        ("Load Current U", current(53 + 1, I16)),
        ("Load Current V", current(54 + 1, I16)),
        ("Load Current W", current(55 + 1, I16)),
        ("Output Voltage U", voltage(56 + 1)),
        ("Output Voltage V", voltage(57 + 1)),
        ("Output Voltage W", voltage(58 + 1)),
        (
            "Total Load Energy",
            Parameter::input(84 + 1, 2, U32)
                .scale(0.1)
                .unit("kWh")
                .class(DeviceClass::Energy),
        ),
        ("BMS Battery Status", Parameter::input(176 + 1, 1, I8High)),
        ("BMS System Status", Parameter::input(176 + 1, 1, I8Low)),
        ("Running State", Parameter::input(180 + 1, 1, U16)),
    ])
}

/// Parameters for every model outside the PCS line
pub fn non_pcs_parameters() -> ParameterMap {
    table([
        (
            "PV1 Voltage",
            Parameter::input(0 + 1, 1, I16)
                .scale(0.1)
                .unit("V")
                .class(DeviceClass::Voltage),
        ),
        ("PV1 DC Current", current(3 + 1, I16)),
        ("PV1 Power", power(51 + 1, I16)),
        ("PV Daily Power Generation", energy(62 + 1)),
        (
            "Total PV Generation",
            Parameter::input(64 + 1, 2, U32)
                .scale(0.1)
                .unit("kWh")
                .class(DeviceClass::Energy),
        ),
    ])
}

/// PBD (PV + battery hybrid) parameters
pub fn pbd_parameters() -> ParameterMap {
    let pv_voltage = |address| {
        Parameter::input(address, 1, I16)
            .scale(0.1)
            .unit("V")
            .class(DeviceClass::Voltage)
    };

    table([
        ("PV2 Voltage", pv_voltage(105 + 1)),
        ("PV2 DC Current", current(106 + 1, I16)),
        ("PV2 Power", power(107 + 1, I16)),
        ("PV Total Power", power(108 + 1, I16)),
        ("Output Voltage", pv_voltage(109 + 1)),
        ("Output Current", current(110 + 1, I16)),
        ("Output Power", power(113 + 1, I16)),
        (
            "PV Module Temperature",
            Parameter::input(114 + 1, 1, U16)
                .scale(0.1)
                .unit("°C")
                .class(DeviceClass::Temperature),
        ),
        ("PV3 Voltage", pv_voltage(123 + 1)),
        ("PV4 Voltage", pv_voltage(124 + 1)),
        ("PV5 Voltage", pv_voltage(125 + 1)),
        ("PV3 DC Current", current(126 + 1, I16)),
        ("PV4 DC Current", current(127 + 1, I16)),
        ("PV5 DC Current", current(128 + 1, I16)),
        ("PV3 Power", power(132 + 1, I16)),
        ("PV4 Power", power(133 + 1, I16)),
        ("PV5 Power", power(134 + 1, I16)),
    ])
}

fn setting(address: u16) -> Parameter {
    Parameter::holding(address, 1, U16)
}

fn percent(address: u16) -> WriteParameter {
    WriteParameter::number(
        setting(address).unit("%").class(DeviceClass::Battery),
        0.0,
        100.0,
    )
}

/// Writable holding registers
pub fn write_parameters() -> WriteParameterMap {
    write_table([
        (
            "Mode selection",
            WriteParameter::select(setting(26 + 1), MODE_OPTIONS),
        ),
        (
            "Bypass Cabinet Enable",
            WriteParameter::switch(setting(13 + 1)),
        ),
        (
            "BMS Communication Enable",
            WriteParameter::switch(setting(14 + 1)),
        ),
        ("Generator Start SOC", percent(66 + 1)),
        (
            "Grid Power Compensation",
            WriteParameter::number(
                setting(44 + 1)
                    .scale(0.1)
                    .unit("kW")
                    .class(DeviceClass::Power),
                0.0,
                100.0,
            ),
        ),
        ("Generator Stop SOC", percent(67 + 1)),
        (
            "BMS Max Charge Current",
            WriteParameter::number(
                setting(100 + 1)
                    .scale(0.1)
                    .unit("A")
                    .class(DeviceClass::Current),
                0.0,
                1000.0,
            ),
        ),
        (
            "BMS Max Discharge Current",
            WriteParameter::number(
                setting(101 + 1)
                    .scale(0.1)
                    .unit("A")
                    .class(DeviceClass::Current),
                0.0,
                1000.0,
            ),
        ),
        (
            "Battery Charging Saturation",
            WriteParameter::number(setting(150 + 1), 0.0, 10.0),
        ),
        ("Charge Cutoff SOC", percent(178 + 1)),
        ("Discharge Cutoff SOC", percent(47 + 1)),
        ("Grid Charge Cutoff SOC", percent(340 + 1)),
        (
            "Battery Power Export to Grid Set",
            WriteParameter::number(
                setting(174 + 1).unit("kW").class(DeviceClass::Power),
                0.0,
                150.0,
            ),
        ),
        (
            "Grid And PV Charge Together",
            WriteParameter::switch(setting(8 + 1)),
        ),
        (
            "Max Grid Charge Power",
            WriteParameter::number(
                setting(225 + 1)
                    .scale(0.1)
                    .unit("kW")
                    .class(DeviceClass::Power),
                0.0,
                150.0,
            ),
        ),
        (
            "Forced Charge Enable",
            WriteParameter::switch(setting(229 + 1)),
        ),
        ("Anti Reflux Enable", WriteParameter::switch(setting(16 + 1))),
        (
            "Output Power Limit",
            WriteParameter::number(setting(58 + 1).unit("%"), 0.0, 120.0),
        ),
        (
            "Grid Power UP Limit",
            WriteParameter::number(
                setting(65 + 1).unit("kW").class(DeviceClass::Power),
                0.0,
                500.0,
            ),
        ),
        (
            "Discharge current limit",
            WriteParameter::number(
                setting(155 + 1)
                    .scale(0.1)
                    .unit("A")
                    .class(DeviceClass::Current),
                0.0,
                1000.0,
            ),
        ),
    ])
}

/// Parameter changes for an identified model
pub fn model_delta(model: &str) -> ProfileDelta {
    let mut delta = ProfileDelta::default();

    if model.contains("PCS") {
        delta.add = pcs_parameters();
    } else {
        delta.add = non_pcs_parameters();
        if model.contains("PBD") {
            delta.add.extend(pbd_parameters());
        }
        delta.remove_write = PCS_ONLY_WRITES.to_vec();
    }

    delta
}
