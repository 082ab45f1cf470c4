//! Kehua BCS battery converters
//!
//! Every measurement lives in the input bank; the unit exposes no writable
//! parameters.

use crate::core::codec::{self, RegisterCodec};
use crate::core::types::DataType::{I16, I32, U16, U32, Utf8};
use crate::core::types::{DataType, DeviceClass, Parameter, ParameterMap, Value};
use crate::error::{RegSrvError, Result};
use crate::profiles::table;

pub const MANUFACTURER: &str = "Kehua";
pub const SUPPORTED_MODELS: &[&str] = &["BCS500K-A"];
pub const PROBE_PARAMETER: &str = "Device Model";
pub const MODEL_PARAMETER: &str = "Device Model";

/// Kehua wire encoding: the standard codec without 8-bit halves
#[derive(Debug, Clone, Copy, Default)]
pub struct KehuaCodec;

impl RegisterCodec for KehuaCodec {
    fn decode(words: &[u16], data_type: DataType) -> Result<Value> {
        match data_type {
            DataType::I8High | DataType::I8Low => Err(RegSrvError::not_implemented(format!(
                "Kehua decoding of {} is not implemented",
                data_type
            ))),
            _ => codec::decode(words, data_type),
        }
    }

    fn encode(value: f64, data_type: DataType) -> Result<Vec<u16>> {
        codec::encode(value, data_type)
    }
}

/// Model name from the decoded identity string, NUL padding stripped
pub fn model_from_value(value: &Value) -> Result<String> {
    match value {
        Value::Text(text) => Ok(text.trim_end_matches(['\0', ' ']).to_string()),
        other => Err(RegSrvError::model(format!(
            "Device model is not text: {}",
            other
        ))),
    }
}

fn text(address: u16, word_count: u16) -> Parameter {
    Parameter::input(address, word_count, Utf8)
}

fn status(address: u16) -> Parameter {
    Parameter::input(address, 1, U16)
}

fn tenths(address: u16, data_type: DataType, unit: &'static str, class: DeviceClass) -> Parameter {
    Parameter::input(address, 1, data_type)
        .scale(0.1)
        .unit(unit)
        .class(class)
}

fn energy(address: u16) -> Parameter {
    Parameter::input(address, 2, U32)
        .scale(0.1)
        .unit("kWh")
        .class(DeviceClass::Energy)
}

fn gains(address: u16) -> Parameter {
    Parameter::input(address, 2, I32)
        .unit("Yuan")
        .class(DeviceClass::Monetary)
}

fn power_factor(address: u16) -> Parameter {
    Parameter::input(address, 1, I16)
        .scale(0.01)
        .class(DeviceClass::PowerFactor)
}

fn load_capacity(address: u16) -> Parameter {
    Parameter::input(address, 1, U16).unit("%")
}

pub fn parameters() -> ParameterMap {
    use DeviceClass::{ApparentPower, Battery, Current, Frequency, Power, ReactivePower, Temperature, Voltage};

    table([
        // identity
        ("Device Model", text(4800, 10)),
        ("Hardware Version", text(4810, 5)),
        ("Software Version", text(4815, 5)),
        ("HMI Version", text(4820, 5)),
        ("Manufacturer Info", text(4825, 15)),
        // status
        ("Running Status", status(5001)),
        ("Fault Code 1", status(5002)),
        ("Fault Code 2", status(5003)),
        ("Fault Code 3", status(5004)),
        ("Fault Code 4", status(5005)),
        // grid and output
        ("Grid Voltage U", tenths(5006, U16, "V", Voltage)),
        ("Grid Voltage V", tenths(5007, U16, "V", Voltage)),
        ("Grid Voltage W", tenths(5008, U16, "V", Voltage)),
        ("Output Voltage U", tenths(5009, U16, "V", Voltage)),
        ("Output Voltage V", tenths(5010, U16, "V", Voltage)),
        ("Output Voltage W", tenths(5011, U16, "V", Voltage)),
        ("Output Current U", tenths(5012, U16, "A", Current)),
        ("Output Current V", tenths(5013, U16, "A", Current)),
        ("Output Current W", tenths(5014, U16, "A", Current)),
        (
            "Off-Grid Frequency",
            Parameter::input(5015, 1, U16)
                .scale(0.01)
                .unit("Hz")
                .class(Frequency),
        ),
        (
            "Grid Frequency",
            Parameter::input(5016, 1, U16)
                .scale(0.01)
                .unit("Hz")
                .class(Frequency),
        ),
        ("Inner Temperature", tenths(5018, I16, "°C", Temperature)),
        ("Radiator Temperature", tenths(5019, I16, "°C", Temperature)),
        // DC side and totals
        ("DC Voltage", tenths(5020, U16, "V", Voltage)),
        ("DC Current", tenths(5021, I16, "A", Current)),
        ("Total DC Power", tenths(5022, I16, "kW", Power)),
        ("Output Apparent Power", tenths(5023, U16, "kVA", ApparentPower)),
        ("Output Active Power", tenths(5024, I16, "kW", Power)),
        ("Output Reactive Power", tenths(5025, I16, "kVar", ReactivePower)),
        // per phase
        ("Phase-U Apparent Power", tenths(5026, U16, "kVA", ApparentPower)),
        ("Phase-U Active Power", tenths(5027, I16, "kW", Power)),
        ("Phase-U Power Factor", power_factor(5028)),
        ("Phase-U Load Capacity", load_capacity(5029)),
        ("Phase-V Apparent Power", tenths(5030, U16, "kVA", ApparentPower)),
        ("Phase-V Active Power", tenths(5031, I16, "kW", Power)),
        ("Phase-V Power Factor", power_factor(5032)),
        ("Phase-V Load Capacity", load_capacity(5033)),
        ("Phase-W Apparent Power", tenths(5034, U16, "kVA", ApparentPower)),
        ("Phase-W Active Power", tenths(5035, I16, "kW", Power)),
        ("Phase-W Power Factor", power_factor(5036)),
        ("Phase-W Load Capacity", load_capacity(5037)),
        // energy and tariff
        ("Daily Charge", energy(5039)),
        ("Daily Discharge", energy(5041)),
        ("Daily Gains", gains(5043)),
        ("Total Charge", energy(5045)),
        ("Total Discharge", energy(5047)),
        ("Total Gains", gains(5049)),
        (
            "Current Electricity Price",
            Parameter::input(5051, 2, U32)
                .scale(0.0001)
                .unit("Yuan")
                .class(DeviceClass::Monetary),
        ),
        ("On-Grid/Off-Grid Status", status(5053)),
        ("Available Power", tenths(5054, U16, "kVA", ApparentPower)),
        ("Remote Control Status", status(5055)),
        // battery
        ("BMS System Status", status(5200)),
        ("Total Battery Voltage", tenths(5202, U16, "V", Voltage)),
        ("Total Battery Current", tenths(5203, I16, "A", Current)),
        ("Battery Group SOC", tenths(5204, U16, "%", Battery)),
        ("Battery Group SOH", tenths(5205, U16, "%", Battery)),
        ("Charge Limit Current", tenths(5206, U16, "A", Current)),
        ("Discharge Limit Current", tenths(5207, U16, "A", Current)),
        ("Charge Limit Voltage", tenths(5208, U16, "V", Voltage)),
    ])
}
