//! Register model types
//!
//! Addresses are stored 1-based: every address is the documented protocol
//! address plus one, and is sent to the transport unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The two addressable register banks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterCategory {
    Holding,
    Input,
}

impl RegisterCategory {
    /// Read order within one cycle
    pub const ALL: [RegisterCategory; 2] = [RegisterCategory::Holding, RegisterCategory::Input];

    /// Modbus function code used to read this bank
    pub fn read_function_code(&self) -> u8 {
        match self {
            RegisterCategory::Holding => 0x03,
            RegisterCategory::Input => 0x04,
        }
    }
}

impl fmt::Display for RegisterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterCategory::Holding => write!(f, "holding"),
            RegisterCategory::Input => write!(f, "input"),
        }
    }
}

/// Wire data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    U16,
    I16,
    U32,
    I32,
    Utf8,
    /// Signed 8-bit value in the high byte of a word
    I8High,
    /// Signed 8-bit value in the low byte of a word
    I8Low,
}

impl DataType {
    /// Minimum number of words a value of this type occupies
    pub fn min_words(&self) -> usize {
        match self {
            DataType::U32 | DataType::I32 => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U16 => "U16",
            DataType::I16 => "I16",
            DataType::U32 => "U32",
            DataType::I32 => "I32",
            DataType::Utf8 => "UTF8",
            DataType::I8High => "I8H",
            DataType::I8Low => "I8L",
        };
        f.write_str(name)
    }
}

/// Semantic class of a quantity, drives presentation rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Voltage,
    Current,
    Power,
    ApparentPower,
    ReactivePower,
    PowerFactor,
    Energy,
    Frequency,
    Temperature,
    Battery,
    Monetary,
    #[default]
    Enum,
}

impl DeviceClass {
    /// Decimal places kept after scaling
    pub fn default_rounding(&self) -> u32 {
        match self {
            DeviceClass::PowerFactor => 3,
            DeviceClass::Monetary => 4,
            _ => 2,
        }
    }
}

/// One named, typed, scaled view onto one or more registers
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub address: u16,
    pub word_count: u16,
    pub data_type: DataType,
    pub scale: f64,
    pub category: RegisterCategory,
    pub unit: &'static str,
    pub device_class: DeviceClass,
    /// Overrides the class and unit based rounding when set
    pub rounding: Option<u32>,
}

impl Parameter {
    pub fn new(
        category: RegisterCategory,
        address: u16,
        word_count: u16,
        data_type: DataType,
    ) -> Self {
        Self {
            address,
            word_count: word_count.max(1),
            data_type,
            scale: 1.0,
            category,
            unit: "",
            device_class: DeviceClass::Enum,
            rounding: None,
        }
    }

    pub fn holding(address: u16, word_count: u16, data_type: DataType) -> Self {
        Self::new(RegisterCategory::Holding, address, word_count, data_type)
    }

    pub fn input(address: u16, word_count: u16, data_type: DataType) -> Self {
        Self::new(RegisterCategory::Input, address, word_count, data_type)
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub fn class(mut self, device_class: DeviceClass) -> Self {
        self.device_class = device_class;
        self
    }

    pub fn rounding(mut self, digits: u32) -> Self {
        self.rounding = Some(digits);
        self
    }

    /// Last address occupied, inclusive
    pub fn last_address(&self) -> u32 {
        u32::from(self.address) + u32::from(self.word_count) - 1
    }

    /// Decimal places for presentation
    pub fn rounding_digits(&self) -> u32 {
        if let Some(digits) = self.rounding {
            return digits;
        }
        if self.unit.starts_with('k') {
            return 1;
        }
        self.device_class.default_rounding()
    }
}

/// How a writable parameter accepts values
#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Raw integer payloads for the two states
    Switch { on: u16, off: u16 },
    /// Inclusive range in engineering units (before scaling)
    Number { min: f64, max: f64 },
    /// Wire value is the index of the option label
    Select { options: &'static [&'static str] },
}

/// A parameter that also accepts writes
#[derive(Debug, Clone, PartialEq)]
pub struct WriteParameter {
    pub register: Parameter,
    pub kind: WriteKind,
}

impl WriteParameter {
    pub fn switch(register: Parameter) -> Self {
        Self {
            register,
            kind: WriteKind::Switch { on: 1, off: 0 },
        }
    }

    pub fn number(register: Parameter, min: f64, max: f64) -> Self {
        Self {
            register,
            kind: WriteKind::Number { min, max },
        }
    }

    pub fn select(register: Parameter, options: &'static [&'static str]) -> Self {
        Self {
            register,
            kind: WriteKind::Select { options },
        }
    }

    /// Map an option label to its wire index, for select parameters
    pub fn option_index(&self, label: &str) -> Option<usize> {
        match &self.kind {
            WriteKind::Select { options } => options.iter().position(|o| *o == label),
            _ => None,
        }
    }
}

/// Parameters keyed by human-readable name
pub type ParameterMap = BTreeMap<String, Parameter>;

/// Writable parameters keyed by human-readable name
pub type WriteParameterMap = BTreeMap<String, WriteParameter>;

/// A decoded, scaled value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// Multiply by `scale` when it is not 1, then round to `digits` places
    pub fn scaled(self, scale: f64, digits: u32) -> Value {
        match self {
            Value::Int(v) if scale == 1.0 => Value::Int(v),
            Value::Int(v) => Value::Float(round_to(v as f64 * scale, digits)),
            Value::Float(v) => Value::Float(round_to(v * scale, digits)),
            text @ Value::Text(_) => text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_digits() {
        let voltage = Parameter::input(5006, 1, DataType::U16)
            .scale(0.1)
            .unit("V")
            .class(DeviceClass::Voltage);
        assert_eq!(voltage.rounding_digits(), 2);

        let power = Parameter::input(5024, 1, DataType::I16)
            .scale(0.1)
            .unit("kW")
            .class(DeviceClass::Power);
        assert_eq!(power.rounding_digits(), 1);

        let pf = Parameter::input(5028, 1, DataType::I16)
            .scale(0.01)
            .class(DeviceClass::PowerFactor);
        assert_eq!(pf.rounding_digits(), 3);

        assert_eq!(voltage.clone().rounding(0).rounding_digits(), 0);
    }

    #[test]
    fn test_value_scaling() {
        assert_eq!(Value::Int(2301).scaled(0.1, 2), Value::Float(230.1));
        assert_eq!(Value::Int(7).scaled(1.0, 2), Value::Int(7));
        assert_eq!(Value::Int(12345).scaled(0.1, 1), Value::Float(1234.5));
        assert_eq!(Value::Int(-15).scaled(0.1, 2), Value::Float(-1.5));
        assert_eq!(
            Value::Text("AB".into()).scaled(0.1, 2),
            Value::Text("AB".into())
        );
    }

    #[test]
    fn test_last_address() {
        let p = Parameter::input(5039, 2, DataType::U32);
        assert_eq!(p.last_address(), 5040);
        let p = Parameter::holding(1, 1, DataType::U16);
        assert_eq!(p.last_address(), 1);
    }

    #[test]
    fn test_option_index() {
        static OPTIONS: &[&str] = &["Load First", "Battery First"];
        let p = WriteParameter::select(Parameter::holding(27, 1, DataType::U16), OPTIONS);
        assert_eq!(p.option_index("Battery First"), Some(1));
        assert_eq!(p.option_index("Grid First"), None);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(RegisterCategory::Holding.to_string(), "holding");
        assert_eq!(RegisterCategory::Input.read_function_code(), 0x04);
    }
}
