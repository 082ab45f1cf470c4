//! Device families
//!
//! Each supported family is a variant of [`DeviceFamily`]. A family supplies
//! its default register tables, how to identify the model, the parameter
//! changes that follow from the model, and its wire codec.

pub mod atess;
pub mod kehua;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::codec::RegisterCodec;
use crate::core::types::{
    DataType, Parameter, ParameterMap, RegisterCategory, Value, WriteParameter, WriteParameterMap,
};
use crate::error::{RegSrvError, Result};
use crate::transport::SimulatedBus;

pub use atess::AtessCodec;
pub use kehua::KehuaCodec;

pub(crate) fn table<const N: usize>(entries: [(&str, Parameter); N]) -> ParameterMap {
    entries
        .into_iter()
        .map(|(name, param)| (name.to_string(), param))
        .collect()
}

pub(crate) fn write_table<const N: usize>(
    entries: [(&str, WriteParameter); N],
) -> WriteParameterMap {
    entries
        .into_iter()
        .map(|(name, param)| (name.to_string(), param))
        .collect()
}

/// Parameter additions and removals selected by the identified model
#[derive(Debug, Clone, Default)]
pub struct ProfileDelta {
    pub add: ParameterMap,
    pub add_write: WriteParameterMap,
    pub remove: Vec<&'static str>,
    pub remove_write: Vec<&'static str>,
}

impl ProfileDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.add_write.is_empty()
            && self.remove.is_empty()
            && self.remove_write.is_empty()
    }

    /// Apply to a freshly reset parameter set; removals run after additions
    pub fn apply(&self, parameters: &mut ParameterMap, write_parameters: &mut WriteParameterMap) {
        parameters.extend(self.add.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_parameters.extend(self.add_write.iter().map(|(k, v)| (k.clone(), v.clone())));
        for name in &self.remove {
            parameters.remove(*name);
        }
        for name in &self.remove_write {
            write_parameters.remove(*name);
        }
    }
}

/// Supported device families, named as in the `server_type` config key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    #[serde(rename = "KEHUA_INVERTER")]
    Kehua,
    #[serde(rename = "ATESS_INVERTER")]
    Atess,
}

impl DeviceFamily {
    pub fn manufacturer(&self) -> &'static str {
        match self {
            DeviceFamily::Kehua => kehua::MANUFACTURER,
            DeviceFamily::Atess => atess::MANUFACTURER,
        }
    }

    pub fn supported_models(&self) -> &'static [&'static str] {
        match self {
            DeviceFamily::Kehua => kehua::SUPPORTED_MODELS,
            DeviceFamily::Atess => atess::SUPPORTED_MODELS,
        }
    }

    pub fn is_supported(&self, model: &str) -> bool {
        self.supported_models().contains(&model)
    }

    /// Always-present parameter read to check the device answers
    pub fn probe_parameter(&self) -> &'static str {
        match self {
            DeviceFamily::Kehua => kehua::PROBE_PARAMETER,
            DeviceFamily::Atess => atess::PROBE_PARAMETER,
        }
    }

    /// Parameter holding the model identity
    pub fn model_parameter(&self) -> &'static str {
        match self {
            DeviceFamily::Kehua => kehua::MODEL_PARAMETER,
            DeviceFamily::Atess => atess::MODEL_PARAMETER,
        }
    }

    /// Parameter holding the unit's serial number, when the family exposes one
    pub fn serial_parameter(&self) -> Option<&'static str> {
        match self {
            DeviceFamily::Kehua => None,
            DeviceFamily::Atess => Some(atess::SERIAL_PARAMETER),
        }
    }

    pub fn default_parameters(&self) -> ParameterMap {
        match self {
            DeviceFamily::Kehua => kehua::parameters(),
            DeviceFamily::Atess => atess::parameters(),
        }
    }

    pub fn default_write_parameters(&self) -> WriteParameterMap {
        match self {
            DeviceFamily::Kehua => WriteParameterMap::new(),
            DeviceFamily::Atess => atess::write_parameters(),
        }
    }

    /// Model name from the decoded model parameter
    pub fn model_from_value(&self, value: &Value) -> Result<String> {
        match self {
            DeviceFamily::Kehua => kehua::model_from_value(value),
            DeviceFamily::Atess => atess::model_from_value(value),
        }
    }

    pub fn model_delta(&self, model: &str) -> ProfileDelta {
        match self {
            DeviceFamily::Kehua => ProfileDelta::default(),
            DeviceFamily::Atess => atess::model_delta(model),
        }
    }

    pub fn decode(&self, words: &[u16], data_type: DataType) -> Result<Value> {
        match self {
            DeviceFamily::Kehua => KehuaCodec::decode(words, data_type),
            DeviceFamily::Atess => AtessCodec::decode(words, data_type),
        }
    }

    pub fn encode(&self, value: f64, data_type: DataType) -> Result<Vec<u16>> {
        match self {
            DeviceFamily::Kehua => KehuaCodec::encode(value, data_type),
            DeviceFamily::Atess => AtessCodec::encode(value, data_type),
        }
    }

    /// Seed a simulated bus with identity registers for the first supported model
    pub fn seed_simulation(&self, bus: &SimulatedBus, slave_id: u8) {
        match self {
            DeviceFamily::Kehua => {
                let model = &kehua::parameters()[kehua::MODEL_PARAMETER];
                bus.set_text(
                    slave_id,
                    model.category,
                    model.address,
                    model.word_count,
                    kehua::SUPPORTED_MODELS[0],
                );
            },
            DeviceFamily::Atess => {
                // 21025: PCS500
                bus.set_register(slave_id, RegisterCategory::Holding, 43 + 1, 21025);
                bus.set_register(slave_id, RegisterCategory::Holding, 1, 1);
            },
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFamily::Kehua => write!(f, "KEHUA_INVERTER"),
            DeviceFamily::Atess => write!(f, "ATESS_INVERTER"),
        }
    }
}

impl FromStr for DeviceFamily {
    type Err = RegSrvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "KEHUA_INVERTER" | "KEHUA" => Ok(DeviceFamily::Kehua),
            "ATESS_INVERTER" | "ATESS" => Ok(DeviceFamily::Atess),
            other => Err(RegSrvError::config(format!("Unknown server type: {}", other))),
        }
    }
}
