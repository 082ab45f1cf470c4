//! Home Assistant MQTT discovery payloads

use serde_json::{json, Map, Value as Json};

use crate::core::device::Device;
use crate::core::slug::slugify;
use crate::core::types::{DeviceClass, Parameter, WriteKind, WriteParameter};
use crate::publisher::Topics;

/// One retained discovery message
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: Json,
}

fn device_block(device: &Device) -> Json {
    json!({
        "manufacturer": device.family().manufacturer(),
        "model": device.model().unwrap_or("unknown"),
        "identifiers": [device.name()],
        "name": device.name(),
    })
}

fn device_class(class: DeviceClass) -> Option<String> {
    match class {
        DeviceClass::Enum => None,
        other => serde_json::to_value(other)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string)),
    }
}

fn state_class(param: &Parameter) -> Option<&'static str> {
    match param.device_class {
        DeviceClass::Enum | DeviceClass::Monetary => None,
        DeviceClass::Energy => Some("total_increasing"),
        _ => Some("measurement"),
    }
}

fn base_entity(topics: &Topics, device: &Device, name: &str, param: &Parameter) -> Map<String, Json> {
    let slug = slugify(name);
    let mut entity = Map::new();
    entity.insert("name".into(), json!(name));
    entity.insert("unique_id".into(), json!(format!("{}_{}", device.name(), slug)));
    entity.insert("state_topic".into(), json!(topics.state(device.name(), &slug)));
    entity.insert(
        "availability".into(),
        json!([
            { "topic": topics.availability(device.name()) },
            { "topic": topics.bridge_availability() },
        ]),
    );
    entity.insert("availability_mode".into(), json!("all"));
    entity.insert("device".into(), device_block(device));
    if let Some(class) = device_class(param.device_class) {
        entity.insert("device_class".into(), json!(class));
    }
    if !param.unit.is_empty() {
        entity.insert("unit_of_measurement".into(), json!(param.unit));
    }
    entity
}

/// Sensor config for a read parameter
pub fn sensor(topics: &Topics, device: &Device, name: &str, param: &Parameter) -> DiscoveryMessage {
    let mut entity = base_entity(topics, device, name, param);
    if let Some(class) = state_class(param) {
        entity.insert("state_class".into(), json!(class));
    }
    DiscoveryMessage {
        topic: topics.discovery("sensor", device.name(), &slugify(name)),
        payload: Json::Object(entity),
    }
}

/// Switch, number or select config for a write parameter
pub fn control(
    topics: &Topics,
    device: &Device,
    name: &str,
    param: &WriteParameter,
) -> DiscoveryMessage {
    let slug = slugify(name);
    let mut entity = base_entity(topics, device, name, &param.register);
    entity.insert(
        "command_topic".into(),
        json!(topics.command(device.name(), &slug)),
    );

    let component = match &param.kind {
        WriteKind::Switch { on, off } => {
            entity.insert("payload_on".into(), json!(on.to_string()));
            entity.insert("payload_off".into(), json!(off.to_string()));
            entity.insert("state_on".into(), json!(on.to_string()));
            entity.insert("state_off".into(), json!(off.to_string()));
            "switch"
        },
        WriteKind::Number { min, max } => {
            entity.insert("min".into(), json!(min));
            entity.insert("max".into(), json!(max));
            entity.insert("step".into(), json!(param.register.scale.min(1.0)));
            "number"
        },
        WriteKind::Select { options } => {
            entity.insert("options".into(), json!(options));
            // state carries the index; show the label
            entity.insert(
                "value_template".into(),
                json!(format!(
                    "{{{{ {}[value | int(0)] | default(value) }}}}",
                    serde_json::to_string(options).unwrap_or_default()
                )),
            );
            "select"
        },
    };

    DiscoveryMessage {
        topic: topics.discovery(component, device.name(), &slug),
        payload: Json::Object(entity),
    }
}

/// Every discovery message for a device, sensors first
pub fn messages(topics: &Topics, device: &Device) -> Vec<DiscoveryMessage> {
    let sensors = device
        .parameters()
        .iter()
        .filter(|(name, _)| !device.write_parameters().contains_key(*name))
        .map(|(name, param)| sensor(topics, device, name, param));
    let controls = device
        .write_parameters()
        .iter()
        .map(|(name, param)| control(topics, device, name, param));
    sensors.chain(controls).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::DeviceIdentity;
    use crate::profiles::DeviceFamily;
    use crate::transport::{SharedTransport, SimulatedClient, DEFAULT_TRANSPORT_TIMEOUT};

    fn atess() -> Device {
        let transport = SharedTransport::new(
            Box::new(SimulatedClient::new("line0")),
            DEFAULT_TRANSPORT_TIMEOUT,
        );
        Device::new(
            DeviceIdentity::new("ATESS1", 1),
            DeviceFamily::Atess,
            transport,
        )
    }

    #[test]
    fn test_sensor_payload() {
        let device = atess();
        let topics = Topics::new("modbus", "homeassistant");
        let param = &device.parameters()["Battery Power"];
        let msg = sensor(&topics, &device, "Battery Power", param);

        assert_eq!(msg.topic, "homeassistant/sensor/ATESS1/battery_power/config");
        assert_eq!(msg.payload["unique_id"], "ATESS1_battery_power");
        assert_eq!(msg.payload["device_class"], "power");
        assert_eq!(msg.payload["unit_of_measurement"], "kW");
        assert_eq!(msg.payload["state_class"], "measurement");
        assert_eq!(msg.payload["device"]["manufacturer"], "Atess");
    }

    #[test]
    fn test_control_payloads() {
        let device = atess();
        let topics = Topics::new("modbus", "homeassistant");

        let mode = &device.write_parameters()["Mode selection"];
        let msg = control(&topics, &device, "Mode selection", mode);
        assert_eq!(msg.topic, "homeassistant/select/ATESS1/mode_selection/config");
        assert_eq!(msg.payload["command_topic"], "modbus/ATESS1/mode_selection/set");
        assert_eq!(msg.payload["options"][1], "Battery First");

        let limit = &device.write_parameters()["Output Power Limit"];
        let msg = control(&topics, &device, "Output Power Limit", limit);
        assert_eq!(msg.payload["max"], 120.0);

        let all = messages(&topics, &device);
        assert_eq!(
            all.len(),
            device.parameters().len() + device.write_parameters().len()
        );
    }
}
