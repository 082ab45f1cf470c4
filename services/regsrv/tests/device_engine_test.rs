//! Device read/write engine against a simulated line

use regsrv::core::types::{RegisterCategory, Value};
use regsrv::transport::simulated::WriteRecord;
use regsrv::transport::SimulatedBus;
use regsrv::{Device, DeviceFamily, LifecycleState, RegSrvError};

mod common;
use common::{seeded_device, simulated_line};

use RegisterCategory::{Holding, Input};

async fn ready_atess() -> (Device, SimulatedBus) {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("ATESS1", DeviceFamily::Atess, 1, &transport, &bus);
    device.connect().await.unwrap();
    assert_eq!(device.state(), LifecycleState::BatchesReady);
    (device, bus)
}

#[tokio::test]
async fn test_failed_batch_leaves_state_untouched() {
    let (mut device, bus) = ready_atess().await;
    bus.set_register(1, Holding, 81, 2301);
    bus.set_register(1, Input, 48, 87);

    device.read_batches().await.unwrap();
    let holding = device.bank(Holding).state().to_vec();
    let input = device.bank(Input).state().to_vec();
    assert_eq!(
        Some(holding.len()),
        device.bank(Holding).plan().extent.map(|e| e.width())
    );
    assert_eq!(device.read_from_state("PV Voltage").unwrap(), Value::Float(230.1));

    bus.set_register(1, Holding, 81, 2400);
    bus.set_register(1, Input, 48, 55);
    let calls = bus.read_calls();
    bus.fail_read_call(calls + 2);

    match device.read_batches().await {
        Err(RegSrvError::BatchReadError {
            category,
            start,
            count,
            ..
        }) => {
            assert_eq!(category, Holding);
            assert_eq!(start, 126);
            assert_eq!(count, 125);
        },
        other => panic!("expected a batch read error, got {:?}", other),
    }
    // remaining batches are not attempted
    assert_eq!(bus.read_calls(), calls + 2);
    assert_eq!(device.bank(Holding).state(), holding.as_slice());
    assert_eq!(device.bank(Input).state(), input.as_slice());
    assert_eq!(device.read_from_state("PV Voltage").unwrap(), Value::Float(230.1));
    assert_eq!(device.read_from_state("Battery SOC").unwrap(), Value::Int(87));

    // the next cycle starts clean
    device.read_batches().await.unwrap();
    assert_eq!(device.read_from_state("PV Voltage").unwrap(), Value::Float(240.0));
    assert_eq!(device.read_from_state("Battery SOC").unwrap(), Value::Int(55));
}

#[tokio::test]
async fn test_state_matches_direct_read() {
    let (mut device, bus) = ready_atess().await;
    bus.set_text(1, Holding, 181, 5, "AT2023001");
    bus.set_text(1, Input, 271, 10, "HW-V1.2");
    bus.set_register(1, Input, 18, 0x0064);
    bus.set_register(1, Input, 177, 0xFE05);
    bus.set_register(1, Input, 2, 5123);
    bus.set_register(1, Holding, 179, 95);
    bus.set_register(1, Holding, 45, 125);

    device.read_batches().await.unwrap();

    let names: Vec<String> = device
        .parameters()
        .keys()
        .chain(device.write_parameters().keys())
        .cloned()
        .collect();
    for name in names {
        let from_state = device.read_from_state(&name).unwrap();
        let direct = device.read_parameter(&name).await.unwrap();
        assert_eq!(from_state, direct, "{}", name);
    }

    assert_eq!(device.read_from_state("Battery Power").unwrap(), Value::Float(10.0));
    assert_eq!(device.read_from_state("BMS Battery Status").unwrap(), Value::Int(-2));
    assert_eq!(device.read_from_state("BMS System Status").unwrap(), Value::Int(5));
    assert_eq!(
        device.read_from_state("Grid Power Compensation").unwrap(),
        Value::Float(12.5)
    );
}

#[tokio::test]
async fn test_kehua_state_matches_direct_read() {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("KH1", DeviceFamily::Kehua, 3, &transport, &bus);
    for offset in 0..409u16 {
        if !(4800..4810).contains(&(4800 + offset)) {
            bus.set_register(3, Input, 4800 + offset, offset.wrapping_mul(37));
        }
    }
    device.connect().await.unwrap();
    device.read_batches().await.unwrap();

    let names: Vec<String> = device.parameters().keys().cloned().collect();
    for name in names {
        let from_state = device.read_from_state(&name).unwrap();
        let direct = device.read_parameter(&name).await.unwrap();
        assert_eq!(from_state, direct, "{}", name);
    }
}

#[tokio::test]
async fn test_unknown_parameter() {
    let (device, _bus) = ready_atess().await;
    assert!(matches!(
        device.read_from_state("Nope"),
        Err(RegSrvError::NotFound(_))
    ));
    assert!(matches!(
        device.write_registers("Nope", "1").await,
        Err(RegSrvError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_read_before_first_cycle_is_index_error() {
    let (device, _bus) = ready_atess().await;
    assert!(matches!(
        device.read_from_state("Battery SOC"),
        Err(RegSrvError::IndexError(_))
    ));
}

#[tokio::test]
async fn test_select_write_and_read_back() {
    let (device, bus) = ready_atess().await;

    let value = device.write_registers("Mode selection", "1").await.unwrap();
    assert_eq!(value, Some(Value::Int(1)));
    assert_eq!(
        bus.writes().last(),
        Some(&WriteRecord {
            slave_id: 1,
            category: Holding,
            address: 27,
            words: vec![1],
        })
    );

    assert!(matches!(
        device.write_registers("Mode selection", "12").await,
        Err(RegSrvError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_number_write_divides_by_scale() {
    let (device, bus) = ready_atess().await;

    let value = device
        .write_registers("Grid Power Compensation", "12.5")
        .await
        .unwrap();
    assert_eq!(value, Some(Value::Float(12.5)));
    assert_eq!(bus.register(1, Holding, 45), 125);

    let writes = bus.writes().len();
    assert!(matches!(
        device.write_registers("Output Power Limit", "130").await,
        Err(RegSrvError::RangeError(_))
    ));
    assert!(matches!(
        device.write_registers("Output Power Limit", "lots").await,
        Err(RegSrvError::ValidationError(_))
    ));
    assert_eq!(bus.writes().len(), writes);
}

#[tokio::test]
async fn test_switch_write_takes_integer_literals() {
    let (device, bus) = ready_atess().await;

    let value = device
        .write_registers("Anti Reflux Enable", "0x1")
        .await
        .unwrap();
    assert_eq!(value, Some(Value::Int(1)));
    assert_eq!(bus.register(1, Holding, 17), 1);

    assert!(matches!(
        device.write_registers("Anti Reflux Enable", "5").await,
        Err(RegSrvError::ValidationError(_))
    ));
}
