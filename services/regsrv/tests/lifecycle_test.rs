//! Connection lifecycle against a simulated line

use regsrv::core::types::RegisterCategory;
use regsrv::{DeviceFamily, LifecycleState, RegSrvError};

mod common;
use common::{seeded_device, simulated_line};

#[tokio::test]
async fn test_connection_failure_surfaces() {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("ATESS1", DeviceFamily::Atess, 1, &transport, &bus);
    bus.set_fail_connect(true);

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, RegSrvError::ConnectionError(_)));
    assert!(err.is_recoverable());
    assert_eq!(device.state(), LifecycleState::Unconnected);
    assert_eq!(bus.read_calls(), 0);
}

#[tokio::test]
async fn test_silent_device_is_unavailable() {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("ATESS1", DeviceFamily::Atess, 1, &transport, &bus);
    bus.set_offline(1, true);

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, RegSrvError::Unavailable(_)));
    assert_eq!(device.state(), LifecycleState::Unavailable);
    assert!(!device.is_available(None).await);

    bus.set_offline(1, false);
    device.connect().await.unwrap();
    assert_eq!(device.state(), LifecycleState::BatchesReady);
}

#[tokio::test]
async fn test_unsupported_model_stops_at_connected() {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("ATESS1", DeviceFamily::Atess, 1, &transport, &bus);
    // HPS30: a known code, but not a supported model
    bus.set_register(1, RegisterCategory::Holding, 44, 22001);

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, RegSrvError::ModelError(_)));
    assert!(!err.is_recoverable());
    assert_eq!(device.state(), LifecycleState::Connected);
    assert_eq!(device.model(), None);

    bus.set_register(1, RegisterCategory::Holding, 44, 12345);
    assert!(matches!(
        device.connect().await,
        Err(RegSrvError::ModelError(_))
    ));
}

#[tokio::test]
async fn test_pcs_model_parameters() {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("ATESS1", DeviceFamily::Atess, 1, &transport, &bus);

    device.connect().await.unwrap();
    assert_eq!(device.model(), Some("PCS500"));
    assert!(device.parameters().contains_key("Grid Frequency"));
    assert!(!device.parameters().contains_key("PV1 Voltage"));
    assert!(device.write_parameters().contains_key("Bypass Cabinet Enable"));
}

#[tokio::test]
async fn test_reconnect_reruns_model_delta() {
    let (transport, bus) = simulated_line("line0");
    let mut device = seeded_device("ATESS1", DeviceFamily::Atess, 1, &transport, &bus);
    device.connect().await.unwrap();
    let pcs_batches = device.bank(RegisterCategory::Input).plan().batches.len();

    // the unit was swapped for a PBD250
    bus.set_register(1, RegisterCategory::Holding, 44, 23003);
    device.connect().await.unwrap();

    assert_eq!(device.model(), Some("PBD250"));
    assert!(device.parameters().contains_key("PV1 Voltage"));
    assert!(device.parameters().contains_key("PV5 Power"));
    assert!(!device.parameters().contains_key("Grid Frequency"));
    assert!(!device.write_parameters().contains_key("Bypass Cabinet Enable"));
    assert!(!device.write_parameters().contains_key("BMS Communication Enable"));
    assert!(device.write_parameters().contains_key("Mode selection"));
    assert!(pcs_batches > 0);
    // a fresh plan, and no state carried over from the previous connection
    assert!(device.bank(RegisterCategory::Input).state().is_empty());
}

#[tokio::test]
async fn test_serial_mismatch_does_not_block() {
    let (transport, bus) = simulated_line("line0");
    DeviceFamily::Atess.seed_simulation(&bus, 1);
    bus.set_text(1, RegisterCategory::Holding, 181, 5, "OTHER");
    let mut device = regsrv::Device::new(
        regsrv::DeviceIdentity::new("ATESS1", 1).with_serial("AT2023001"),
        DeviceFamily::Atess,
        transport,
    );

    device.connect().await.unwrap();
    assert!(device.is_ready());
}
