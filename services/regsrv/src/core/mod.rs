//! Device register model and batched read/write engine

pub mod codec;
pub mod device;
pub mod lifecycle;
pub mod planner;
pub mod slug;
pub mod types;

pub use device::{Device, DeviceIdentity, RegisterBank, WRITE_ATTEMPTS};
pub use lifecycle::LifecycleState;
pub use planner::{compute_extent, make_batches, Batch, BankPlan, Extent, MODBUS_MAX_READ_REGISTERS};
pub use slug::slugify;
pub use types::{
    DataType, DeviceClass, Parameter, ParameterMap, RegisterCategory, Value, WriteKind,
    WriteParameter, WriteParameterMap,
};
