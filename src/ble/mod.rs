//! Bluetooth LE GATT server.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`esp`] binds [`GattStack`] to Bluedroid and
//!   routes C callbacks into the server.
//! - **all other targets**: everything except `esp` builds, and tests drive
//!   [`GattServer`] with a recording stack.
//!
//! | Module         | Role                                                   |
//! |----------------|--------------------------------------------------------|
//! | [`uuid`]       | 16/32-bit UUIDs and their 128-bit expansion            |
//! | [`profile`]    | services, characteristics, descriptors                 |
//! | [`attr_table`] | flattened attribute entries and handle arithmetic     |
//! | [`stack`]      | host stack port trait                                  |
//! | [`events`]     | decoded GAP / GATTS events                             |
//! | [`server`]     | event-driven server state machine                      |
//! | [`dispatch`]   | app id / interface id → handler routing                |

pub mod attr_table;
pub mod dispatch;
pub mod events;
pub mod profile;
pub mod server;
pub mod stack;
pub mod uuid;

#[cfg(target_os = "espidf")]
pub mod esp;

pub use attr_table::{AttributeTable, AttributeTableEntry, HandleLayout};
pub use events::{GapEvent, GattsEvent};
pub use server::{ConnectionContext, GattEventHandler, GattServer, ServerState, UpdateOutcome};
pub use stack::{GattStack, GattStatus, StackError};
pub use uuid::BleUuid;
