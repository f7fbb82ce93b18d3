//! Device list screen: the account's devices, their trust, and the
//! rename/delete/verify operations on them.

mod controller;
mod events;
mod state;

pub use controller::{DevicesConfig, DevicesController};
pub use events::{DevicesAction, DevicesViewEvent};
pub use state::{reduce, DeviceListState, PendingAuthContext, StateChange};
