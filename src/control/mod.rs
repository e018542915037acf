// src/control/mod.rs

//! Process-level control: the cycle driver and the two ways to stop it
//! (Ctrl-C and the `Stop` RPC), which share one [`ControlContext`].

pub mod context;
pub mod driver;
pub mod rpc;
pub mod signal;

pub use context::ControlContext;
pub use driver::{Driver, DriverOptions};
pub use rpc::{DEFAULT_RPC_ADDR, MAX_REQUEST_BYTES, RpcServer, send_stop};
pub use signal::spawn_ctrl_c_handler;
