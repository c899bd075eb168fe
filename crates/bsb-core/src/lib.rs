//! # bsb-core
//!
//! Protocol stack for the BSB bus used by Siemens/Baxi heating controllers.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Field codecs turning telegram payloads into typed values and back
//! - The built-in parameter table
//! - Telegram framing, CRC-16 and parameter swapping
//! - A serial driver with frame resynchronisation and echo-verified sending
//! - A bus controller serialising all bus access through one monitor thread
//! - A simulated bus for tests and dry runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bsb_core::prelude::*;
//!
//! let registry = Arc::new(MessageRegistry::builtin());
//! let config = BusConfig::load("config.json".as_ref())?;
//! let driver = config.open_driver(Arc::clone(&registry))?;
//!
//! let controller = Controller::new(driver, config.src_address, config.controller_timing());
//! controller.add_callback(|name, value| println!("{name}: {value:?}"));
//! controller.start()?;
//!
//! let temp = controller.get_value("boiler_temp")?;
//! controller.set_value("hc1_operating_mode", Some(Value::from("comfort")))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod controller;
pub mod fields;
pub mod messages;
pub mod protocol;
pub mod simulator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BusConfig, ConfigError, MonitoredRequest};
    pub use crate::controller::{Controller, ControllerError, ControllerTiming, RequestOptions};
    pub use crate::fields::{FieldError, FieldType, Value};
    pub use crate::messages::{Flags, Message, MessageRegistry};
    pub use crate::protocol::{BusDriver, Command, DriverTiming, ProtocolError, Telegram, TelegramBuilder};
    pub use crate::simulator::{SimulatedBus, SimulatorHandle};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
