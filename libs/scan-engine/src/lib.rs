//! Wires the addressing, conversion, and rule layers into a running scan
//! pipeline (§4.H, §5, §6, §7): an in-process message bus, layered TOML
//! configuration, and the `Engine` lifecycle that bootstraps/reloads/shuts
//! down the five pipeline stage workers against it.

pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod error;
pub mod pipeline;

pub use bootstrap::Engine;
pub use bus::{ScanBus, Topic};
pub use config::{QueueNames, ScanConfig};
pub use error::EngineError;
