//! Matrix Emulator Network Layer
//!
//! This crate puts the device model from `mmu-matrix` on the network. It
//! includes:
//!
//! - **ListenerManager**: enables and disables the TCP listener, draining
//!   client connections and rebuilding the device with stable identifiers
//! - **Session**: answers line-protocol requests and pushes change
//!   notifications for opened nodes
//! - **Emulator**: the control surface used by the binary and by tests
//!
//! # Example
//!
//! ```rust,no_run
//! use mmu_matrix::{DeviceIdentity, MatrixConfig};
//! use mmu_sim::{Emulator, ListenerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let emulator = Emulator::new(
//!     MatrixConfig::default(),
//!     DeviceIdentity::default(),
//!     ListenerConfig::default(),
//! )?;
//! emulator.enable_listener().await?;
//! emulator.switch("VIDEO", "TX1:RX1")?;
//! emulator.disable_listener().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod emulator;
pub mod error;
pub mod listener;
pub mod session;

pub use config::{ListenerConfig, DEFAULT_PORT};
pub use emulator::Emulator;
pub use error::ListenerError;
pub use listener::{ConnectionId, ListenerManager};
pub use session::{error_code, run_session, Session};
