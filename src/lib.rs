//! # Modbus Scanner - Modbus TCP Client Codec and Range Scanner
//!
//! Builds and parses Modbus TCP (MBAP) frames for a small set of function
//! codes, runs single request/response exchanges against a server, and
//! sweeps address or unit ID ranges to find out what a device exposes.
//!
//! ## Features
//!
//! - **Frame Codec**: Byte-exact request encoding and validated response decoding
//! - **Outcome Classification**: Every exchange ends as exactly one [`ScanOutcome`]
//! - **Sequential Scanning**: One request in flight at a time, with a configurable
//!   inter-request delay so slow field devices are not overrun
//! - **Session Control**: Reuse one TCP session per scan or reconnect per probe
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Scanner |
//! |------|----------|---------|
//! | 0x01 | Read Coils | `scan_coils`, `read_coil` |
//! | 0x03 | Read Holding Registers | `scan_holding_registers`, `scan_unit_ids` |
//! | 0x05 | Write Single Coil | `write_coil` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_scanner::{ModbusResult, RangeScanner, ScanConfig, TcpConnector};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let connector = TcpConnector::from_address("127.0.0.1:502")?;
//!     let config = ScanConfig::new().with_timeout(Duration::from_secs(1));
//!     let mut scanner = RangeScanner::new(connector, config);
//!
//!     // Which units answer at all?
//!     let units = scanner.scan_unit_ids(1, 10).await?;
//!     println!("Responsive units: {:?}", units.responsive_targets());
//!
//!     // Holding registers 0..=99 on unit 1
//!     let registers = scanner.scan_holding_registers(1, 0, 99).await?;
//!     for (address, value) in registers.successes() {
//!         println!("{:05}: {}", address, value);
//!     }
//!
//!     scanner.close().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus TCP protocol constants
pub mod constants;

/// Function codes, exception codes, requests and responses
pub mod protocol;

/// Stack-allocated PDU and PDU builder
pub mod pdu;

/// MBAP frame encoding and response validation
pub mod codec;

/// Byte channels to a Modbus TCP server
pub mod transport;

// ============================================================================
// Scanning
// ============================================================================

/// Single exchange and outcome classification
pub mod dispatcher;

/// Probe outcomes and scan reports
pub mod report;

/// Scanner pacing and session configuration
pub mod config;

/// Sequential range scanner
pub mod scanner;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_scanner::tokio) ===
pub use tokio;

// === Error handling ===
pub use error::{ErrorKind, ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{CoilState, ModbusException, ModbusFunction, ModbusRequest, ModbusResponse, UnitId};

// === Codec ===
pub use codec::{
    decode_response, decode_response_for, encode_read_coils, encode_read_holding_registers,
    encode_request, encode_write_single_coil, DecodeError, DecodeMode,
};

// === Transport ===
pub use transport::{ChannelConnector, ModbusChannel, TcpChannel, TcpConnector, TransportStats};

// === Scanning ===
pub use config::{ScanConfig, SessionPolicy, TransactionIdMode};
pub use dispatcher::RequestDispatcher;
pub use report::{OutcomeKind, ProbeValue, ScanEntry, ScanKind, ScanOutcome, ScanReport};
pub use scanner::RangeScanner;

// === Protocol limits (commonly needed constants) ===
pub use constants::{MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

/// Default server host for the scanner binary
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Unit ID used when none is given
pub const DEFAULT_UNIT_ID: UnitId = 1;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Modbus Scanner v{} - Modbus TCP coil, register and unit ID scanner",
        VERSION
    )
}
