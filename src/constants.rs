//! Modbus TCP protocol constants
//!
//! Values follow the Modbus Application Protocol and Modbus Messaging on
//! TCP/IP specifications. Only the three function codes this client speaks
//! are listed.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP header length including the unit ID
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1) = 7 bytes
pub const MBAP_HEADER_LEN: usize = 7;

/// Smallest decodable response: MBAP header + function code
pub const MIN_RESPONSE_LEN: usize = MBAP_HEADER_LEN + 1;

/// Size of every request frame this client emits
/// MBAP(7) + FC(1) + address(2) + quantity/value(2) = 12 bytes
pub const REQUEST_FRAME_LEN: usize = 12;

/// Protocol identifier, always zero for Modbus TCP
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU) = 254 bytes
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Response buffer size for receiving Modbus frames
///
/// Theoretical max frame is 6 + 254 = 260 bytes; 512 leaves headroom for
/// servers that pad.
pub const MODBUS_RESPONSE_BUFFER_SIZE: usize = 512;

// ============================================================================
// Quantity Limits
// ============================================================================

/// Maximum number of registers for FC03 (Read Holding Registers)
///
/// Response PDU: 1 (FC) + 1 (byte count) + N × 2 ≤ 253, so N ≤ 125
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of coils for FC01 (Read Coils)
///
/// Response PDU: 1 (FC) + 1 (byte count) + ceil(N / 8) ≤ 253, rounded by
/// the specification to 2000
pub const MAX_READ_COILS: u16 = 2000;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Write Single Coil Values
// ============================================================================

/// Wire value for coil ON
pub const COIL_ON: u16 = 0xFF00;

/// Wire value for coil OFF
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;
