//! # Modbus TCP Frame Codec
//!
//! Pure functions that serialize request ADUs and validate response ADUs for
//! the three supported function codes.
//!
//! ## Request frame
//!
//! | Offset | Field | Size |
//! |--------|-------|------|
//! | 0 | Transaction ID | 2 |
//! | 2 | Protocol ID (0) | 2 |
//! | 4 | Length (6) | 2 |
//! | 6 | Unit ID | 1 |
//! | 7 | Function code | 1 |
//! | 8 | Address | 2 |
//! | 10 | Quantity / coil value | 2 |
//!
//! All fields are big-endian.
//!
//! ## Response validation order
//!
//! 1. Shorter than MBAP + function code: malformed
//! 2. Exception bit set: exception response, whatever function was expected
//! 3. Function code differs from the expected one: malformed
//! 4. Function-specific minimum length
//!
//! The transaction ID is not compared unless strict decoding is requested.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tracing::debug;

use crate::constants::{
    FC_READ_COILS, FC_READ_HOLDING_REGISTERS, FC_WRITE_SINGLE_COIL, MBAP_HEADER_LEN,
    MIN_RESPONSE_LEN, REQUEST_FRAME_LEN,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;
use crate::protocol::{CoilState, ModbusFunction, ModbusRequest, ModbusResponse, UnitId};

/// Offset of the byte-count field in a read response
const BYTE_COUNT_OFFSET: usize = MIN_RESPONSE_LEN;

/// Length of a Write Single Coil echo: MBAP + FC + address + value
const WRITE_ECHO_LEN: usize = MIN_RESPONSE_LEN + 4;

/// Structural validation failure of a response frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame shorter than MBAP+function header ({len} bytes)")]
    TooShort { len: usize },

    #[error("exception response without exception code")]
    MissingExceptionCode,

    #[error("function code mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    FunctionMismatch { expected: u8, actual: u8 },

    #[error("read response without byte count")]
    MissingByteCount,

    #[error("response truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("register byte count {byte_count} is odd")]
    OddRegisterByteCount { byte_count: usize },

    #[error("invalid coil value 0x{value:04X} in write echo")]
    InvalidCoilValue { value: u16 },

    #[error("write echo address mismatch (expected {expected}, got {actual})")]
    EchoAddressMismatch { expected: u16, actual: u16 },

    #[error("PDU exceeds maximum size ({len} bytes)")]
    PduTooLarge { len: usize },

    #[error("transaction ID mismatch (expected {expected}, got {actual})")]
    TransactionMismatch { expected: u16, actual: u16 },
}

impl From<DecodeError> for ModbusError {
    fn from(err: DecodeError) -> Self {
        ModbusError::malformed(err.to_string())
    }
}

/// How strictly a response is matched against its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Transaction ID is ignored
    #[default]
    Lenient,
    /// Transaction ID must echo the request's
    Strict,
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize a request into its Modbus TCP ADU
pub fn encode_request(request: &ModbusRequest) -> Bytes {
    let mut frame = BytesMut::with_capacity(REQUEST_FRAME_LEN);
    frame.put_u16(request.transaction_id());
    frame.put_u16(request.protocol_id());
    frame.put_u16(request.length());
    frame.put_u8(request.unit_id());
    frame.put_u8(request.function_code());
    frame.put_slice(request.payload());
    frame.freeze()
}

/// Encode a Read Coils (FC01) request frame
///
/// # Example
///
/// ```rust
/// use modbus_scanner::codec::encode_read_coils;
///
/// let frame = encode_read_coils(1, 1, 0, 1).unwrap();
/// assert_eq!(&frame[..], &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]);
/// ```
pub fn encode_read_coils(
    transaction_id: u16,
    unit_id: UnitId,
    start_address: u16,
    quantity: u16,
) -> ModbusResult<Bytes> {
    let request = ModbusRequest::read_coils(transaction_id, unit_id, start_address, quantity)?;
    Ok(encode_request(&request))
}

/// Encode a Write Single Coil (FC05) request frame
pub fn encode_write_single_coil(
    transaction_id: u16,
    unit_id: UnitId,
    address: u16,
    state: CoilState,
) -> ModbusResult<Bytes> {
    let request = ModbusRequest::write_single_coil(transaction_id, unit_id, address, state)?;
    Ok(encode_request(&request))
}

/// Encode a Read Holding Registers (FC03) request frame
pub fn encode_read_holding_registers(
    transaction_id: u16,
    unit_id: UnitId,
    start_address: u16,
    quantity: u16,
) -> ModbusResult<Bytes> {
    let request =
        ModbusRequest::read_holding_registers(transaction_id, unit_id, start_address, quantity)?;
    Ok(encode_request(&request))
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode and validate a raw response frame.
///
/// Exception responses are returned as `Ok` with the exception bit set in
/// `function_code`; callers check [`ModbusResponse::is_exception`].
pub fn decode_response(raw: &[u8], expected_function: u8) -> Result<ModbusResponse, DecodeError> {
    if raw.len() < MIN_RESPONSE_LEN {
        return Err(DecodeError::TooShort { len: raw.len() });
    }

    let transaction_id = u16::from_be_bytes([raw[0], raw[1]]);
    let protocol_id = u16::from_be_bytes([raw[2], raw[3]]);
    let length = u16::from_be_bytes([raw[4], raw[5]]);
    let unit_id = raw[6];

    let pdu = ModbusPdu::parse(&raw[MBAP_HEADER_LEN..])?;
    let function_code = raw[MBAP_HEADER_LEN];

    if pdu.is_exception() {
        let code = pdu
            .exception_code()
            .ok_or(DecodeError::MissingExceptionCode)?;
        return Ok(ModbusResponse {
            transaction_id,
            protocol_id,
            length,
            unit_id,
            function_code,
            data: vec![code],
        });
    }

    if function_code != expected_function {
        return Err(DecodeError::FunctionMismatch {
            expected: expected_function,
            actual: function_code,
        });
    }

    match function_code {
        FC_READ_COILS | FC_READ_HOLDING_REGISTERS => {
            let byte_count = *raw
                .get(BYTE_COUNT_OFFSET)
                .ok_or(DecodeError::MissingByteCount)? as usize;
            let needed = BYTE_COUNT_OFFSET + 1 + byte_count;
            if raw.len() < needed {
                return Err(DecodeError::Truncated {
                    needed,
                    actual: raw.len(),
                });
            }
            if function_code == FC_READ_HOLDING_REGISTERS && byte_count % 2 != 0 {
                return Err(DecodeError::OddRegisterByteCount { byte_count });
            }
        }
        FC_WRITE_SINGLE_COIL => {
            if raw.len() < WRITE_ECHO_LEN {
                return Err(DecodeError::Truncated {
                    needed: WRITE_ECHO_LEN,
                    actual: raw.len(),
                });
            }
        }
        _ => {}
    }

    Ok(ModbusResponse {
        transaction_id,
        protocol_id,
        length,
        unit_id,
        function_code,
        data: raw[MIN_RESPONSE_LEN..].to_vec(),
    })
}

/// Decode a response in the context of the request that produced it.
///
/// On top of [`decode_response`] this checks that a read response carries
/// data for the full requested quantity, and in [`DecodeMode::Strict`] that
/// the transaction ID matches.
pub fn decode_response_for(
    raw: &[u8],
    request: &ModbusRequest,
    mode: DecodeMode,
) -> Result<ModbusResponse, DecodeError> {
    let response = decode_response(raw, request.function_code())?;

    if mode == DecodeMode::Strict && response.transaction_id != request.transaction_id() {
        debug!(
            "Rejecting response: transaction {} does not match request {}",
            response.transaction_id,
            request.transaction_id()
        );
        return Err(DecodeError::TransactionMismatch {
            expected: request.transaction_id(),
            actual: response.transaction_id,
        });
    }

    if response.is_exception() {
        return Ok(response);
    }

    let quantity = request.quantity_or_value() as usize;
    let required_bytes = match request.function() {
        ModbusFunction::ReadCoils => quantity.div_ceil(8),
        ModbusFunction::ReadHoldingRegisters => quantity * 2,
        ModbusFunction::WriteSingleCoil => 0,
    };
    if required_bytes > 0 {
        // byte count presence was checked by decode_response
        let byte_count = response.data[0] as usize;
        if byte_count < required_bytes {
            return Err(DecodeError::Truncated {
                needed: BYTE_COUNT_OFFSET + 1 + required_bytes,
                actual: BYTE_COUNT_OFFSET + 1 + byte_count,
            });
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_read_coils_frame() {
        let frame = encode_read_coils(1, 1, 0, 1).unwrap();
        assert_eq!(
            &frame[..],
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_encode_read_holding_registers_frame() {
        let frame = encode_read_holding_registers(0x1234, 0x11, 0x006B, 3).unwrap();
        assert_eq!(
            &frame[..],
            &[0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
    }

    #[test]
    fn test_encode_write_single_coil_values() {
        let on = encode_write_single_coil(5, 1, 10, "on".parse().unwrap()).unwrap();
        assert_eq!(&on[..], &[0x00, 0x05, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x0A, 0xFF, 0x00]);

        let off = encode_write_single_coil(5, 1, 10, "OFF".parse().unwrap()).unwrap();
        assert_eq!(&off[10..], &[0x00, 0x00]);
    }

    #[test]
    fn test_encode_rejects_bad_quantity() {
        assert!(encode_read_coils(1, 1, 0, 0).is_err());
        assert!(encode_read_coils(1, 1, 0, 2001).is_err());
        assert!(encode_read_holding_registers(1, 1, 0, 126).is_err());
    }

    #[test]
    fn test_decode_coil_on() {
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01];
        let response = decode_response(&raw, 0x01).unwrap();
        assert!(!response.is_exception());
        assert_eq!(response.transaction_id, 1);
        assert_eq!(response.length, 4);
        assert_eq!(response.coil_state().unwrap(), CoilState::On);
    }

    #[test]
    fn test_decode_exception() {
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x81, 0x02];
        let response = decode_response(&raw, 0x01).unwrap();
        assert!(response.is_exception());
        assert_eq!(response.exception_code(), Some(0x02));
        assert_eq!(response.data, vec![0x02]);
    }

    #[test]
    fn test_decode_exception_ignores_expected_function() {
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x81, 0x02];
        let response = decode_response(&raw, 0x03).unwrap();
        assert_eq!(response.exception_code(), Some(0x02));
    }

    #[test]
    fn test_decode_exception_without_code() {
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0x81];
        assert_eq!(
            decode_response(&raw, 0x01),
            Err(DecodeError::MissingExceptionCode)
        );
    }

    #[test]
    fn test_decode_header_only_is_malformed() {
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01];
        assert_eq!(
            decode_response(&raw, 0x01),
            Err(DecodeError::TooShort { len: 7 })
        );
        assert_eq!(decode_response(&[], 0x01), Err(DecodeError::TooShort { len: 0 }));
    }

    #[test]
    fn test_decode_function_mismatch() {
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x01];
        let err = decode_response(&raw, 0x01).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FunctionMismatch {
                expected: 0x01,
                actual: 0x03
            }
        );
        assert!(err.to_string().starts_with("function code mismatch"));
    }

    #[test]
    fn test_decode_truncated_read() {
        // byte count says 4, only 2 data bytes present
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00, 0x01];
        assert_eq!(
            decode_response(&raw, 0x03),
            Err(DecodeError::Truncated {
                needed: 13,
                actual: 11
            })
        );

        let no_count = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0x01];
        assert_eq!(
            decode_response(&no_count, 0x01),
            Err(DecodeError::MissingByteCount)
        );
    }

    #[test]
    fn test_decode_write_echo() {
        let raw = [0x00, 0x05, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x0A, 0xFF, 0x00];
        let response = decode_response(&raw, 0x05).unwrap();
        assert_eq!(response.echoed_coil_write().unwrap(), (10, CoilState::On));

        assert_eq!(
            decode_response(&raw[..11], 0x05),
            Err(DecodeError::Truncated {
                needed: 12,
                actual: 11
            })
        );
    }

    #[test]
    fn test_decode_register_value() {
        let raw = [0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0xAB, 0xCD];
        let response = decode_response(&raw, 0x03).unwrap();
        assert_eq!(response.registers().unwrap(), vec![0xABCD]);
    }

    #[test]
    fn test_decode_for_checks_quantity() {
        let request = ModbusRequest::read_holding_registers(7, 1, 0, 2).unwrap();
        let raw = [0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0xAB, 0xCD];
        assert!(matches!(
            decode_response_for(&raw, &request, DecodeMode::Lenient),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_for_strict_transaction_id() {
        let request = ModbusRequest::read_coils(9, 1, 0, 1).unwrap();
        let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x00];

        assert!(decode_response_for(&raw, &request, DecodeMode::Lenient).is_ok());
        assert_eq!(
            decode_response_for(&raw, &request, DecodeMode::Strict),
            Err(DecodeError::TransactionMismatch {
                expected: 9,
                actual: 1
            })
        );
    }

    #[test]
    fn test_decode_error_into_modbus_error() {
        let err: ModbusError = DecodeError::TooShort { len: 3 }.into();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedResponse);
    }

    /// Answer a read coils request with a single ON coil
    fn coil_reply(request: &[u8]) -> Vec<u8> {
        let mut reply = request[..8].to_vec();
        reply[5] = 0x04;
        reply.extend_from_slice(&[0x01, 0x01]);
        reply
    }

    proptest! {
        #[test]
        fn prop_read_coils_header_roundtrip(
            transaction_id in any::<u16>(),
            unit_id in any::<u8>(),
            start in any::<u16>(),
            quantity in 1u16..=2000,
        ) {
            let frame = encode_read_coils(transaction_id, unit_id, start, quantity).unwrap();
            prop_assert_eq!(frame.len(), REQUEST_FRAME_LEN);

            let response = decode_response(&coil_reply(&frame), 0x01).unwrap();
            prop_assert_eq!(response.transaction_id, transaction_id);
            prop_assert_eq!(response.unit_id, unit_id);
            prop_assert_eq!(response.function_code, 0x01);
        }

        #[test]
        fn prop_encoding_is_idempotent(
            transaction_id in any::<u16>(),
            unit_id in any::<u8>(),
            address in any::<u16>(),
            on in any::<bool>(),
        ) {
            let state = CoilState::from(on);
            let a = encode_write_single_coil(transaction_id, unit_id, address, state).unwrap();
            let b = encode_write_single_coil(transaction_id, unit_id, address, state).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_exception_bit_wins(expected in any::<u8>(), code in any::<u8>()) {
            let raw = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x81, code];
            let response = decode_response(&raw, expected).unwrap();
            prop_assert!(response.is_exception());
            prop_assert_eq!(response.exception_code(), Some(code));
        }

        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..300)) {
            let _ = decode_response(&raw, 0x01);
            let _ = decode_response(&raw, 0x03);
            let _ = decode_response(&raw, 0x05);
        }
    }
}
