//! # Request Dispatcher
//!
//! Runs one request/response exchange on a channel and classifies the
//! result into a [`ScanOutcome`]:
//!
//! | Observation | Outcome |
//! |-------------|---------|
//! | timeout, nothing received | `NoResponse` |
//! | any other channel fault | `NetworkError` |
//! | exception bit set | `ModbusException(code)` |
//! | wrong function code / short frame | `MalformedResponse` |
//! | valid response | `Success(value)` |
//!
//! No retries happen here; one call is one attempt.

use std::time::Duration;

use tracing::{debug, warn};

use crate::codec::{decode_response_for, encode_request, DecodeError, DecodeMode};
use crate::config::ScanConfig;
use crate::constants::MODBUS_RESPONSE_BUFFER_SIZE;
use crate::protocol::{CoilState, ModbusFunction, ModbusRequest};
use crate::report::{ProbeValue, ScanOutcome};
use crate::transport::ModbusChannel;

/// Issues requests on a channel and classifies what comes back
#[derive(Debug, Clone, Copy)]
pub struct RequestDispatcher {
    timeout: Duration,
    mode: DecodeMode,
}

impl RequestDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            mode: DecodeMode::Lenient,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.timeout).with_strict_transaction_check(config.strict_transaction_check)
    }

    /// Reject responses whose transaction ID does not echo the request's
    pub fn with_strict_transaction_check(mut self, strict: bool) -> Self {
        self.mode = if strict {
            DecodeMode::Strict
        } else {
            DecodeMode::Lenient
        };
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request`, wait for its response and classify it.
    ///
    /// The channel is used exclusively for the duration of the call.
    pub async fn exchange<C: ModbusChannel>(
        &self,
        channel: &mut C,
        request: &ModbusRequest,
    ) -> ScanOutcome {
        let frame = encode_request(request);
        debug!(
            "Dispatching {} tx={} unit={} address={}",
            request.function(),
            request.transaction_id(),
            request.unit_id(),
            request.address()
        );

        if let Err(e) = channel.send(&frame).await {
            warn!("Send failed for tx={}: {}", request.transaction_id(), e);
            return ScanOutcome::from_error(&e);
        }

        let raw = match channel
            .receive(MODBUS_RESPONSE_BUFFER_SIZE, self.timeout)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_timeout() {
                    debug!("No response for tx={}", request.transaction_id());
                } else {
                    warn!("Receive failed for tx={}: {}", request.transaction_id(), e);
                }
                return ScanOutcome::from_error(&e);
            }
        };

        self.classify(&raw, request)
    }

    /// Classify raw response bytes received for `request`
    pub fn classify(&self, raw: &[u8], request: &ModbusRequest) -> ScanOutcome {
        let response = match decode_response_for(raw, request, self.mode) {
            Ok(response) => response,
            Err(reason) => {
                debug!("Malformed response for tx={}: {}", request.transaction_id(), reason);
                return ScanOutcome::MalformedResponse(reason);
            }
        };

        if let Some(code) = response.exception_code() {
            debug!(
                "Exception 0x{:02X} for tx={}",
                code,
                request.transaction_id()
            );
            return ScanOutcome::ModbusException(code);
        }

        match extract_value(request, &response.data) {
            Ok(value) => ScanOutcome::Success(value),
            Err(reason) => ScanOutcome::MalformedResponse(reason),
        }
    }
}

/// Pull the function-specific value out of a validated response payload
fn extract_value(request: &ModbusRequest, data: &[u8]) -> Result<ProbeValue, DecodeError> {
    match request.function() {
        ModbusFunction::ReadCoils => data
            .get(1)
            .map(|&status| ProbeValue::Coil(CoilState::from_status_byte(status)))
            .ok_or(DecodeError::MissingByteCount),
        ModbusFunction::ReadHoldingRegisters => match data.get(1..3) {
            Some(&[hi, lo]) => Ok(ProbeValue::Register(u16::from_be_bytes([hi, lo]))),
            _ => Err(DecodeError::Truncated {
                needed: 11,
                actual: 8 + data.len(),
            }),
        },
        ModbusFunction::WriteSingleCoil => match data.get(0..4) {
            Some(&[addr_hi, addr_lo, hi, lo]) => {
                let address = u16::from_be_bytes([addr_hi, addr_lo]);
                if address != request.address() {
                    return Err(DecodeError::EchoAddressMismatch {
                        expected: request.address(),
                        actual: address,
                    });
                }
                let value = u16::from_be_bytes([hi, lo]);
                CoilState::from_wire(value)
                    .map(ProbeValue::Written)
                    .ok_or(DecodeError::InvalidCoilValue { value })
            }
            _ => Err(DecodeError::Truncated {
                needed: 12,
                actual: 8 + data.len(),
            }),
        },
    }
}
