//! Modbus PDU (function code + data) on a fixed stack buffer
//!
//! Every request this crate sends has the same shape: a function code
//! followed by two big-endian words (address, then quantity or coil value).
//! [`PduBuilder`] fills exactly those slots. Responses are variable length
//! and are copied into a [`ModbusPdu`] by [`ModbusPdu::parse`].

use tracing::debug;

use crate::codec::DecodeError;
use crate::constants::{EXCEPTION_FLAG, MAX_PDU_SIZE};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{CoilState, ModbusFunction};

/// Length of every request PDU: FC + address + quantity/value
pub const REQUEST_PDU_LEN: usize = 5;

/// PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Copy a received PDU, rejecting anything over the protocol maximum
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() > MAX_PDU_SIZE {
            return Err(DecodeError::PduTooLarge { len: bytes.len() });
        }

        let mut data = [0u8; MAX_PDU_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        let pdu = Self {
            data,
            len: bytes.len(),
        };

        match (pdu.function_code(), pdu.exception_code()) {
            (Some(fc), Some(code)) => debug!(
                "PDU parsed: FC={:02X} exception={:02X}",
                fc, code
            ),
            (Some(fc), None) => debug!("PDU parsed: FC={:02X}, data_len={}", fc, pdu.len - 1),
            (None, _) => debug!("PDU parsed: empty"),
        }

        Ok(pdu)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw function code byte, exception bit included
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }

    /// Supported function this PDU belongs to, exception bit stripped
    pub fn function(&self) -> Option<ModbusFunction> {
        self.function_code()
            .and_then(|fc| ModbusFunction::from_u8(fc & !EXCEPTION_FLAG).ok())
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .is_some_and(|fc| fc & EXCEPTION_FLAG != 0)
    }

    /// Exception code; `None` for normal responses or a truncated exception
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.as_bytes().get(1).copied()
        } else {
            None
        }
    }

    /// Bytes after the function code
    pub fn body(&self) -> &[u8] {
        self.as_bytes().get(1..).unwrap_or(&[])
    }
}

/// Builds the fixed-shape request PDU
///
/// ```rust
/// use modbus_scanner::{ModbusFunction, PduBuilder};
///
/// let pdu = PduBuilder::new(ModbusFunction::ReadHoldingRegisters)
///     .address(0x006B)
///     .quantity(3)
///     .build();
/// assert_eq!(pdu.as_bytes(), &[0x03, 0x00, 0x6B, 0x00, 0x03]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PduBuilder {
    function: ModbusFunction,
    address: u16,
    word: u16,
}

impl PduBuilder {
    pub fn new(function: ModbusFunction) -> Self {
        Self {
            function,
            address: 0,
            word: 0,
        }
    }

    pub fn address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Number of coils or registers to read
    pub fn quantity(mut self, quantity: u16) -> Self {
        self.word = quantity;
        self
    }

    /// Coil value to write (0xFF00 or 0x0000 on the wire)
    pub fn coil(mut self, state: CoilState) -> Self {
        self.word = state.to_wire();
        self
    }

    pub fn build(self) -> ModbusPdu {
        let mut data = [0u8; MAX_PDU_SIZE];
        data[0] = self.function.to_u8();
        data[1..3].copy_from_slice(&self.address.to_be_bytes());
        data[3..5].copy_from_slice(&self.word.to_be_bytes());
        debug!(
            "PDU built: {} address={} word=0x{:04X}",
            self.function, self.address, self.word
        );
        ModbusPdu {
            data,
            len: REQUEST_PDU_LEN,
        }
    }

    /// Read request PDU; only Read Coils and Read Holding Registers qualify
    pub fn read_request(
        function: ModbusFunction,
        start_address: u16,
        quantity: u16,
    ) -> ModbusResult<ModbusPdu> {
        if function == ModbusFunction::WriteSingleCoil {
            return Err(ModbusError::invalid_function(function.to_u8()));
        }
        Ok(Self::new(function)
            .address(start_address)
            .quantity(quantity)
            .build())
    }

    pub fn write_single_coil(address: u16, state: CoilState) -> ModbusPdu {
        Self::new(ModbusFunction::WriteSingleCoil)
            .address(address)
            .coil(state)
            .build()
    }
}
