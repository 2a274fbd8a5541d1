//! Modbus protocol definitions and data structures
//!
//! Function codes, exception codes, coil states and the request/response
//! views shared by the codec, dispatcher and scanner.

use std::fmt;
use std::str::FromStr;

use crate::constants::{
    COIL_OFF, COIL_ON, EXCEPTION_ACKNOWLEDGE, EXCEPTION_FLAG, EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    EXCEPTION_GATEWAY_TARGET_FAILED, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE,
    EXCEPTION_ILLEGAL_FUNCTION, EXCEPTION_MEMORY_PARITY_ERROR, EXCEPTION_SERVER_DEVICE_BUSY,
    EXCEPTION_SERVER_DEVICE_FAILURE, FC_READ_COILS, FC_READ_HOLDING_REGISTERS,
    FC_WRITE_SINGLE_COIL, MAX_READ_COILS, MAX_READ_REGISTERS, MODBUS_PROTOCOL_ID,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};

/// Modbus unit identifier (slave address on a gateway)
pub type UnitId = u8;

/// Function codes supported by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils = FC_READ_COILS,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = FC_READ_HOLDING_REGISTERS,
    /// Write Single Coil (0x05)
    WriteSingleCoil = FC_WRITE_SINGLE_COIL,
}

impl ModbusFunction {
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            FC_READ_COILS => Ok(Self::ReadCoils),
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_WRITE_SINGLE_COIL => Ok(Self::WriteSingleCoil),
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Function code the server uses when answering with an exception
    #[inline]
    pub fn exception_code(self) -> u8 {
        self.to_u8() | EXCEPTION_FLAG
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::WriteSingleCoil => "Write Single Coil",
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.to_u8())
    }
}

/// Standard Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = EXCEPTION_ILLEGAL_FUNCTION,
    IllegalDataAddress = EXCEPTION_ILLEGAL_DATA_ADDRESS,
    IllegalDataValue = EXCEPTION_ILLEGAL_DATA_VALUE,
    ServerDeviceFailure = EXCEPTION_SERVER_DEVICE_FAILURE,
    Acknowledge = EXCEPTION_ACKNOWLEDGE,
    ServerDeviceBusy = EXCEPTION_SERVER_DEVICE_BUSY,
    MemoryParityError = EXCEPTION_MEMORY_PARITY_ERROR,
    GatewayPathUnavailable = EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    GatewayTargetFailedToRespond = EXCEPTION_GATEWAY_TARGET_FAILED,
}

impl ModbusException {
    /// Map a raw exception code; unknown codes yield `None`
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            EXCEPTION_ILLEGAL_FUNCTION => Some(Self::IllegalFunction),
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Some(Self::IllegalDataAddress),
            EXCEPTION_ILLEGAL_DATA_VALUE => Some(Self::IllegalDataValue),
            EXCEPTION_SERVER_DEVICE_FAILURE => Some(Self::ServerDeviceFailure),
            EXCEPTION_ACKNOWLEDGE => Some(Self::Acknowledge),
            EXCEPTION_SERVER_DEVICE_BUSY => Some(Self::ServerDeviceBusy),
            EXCEPTION_MEMORY_PARITY_ERROR => Some(Self::MemoryParityError),
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => Some(Self::GatewayPathUnavailable),
            EXCEPTION_GATEWAY_TARGET_FAILED => Some(Self::GatewayTargetFailedToRespond),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::ServerDeviceFailure => "server device failure",
            Self::Acknowledge => "acknowledge",
            Self::ServerDeviceBusy => "server device busy",
            Self::MemoryParityError => "memory parity error",
            Self::GatewayPathUnavailable => "gateway path unavailable",
            Self::GatewayTargetFailedToRespond => "gateway target device failed to respond",
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", *self as u8, self.description())
    }
}

/// State of a single coil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoilState {
    On,
    Off,
}

impl CoilState {
    /// Value sent in a Write Single Coil request
    #[inline]
    pub fn to_wire(self) -> u16 {
        match self {
            Self::On => COIL_ON,
            Self::Off => COIL_OFF,
        }
    }

    /// Parse a Write Single Coil value; only `0xFF00` and `0x0000` are legal
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            COIL_ON => Some(Self::On),
            COIL_OFF => Some(Self::Off),
            _ => None,
        }
    }

    /// Coil status is bit 0 of the data byte
    #[inline]
    pub fn from_status_byte(byte: u8) -> Self {
        if byte & 0x01 != 0 {
            Self::On
        } else {
            Self::Off
        }
    }

    #[inline]
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for CoilState {
    fn from(value: bool) -> Self {
        if value {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl FromStr for CoilState {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(Self::On),
            "off" | "false" | "0" => Ok(Self::Off),
            other => Err(ModbusError::invalid_argument(format!(
                "invalid coil state '{}' (expected on/off)",
                other
            ))),
        }
    }
}

impl fmt::Display for CoilState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("ON"),
            Self::Off => f.write_str("OFF"),
        }
    }
}

/// A Modbus TCP request, immutable once built.
///
/// The protocol ID is always zero and the MBAP length field is derived from
/// the payload, so neither can be supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    transaction_id: u16,
    unit_id: UnitId,
    function: ModbusFunction,
    /// PDU bytes following the function code
    payload: Vec<u8>,
}

impl ModbusRequest {
    /// Build a Read Coils (FC01) request for `quantity` coils (1-2000)
    pub fn read_coils(
        transaction_id: u16,
        unit_id: UnitId,
        start_address: u16,
        quantity: u16,
    ) -> ModbusResult<Self> {
        if quantity == 0 || quantity > MAX_READ_COILS {
            return Err(ModbusError::invalid_argument(format!(
                "coil quantity {} out of range 1-{}",
                quantity, MAX_READ_COILS
            )));
        }
        let pdu = PduBuilder::read_request(ModbusFunction::ReadCoils, start_address, quantity)?;
        Self::from_pdu(transaction_id, unit_id, &pdu)
    }

    /// Build a Read Holding Registers (FC03) request for `quantity` registers (1-125)
    pub fn read_holding_registers(
        transaction_id: u16,
        unit_id: UnitId,
        start_address: u16,
        quantity: u16,
    ) -> ModbusResult<Self> {
        if quantity == 0 || quantity > MAX_READ_REGISTERS {
            return Err(ModbusError::invalid_argument(format!(
                "register quantity {} out of range 1-{}",
                quantity, MAX_READ_REGISTERS
            )));
        }
        let pdu = PduBuilder::read_request(
            ModbusFunction::ReadHoldingRegisters,
            start_address,
            quantity,
        )?;
        Self::from_pdu(transaction_id, unit_id, &pdu)
    }

    /// Build a Write Single Coil (FC05) request
    pub fn write_single_coil(
        transaction_id: u16,
        unit_id: UnitId,
        address: u16,
        state: CoilState,
    ) -> ModbusResult<Self> {
        let pdu = PduBuilder::write_single_coil(address, state);
        Self::from_pdu(transaction_id, unit_id, &pdu)
    }

    fn from_pdu(transaction_id: u16, unit_id: UnitId, pdu: &ModbusPdu) -> ModbusResult<Self> {
        let function = pdu
            .function()
            .ok_or_else(|| ModbusError::invalid_function(pdu.function_code().unwrap_or(0)))?;
        Ok(Self {
            transaction_id,
            unit_id,
            function,
            payload: pdu.body().to_vec(),
        })
    }

    #[inline]
    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    #[inline]
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[inline]
    pub fn function(&self) -> ModbusFunction {
        self.function
    }

    #[inline]
    pub fn function_code(&self) -> u8 {
        self.function.to_u8()
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Always zero for Modbus TCP
    #[inline]
    pub fn protocol_id(&self) -> u16 {
        MODBUS_PROTOCOL_ID
    }

    /// MBAP length field: unit ID + function code + payload
    #[inline]
    pub fn length(&self) -> u16 {
        (2 + self.payload.len()) as u16
    }

    /// Starting address (or coil address for writes), first payload word
    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.payload[0], self.payload[1]])
    }

    /// Quantity for reads, coil value for writes; second payload word
    pub fn quantity_or_value(&self) -> u16 {
        u16::from_be_bytes([self.payload[2], self.payload[3]])
    }
}

/// Parsed view of a raw Modbus TCP response.
///
/// When `function_code & 0x80 != 0` the response is an exception and `data`
/// holds the single exception-code byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: UnitId,
    pub function_code: u8,
    pub data: Vec<u8>,
}

impl ModbusResponse {
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_FLAG != 0
    }

    /// Raw exception code, if this is an exception response
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.data.first().copied()
        } else {
            None
        }
    }

    pub fn exception(&self) -> Option<ModbusException> {
        self.exception_code().and_then(ModbusException::from_u8)
    }

    /// Function the response answers, with the exception bit cleared
    pub fn function(&self) -> ModbusResult<ModbusFunction> {
        ModbusFunction::from_u8(self.function_code & !EXCEPTION_FLAG)
    }

    /// Byte-count-prefixed payload of a read response
    fn read_payload(&self) -> ModbusResult<&[u8]> {
        let byte_count = *self
            .data
            .first()
            .ok_or_else(|| ModbusError::malformed("missing byte count"))?
            as usize;
        self.data
            .get(1..1 + byte_count)
            .ok_or_else(|| ModbusError::malformed("byte count exceeds payload"))
    }

    /// State of the first coil of a Read Coils response
    pub fn coil_state(&self) -> ModbusResult<CoilState> {
        let payload = self.read_payload()?;
        payload
            .first()
            .map(|&byte| CoilState::from_status_byte(byte))
            .ok_or_else(|| ModbusError::malformed("no coil data"))
    }

    /// All coil bits of a Read Coils response, LSB first within each byte
    pub fn coils(&self, quantity: u16) -> ModbusResult<Vec<bool>> {
        let payload = self.read_payload()?;
        Ok((0..quantity as usize)
            .filter_map(|i| payload.get(i / 8).map(|byte| (byte >> (i % 8)) & 0x01 != 0))
            .collect())
    }

    /// Register values of a Read Holding Registers response
    pub fn registers(&self) -> ModbusResult<Vec<u16>> {
        let payload = self.read_payload()?;
        if payload.len() % 2 != 0 {
            return Err(ModbusError::malformed(format!(
                "odd register byte count {}",
                payload.len()
            )));
        }
        Ok(payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Address and state echoed by a Write Single Coil response
    pub fn echoed_coil_write(&self) -> ModbusResult<(u16, CoilState)> {
        if self.data.len() < 4 {
            return Err(ModbusError::malformed("write echo shorter than 4 bytes"));
        }
        let address = u16::from_be_bytes([self.data[0], self.data[1]]);
        let value = u16::from_be_bytes([self.data[2], self.data[3]]);
        let state = CoilState::from_wire(value).ok_or_else(|| {
            ModbusError::malformed(format!("invalid coil value 0x{:04X} in echo", value))
        })?;
        Ok((address, state))
    }
}
