//! Per-probe outcomes and the scan report they accumulate into

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::codec::DecodeError;
use crate::error::{ErrorKind, ModbusError};
use crate::protocol::{CoilState, ModbusException, UnitId};

/// Value extracted from a successful probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeValue {
    /// Coil status from Read Coils
    Coil(CoilState),
    /// State echoed back by Write Single Coil
    Written(CoilState),
    /// Holding register value
    Register(u16),
}

impl fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coil(state) | Self::Written(state) => write!(f, "{}", state),
            Self::Register(value) => write!(f, "{}", value),
        }
    }
}

/// Result of probing one target. Exactly one per probe, never merged or retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Success(ProbeValue),
    /// Server answered with this exception code
    ModbusException(u8),
    /// Bytes arrived but failed validation
    MalformedResponse(DecodeError),
    /// Connect/send/receive failure other than a silent timeout
    NetworkError(String),
    /// Timed out with nothing received
    NoResponse,
}

/// Discriminant of a [`ScanOutcome`], used for tallies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutcomeKind {
    Success,
    ModbusException,
    MalformedResponse,
    NetworkError,
    NoResponse,
}

impl ScanOutcome {
    /// Outcome for a probe that failed before or during I/O
    pub fn from_error(err: &ModbusError) -> Self {
        match err.kind() {
            ErrorKind::NoResponse => Self::NoResponse,
            _ => Self::NetworkError(err.to_string()),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn value(&self) -> Option<ProbeValue> {
        match self {
            Self::Success(value) => Some(*value),
            _ => None,
        }
    }

    /// Known exception, if the code is a standard one
    pub fn exception(&self) -> Option<ModbusException> {
        match self {
            Self::ModbusException(code) => ModbusException::from_u8(*code),
            _ => None,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::ModbusException(_) => OutcomeKind::ModbusException,
            Self::MalformedResponse(_) => OutcomeKind::MalformedResponse,
            Self::NetworkError(_) => OutcomeKind::NetworkError,
            Self::NoResponse => OutcomeKind::NoResponse,
        }
    }

    /// Whether the session that produced this outcome may carry stray bytes
    pub(crate) fn poisons_session(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_) | Self::NetworkError(_) | Self::NoResponse
        )
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(value) => write!(f, "{}", value),
            Self::ModbusException(code) => match ModbusException::from_u8(*code) {
                Some(exc) => write!(f, "Modbus exception {}", exc),
                None => write!(f, "Modbus exception 0x{:02X}", code),
            },
            Self::MalformedResponse(reason) => write!(f, "malformed response: {}", reason),
            Self::NetworkError(reason) => write!(f, "network error: {}", reason),
            Self::NoResponse => f.write_str("no response"),
        }
    }
}

/// What a scan swept over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Coils,
    HoldingRegisters,
    UnitIds,
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coils => f.write_str("coils"),
            Self::HoldingRegisters => f.write_str("holding registers"),
            Self::UnitIds => f.write_str("unit IDs"),
        }
    }
}

/// One probed target and its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Address, or unit ID for unit sweeps
    pub target: u16,
    pub outcome: ScanOutcome,
}

/// Finished, immutable result of one scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    kind: ScanKind,
    unit_id: Option<UnitId>,
    entries: Vec<ScanEntry>,
    success_count: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    /// Unit ID the sweep addressed; `None` for unit ID sweeps
    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit_id
    }

    /// Every probe in ascending target order
    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &ScanOutcome> {
        self.entries.iter().map(|entry| &entry.outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    /// `(target, value)` for successful probes only
    pub fn successes(&self) -> Vec<(u16, ProbeValue)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.outcome.value().map(|value| (entry.target, value)))
            .collect()
    }

    /// Targets that answered with a valid, non-exception response
    pub fn responsive_targets(&self) -> Vec<u16> {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_success())
            .map(|entry| entry.target)
            .collect()
    }

    pub fn count_by_kind(&self) -> BTreeMap<OutcomeKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.outcome.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Accumulates entries while a scan runs
#[derive(Debug)]
pub struct ScanReportBuilder {
    kind: ScanKind,
    unit_id: Option<UnitId>,
    entries: Vec<ScanEntry>,
    success_count: usize,
    started_at: DateTime<Utc>,
}

impl ScanReportBuilder {
    pub fn new(kind: ScanKind, unit_id: Option<UnitId>) -> Self {
        Self {
            kind,
            unit_id,
            entries: Vec::new(),
            success_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn with_capacity(kind: ScanKind, unit_id: Option<UnitId>, capacity: usize) -> Self {
        let mut builder = Self::new(kind, unit_id);
        builder.entries.reserve(capacity);
        builder
    }

    pub fn record(&mut self, target: u16, outcome: ScanOutcome) {
        if outcome.is_success() {
            self.success_count += 1;
        }
        self.entries.push(ScanEntry { target, outcome });
    }

    pub fn finish(self) -> ScanReport {
        ScanReport {
            kind: self.kind,
            unit_id: self.unit_id,
            entries: self.entries,
            success_count: self.success_count,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
