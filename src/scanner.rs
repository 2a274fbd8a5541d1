//! # Range Scanner
//!
//! Sweeps an address or unit ID range one probe at a time and collects a
//! [`ScanReport`]. Every target yields exactly one [`ScanOutcome`]; a failed
//! probe never aborts the sweep. Only invalid scan parameters are fatal, and
//! those are rejected before any connection is opened.
//!
//! ## Sessions
//!
//! With [`SessionPolicy::Reuse`] (the default) one channel serves the whole
//! sweep. A channel that timed out, faulted or produced garbage is closed
//! and the next probe reconnects, so a late reply can never be read as the
//! answer to a later request. [`SessionPolicy::PerProbe`] reconnects around
//! every probe.
//!
//! ```rust,no_run
//! use modbus_scanner::{RangeScanner, ScanConfig, TcpConnector};
//! use std::time::Duration;
//!
//! # async fn example() -> modbus_scanner::ModbusResult<()> {
//! let connector = TcpConnector::from_address("127.0.0.1:502")?;
//! let config = ScanConfig::new().with_timeout(Duration::from_millis(500));
//! let mut scanner = RangeScanner::new(connector, config);
//!
//! let report = scanner.scan_coils(1, 0, 100).await?;
//! for (address, state) in report.successes() {
//!     println!("coil {:05} {}", address, state);
//! }
//! println!("{} coils available", report.success_count());
//! scanner.close().await;
//! # Ok(())
//! # }
//! ```

use std::ops::RangeInclusive;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ScanConfig, SessionPolicy, TransactionIdMode};
use crate::dispatcher::RequestDispatcher;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{CoilState, ModbusRequest, UnitId};
use crate::report::{ScanKind, ScanOutcome, ScanReport, ScanReportBuilder};
use crate::transport::{ChannelConnector, ModbusChannel};

/// Address probed when checking whether a unit ID is alive
pub const UNIT_PROBE_ADDRESS: u16 = 0;

/// Sequential sweeper over one Modbus server
pub struct RangeScanner<K: ChannelConnector> {
    connector: K,
    config: ScanConfig,
    dispatcher: RequestDispatcher,
    session: Option<K::Channel>,
    next_transaction_id: u16,
}

impl<K: ChannelConnector> RangeScanner<K> {
    pub fn new(connector: K, config: ScanConfig) -> Self {
        Self {
            dispatcher: RequestDispatcher::from_config(&config),
            connector,
            config,
            session: None,
            next_transaction_id: 0,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Read the state of every coil in `start..=end` on `unit_id`
    pub async fn scan_coils(
        &mut self,
        unit_id: UnitId,
        start: u16,
        end: u16,
    ) -> ModbusResult<ScanReport> {
        let targets = validate_range(start, end)?;
        info!(
            "Scanning coils {}..={} on unit {} ({:?} sessions)",
            start, end, unit_id, self.config.session_policy
        );
        self.sweep(ScanKind::Coils, Some(unit_id), targets, |tx, address| {
            ModbusRequest::read_coils(tx, unit_id, address, 1)
        })
        .await
    }

    /// Read every holding register in `start..=end` on `unit_id`
    pub async fn scan_holding_registers(
        &mut self,
        unit_id: UnitId,
        start: u16,
        end: u16,
    ) -> ModbusResult<ScanReport> {
        let targets = validate_range(start, end)?;
        info!(
            "Scanning holding registers {}..={} on unit {} ({:?} sessions)",
            start, end, unit_id, self.config.session_policy
        );
        self.sweep(
            ScanKind::HoldingRegisters,
            Some(unit_id),
            targets,
            |tx, address| ModbusRequest::read_holding_registers(tx, unit_id, address, 1),
        )
        .await
    }

    /// Ping every unit ID in `first..=last` with a one-register read at address 0.
    ///
    /// A unit counts as responsive only on a valid, non-exception reply; see
    /// [`ScanReport::responsive_targets`].
    pub async fn scan_unit_ids(&mut self, first: UnitId, last: UnitId) -> ModbusResult<ScanReport> {
        let targets = validate_range(first as u16, last as u16)?;
        info!("Scanning unit IDs {}..={}", first, last);
        self.sweep(ScanKind::UnitIds, None, targets, |tx, unit| {
            ModbusRequest::read_holding_registers(tx, unit as UnitId, UNIT_PROBE_ADDRESS, 1)
        })
        .await
    }

    /// Read one coil
    pub async fn read_coil(&mut self, unit_id: UnitId, address: u16) -> ModbusResult<ScanOutcome> {
        let tx = self.transaction_id_for(address);
        let request = ModbusRequest::read_coils(tx, unit_id, address, 1)?;
        Ok(self.probe(&request).await)
    }

    /// Read one holding register
    pub async fn read_holding_register(
        &mut self,
        unit_id: UnitId,
        address: u16,
    ) -> ModbusResult<ScanOutcome> {
        let tx = self.transaction_id_for(address);
        let request = ModbusRequest::read_holding_registers(tx, unit_id, address, 1)?;
        Ok(self.probe(&request).await)
    }

    /// Write one coil; success carries the state the server echoed
    pub async fn write_coil(
        &mut self,
        unit_id: UnitId,
        address: u16,
        state: CoilState,
    ) -> ModbusResult<ScanOutcome> {
        let tx = self.transaction_id_for(address);
        let request = ModbusRequest::write_single_coil(tx, unit_id, address, state)?;
        Ok(self.probe(&request).await)
    }

    /// Liveness probe for a single unit ID
    pub async fn ping_unit(&mut self, unit_id: UnitId) -> ModbusResult<ScanOutcome> {
        let tx = self.transaction_id_for(unit_id as u16);
        let request =
            ModbusRequest::read_holding_registers(tx, unit_id, UNIT_PROBE_ADDRESS, 1)?;
        Ok(self.probe(&request).await)
    }

    /// Close the reused session, if one is open
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.session.take() {
            if let Err(e) = channel.close().await {
                debug!("Error closing session: {}", e);
            }
        }
    }

    async fn sweep<F>(
        &mut self,
        kind: ScanKind,
        unit_id: Option<UnitId>,
        targets: RangeInclusive<u16>,
        build: F,
    ) -> ModbusResult<ScanReport>
    where
        F: Fn(u16, u16) -> ModbusResult<ModbusRequest>,
    {
        let last = *targets.end();
        let capacity = targets.len();
        let mut report = ScanReportBuilder::with_capacity(kind, unit_id, capacity);

        for target in targets {
            let tx = self.transaction_id_for(target);
            let request = build(tx, target)?;
            let outcome = self.probe(&request).await;
            debug!("{} {:05}: {}", kind, target, outcome);
            report.record(target, outcome);

            if target != last && !self.config.inter_request_delay.is_zero() {
                sleep(self.config.inter_request_delay).await;
            }
        }

        if self.config.session_policy == SessionPolicy::PerProbe {
            self.close().await;
        }

        let report = report.finish();
        info!(
            "Scan of {} finished: {}/{} successful",
            kind,
            report.success_count(),
            report.len()
        );
        Ok(report)
    }

    /// One attempt: obtain a channel, exchange, then keep or drop the channel
    async fn probe(&mut self, request: &ModbusRequest) -> ScanOutcome {
        let mut channel = match self.session.take() {
            Some(channel) if channel.is_connected() => channel,
            _ => match self.connector.connect(self.config.timeout).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!("Connect failed: {}", e);
                    return ScanOutcome::from_error(&e);
                }
            },
        };

        let outcome = self.dispatcher.exchange(&mut channel, request).await;

        let keep = self.config.session_policy == SessionPolicy::Reuse
            && !outcome.poisons_session()
            && channel.is_connected();
        if keep {
            self.session = Some(channel);
        } else if let Err(e) = channel.close().await {
            debug!("Error closing session: {}", e);
        }

        outcome
    }

    fn transaction_id_for(&mut self, target: u16) -> u16 {
        match self.config.transaction_ids {
            TransactionIdMode::FromTarget => target,
            TransactionIdMode::Sequential => {
                self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
                if self.next_transaction_id == 0 {
                    self.next_transaction_id = 1;
                }
                self.next_transaction_id
            }
        }
    }
}

fn validate_range(start: u16, end: u16) -> ModbusResult<RangeInclusive<u16>> {
    if start > end {
        return Err(ModbusError::invalid_argument(format!(
            "scan range start {} is after end {}",
            start, end
        )));
    }
    Ok(start..=end)
}
