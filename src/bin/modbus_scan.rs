//! Modbus Scan
//!
//! Sweeps a Modbus TCP server and prints what answered.
//!
//! Usage:
//!   modbus_scan coils     [host:port] [unit] [start] [end]
//!   modbus_scan registers [host:port] [unit] [start] [end]
//!   modbus_scan units     [host:port] [first] [last]
//!   modbus_scan write     [host:port] [unit] [address] [on|off]
//!
//! Example: cargo run --bin modbus_scan -- coils 127.0.0.1:502 1 0 100
//!
//! Set `RUST_LOG=modbus_scanner=debug` to see every probe.

use std::time::Duration;

use modbus_scanner::{
    CoilState, ModbusError, RangeScanner, ScanConfig, ScanReport, SessionPolicy, TcpConnector,
    DEFAULT_HOST, DEFAULT_TCP_PORT, DEFAULT_UNIT_ID,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn parse_arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> Result<T, ModbusError>
where
    T::Err: std::fmt::Display,
{
    match args.get(index) {
        Some(raw) => raw.parse::<T>().map_err(|e| {
            ModbusError::invalid_argument(format!("argument {} '{}': {}", index, raw, e))
        }),
        None => Ok(default),
    }
}

fn print_report(report: &ScanReport) {
    println!(
        "\n{} scan{}: {} probes in {} ms",
        report.kind(),
        report
            .unit_id()
            .map(|unit| format!(" on unit {}", unit))
            .unwrap_or_default(),
        report.len(),
        report.elapsed().num_milliseconds()
    );
    println!("---------------------------------");
    for entry in report.entries() {
        println!("  {:05}  {}", entry.target, entry.outcome);
    }
    println!("---------------------------------");
    println!("  {} successful", report.success_count());
    for (kind, count) in report.count_by_kind() {
        println!("  {:?}: {}", kind, count);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("coils");
    let address = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| format!("{}:{}", DEFAULT_HOST, DEFAULT_TCP_PORT));

    println!("{}", modbus_scanner::info());
    println!("Target: {}", address);

    let config = ScanConfig::default();
    let connector = TcpConnector::from_address(&address)?
        .with_packet_logging(std::env::var_os("MODBUS_PACKET_LOG").is_some());

    match mode {
        "coils" => {
            let unit = parse_arg(&args, 3, DEFAULT_UNIT_ID)?;
            let start = parse_arg(&args, 4, 0u16)?;
            let end = parse_arg(&args, 5, 100u16)?;
            let mut scanner = RangeScanner::new(connector, config);
            let report = scanner.scan_coils(unit, start, end).await?;
            scanner.close().await;
            print_report(&report);
        }
        "registers" => {
            let unit = parse_arg(&args, 3, DEFAULT_UNIT_ID)?;
            let start = parse_arg(&args, 4, 0u16)?;
            let end = parse_arg(&args, 5, 100u16)?;
            let mut scanner = RangeScanner::new(connector, config);
            let report = scanner.scan_holding_registers(unit, start, end).await?;
            scanner.close().await;
            print_report(&report);
        }
        "units" => {
            let first = parse_arg(&args, 3, 1u8)?;
            let last = parse_arg(&args, 4, 247u8)?;
            let config = config
                .with_session_policy(SessionPolicy::PerProbe)
                .with_timeout(Duration::from_millis(500));
            let mut scanner = RangeScanner::new(connector, config);
            let report = scanner.scan_unit_ids(first, last).await?;
            print_report(&report);
            println!("  Responsive units: {:?}", report.responsive_targets());
        }
        "write" => {
            let unit = parse_arg(&args, 3, DEFAULT_UNIT_ID)?;
            let target = parse_arg(&args, 4, 0u16)?;
            let state = parse_arg(&args, 5, CoilState::On)?;
            let mut scanner = RangeScanner::new(connector, config);
            let outcome = scanner.write_coil(unit, target, state).await?;
            scanner.close().await;
            println!("\n  Write coil {:05} {}: {}", target, state, outcome);
        }
        other => {
            eprintln!(
                "Unknown mode '{}'; expected coils, registers, units or write",
                other
            );
            std::process::exit(2);
        }
    }

    Ok(())
}
