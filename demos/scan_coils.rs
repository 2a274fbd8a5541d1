//! Coil scan against a live server, replaying the classic sweep behaviour
//! (fresh connection per probe, 50 ms between probes).
//!
//! Usage: cargo run --example scan_coils [server_address] [unit] [start] [end]
//! Example: cargo run --example scan_coils 192.168.1.10:502 1 0 50

use modbus_scanner::{
    CoilState, ProbeValue, RangeScanner, ScanConfig, ScanOutcome, TcpConnector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let address = args.get(1).map(String::as_str).unwrap_or("127.0.0.1:502");
    let unit: u8 = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(1);
    let start: u16 = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(0);
    let end: u16 = args.get(4).map(|s| s.parse()).transpose()?.unwrap_or(20);

    let config = ScanConfig::legacy();
    let connector = TcpConnector::from_address(address)?;
    let mut scanner = RangeScanner::new(connector, config);

    println!("Scanning coils {}..={} on {} unit {}", start, end, address, unit);
    let report = scanner.scan_coils(unit, start, end).await?;

    for entry in report.entries() {
        match &entry.outcome {
            ScanOutcome::Success(ProbeValue::Coil(CoilState::On)) => {
                println!("  coil {:05}: ON", entry.target)
            }
            ScanOutcome::Success(value) => println!("  coil {:05}: {}", entry.target, value),
            ScanOutcome::ModbusException(code) => {
                println!("  coil {:05}: exception 0x{:02X}", entry.target, code)
            }
            other => println!("  coil {:05}: {}", entry.target, other),
        }
    }

    println!(
        "{} of {} coils answered",
        report.success_count(),
        report.len()
    );
    Ok(())
}
