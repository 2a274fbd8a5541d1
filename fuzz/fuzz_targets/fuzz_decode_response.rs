#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_scanner::{
    decode_response, decode_response_for, DecodeMode, ModbusRequest, RequestDispatcher,
};
use std::time::Duration;

#[derive(Debug, Arbitrary)]
struct Input {
    function: u8,
    strict: bool,
    address: u16,
    frame: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Arbitrary bytes against any expected function: must return, never panic
    let _ = decode_response(&input.frame, input.function);

    let requests = [
        ModbusRequest::read_coils(input.address, 1, input.address, 1),
        ModbusRequest::read_holding_registers(input.address, 1, input.address, 1),
    ];
    let mode = if input.strict {
        DecodeMode::Strict
    } else {
        DecodeMode::Lenient
    };
    let dispatcher = RequestDispatcher::new(Duration::from_millis(1))
        .with_strict_transaction_check(input.strict);

    for request in requests.iter().flatten() {
        if let Ok(response) = decode_response_for(&input.frame, request, mode) {
            assert!(input.frame.len() >= 8);
            if !response.is_exception() {
                assert_eq!(response.function_code, request.function_code());
            }
        }
        let _ = dispatcher.classify(&input.frame, request);
    }
});
