//! Fuzz the SQL lexer and parser: arbitrary input must either parse or
//! return a structured error, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = strata::sql::parse(text);
        let _ = strata::sql::parse_expression(text);
    }
});
