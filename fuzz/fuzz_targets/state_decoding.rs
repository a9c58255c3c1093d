#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate tlog_monitor;

fuzz_target!(|data: &[u8]| {
	let _ = tlog_monitor::decode_state(data);
});
