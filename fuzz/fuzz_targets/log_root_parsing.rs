#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate tlog_monitor;

fuzz_target!(|data: &[u8]| {
	if let Ok(root) = tlog_monitor::LogRootV1::from_bytes(data) {
		assert_eq!(root.to_bytes(), data);
	}
});
