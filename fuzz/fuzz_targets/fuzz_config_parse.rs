#![no_main]

use libfuzzer_sys::fuzz_target;

use blockswap_decision::SchedulerConfig;

// Config parsing must reject malformed input with an error, never a panic,
// and anything it accepts must be valid and survive a re-encode.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = SchedulerConfig::from_toml_str(text) {
        assert!(config.validate().is_ok());
        let encoded = config.to_toml_string().expect("parsed config re-encodes");
        let reparsed = SchedulerConfig::from_toml_str(&encoded).expect("re-encoded config parses");
        assert_eq!(reparsed, config);
    }
});
