#![no_main]
use libfuzzer_sys::fuzz_target;
use rsloadgen::config::ByteSize;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(size) = s.parse::<ByteSize>() {
        // whatever parses must survive a display round trip
        let rendered = size.to_string();
        assert_eq!(rendered.parse::<ByteSize>().unwrap(), size, "{s:?} -> {rendered}");
    }
});
