#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = rawcurl::decode::decode(data.to_vec(), Some("gzip"));
    let _ = rawcurl::decode::decode(data.to_vec(), Some("deflate"));
});
