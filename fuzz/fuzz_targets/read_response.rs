#![no_main]

use libfuzzer_sys::fuzz_target;
use rawcurl::http::Method;
use rawcurl::parser::{read_response, Limits};

fuzz_target!(|data: &[u8]| {
    let limits = Limits {
        max_unframed_body: 64 * 1024,
    };
    let _ = read_response(data, &Method::GET, &limits);
});
