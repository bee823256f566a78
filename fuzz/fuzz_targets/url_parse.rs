#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let Some((base, location)) = s.split_once('\n') else {
        let _ = rawcurl::Url::parse(s);
        return;
    };

    if let Ok(url) = rawcurl::Url::parse(base) {
        if let Ok(next) = url.join(location) {
            // A resolved url always has an absolute path.
            assert!(next.path().starts_with('/'));
        }
    }
});
