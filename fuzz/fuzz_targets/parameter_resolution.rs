#![no_main]

use di_compiler::ParameterBag;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Each line is `name=value`; values may reference each other.
    let mut params = ParameterBag::new();
    for line in text.lines().take(32) {
        if let Some((name, value)) = line.split_once('=') {
            params.set(name, value);
        }
    }

    if let Ok(resolved) = params.resolve_all() {
        assert!(resolved.is_resolved());
        assert_eq!(resolved.len(), params.len());
        let again = resolved.resolve_all().unwrap();
        assert_eq!(again.all(), resolved.all());
    }
});
