#![no_main]

use di_compiler::loader::{FileFormat, FileLoader};
use di_compiler::ContainerBuilder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    for format in [FileFormat::Json, FileFormat::Yaml] {
        let mut builder = ContainerBuilder::new();
        if FileLoader::new(&mut builder).load_str(text, format).is_ok() {
            // Any loaded document either compiles or fails with an error, never a panic.
            let _ = builder.compile();
        }
    }
});
