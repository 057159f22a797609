#![no_main]

use di_compiler::{ContainerBuilder, Definition, Reference};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte: service count. Then triples of (from, to, kind).
    let count = (data[0] % 16) as usize + 1;
    let mut definitions: Vec<Definition> = (0..count).map(|_| Definition::new("Node")).collect();
    for edge in data[1..].chunks_exact(3) {
        let from = edge[0] as usize % count;
        let target = Reference::new(format!("s{}", edge[1] as usize % count));
        let def = std::mem::take(&mut definitions[from]);
        definitions[from] = match edge[2] % 3 {
            0 => def.arg(target),
            1 => def.call("set", vec![target.into()]),
            _ => def.property("p", target),
        };
    }

    let mut builder = ContainerBuilder::new();
    for (i, def) in definitions.into_iter().enumerate() {
        builder.register(format!("s{i}"), def.public());
    }

    if let Ok(frozen) = builder.compile() {
        assert_eq!(frozen.construction_order().len(), count);
    }
});
