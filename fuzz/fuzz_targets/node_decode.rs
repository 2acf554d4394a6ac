#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use gantry_core::event::Source;
use gantry_core::node::{Node, decode};

#[derive(Arbitrary, Debug)]
struct RawNode {
    path: String,
    is_dir: bool,
    value: String,
}

fuzz_target!(|raw: RawNode| {
    let node = Node {
        path: raw.path,
        is_dir: raw.is_dir,
        value: raw.value,
        source: Source::named("fuzz"),
    };
    let _ = decode(&node);
});
