#![no_main]

use libfuzzer_sys::fuzz_target;

use gantry_balancer::RouteTable;
use gantry_core::event::Source;
use gantry_core::types::RouteConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = serde_json::from_slice::<RouteConfig>(data) else {
        return;
    };
    let mut table = RouteTable::new();
    let _ = table
        .get_or_create("fuzz", &Source::named("fuzz"))
        .configure(&config);
    let _ = table.lookup(&"10.1.2.3".parse().unwrap());
});
