#![no_main]

use libfuzzer_sys::fuzz_target;

use gantry_netlink::attr::AttrReader;
use gantry_netlink::{IpvsInfo, IpvsService};

fuzz_target!(|data: &[u8]| {
    for attr in AttrReader::new(data) {
        if attr.is_err() {
            break;
        }
    }
    let _ = IpvsService::unpack(data);
    let _ = IpvsInfo::unpack(data);
});
