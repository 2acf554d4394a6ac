#![doc = include_str!("../README.md")]

pub mod driver;
pub mod route;
pub mod services;

// --- 주요 타입 re-export ---

pub use driver::{IPVS_SLOTS, IpvsDriver, Slot};
pub use route::{Route, RouteTable};
pub use services::{Service, Services};
