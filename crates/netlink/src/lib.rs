#![doc = include_str!("../README.md")]

pub mod attr;
pub mod client;
pub mod consts;
pub mod dest;
pub mod error;
pub mod info;
pub mod service;

// --- 주요 타입 re-export ---

pub use client::{GenlSocket, IpvsClient, Transport};
pub use dest::{FwdMethod, IpvsDest};
pub use error::NetlinkError;
pub use info::{IpvsInfo, Version};
pub use service::{Af, Flags, IpvsService, Protocol};
