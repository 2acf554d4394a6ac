//! Virtual service wire type.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::attr::{Attr, AttrReader, AttrWriter, parse_addr};
use crate::consts::{
    AF_INET, AF_INET6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP, IPVS_SVC_ATTR_ADDR,
    IPVS_SVC_ATTR_AF, IPVS_SVC_ATTR_FLAGS, IPVS_SVC_ATTR_FWMARK, IPVS_SVC_ATTR_NETMASK,
    IPVS_SVC_ATTR_PORT, IPVS_SVC_ATTR_PROTOCOL, IPVS_SVC_ATTR_SCHED_NAME, IPVS_SVC_ATTR_TIMEOUT,
};
use crate::error::NetlinkError;

/// Address family of a virtual service (`AF_INET` / `AF_INET6`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Af(pub u16);

impl Af {
    pub const INET: Af = Af(AF_INET);
    pub const INET6: Af = Af(AF_INET6);
}

impl fmt::Display for Af {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            AF_INET => write!(f, "inet"),
            AF_INET6 => write!(f, "inet6"),
            other => write!(f, "{other}"),
        }
    }
}

/// Transport protocol of a virtual service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Protocol(pub u16);

impl Protocol {
    pub const TCP: Protocol = Protocol(IPPROTO_TCP);
    pub const UDP: Protocol = Protocol(IPPROTO_UDP);
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            IPPROTO_TCP => write!(f, "tcp"),
            IPPROTO_UDP => write!(f, "udp"),
            IPPROTO_SCTP => write!(f, "sctp"),
            other => write!(f, "{other}"),
        }
    }
}

/// Service flag word with its change mask (`struct ip_vs_flags`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub flags: u32,
    pub mask: u32,
}

impl Flags {
    /// Packs the kernel `ip_vs_flags` struct (two native-endian u32s).
    fn pack(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.flags.to_ne_bytes());
        out[4..].copy_from_slice(&self.mask.to_ne_bytes());
        out
    }

    fn unpack(raw: &[u8]) -> Result<Self, NetlinkError> {
        if raw.len() < 8 {
            return Err(NetlinkError::Decode("short ip_vs_flags".into()));
        }
        Ok(Self {
            flags: u32::from_ne_bytes(raw[..4].try_into().expect("length checked")),
            mask: u32::from_ne_bytes(raw[4..8].try_into().expect("length checked")),
        })
    }
}

/// A kernel virtual service.
///
/// Identified either by `(af, protocol, addr, port)` or by `(af, fw_mark)`;
/// the remaining fields are settings sent with NEW/SET commands.
#[derive(Debug, Clone, PartialEq)]
pub struct IpvsService {
    // id
    pub af: Af,
    pub protocol: Protocol,
    pub addr: IpAddr,
    pub port: u16,
    pub fw_mark: u32,

    // params
    pub sched_name: String,
    pub flags: Flags,
    pub timeout: u32,
    pub netmask: u32,
}

impl Default for IpvsService {
    fn default() -> Self {
        Self {
            af: Af::default(),
            protocol: Protocol::default(),
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            fw_mark: 0,
            sched_name: String::new(),
            flags: Flags::default(),
            timeout: 0,
            netmask: 0,
        }
    }
}

impl IpvsService {
    /// Unique identifying string, used as the merge-registry key.
    pub fn id_string(&self) -> String {
        if self.fw_mark == 0 {
            format!(
                "{}+{}://{}:{}",
                self.af, self.protocol, self.addr, self.port
            )
        } else {
            format!("{}+fwmark://{}", self.af, self.fw_mark)
        }
    }

    /// Packs the service as a nested-attribute payload.
    ///
    /// With `full`, the settings accompany the identifying fields
    /// (NEW_SERVICE / SET_SERVICE); otherwise only the id is sent
    /// (DEL_SERVICE, GET_DEST).
    pub fn attrs(&self, full: bool) -> Result<AttrWriter, NetlinkError> {
        let mut writer = AttrWriter::new();

        if self.fw_mark != 0 {
            writer.put_u16(IPVS_SVC_ATTR_AF, self.af.0);
            writer.put_u32(IPVS_SVC_ATTR_FWMARK, self.fw_mark);
        } else if self.protocol.0 != 0 && self.port != 0 {
            writer.put_u16(IPVS_SVC_ATTR_AF, self.af.0);
            writer.put_u16(IPVS_SVC_ATTR_PROTOCOL, self.protocol.0);
            writer.put_addr(IPVS_SVC_ATTR_ADDR, &self.addr);
            writer.put_port(IPVS_SVC_ATTR_PORT, self.port);
        } else {
            return Err(NetlinkError::InvalidRequest(
                "incomplete service id fields".into(),
            ));
        }

        if full {
            writer.put_str(IPVS_SVC_ATTR_SCHED_NAME, &self.sched_name);
            writer.put_bytes(IPVS_SVC_ATTR_FLAGS, &self.flags.pack());
            writer.put_u32(IPVS_SVC_ATTR_TIMEOUT, self.timeout);
            writer.put_u32(IPVS_SVC_ATTR_NETMASK, self.netmask);
        }

        Ok(writer)
    }

    /// Decodes a service from a dump reply's nested attribute payload.
    /// Unknown attributes are ignored.
    pub fn unpack(raw: &[u8]) -> Result<Self, NetlinkError> {
        let mut service = Self::default();
        let mut addr_raw: Option<Vec<u8>> = None;

        for attr in AttrReader::new(raw) {
            let attr: Attr = attr?;
            match attr.kind {
                IPVS_SVC_ATTR_AF => service.af = Af(attr.as_u16()?),
                IPVS_SVC_ATTR_PROTOCOL => service.protocol = Protocol(attr.as_u16()?),
                IPVS_SVC_ATTR_ADDR => addr_raw = Some(attr.value.to_vec()),
                IPVS_SVC_ATTR_PORT => service.port = attr.as_port()?,
                IPVS_SVC_ATTR_FWMARK => service.fw_mark = attr.as_u32()?,
                IPVS_SVC_ATTR_SCHED_NAME => service.sched_name = attr.as_str()?.to_owned(),
                IPVS_SVC_ATTR_FLAGS => service.flags = Flags::unpack(attr.value)?,
                IPVS_SVC_ATTR_TIMEOUT => service.timeout = attr.as_u32()?,
                IPVS_SVC_ATTR_NETMASK => service.netmask = attr.as_u32()?,
                _ => {}
            }
        }

        if let Some(raw_addr) = addr_raw {
            service.addr = parse_addr(service.af.0, &raw_addr)
                .map_err(|err| NetlinkError::Decode(format!("service addr: {err}")))?;
        }

        Ok(service)
    }
}

impl fmt::Display for IpvsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IpvsService {
        IpvsService {
            af: Af::INET,
            protocol: Protocol::TCP,
            addr: "10.0.1.1".parse().unwrap(),
            port: 80,
            fw_mark: 0,
            sched_name: "wlc".to_owned(),
            flags: Flags {
                flags: 0,
                mask: 0xffff_ffff,
            },
            timeout: 0,
            netmask: 0xffff_ffff,
        }
    }

    #[test]
    fn id_string_forms() {
        assert_eq!(sample().id_string(), "inet+tcp://10.0.1.1:80");

        let fwmark = IpvsService {
            fw_mark: 10,
            af: Af::INET6,
            ..Default::default()
        };
        assert_eq!(fwmark.id_string(), "inet6+fwmark://10");
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let service = sample();
        let raw = service.attrs(true).unwrap().finish();
        let decoded = IpvsService::unpack(&raw).unwrap();
        assert_eq!(decoded, service);
    }

    #[test]
    fn id_only_attrs_omit_settings() {
        let raw = sample().attrs(false).unwrap().finish();
        let decoded = IpvsService::unpack(&raw).unwrap();
        assert!(decoded.sched_name.is_empty());
        assert_eq!(decoded.port, 80);
    }

    #[test]
    fn incomplete_id_is_rejected() {
        let service = IpvsService::default();
        assert!(service.attrs(true).is_err());
    }

    #[test]
    fn ipv6_service_roundtrip() {
        let service = IpvsService {
            af: Af::INET6,
            protocol: Protocol::UDP,
            addr: "2001:db8::1".parse().unwrap(),
            port: 53,
            sched_name: "rr".to_owned(),
            ..sample()
        };
        let raw = service.attrs(true).unwrap().finish();
        let decoded = IpvsService::unpack(&raw).unwrap();
        assert_eq!(decoded.id_string(), "inet6+udp://2001:db8::1:53");
    }
}
