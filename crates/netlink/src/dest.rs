//! Destination (real server) wire type and forwarding methods.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::attr::{Attr, AttrReader, AttrWriter, parse_addr};
use crate::consts::{
    IP_VS_CONN_F_BYPASS, IP_VS_CONN_F_DROUTE, IP_VS_CONN_F_FWD_MASK, IP_VS_CONN_F_LOCALNODE,
    IP_VS_CONN_F_MASQ, IP_VS_CONN_F_TUNNEL, IPVS_DEST_ATTR_ACTIVE_CONNS, IPVS_DEST_ATTR_ADDR,
    IPVS_DEST_ATTR_FWD_METHOD, IPVS_DEST_ATTR_INACT_CONNS, IPVS_DEST_ATTR_L_THRESH,
    IPVS_DEST_ATTR_PERSIST_CONNS, IPVS_DEST_ATTR_PORT, IPVS_DEST_ATTR_U_THRESH,
    IPVS_DEST_ATTR_WEIGHT,
};
use crate::error::NetlinkError;
use crate::service::IpvsService;

/// Packet forwarding method for a destination.
///
/// Stored as the kernel connection-flag word; only the low fwd-method
/// bits are significant for display and comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FwdMethod(pub u32);

impl FwdMethod {
    pub const MASQ: FwdMethod = FwdMethod(IP_VS_CONN_F_MASQ);
    pub const TUNNEL: FwdMethod = FwdMethod(IP_VS_CONN_F_TUNNEL);
    pub const DROUTE: FwdMethod = FwdMethod(IP_VS_CONN_F_DROUTE);
}

impl fmt::Display for FwdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 & IP_VS_CONN_F_FWD_MASK {
            IP_VS_CONN_F_MASQ => write!(f, "masq"),
            IP_VS_CONN_F_LOCALNODE => write!(f, "localnode"),
            IP_VS_CONN_F_TUNNEL => write!(f, "tunnel"),
            IP_VS_CONN_F_DROUTE => write!(f, "droute"),
            IP_VS_CONN_F_BYPASS => write!(f, "bypass"),
            other => write!(f, "{other:#06x}"),
        }
    }
}

impl FromStr for FwdMethod {
    type Err = NetlinkError;

    /// Parses the user-facing method names. Only the methods that make
    /// sense for a configured destination are accepted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "masq" => Ok(Self::MASQ),
            "tunnel" => Ok(Self::TUNNEL),
            "droute" => Ok(Self::DROUTE),
            other => Err(NetlinkError::InvalidRequest(format!(
                "invalid fwd-method: {other}"
            ))),
        }
    }
}

/// A kernel destination behind a virtual service.
///
/// Identified by `(addr, port)` within its service; the address family
/// follows the owning service.
#[derive(Debug, Clone, PartialEq)]
pub struct IpvsDest {
    // id
    pub addr: IpAddr,
    pub port: u16,

    // params
    pub fwd_method: FwdMethod,
    pub weight: u32,
    pub u_thresh: u32,
    pub l_thresh: u32,

    // info (dump replies only)
    pub active_conns: u32,
    pub inact_conns: u32,
    pub persist_conns: u32,
}

impl Default for IpvsDest {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            fwd_method: FwdMethod::default(),
            weight: 0,
            u_thresh: 0,
            l_thresh: 0,
            active_conns: 0,
            inact_conns: 0,
            persist_conns: 0,
        }
    }
}

impl IpvsDest {
    /// Unique identifying string within a service, used as the
    /// merge-registry key.
    pub fn id_string(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// Packs the destination as a nested-attribute payload.
    ///
    /// With `full`, the settings accompany the id (NEW_DEST / SET_DEST);
    /// otherwise only the identifying attrs are sent (DEL_DEST).
    pub fn attrs(&self, full: bool) -> AttrWriter {
        let mut writer = AttrWriter::new();

        writer.put_addr(IPVS_DEST_ATTR_ADDR, &self.addr);
        writer.put_port(IPVS_DEST_ATTR_PORT, self.port);

        if full {
            writer.put_u32(IPVS_DEST_ATTR_FWD_METHOD, self.fwd_method.0);
            writer.put_u32(IPVS_DEST_ATTR_WEIGHT, self.weight);
            writer.put_u32(IPVS_DEST_ATTR_U_THRESH, self.u_thresh);
            writer.put_u32(IPVS_DEST_ATTR_L_THRESH, self.l_thresh);
        }

        writer
    }

    /// Decodes a destination from a dump reply, using the owning
    /// service's address family. Unknown attributes are ignored.
    pub fn unpack(service: &IpvsService, raw: &[u8]) -> Result<Self, NetlinkError> {
        let mut dest = Self::default();
        let mut addr_raw: Option<Vec<u8>> = None;

        for attr in AttrReader::new(raw) {
            let attr: Attr = attr?;
            match attr.kind {
                IPVS_DEST_ATTR_ADDR => addr_raw = Some(attr.value.to_vec()),
                IPVS_DEST_ATTR_PORT => dest.port = attr.as_port()?,
                IPVS_DEST_ATTR_FWD_METHOD => dest.fwd_method = FwdMethod(attr.as_u32()?),
                IPVS_DEST_ATTR_WEIGHT => dest.weight = attr.as_u32()?,
                IPVS_DEST_ATTR_U_THRESH => dest.u_thresh = attr.as_u32()?,
                IPVS_DEST_ATTR_L_THRESH => dest.l_thresh = attr.as_u32()?,
                IPVS_DEST_ATTR_ACTIVE_CONNS => dest.active_conns = attr.as_u32()?,
                IPVS_DEST_ATTR_INACT_CONNS => dest.inact_conns = attr.as_u32()?,
                IPVS_DEST_ATTR_PERSIST_CONNS => dest.persist_conns = attr.as_u32()?,
                _ => {}
            }
        }

        if let Some(raw_addr) = addr_raw {
            dest.addr = parse_addr(service.af.0, &raw_addr)
                .map_err(|err| NetlinkError::Decode(format!("dest addr: {err}")))?;
        }

        Ok(dest)
    }
}

impl fmt::Display for IpvsDest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Af, Protocol};

    fn sample_service() -> IpvsService {
        IpvsService {
            af: Af::INET,
            protocol: Protocol::TCP,
            addr: "10.0.1.1".parse().unwrap(),
            port: 80,
            sched_name: "wlc".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn fwd_method_display() {
        assert_eq!(FwdMethod::MASQ.to_string(), "masq");
        assert_eq!(FwdMethod::TUNNEL.to_string(), "tunnel");
        assert_eq!(FwdMethod::DROUTE.to_string(), "droute");
        assert_eq!(FwdMethod(IP_VS_CONN_F_BYPASS).to_string(), "bypass");
    }

    #[test]
    fn fwd_method_parse() {
        assert_eq!("masq".parse::<FwdMethod>().unwrap(), FwdMethod::MASQ);
        assert_eq!("tunnel".parse::<FwdMethod>().unwrap(), FwdMethod::TUNNEL);
        assert_eq!("droute".parse::<FwdMethod>().unwrap(), FwdMethod::DROUTE);
        assert!("bypass".parse::<FwdMethod>().is_err());
        assert!("".parse::<FwdMethod>().is_err());
    }

    #[test]
    fn id_string_is_addr_port() {
        let dest = IpvsDest {
            addr: "10.1.0.1".parse().unwrap(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(dest.id_string(), "10.1.0.1:80");
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let dest = IpvsDest {
            addr: "10.1.0.1".parse().unwrap(),
            port: 8080,
            fwd_method: FwdMethod::DROUTE,
            weight: 7,
            ..Default::default()
        };
        let raw = dest.attrs(true).finish();
        let decoded = IpvsDest::unpack(&sample_service(), &raw).unwrap();
        assert_eq!(decoded, dest);
    }

    #[test]
    fn id_only_attrs_omit_weight() {
        let dest = IpvsDest {
            addr: "10.1.0.1".parse().unwrap(),
            port: 80,
            weight: 5,
            ..Default::default()
        };
        let raw = dest.attrs(false).finish();
        let decoded = IpvsDest::unpack(&sample_service(), &raw).unwrap();
        assert_eq!(decoded.weight, 0);
        assert_eq!(decoded.port, 80);
    }
}
