//! Synchronous IPVS generic-netlink client.
//!
//! The kernel conversation is plain request/reply over a `NETLINK_GENERIC`
//! socket: commands that change state are acknowledged with an
//! `NLMSG_ERROR` carrying errno 0, queries reply with one family message,
//! and dumps reply with a multipart stream terminated by `NLMSG_DONE`.
//!
//! The socket sits behind the [`Transport`] trait so tests can script
//! kernel replies without CAP_NET_ADMIN or a live kernel.

use bytes::{BufMut, BytesMut};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_GENERIC};
use tracing::{debug, warn};

use crate::attr::{Attr, AttrReader, AttrWriter};
use crate::consts::{
    CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_ATTR_VERSION, CTRL_CMD_GETFAMILY,
    GENL_HDRLEN, GENL_ID_CTRL, IPVS_CMD_ATTR_DEST, IPVS_CMD_ATTR_SERVICE, IPVS_CMD_DEL_DEST,
    IPVS_CMD_DEL_SERVICE, IPVS_CMD_FLUSH, IPVS_CMD_GET_DEST, IPVS_CMD_GET_INFO,
    IPVS_CMD_GET_SERVICE, IPVS_CMD_NEW_DEST, IPVS_CMD_NEW_SERVICE, IPVS_CMD_SET_DEST,
    IPVS_CMD_SET_SERVICE, IPVS_GENL_NAME, IPVS_GENL_VERSION, NLM_F_ACK, NLM_F_DUMP,
    NLM_F_REQUEST, NLMSG_DONE, NLMSG_ERROR, NLMSG_HDRLEN, NLMSG_NOOP,
};
use crate::dest::IpvsDest;
use crate::error::NetlinkError;
use crate::info::IpvsInfo;
use crate::service::IpvsService;

const RECV_BUF_SIZE: usize = 64 * 1024;

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Datagram-level transport seam between the client and the socket.
///
/// The production implementation is [`GenlSocket`]; tests use a scripted
/// mock that records sent frames and replays canned kernel replies.
pub trait Transport: Send {
    /// Sends one netlink datagram.
    fn send(&mut self, frame: &[u8]) -> Result<(), NetlinkError>;

    /// Receives one netlink datagram (possibly containing several
    /// messages).
    fn recv(&mut self) -> Result<Vec<u8>, NetlinkError>;
}

/// Raw `NETLINK_GENERIC` socket transport.
pub struct GenlSocket {
    socket: Socket,
    buf: Vec<u8>,
}

impl GenlSocket {
    /// Opens and binds a generic-netlink socket connected to the kernel.
    pub fn open() -> Result<Self, NetlinkError> {
        let mut socket = Socket::new(NETLINK_GENERIC)?;
        socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;
        Ok(Self {
            socket,
            buf: Vec::with_capacity(RECV_BUF_SIZE),
        })
    }
}

impl Transport for GenlSocket {
    fn send(&mut self, frame: &[u8]) -> Result<(), NetlinkError> {
        self.socket.send(frame, 0)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, NetlinkError> {
        self.buf.clear();
        let len = self.socket.recv(&mut self.buf, 0)?;
        Ok(self.buf[..len].to_vec())
    }
}

/// Frames one generic-netlink message.
fn frame(family: u16, flags: u16, seq: u32, cmd: u8, version: u8, attrs: &[u8]) -> Vec<u8> {
    let len = NLMSG_HDRLEN + GENL_HDRLEN + attrs.len();
    let mut buf = BytesMut::with_capacity(align4(len));

    // struct nlmsghdr
    buf.put_u32_ne(len as u32);
    buf.put_u16_ne(family);
    buf.put_u16_ne(flags);
    buf.put_u32_ne(seq);
    buf.put_u32_ne(0); // pid: filled in by the kernel

    // struct genlmsghdr
    buf.put_u8(cmd);
    buf.put_u8(version);
    buf.put_u16_ne(0);

    buf.put_slice(attrs);
    buf.to_vec()
}

/// IPVS generic-netlink client.
///
/// Resolves the `"IPVS"` family id at open time and verifies the family
/// version. All operations are synchronous round-trips; the kernel table
/// is the only state behind this handle.
pub struct IpvsClient {
    transport: Box<dyn Transport>,
    family_id: u16,
    seq: u32,
    debug: bool,
}

impl std::fmt::Debug for IpvsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpvsClient")
            .field("family_id", &self.family_id)
            .field("seq", &self.seq)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl IpvsClient {
    /// Opens a netlink socket and resolves the IPVS family.
    pub fn open() -> Result<Self, NetlinkError> {
        Self::with_transport(Box::new(GenlSocket::open()?))
    }

    /// Builds a client over an arbitrary transport (tests).
    ///
    /// Performs the same family resolution handshake as [`open`](Self::open).
    pub fn with_transport(transport: Box<dyn Transport>) -> Result<Self, NetlinkError> {
        let mut client = Self {
            transport,
            family_id: 0,
            seq: 0,
            debug: false,
        };

        let (family_id, family_version) = client.resolve_family(IPVS_GENL_NAME)?;
        if family_id == 0 {
            return Err(NetlinkError::Family {
                family: IPVS_GENL_NAME.to_owned(),
                reason: "family not present".to_owned(),
            });
        }
        if family_version != u32::from(IPVS_GENL_VERSION) {
            return Err(NetlinkError::Family {
                family: IPVS_GENL_NAME.to_owned(),
                reason: format!("unsupported family version {family_version}"),
            });
        }

        debug!(family_id, family_version, "resolved IPVS genl family");
        client.family_id = family_id;
        Ok(client)
    }

    /// Enables request/reply debug tracing.
    pub fn set_debug(&mut self) {
        self.debug = true;
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Resolves a genl family via the nlctrl GETFAMILY command.
    fn resolve_family(&mut self, name: &str) -> Result<(u16, u32), NetlinkError> {
        let mut attrs = AttrWriter::new();
        attrs.put_str(CTRL_ATTR_FAMILY_NAME, name);

        let payloads = self.request(GENL_ID_CTRL, 1, CTRL_CMD_GETFAMILY, 0, &attrs.finish())?;
        let payload = payloads.first().ok_or_else(|| NetlinkError::Family {
            family: name.to_owned(),
            reason: "empty GETFAMILY reply".to_owned(),
        })?;

        let mut family_id = 0u16;
        let mut version = 0u32;
        for attr in AttrReader::new(payload) {
            let attr: Attr = attr?;
            match attr.kind {
                CTRL_ATTR_FAMILY_ID => family_id = attr.as_u16()?,
                CTRL_ATTR_VERSION => version = attr.as_u32()?,
                _ => {}
            }
        }

        Ok((family_id, version))
    }

    /// Sends one request and collects the genl attribute payloads of every
    /// reply message belonging to the addressed family.
    ///
    /// Every request carries `NLM_F_ACK`: plain commands finish on the
    /// errno-0 acknowledgement, dumps finish on `NLMSG_DONE`. A negative
    /// errno surfaces as [`NetlinkError::Kernel`].
    fn request(
        &mut self,
        family: u16,
        version: u8,
        cmd: u8,
        extra_flags: u16,
        attrs: &[u8],
    ) -> Result<Vec<Vec<u8>>, NetlinkError> {
        let seq = self.next_seq();
        let flags = NLM_F_REQUEST | NLM_F_ACK | extra_flags;
        let msg = frame(family, flags, seq, cmd, version, attrs);

        if self.debug {
            debug!(
                family,
                cmd,
                flags = format_args!("{flags:#06x}"),
                seq,
                attr_len = attrs.len(),
                "netlink request"
            );
        }

        self.transport.send(&msg)?;

        let mut payloads = Vec::new();
        loop {
            let datagram = self.transport.recv()?;
            let mut offset = 0;

            while offset + NLMSG_HDRLEN <= datagram.len() {
                let len = u32::from_ne_bytes(
                    datagram[offset..offset + 4].try_into().expect("bounds checked"),
                ) as usize;
                let msg_type = u16::from_ne_bytes(
                    datagram[offset + 4..offset + 6].try_into().expect("bounds checked"),
                );
                let msg_seq = u32::from_ne_bytes(
                    datagram[offset + 8..offset + 12].try_into().expect("bounds checked"),
                );

                if len < NLMSG_HDRLEN || offset + len > datagram.len() {
                    return Err(NetlinkError::Decode(format!("bad message length {len}")));
                }
                let body = &datagram[offset + NLMSG_HDRLEN..offset + len];
                offset += align4(len);

                if msg_seq != seq {
                    warn!(msg_seq, seq, "skipping reply with unexpected sequence");
                    continue;
                }

                match msg_type {
                    NLMSG_NOOP => {}
                    NLMSG_ERROR => {
                        let errno = i32::from_ne_bytes(
                            body.get(..4)
                                .and_then(|b| b.try_into().ok())
                                .ok_or_else(|| {
                                    NetlinkError::Decode("short nlmsgerr".to_owned())
                                })?,
                        );
                        if errno != 0 {
                            return Err(NetlinkError::Kernel { errno: -errno });
                        }
                        // errno 0: acknowledgement, request complete
                        if self.debug {
                            debug!(seq, replies = payloads.len(), "netlink ack");
                        }
                        return Ok(payloads);
                    }
                    NLMSG_DONE => {
                        if self.debug {
                            debug!(seq, replies = payloads.len(), "netlink dump done");
                        }
                        return Ok(payloads);
                    }
                    t if t == family => {
                        if body.len() < GENL_HDRLEN {
                            return Err(NetlinkError::Decode("short genl header".to_owned()));
                        }
                        payloads.push(body[GENL_HDRLEN..].to_vec());
                    }
                    other => {
                        warn!(msg_type = other, "ignoring reply of unknown type");
                    }
                }
            }
        }
    }

    fn exec(&mut self, cmd: u8, attrs: &[u8]) -> Result<(), NetlinkError> {
        self.request(self.family_id, IPVS_GENL_VERSION, cmd, 0, attrs)?;
        Ok(())
    }

    fn command_attrs(
        service: Option<(&IpvsService, bool)>,
        dest: Option<(&IpvsDest, bool)>,
    ) -> Result<Vec<u8>, NetlinkError> {
        let mut writer = AttrWriter::new();
        if let Some((service, full)) = service {
            writer.put_nested(IPVS_CMD_ATTR_SERVICE, service.attrs(full)?);
        }
        if let Some((dest, full)) = dest {
            writer.put_nested(IPVS_CMD_ATTR_DEST, dest.attrs(full));
        }
        Ok(writer.finish())
    }

    /// Installs a virtual service.
    pub fn new_service(&mut self, service: &IpvsService) -> Result<(), NetlinkError> {
        let attrs = Self::command_attrs(Some((service, true)), None)?;
        self.exec(IPVS_CMD_NEW_SERVICE, &attrs)
    }

    /// Updates a virtual service's settings.
    pub fn set_service(&mut self, service: &IpvsService) -> Result<(), NetlinkError> {
        let attrs = Self::command_attrs(Some((service, true)), None)?;
        self.exec(IPVS_CMD_SET_SERVICE, &attrs)
    }

    /// Removes a virtual service; the kernel drops its destinations too.
    pub fn del_service(&mut self, service: &IpvsService) -> Result<(), NetlinkError> {
        let attrs = Self::command_attrs(Some((service, false)), None)?;
        self.exec(IPVS_CMD_DEL_SERVICE, &attrs)
    }

    /// Dumps all installed virtual services.
    pub fn list_services(&mut self) -> Result<Vec<IpvsService>, NetlinkError> {
        let payloads = self.request(
            self.family_id,
            IPVS_GENL_VERSION,
            IPVS_CMD_GET_SERVICE,
            NLM_F_DUMP,
            &[],
        )?;

        let mut services = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let service_attr = Self::find_attr(&payload, IPVS_CMD_ATTR_SERVICE)?
                .ok_or_else(|| {
                    NetlinkError::Decode("GET_SERVICE reply without service attr".to_owned())
                })?;
            services.push(IpvsService::unpack(&service_attr)?);
        }
        Ok(services)
    }

    /// Installs a destination under a service.
    pub fn new_dest(
        &mut self,
        service: &IpvsService,
        dest: &IpvsDest,
    ) -> Result<(), NetlinkError> {
        let attrs = Self::command_attrs(Some((service, false)), Some((dest, true)))?;
        self.exec(IPVS_CMD_NEW_DEST, &attrs)
    }

    /// Updates a destination's settings (weight, fwd method, thresholds).
    pub fn set_dest(
        &mut self,
        service: &IpvsService,
        dest: &IpvsDest,
    ) -> Result<(), NetlinkError> {
        let attrs = Self::command_attrs(Some((service, false)), Some((dest, true)))?;
        self.exec(IPVS_CMD_SET_DEST, &attrs)
    }

    /// Removes a destination from a service.
    pub fn del_dest(
        &mut self,
        service: &IpvsService,
        dest: &IpvsDest,
    ) -> Result<(), NetlinkError> {
        let attrs = Self::command_attrs(Some((service, false)), Some((dest, false)))?;
        self.exec(IPVS_CMD_DEL_DEST, &attrs)
    }

    /// Dumps the destinations of one service.
    pub fn list_dests(&mut self, service: &IpvsService) -> Result<Vec<IpvsDest>, NetlinkError> {
        let attrs = Self::command_attrs(Some((service, false)), None)?;
        let payloads = self.request(
            self.family_id,
            IPVS_GENL_VERSION,
            IPVS_CMD_GET_DEST,
            NLM_F_DUMP,
            &attrs,
        )?;

        let mut dests = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let dest_attr = Self::find_attr(&payload, IPVS_CMD_ATTR_DEST)?.ok_or_else(|| {
                NetlinkError::Decode("GET_DEST reply without dest attr".to_owned())
            })?;
            dests.push(IpvsDest::unpack(service, &dest_attr)?);
        }
        Ok(dests)
    }

    /// Queries the kernel IPVS version and connection-table size.
    pub fn get_info(&mut self) -> Result<IpvsInfo, NetlinkError> {
        let payloads = self.request(
            self.family_id,
            IPVS_GENL_VERSION,
            IPVS_CMD_GET_INFO,
            0,
            &[],
        )?;
        let payload = payloads
            .first()
            .ok_or_else(|| NetlinkError::Decode("empty GET_INFO reply".to_owned()))?;
        IpvsInfo::unpack(payload)
    }

    /// Flushes every virtual service and destination from the kernel.
    pub fn flush(&mut self) -> Result<(), NetlinkError> {
        self.exec(IPVS_CMD_FLUSH, &[])
    }

    fn find_attr(payload: &[u8], kind: u16) -> Result<Option<Vec<u8>>, NetlinkError> {
        for attr in AttrReader::new(payload) {
            let attr: Attr = attr?;
            if attr.kind == kind {
                return Ok(Some(attr.value.to_vec()));
            }
        }
        Ok(None)
    }
}
