//! IPVS generic-netlink constants.
//!
//! Based on the Linux kernel's `include/uapi/linux/ip_vs.h` and
//! `include/uapi/linux/{netlink,genetlink}.h`.

/// Generic-netlink family name of the IPVS subsystem
pub const IPVS_GENL_NAME: &str = "IPVS";
/// Supported IPVS genl family version
pub const IPVS_GENL_VERSION: u8 = 0x1;

// --- netlink message header ---

pub const NLMSG_HDRLEN: usize = 16;
pub const GENL_HDRLEN: usize = 4;

pub const NLMSG_NOOP: u16 = 0x1;
pub const NLMSG_ERROR: u16 = 0x2;
pub const NLMSG_DONE: u16 = 0x3;

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// --- netlink attribute header ---

pub const NLA_HDRLEN: usize = 4;
pub const NLA_F_NESTED: u16 = 0x8000;
pub const NLA_F_NET_BYTEORDER: u16 = 0x4000;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

// --- generic netlink controller (family resolution) ---

pub const GENL_ID_CTRL: u16 = 0x10;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_VERSION: u16 = 3;

// --- address families / transport protocols ---

pub const AF_INET: u16 = 2;
pub const AF_INET6: u16 = 10;
pub const IPPROTO_TCP: u16 = 6;
pub const IPPROTO_UDP: u16 = 17;
pub const IPPROTO_SCTP: u16 = 132;

// --- destination forwarding methods (connection flags) ---

pub const IP_VS_CONN_F_FWD_MASK: u32 = 0x0007; /* mask for the fwd methods */
pub const IP_VS_CONN_F_MASQ: u32 = 0x0000; /* masquerading/NAT */
pub const IP_VS_CONN_F_LOCALNODE: u32 = 0x0001; /* local node */
pub const IP_VS_CONN_F_TUNNEL: u32 = 0x0002; /* tunneling */
pub const IP_VS_CONN_F_DROUTE: u32 = 0x0003; /* direct routing */
pub const IP_VS_CONN_F_BYPASS: u32 = 0x0004; /* cache bypass */

// --- commands ---

pub const IPVS_CMD_NEW_SERVICE: u8 = 1; /* add service */
pub const IPVS_CMD_SET_SERVICE: u8 = 2; /* modify service */
pub const IPVS_CMD_DEL_SERVICE: u8 = 3; /* delete service */
pub const IPVS_CMD_GET_SERVICE: u8 = 4; /* get service info */

pub const IPVS_CMD_NEW_DEST: u8 = 5; /* add destination */
pub const IPVS_CMD_SET_DEST: u8 = 6; /* modify destination */
pub const IPVS_CMD_DEL_DEST: u8 = 7; /* delete destination */
pub const IPVS_CMD_GET_DEST: u8 = 8; /* get list of service dests */

pub const IPVS_CMD_NEW_DAEMON: u8 = 9; /* start sync daemon */
pub const IPVS_CMD_DEL_DAEMON: u8 = 10; /* stop sync daemon */
pub const IPVS_CMD_GET_DAEMON: u8 = 11; /* get sync daemon status */

pub const IPVS_CMD_SET_TIMEOUT: u8 = 12; /* set TCP and UDP timeouts */
pub const IPVS_CMD_GET_TIMEOUT: u8 = 13; /* get TCP and UDP timeouts */

pub const IPVS_CMD_SET_INFO: u8 = 14; /* only used in GET_INFO reply */
pub const IPVS_CMD_GET_INFO: u8 = 15; /* get general IPVS info */

pub const IPVS_CMD_ZERO: u8 = 16; /* zero all counters and stats */
pub const IPVS_CMD_FLUSH: u8 = 17; /* flush services and dests */

// --- command attributes ---

pub const IPVS_CMD_ATTR_SERVICE: u16 = 1; /* nested service attribute */
pub const IPVS_CMD_ATTR_DEST: u16 = 2; /* nested destination attribute */
pub const IPVS_CMD_ATTR_DAEMON: u16 = 3; /* nested sync daemon attribute */
pub const IPVS_CMD_ATTR_TIMEOUT_TCP: u16 = 4;
pub const IPVS_CMD_ATTR_TIMEOUT_TCP_FIN: u16 = 5;
pub const IPVS_CMD_ATTR_TIMEOUT_UDP: u16 = 6;

// --- service attributes ---

pub const IPVS_SVC_ATTR_AF: u16 = 1; /* address family */
pub const IPVS_SVC_ATTR_PROTOCOL: u16 = 2; /* virtual service protocol */
pub const IPVS_SVC_ATTR_ADDR: u16 = 3; /* virtual service address */
pub const IPVS_SVC_ATTR_PORT: u16 = 4; /* virtual service port */
pub const IPVS_SVC_ATTR_FWMARK: u16 = 5; /* firewall mark of service */
pub const IPVS_SVC_ATTR_SCHED_NAME: u16 = 6; /* name of scheduler */
pub const IPVS_SVC_ATTR_FLAGS: u16 = 7; /* virtual service flags */
pub const IPVS_SVC_ATTR_TIMEOUT: u16 = 8; /* persistent timeout */
pub const IPVS_SVC_ATTR_NETMASK: u16 = 9; /* persistent netmask */
pub const IPVS_SVC_ATTR_STATS: u16 = 10; /* nested service stats */
pub const IPVS_SVC_ATTR_PE_NAME: u16 = 11; /* persistence engine name */

// --- destination attributes ---

pub const IPVS_DEST_ATTR_ADDR: u16 = 1; /* real server address */
pub const IPVS_DEST_ATTR_PORT: u16 = 2; /* real server port */
pub const IPVS_DEST_ATTR_FWD_METHOD: u16 = 3; /* forwarding method */
pub const IPVS_DEST_ATTR_WEIGHT: u16 = 4; /* destination weight */
pub const IPVS_DEST_ATTR_U_THRESH: u16 = 5; /* upper threshold */
pub const IPVS_DEST_ATTR_L_THRESH: u16 = 6; /* lower threshold */
pub const IPVS_DEST_ATTR_ACTIVE_CONNS: u16 = 7; /* active connections */
pub const IPVS_DEST_ATTR_INACT_CONNS: u16 = 8; /* inactive connections */
pub const IPVS_DEST_ATTR_PERSIST_CONNS: u16 = 9; /* persistent connections */
pub const IPVS_DEST_ATTR_STATS: u16 = 10; /* nested dest stats */
pub const IPVS_DEST_ATTR_ADDR_FAMILY: u16 = 11; /* address family */

// --- info attributes ---

pub const IPVS_INFO_ATTR_VERSION: u16 = 1; /* IPVS version number */
pub const IPVS_INFO_ATTR_CONN_TAB_SIZE: u16 = 2; /* connection hash table size */
