//! netlink 속성(TLV) 코덱 — IPVS 패킹 규약 포함
//!
//! 속성은 4바이트 헤더(길이, 타입)와 4바이트 정렬 페이로드로
//! 이루어집니다. IPVS 규약상 포트는 빅엔디안 u16이고 주소는 패밀리별
//! 원시 바이너리(IPv4 4바이트, IPv6 16바이트)입니다. 정수 속성은
//! 호스트 엔디안입니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};

use crate::consts::{AF_INET, AF_INET6, NLA_F_NESTED, NLA_HDRLEN, NLA_TYPE_MASK};
use crate::error::NetlinkError;

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// 속성 스트림 작성기
#[derive(Debug, Default)]
pub struct AttrWriter {
    buf: BytesMut,
}

impl AttrWriter {
    /// 빈 작성기를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn put_header(&mut self, kind: u16, payload_len: usize) {
        let len = NLA_HDRLEN + payload_len;
        debug_assert!(len <= u16::MAX as usize);
        self.buf.put_u16_ne(len as u16);
        self.buf.put_u16_ne(kind);
    }

    fn pad(&mut self, payload_len: usize) {
        for _ in payload_len..align4(payload_len) {
            self.buf.put_u8(0);
        }
    }

    /// 원시 바이트 속성을 추가합니다.
    pub fn put_bytes(&mut self, kind: u16, value: &[u8]) {
        self.put_header(kind, value.len());
        self.buf.put_slice(value);
        self.pad(value.len());
    }

    /// 호스트 엔디안 u16 속성을 추가합니다.
    pub fn put_u16(&mut self, kind: u16, value: u16) {
        self.put_bytes(kind, &value.to_ne_bytes());
    }

    /// 호스트 엔디안 u32 속성을 추가합니다.
    pub fn put_u32(&mut self, kind: u16, value: u32) {
        self.put_bytes(kind, &value.to_ne_bytes());
    }

    /// 빅엔디안(네트워크 바이트 순서) 포트 속성을 추가합니다.
    pub fn put_port(&mut self, kind: u16, port: u16) {
        self.put_bytes(kind, &port.to_be_bytes());
    }

    /// NUL 종단 문자열 속성을 추가합니다.
    pub fn put_str(&mut self, kind: u16, value: &str) {
        self.put_header(kind, value.len() + 1);
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        self.pad(value.len() + 1);
    }

    /// 패밀리에 맞는 원시 주소 바이트 속성을 추가합니다.
    pub fn put_addr(&mut self, kind: u16, addr: &IpAddr) {
        match addr {
            IpAddr::V4(v4) => self.put_bytes(kind, &v4.octets()),
            IpAddr::V6(v6) => self.put_bytes(kind, &v6.octets()),
        }
    }

    /// 중첩 속성을 추가합니다 (`NLA_F_NESTED` 비트 포함).
    pub fn put_nested(&mut self, kind: u16, inner: AttrWriter) {
        let payload = inner.finish();
        self.put_header(kind | NLA_F_NESTED, payload.len());
        self.buf.put_slice(&payload);
        // 중첩 페이로드는 이미 4바이트 정렬 상태입니다.
    }

    /// 작성된 속성 스트림을 반환합니다.
    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// 파싱된 단일 속성
#[derive(Debug, Clone, Copy)]
pub struct Attr<'a> {
    /// 플래그 비트를 제거한 속성 타입
    pub kind: u16,
    /// 패딩을 제외한 페이로드
    pub value: &'a [u8],
}

impl Attr<'_> {
    /// 호스트 엔디안 u16 값으로 해석합니다.
    pub fn as_u16(&self) -> Result<u16, NetlinkError> {
        let bytes: [u8; 2] = self
            .value
            .get(..2)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| NetlinkError::Decode(format!("attr {}: short u16", self.kind)))?;
        Ok(u16::from_ne_bytes(bytes))
    }

    /// 호스트 엔디안 u32 값으로 해석합니다.
    pub fn as_u32(&self) -> Result<u32, NetlinkError> {
        let bytes: [u8; 4] = self
            .value
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| NetlinkError::Decode(format!("attr {}: short u32", self.kind)))?;
        Ok(u32::from_ne_bytes(bytes))
    }

    /// 빅엔디안 포트 값으로 해석합니다.
    pub fn as_port(&self) -> Result<u16, NetlinkError> {
        let bytes: [u8; 2] = self
            .value
            .get(..2)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| NetlinkError::Decode(format!("attr {}: short port", self.kind)))?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// NUL 종단 문자열 값으로 해석합니다.
    pub fn as_str(&self) -> Result<&str, NetlinkError> {
        let end = self
            .value
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.value.len());
        std::str::from_utf8(&self.value[..end])
            .map_err(|_| NetlinkError::Decode(format!("attr {}: invalid utf-8", self.kind)))
    }
}

/// 패밀리에 맞게 원시 주소 바이트를 해석합니다.
///
/// 커널은 16바이트 버퍼를 통째로 돌려주기도 하므로 앞쪽 바이트만
/// 사용합니다.
pub fn parse_addr(af: u16, raw: &[u8]) -> Result<IpAddr, NetlinkError> {
    match af {
        AF_INET => {
            let octets: [u8; 4] = raw
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| NetlinkError::Decode(format!("short inet addr: {raw:?}")))?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        AF_INET6 => {
            let octets: [u8; 16] = raw
                .get(..16)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| NetlinkError::Decode(format!("short inet6 addr: {raw:?}")))?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        other => Err(NetlinkError::Decode(format!("unknown af={other}"))),
    }
}

/// 속성 스트림을 순회합니다.
///
/// 길이가 손상된 속성을 만나면 `Err` 하나를 내고 종료합니다.
/// 알 수 없는 속성 타입의 처리는 호출자 몫입니다 (보통 무시).
pub struct AttrReader<'a> {
    data: &'a [u8],
}

impl<'a> AttrReader<'a> {
    /// 속성 스트림 리더를 만듭니다.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrReader<'a> {
    type Item = Result<Attr<'a>, NetlinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < NLA_HDRLEN {
            self.data = &[];
            return Some(Err(NetlinkError::Decode("truncated attr header".into())));
        }

        let len = u16::from_ne_bytes([self.data[0], self.data[1]]) as usize;
        let kind = u16::from_ne_bytes([self.data[2], self.data[3]]) & NLA_TYPE_MASK;

        if len < NLA_HDRLEN || len > self.data.len() {
            self.data = &[];
            return Some(Err(NetlinkError::Decode(format!(
                "bad attr length {len}"
            ))));
        }

        let value = &self.data[NLA_HDRLEN..len];
        self.data = &self.data[align4(len).min(self.data.len())..];

        Some(Ok(Attr { kind, value }))
    }
}
