//! IPVS 버전/테이블 정보 (GET_INFO 응답)

use std::fmt;

use crate::attr::{Attr, AttrReader};
use crate::consts::{IPVS_INFO_ATTR_CONN_TAB_SIZE, IPVS_INFO_ATTR_VERSION};
use crate::error::NetlinkError;

/// 패킹된 IPVS 버전 번호 (상위부터 8비트씩 major.minor.patch)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version(pub u32);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            (self.0 >> 16) & 0xff,
            (self.0 >> 8) & 0xff,
            self.0 & 0xff,
        )
    }
}

/// GET_INFO 응답
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpvsInfo {
    /// 커널 IPVS 버전
    pub version: Version,
    /// 커넥션 해시 테이블 크기
    pub conn_tab_size: u32,
}

impl IpvsInfo {
    /// GET_INFO 응답의 속성 페이로드를 해석합니다.
    pub fn unpack(raw: &[u8]) -> Result<Self, NetlinkError> {
        let mut info = Self::default();

        for attr in AttrReader::new(raw) {
            let attr: Attr = attr?;
            match attr.kind {
                IPVS_INFO_ATTR_VERSION => info.version = Version(attr.as_u32()?),
                IPVS_INFO_ATTR_CONN_TAB_SIZE => info.conn_tab_size = attr.as_u32()?,
                _ => {}
            }
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrWriter;

    #[test]
    fn version_display_unpacks_octets() {
        // 1.2.1
        assert_eq!(Version(0x0001_0201).to_string(), "1.2.1");
    }

    #[test]
    fn info_unpack() {
        let mut writer = AttrWriter::new();
        writer.put_u32(IPVS_INFO_ATTR_VERSION, 0x0001_0201);
        writer.put_u32(IPVS_INFO_ATTR_CONN_TAB_SIZE, 4096);
        let raw = writer.finish();

        let info = IpvsInfo::unpack(&raw).unwrap();
        assert_eq!(info.version.to_string(), "1.2.1");
        assert_eq!(info.conn_tab_size, 4096);
    }
}
