//! netlink 바인딩 에러 타입

/// IPVS netlink 바인딩 에러
#[derive(Debug, thiserror::Error)]
pub enum NetlinkError {
    /// 소켓 열기/바인딩/송수신 실패
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// genl 패밀리 해석 실패
    #[error("genl family '{family}': {reason}")]
    Family { family: String, reason: String },

    /// 커널이 음수 errno로 응답함
    #[error("kernel error: errno {errno}")]
    Kernel { errno: i32 },

    /// 응답 메시지를 해석할 수 없음
    #[error("malformed response: {0}")]
    Decode(String),

    /// 요청을 구성할 수 없음 (식별 필드 누락 등)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
