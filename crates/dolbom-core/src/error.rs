//! DOLBOM 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 자체 에러 대신 `CoreError`를 그대로 사용하거나
//! `#[from]`으로 래핑한다. 파싱 레벨 에러는 코덱/디스커버리 경계에서
//! 흡수되어 로그로만 남고, 전송 레벨 에러는 연결 상태 전이로 한 단계만
//! 전파된다. 어떤 변형도 프로세스 종료로 이어지지 않는다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 프린터 통신의 에러 분류 체계를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 디스커버리 실패 (비치명적 — 빈 결과 + 경고로 강등됨)
    #[error("디스커버리 실패: {0}")]
    Discovery(String),

    /// 해석 불가능한 수신 메시지 (드롭됨, 루프는 계속)
    #[error("잘못된 메시지: {0}")]
    MalformedMessage(String),

    /// 전송 레벨 에러 (해당 서브채널에 치명적, 상태 → Error)
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 설정값 오류 (소켓을 열기 전에 거부됨)
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 — {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 스냅샷 저장 실패 (작업 국소적, 연결 상태에 영향 없음)
    #[error("스냅샷 에러: {0}")]
    Snapshot(String),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 해당 서브채널을 끝내는 에러인지 여부.
    ///
    /// 전송 에러만 채널 치명적이다. 파싱/스냅샷/디스커버리 에러는
    /// 흡수되거나 호출 지점에 국한된다.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(self, CoreError::Transport(_))
    }
}
