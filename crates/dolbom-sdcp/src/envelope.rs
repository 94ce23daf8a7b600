//! SDCP 메시지 봉투.
//!
//! 송신 요청의 직렬화 타입과 수신 토픽 분류를 정의한다.
//! 봉투는 `{Topic, Data}` 두 필드가 전부이며, 응답은 개별 요청이 아니라
//! 세션에 매칭된다 — 펌웨어가 요청/응답의 엄격한 상관을 보장하지 않는다.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// 상태 질의 명령 코드
pub const CMD_STATUS_QUERY: u32 = 255;

/// 요청 토픽 네임스페이스
const REQUEST_NAMESPACE: &str = "sdcp/request";

/// 송신 요청 봉투
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    /// `sdcp/request/<deviceId>`
    #[serde(rename = "Topic")]
    pub topic: String,
    /// 요청 본문
    #[serde(rename = "Data")]
    pub data: RequestData,
}

/// 요청 본문
#[derive(Debug, Clone, Serialize)]
pub struct RequestData {
    /// 명령 코드
    #[serde(rename = "Cmd")]
    pub cmd: u32,
    /// 매 요청마다 새로 생성되는 식별자
    #[serde(rename = "RequestID")]
    pub request_id: String,
    /// 명령 인자 (상태 질의는 빈 객체)
    #[serde(rename = "Data")]
    pub data: Value,
    /// 대상 장치 식별자
    #[serde(rename = "MainboardID")]
    pub mainboard_id: String,
    /// 발신자 구분 (클라이언트 = 0)
    #[serde(rename = "From")]
    pub from: u32,
}

/// 상태 질의 요청 생성.
pub fn status_request(device_id: &str) -> RequestEnvelope {
    RequestEnvelope {
        topic: format!("{REQUEST_NAMESPACE}/{device_id}"),
        data: RequestData {
            cmd: CMD_STATUS_QUERY,
            request_id: Uuid::new_v4().simple().to_string(),
            data: Value::Object(serde_json::Map::new()),
            mainboard_id: device_id.to_string(),
            from: 0,
        },
    }
}

/// 수신 토픽 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// 요청에 대한 응답
    Response,
    /// 상태 푸시
    Status,
    /// 공지
    Notice,
    /// 장치 측 에러
    Error,
    /// 알 수 없는 토픽
    Unknown,
}

/// 토픽 문자열 분류 (`sdcp/status/12345` → `Status`).
pub fn classify_topic(topic: &str) -> TopicKind {
    let mut segments = topic.split('/');
    let _namespace = segments.next();
    match segments.next() {
        Some("response") => TopicKind::Response,
        Some("status") => TopicKind::Status,
        Some("notice") => TopicKind::Notice,
        Some("error") => TopicKind::Error,
        _ => TopicKind::Unknown,
    }
}
