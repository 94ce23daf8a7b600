//! 프린터 식별 정보 모델.

use serde::{Deserialize, Serialize};

/// 디스커버리 응답에서 얻는 프린터 식별 레코드.
///
/// 발견 이후 불변 — 재발견 시 레코드 전체가 교체된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterIdentity {
    /// 프로토콜이 부여한 장치 식별자 (MainboardID)
    pub id: String,
    /// 표시 이름
    pub display_name: String,
    /// IP 주소
    pub ip_address: String,
    /// 모델명 (예: "Mars 3 Pro")
    pub model: String,
    /// 펌웨어 버전 (예: "V4.5.3")
    pub firmware_version: String,
    /// 연결 종류 태그 (자유 형식 capability 문자열)
    pub connection_kind: String,
}

impl PrinterIdentity {
    /// 디스커버리 없이 직접 IP 연결할 때 쓰는 대체 식별자.
    ///
    /// 장치 식별자를 모르는 상태에서도 상태 채널을 열 수 있어야 한다.
    pub fn fallback(ip_address: &str) -> Self {
        Self {
            id: "ElegooPrinter".to_string(),
            display_name: "Elegoo Printer".to_string(),
            ip_address: ip_address.to_string(),
            model: String::new(),
            firmware_version: String::new(),
            connection_kind: "ElegooPrinterAPI".to_string(),
        }
    }
}
