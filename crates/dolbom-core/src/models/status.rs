//! 출력 상태 모델.
//!
//! 코덱이 펌웨어별 필드명을 정규화한 결과물. 매 폴링/푸시마다
//! 새 스냅샷으로 통째로 교체되며 부분 변경은 없다.

use serde::{Deserialize, Serialize};

/// 상태 코드 분류.
///
/// 펌웨어가 보내는 숫자 상태 코드를 다섯 범주로 접는다.
/// 모르는 코드는 `Unknown`으로 수렴할 뿐 에러가 아니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCategory {
    /// 대기
    Idle,
    /// 출력 준비 중
    Preparing,
    /// 출력 중
    Printing,
    /// 마무리 단계
    Finishing,
    /// 알 수 없는 코드
    Unknown,
}

impl StatusCategory {
    /// 출력 작업이 진행 중인 것으로 보는 범주인지 여부.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StatusCategory::Preparing | StatusCategory::Printing | StatusCategory::Finishing
        )
    }
}

impl std::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StatusCategory::Idle => "Idle",
            StatusCategory::Preparing => "Preparing",
            StatusCategory::Printing => "Printing",
            StatusCategory::Finishing => "Finishing",
            StatusCategory::Unknown => "Unknown",
        };
        write!(f, "{label}")
    }
}

/// 정규화된 출력 상태 스냅샷 (코덱 출력)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintStatus {
    /// 출력 진행 여부
    pub is_printing: bool,
    /// 진행률 (0.0 ~ 100.0)
    pub progress_percent: f64,
    /// 현재 레이어
    pub current_layer: u32,
    /// 전체 레이어 (0이면 미보고)
    pub total_layer: u32,
    /// 남은 시간 (초)
    pub remaining_seconds: u64,
    /// 전체 예상 시간 (초)
    pub total_seconds: u64,
    /// 작업 식별자
    pub task_id: String,
    /// 작업(파일) 이름
    pub task_name: String,
    /// 펌웨어가 보고한 원본 상태 코드
    pub raw_status_code: i64,
    /// UV 패널 온도 (미보고 시 None)
    pub uv_temperature: Option<f64>,
}

impl Default for PrintStatus {
    fn default() -> Self {
        Self {
            is_printing: false,
            progress_percent: 0.0,
            current_layer: 0,
            total_layer: 0,
            remaining_seconds: 0,
            total_seconds: 0,
            task_id: String::new(),
            task_name: String::new(),
            raw_status_code: 0,
            uv_temperature: None,
        }
    }
}

impl PrintStatus {
    /// 남은 시간을 `HH:MM:SS` 문자열로 포맷.
    pub fn format_remaining(&self) -> String {
        format_seconds(self.remaining_seconds)
    }

    /// 전체 시간을 `HH:MM:SS` 문자열로 포맷.
    pub fn format_total(&self) -> String {
        format_seconds(self.total_seconds)
    }
}

/// 초 단위 시간을 `HH:MM:SS`로 포맷.
fn format_seconds(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
