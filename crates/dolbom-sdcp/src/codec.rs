//! 상태 코덱 — 순수 정규화 함수.
//!
//! 펌웨어 변형마다 필드명과 타입이 제각각이라, 정식 필드 하나당
//! 허용 별칭 목록을 순서대로 탐색한다 (대소문자 구분 정확 일치,
//! 퍼지 매칭 없음). 별칭이 존재해도 값이 목표 타입으로 강제되지
//! 않으면 건너뛰고 다음 별칭을 본다. 어느 별칭도 쓸 수 없으면
//! 정의된 기본값(0, false, "")으로 채우고 레코드 전체를 실패시키지
//! 않는다. 느슨한 `serde_json::Value` 형태는 이 모듈 밖으로 새지
//! 않는다.

use dolbom_core::models::status::{PrintStatus, StatusCategory};
use serde_json::{Map, Value};

/// 보고된 진행률과 레이어 유도 진행률의 허용 편차 (퍼센트 포인트).
/// 이보다 크게 어긋나면 레이어 쪽이 이긴다 — 레이어 카운트가
/// 펌웨어 변형 전반에서 더 신뢰할 수 있는 신호다.
const PROGRESS_TOLERANCE_PCT: f64 = 5.0;

// ============================================================
// 별칭 테이블 (데이터 주도 — 분기 코드가 아니라 테이블로 유지)
// ============================================================

/// 출력 여부
const IS_PRINTING_ALIASES: &[&str] = &["IsPrinting", "Printing", "isPrinting", "is_printing", "Status"];
/// 진행률
const PROGRESS_ALIASES: &[&str] = &["Progress", "progress", "PrintProgress", "print_progress", "Percent"];
/// 현재 레이어
const CURRENT_LAYER_ALIASES: &[&str] =
    &["CurrentLayer", "Layer", "current_layer", "CurrentLine", "LineNum", "Layers"];
/// 전체 레이어
const TOTAL_LAYER_ALIASES: &[&str] =
    &["TotalLayer", "TotalLayers", "MaxLayer", "Lines", "total_layers", "Slices"];
/// 남은 시간 (초)
const REMAINING_SECONDS_ALIASES: &[&str] = &["RemainTime", "TimeLeft", "remain_time", "RemainingTime"];
/// 전체 시간 (초)
const TOTAL_SECONDS_ALIASES: &[&str] = &["TotalTime", "total_time", "TotalPrintTime", "PrintTime"];
/// 작업 이름
const TASK_NAME_ALIASES: &[&str] = &["FileName", "File", "TaskName", "task_name", "file_name"];
/// 작업 식별자
const TASK_ID_ALIASES: &[&str] = &["TaskID", "task_id", "JobID", "PrintID"];
/// UV 패널 온도
const UV_TEMP_ALIASES: &[&str] = &["UVTemp", "UV", "uv_temp", "UVTemperature", "LightTemp"];

/// `Status` 별칭이 문자열일 때 출력 중으로 보는 값들 (소문자 비교)
const ACTIVE_STATUS_STRINGS: &[&str] = &["running", "printing", "busy"];

/// 온도가 하위 객체로 중첩돼 오는 펌웨어용 부모/자식 키
const UV_TEMP_PARENTS: &[&str] = &["UV", "UVPanel", "Light"];
const UV_TEMP_CHILDREN: &[&str] = &["Temp", "Temperature", "Value", "Current"];

// ============================================================
// 상태 코드 매핑
// ============================================================

/// 원본 숫자 상태 코드를 범주로 매핑.
///
/// 0→Idle, 1→Preparing, 2/3/4→Printing, 7→Finishing, 8→Idle.
/// 그 외 값은 `Unknown`이며 결코 치명적이지 않다.
pub fn map_status_code(code: i64) -> StatusCategory {
    match code {
        0 | 8 => StatusCategory::Idle,
        1 => StatusCategory::Preparing,
        2..=4 => StatusCategory::Printing,
        7 => StatusCategory::Finishing,
        _ => StatusCategory::Unknown,
    }
}

// ============================================================
// 정규화
// ============================================================

/// 느슨한 필드 맵을 정규 상태 스냅샷으로 정규화.
///
/// 실패하지 않는다 — 빈 맵을 넣으면 전 필드 기본값의 레코드가 나온다.
pub fn normalize_status(fields: &Map<String, Value>) -> PrintStatus {
    let (is_printing, raw_status_code) = resolve_is_printing(fields);

    let progress = probe(fields, PROGRESS_ALIASES, as_f64).unwrap_or(0.0);
    let current_layer = probe(fields, CURRENT_LAYER_ALIASES, as_u32).unwrap_or(0);
    let total_layer = probe(fields, TOTAL_LAYER_ALIASES, as_u32).unwrap_or(0);

    let mut remaining_seconds = probe(fields, REMAINING_SECONDS_ALIASES, as_seconds).unwrap_or(0);
    let mut total_seconds = probe(fields, TOTAL_SECONDS_ALIASES, as_seconds).unwrap_or(0);

    // 일부 펌웨어는 시간 대신 밀리초 Ticks만 보고한다
    if total_seconds == 0 {
        if let Some(total_ticks) = fields.get("TotalTicks").and_then(as_u64) {
            total_seconds = total_ticks / 1_000;
        }
    }
    if remaining_seconds == 0 {
        if let (Some(total_ticks), Some(current_ticks)) = (
            fields.get("TotalTicks").and_then(as_u64),
            fields.get("CurrentTicks").and_then(as_u64),
        ) {
            remaining_seconds = total_ticks.saturating_sub(current_ticks) / 1_000;
        }
    }

    let task_id = probe(fields, TASK_ID_ALIASES, as_string).unwrap_or_default();
    let task_name = probe(fields, TASK_NAME_ALIASES, as_string).unwrap_or_default();
    let uv_temperature =
        probe(fields, UV_TEMP_ALIASES, as_f64).or_else(|| nested_uv_temperature(fields));

    let status = PrintStatus {
        is_printing,
        progress_percent: progress,
        current_layer,
        total_layer,
        remaining_seconds,
        total_seconds,
        task_id,
        task_name,
        raw_status_code,
        uv_temperature,
    };

    reconcile(status)
}

/// 진행률/레이어 불변식 적용 (발행 직전 단계).
///
/// `total_layer > 0`이면 `current_layer ≤ total_layer`를 강제하고,
/// 레이어 유도 진행률과 보고 진행률이 허용 편차 이상 어긋나면
/// 레이어 쪽 값으로 교체한다.
fn reconcile(mut status: PrintStatus) -> PrintStatus {
    if status.total_layer > 0 {
        if status.current_layer > status.total_layer {
            status.current_layer = status.total_layer;
        }
        let derived = status.current_layer as f64 / status.total_layer as f64 * 100.0;
        if (status.progress_percent - derived).abs() > PROGRESS_TOLERANCE_PCT {
            status.progress_percent = derived;
        }
    }
    status.progress_percent = status.progress_percent.clamp(0.0, 100.0);
    status
}

/// `is_printing`과 원본 상태 코드를 함께 해석.
///
/// `Status` 별칭은 이중 경로다: 숫자면 코드 매핑의 활성 집합으로,
/// 문자열이면 알려진 활성 문자열로 판정한다. 두 경로가 항상 일치한다고
/// 가정하지 않는다 — 먼저 존재하는 별칭이 이긴다.
fn resolve_is_printing(fields: &Map<String, Value>) -> (bool, i64) {
    for alias in IS_PRINTING_ALIASES {
        let Some(value) = fields.get(*alias) else {
            continue;
        };
        if *alias == "Status" {
            if let Some(code) = value.as_i64() {
                return (map_status_code(code).is_active(), code);
            }
            if let Some(text) = value.as_str() {
                let lowered = text.to_lowercase();
                return (
                    ACTIVE_STATUS_STRINGS.iter().any(|known| *known == lowered),
                    0,
                );
            }
            continue;
        }
        if let Some(flag) = as_bool(value) {
            return (flag, 0);
        }
    }
    (false, 0)
}

/// 중첩 객체 안의 UV 온도 탐색 (`{"UV": {"Temp": 41.5}}` 형태)
fn nested_uv_temperature(fields: &Map<String, Value>) -> Option<f64> {
    for parent in UV_TEMP_PARENTS {
        let Some(inner) = fields.get(*parent).and_then(Value::as_object) else {
            continue;
        };
        for child in UV_TEMP_CHILDREN {
            if let Some(temp) = inner.get(*child).and_then(as_f64) {
                return Some(temp);
            }
        }
    }
    None
}

// ============================================================
// 봉투 해체
// ============================================================

/// 수신 메시지에서 상태 필드 맵을 끄집어낸다.
///
/// 표준 중첩(`Data.Data`) 우선, 덜 중첩된 형태 순서로 컨테이너를 찾고,
/// 컨테이너의 `PrintInfo`/`Temperature` 하위 객체를 평탄화해 하나의
/// 필드 맵으로 합친다. 쓸 만한 필드가 없으면 None — 호출자는 드롭한다.
pub fn extract_status_fields(message: &Value) -> Option<Map<String, Value>> {
    let containers = [
        message.get("Data").and_then(|d| d.get("Data")),
        message.get("Data"),
        Some(message),
    ];

    for container in containers.into_iter().flatten() {
        let Some(object) = container.as_object() else {
            continue;
        };
        let fields = flatten_container(object);
        if !fields.is_empty() {
            return Some(fields);
        }
    }
    None
}

/// 컨테이너 하나를 평탄한 필드 맵으로 변환.
///
/// 스칼라 필드를 먼저 싣고, `PrintInfo`/`Temperature` 하위 객체의
/// 필드가 키 충돌 시 우선한다.
fn flatten_container(container: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();

    for (key, value) in container {
        if key == "PrintInfo" || key == "Temperature" {
            continue;
        }
        if recognized_field(key) {
            fields.insert(key.clone(), value.clone());
        }
    }
    for nested_key in ["PrintInfo", "Temperature"] {
        if let Some(nested) = container.get(nested_key).and_then(Value::as_object) {
            for (key, value) in nested {
                fields.insert(key.clone(), value.clone());
            }
        }
    }
    fields
}

/// 별칭 테이블 어딘가에 등장하는 키인지 (봉투 잡음 제거용).
fn recognized_field(key: &str) -> bool {
    IS_PRINTING_ALIASES.contains(&key)
        || PROGRESS_ALIASES.contains(&key)
        || CURRENT_LAYER_ALIASES.contains(&key)
        || TOTAL_LAYER_ALIASES.contains(&key)
        || REMAINING_SECONDS_ALIASES.contains(&key)
        || TOTAL_SECONDS_ALIASES.contains(&key)
        || TASK_NAME_ALIASES.contains(&key)
        || TASK_ID_ALIASES.contains(&key)
        || UV_TEMP_ALIASES.contains(&key)
        || key == "TotalTicks"
        || key == "CurrentTicks"
}

// ============================================================
// 탐색/강제 헬퍼
// ============================================================

/// 별칭 목록을 순서대로 탐색, 강제에 성공한 첫 값을 반환.
fn probe<T>(
    fields: &Map<String, Value>,
    aliases: &[&str],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    aliases
        .iter()
        .find_map(|alias| fields.get(*alias).and_then(&coerce))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_u64(value).and_then(|n| u32::try_from(n).ok())
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 시간 값 강제: 초 숫자, 숫자 문자열, `"HH:MM:SS"`/`"MM:SS"` 문자열.
fn as_seconds(value: &Value) -> Option<u64> {
    if let Some(n) = as_u64(value) {
        return Some(n);
    }
    let text = value.as_str()?;
    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        [h, m, s] => {
            let hours: u64 = h.trim().parse().ok()?;
            let minutes: u64 = m.trim().parse().ok()?;
            let seconds: u64 = s.trim().parse().ok()?;
            Some(hours * 3_600 + minutes * 60 + seconds)
        }
        [m, s] => {
            let minutes: u64 = m.trim().parse().ok()?;
            let seconds: u64 = s.trim().parse().ok()?;
            Some(minutes * 60 + seconds)
        }
        _ => None,
    }
}
