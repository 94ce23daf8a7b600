//! 애플리케이션 설정 구조체.
//!
//! 상태 엔드포인트, 영상 전송, 디스커버리, 스냅샷, 재시도 정책 등
//! 런타임 설정을 정의한다. 연결에 전달된 설정은 그 연결이 살아 있는 동안
//! 읽기 전용 스냅샷이다 — 전송 방식/경로/포트를 바꾸려면 완전히 끊고
//! 다시 연결해야 한다.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 최근 프린터 목록 최대 길이
const MAX_RECENT_PRINTERS: usize = 10;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SDCP 상태 엔드포인트 설정
    #[serde(default)]
    pub status: StatusEndpointConfig,
    /// RTSP 영상 설정
    #[serde(default)]
    pub video: VideoConfig,
    /// 디스커버리 설정
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// 스냅샷 설정
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// 서브채널 재시도 정책
    #[serde(default)]
    pub retry: RetryConfig,
    /// 영상 채널 사용 여부 (끄면 상태 모니터링만)
    #[serde(default = "default_true")]
    pub video_enabled: bool,
    /// 시작 시 마지막 프린터로 자동 연결
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// 프린터 표시 이름 재정의 (None이면 디스커버리 결과 사용)
    #[serde(default)]
    pub display_name_override: Option<String>,
    /// 최근 연결한 프린터 IP (최신 순)
    #[serde(default)]
    pub recent_printers: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            status: StatusEndpointConfig::default(),
            video: VideoConfig::default(),
            discovery: DiscoveryConfig::default(),
            snapshot: SnapshotConfig::default(),
            retry: RetryConfig::default(),
            video_enabled: true,
            auto_connect: true,
            display_name_override: None,
            recent_printers: Vec::new(),
        }
    }
}

impl AppConfig {
    /// 전체 설정 유효성 검증.
    ///
    /// 소켓을 열기 전에 호출되어, 잘못된 설정은 연결 시도 자체를 거부한다.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.status.validate()?;
        self.video.validate()?;
        self.discovery.validate()?;
        Ok(())
    }

    /// 최근 프린터 목록 맨 앞에 추가 (중복 제거, 길이 제한).
    pub fn push_recent_printer(&mut self, ip: &str) {
        self.recent_printers.retain(|known| known != ip);
        self.recent_printers.insert(0, ip.to_string());
        self.recent_printers.truncate(MAX_RECENT_PRINTERS);
    }

    /// 마지막으로 연결했던 프린터 IP.
    pub fn last_used_printer(&self) -> Option<&str> {
        self.recent_printers.first().map(String::as_str)
    }
}

// ============================================================
// 상태 엔드포인트 설정
// ============================================================

/// SDCP 상태 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEndpointConfig {
    /// WebSocket 포트
    #[serde(default = "default_status_port")]
    pub port: u16,
    /// 상태 폴링 간격 (밀리초)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 수신 대기 타임아웃 (밀리초) — 해제 신호는 이 간격 안에 관측된다
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl StatusEndpointConfig {
    /// 폴링 간격
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 수신 타임아웃
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.port == 0 {
            return Err(CoreError::Validation {
                field: "status.port".to_string(),
                message: "0은 유효한 포트가 아님".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Validation {
                field: "status.poll_interval_ms".to_string(),
                message: "폴링 간격은 0일 수 없음".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for StatusEndpointConfig {
    fn default() -> Self {
        Self {
            port: default_status_port(),
            poll_interval_ms: default_poll_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

// ============================================================
// 영상 설정
// ============================================================

/// RTSP 전송 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoTransport {
    /// 손실 허용/비순서 (지연 최소)
    #[default]
    Udp,
    /// 신뢰성/순서 보장
    Tcp,
}

impl VideoTransport {
    /// ffmpeg `-rtsp_transport` 인자 값
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoTransport::Udp => "udp",
            VideoTransport::Tcp => "tcp",
        }
    }
}

/// RTSP 영상 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// 전송 방식
    #[serde(default)]
    pub transport: VideoTransport,
    /// RTSP 경로 (항상 `/`로 시작)
    #[serde(default = "default_video_path")]
    pub path: String,
    /// RTSP 포트
    #[serde(default = "default_video_port")]
    pub port: u16,
}

impl VideoConfig {
    /// 스트림 URL 구성
    pub fn stream_url(&self, ip_address: &str) -> String {
        format!("rtsp://{}:{}{}", ip_address, self.port, self.path)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.port == 0 {
            return Err(CoreError::Validation {
                field: "video.port".to_string(),
                message: "0은 유효한 포트가 아님".to_string(),
            });
        }
        if !self.path.starts_with('/') {
            return Err(CoreError::Validation {
                field: "video.path".to_string(),
                message: format!("경로는 /로 시작해야 함: {}", self.path),
            });
        }
        Ok(())
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            transport: VideoTransport::default(),
            path: default_video_path(),
            port: default_video_port(),
        }
    }
}

// ============================================================
// 디스커버리 설정
// ============================================================

/// UDP 브로드캐스트 디스커버리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// 프로브를 보낼 장치 측 포트
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,
    /// 응답을 기다릴 로컬 포트 (점유 시 임시 포트로 대체)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// 전체 디스커버리 제한 시간 (밀리초)
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
}

impl DiscoveryConfig {
    /// 제한 시간
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.probe_port == 0 {
            return Err(CoreError::Validation {
                field: "discovery.probe_port".to_string(),
                message: "0은 유효한 포트가 아님".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(CoreError::Validation {
                field: "discovery.timeout_ms".to_string(),
                message: "제한 시간은 0일 수 없음".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_port: default_probe_port(),
            listen_port: default_listen_port(),
            timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

// ============================================================
// 스냅샷 설정
// ============================================================

/// 스냅샷 저장 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// 저장 디렉토리 (None이면 호출 시 경로 지정 필수)
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// 타임스탬프 번인 기본값
    #[serde(default = "default_true")]
    pub include_timestamp: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: None,
            include_timestamp: true,
        }
    }
}

// ============================================================
// 재시도 정책
// ============================================================

/// 서브채널 재시도 정책.
///
/// 예기치 않은 에러가 난 서브채널만 제한 횟수 안에서 다시 붙인다.
/// 소진되면 지속 에러로 승격된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 서브채널당 최대 재시도 횟수
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// 재시도 사이 대기 (밀리초)
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl RetryConfig {
    /// 재시도 대기 시간
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

// ============================================================
// 기본값
// ============================================================

fn default_true() -> bool {
    true
}

fn default_status_port() -> u16 {
    3030
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_read_timeout_ms() -> u64 {
    2_000
}

fn default_video_path() -> String {
    "/video".to_string()
}

fn default_video_port() -> u16 {
    554
}

fn default_probe_port() -> u16 {
    3000
}

fn default_listen_port() -> u16 {
    54_780
}

fn default_discovery_timeout_ms() -> u64 {
    1_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    3_000
}
