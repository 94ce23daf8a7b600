//! 장치 모니터 오케스트레이터.
//!
//! 상태 채널(프린터 세션)과 영상 채널(프레임 디코더)을 묶어
//! `Idle → Connecting → Connected → {Disconnecting → Idle | Error}`
//! 집계 상태 머신을 돌린다. 표시 레이어가 보는 유일한 인터페이스다.
//!
//! 재시도 정책은 여기 산다: 사용자가 끊지 않았는데 서브채널이 `Error`로
//! 떨어지면 그 채널만 짧은 지연 후 제한 횟수 안에서 다시 붙인다.
//! 소진되면 지속 에러 신호를 내고 그 채널은 포기한다 — 무한 조용한
//! 재시도는 없다.

use dolbom_core::config::{AppConfig, RetryConfig};
use dolbom_core::error::CoreError;
use dolbom_core::models::connection::{ConnectionState, MonitorState, SubChannel};
use dolbom_core::models::printer::PrinterIdentity;
use dolbom_core::models::status::PrintStatus;
use dolbom_core::models::frame::Frame;
use dolbom_core::ports::config_provider::ConfigProvider;
use dolbom_core::ports::notifier::MonitorNotifier;
use dolbom_core::ports::snapshot_sink::SnapshotSink;
use dolbom_sdcp::discovery::DiscoveryClient;
use dolbom_sdcp::session::PrinterSession;
use dolbom_video::decoder::FrameDecoder;
use rand::RngExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 감독 루프 점검 주기
const SUPERVISOR_TICK: Duration = Duration::from_millis(250);

/// 재시도 지연 + 소량 지터 (두 채널의 재시도 몰림 방지)
async fn retry_pause(retry: &RetryConfig) {
    let jitter_ms = rand::rng().random_range(0..=retry.delay_ms / 4);
    tokio::time::sleep(retry.delay() + Duration::from_millis(jitter_ms)).await;
}

/// 연결 하나의 불변 컨텍스트 (연결 시점 설정 스냅샷)
#[derive(Clone)]
struct ConnectionContext {
    identity: PrinterIdentity,
    config: AppConfig,
}

/// 장치 모니터
pub struct DeviceMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn MonitorNotifier>,
    decoder: Arc<FrameDecoder>,
    session: RwLock<Option<Arc<PrinterSession>>>,
    connection: RwLock<Option<ConnectionContext>>,
    state_tx: watch::Sender<MonitorState>,
    user_disconnect: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceMonitor {
    /// 새 장치 모니터 생성.
    pub fn new(
        provider: Arc<dyn ConfigProvider>,
        notifier: Arc<dyn MonitorNotifier>,
        snapshot_sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(MonitorState::Idle);
        let decoder = Arc::new(FrameDecoder::new(notifier.clone(), snapshot_sink));
        Self {
            inner: Arc::new(Inner {
                provider,
                notifier,
                decoder,
                session: RwLock::new(None),
                connection: RwLock::new(None),
                state_tx,
                user_disconnect: AtomicBool::new(false),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// 현재 집계 상태
    pub fn state(&self) -> MonitorState {
        *self.inner.state_tx.borrow()
    }

    /// 집계 상태 변경 수신기
    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.inner.state_tx.subscribe()
    }

    /// 최신 정규화 상태
    pub async fn latest_status(&self) -> Option<PrintStatus> {
        let session = self.inner.session.read().await;
        session.as_ref().and_then(|s| s.latest_status())
    }

    /// 상태 발행 수신기 (연결 전이면 None)
    pub async fn subscribe_status(&self) -> Option<watch::Receiver<Option<PrintStatus>>> {
        let session = self.inner.session.read().await;
        session.as_ref().map(|s| s.subscribe_status())
    }

    /// 최신 프레임 — 항상 프레임 하나를 반환
    pub fn latest_frame(&self) -> Frame {
        self.inner.decoder.latest_frame()
    }

    /// 연결된 프린터 식별 정보
    pub async fn identity(&self) -> Option<PrinterIdentity> {
        let connection = self.inner.connection.read().await;
        connection.as_ref().map(|c| c.identity.clone())
    }

    /// 영상 디코드 일시정지/재개 (상태 채널 무관)
    pub fn set_video_enabled(&self, enabled: bool) {
        self.inner.decoder.set_enabled(enabled);
    }

    /// 현재 프레임을 스냅샷으로 저장
    pub async fn take_snapshot(&self, path: &Path, with_timestamp: bool) -> Result<(), CoreError> {
        self.inner.decoder.take_snapshot(path, with_timestamp).await
    }

    /// 프린터에 연결.
    ///
    /// 설정 검증 → 최선 노력 디스커버리(실패 비치명) → 상태/영상 채널
    /// 동시 시작. 상태 채널 수립 실패는 에러로 반환되고, 영상 실패는
    /// 감독 루프의 재시도로 넘어간다. 집계 상태는 상태 채널이 붙는
    /// 즉시 `Connected`다 — 영상 준비를 기다리지 않는다.
    pub async fn connect(&self, ip_address: &str) -> Result<(), CoreError> {
        // 기존 연결 정리 (덮어 연결 허용)
        if self.state() != MonitorState::Idle {
            self.disconnect().await;
        }

        let config = self.inner.provider.snapshot();
        config.validate()?;

        self.inner.user_disconnect.store(false, Ordering::Relaxed);
        self.set_state(MonitorState::Connecting);
        info!("프린터 연결 시작: {ip_address}");

        // 디스커버리는 최선 노력 — 실패해도 직접 연결로 진행
        let discovery = DiscoveryClient::new(config.discovery.clone());
        let mut identity = match discovery.probe_host(ip_address).await {
            Some(found) => {
                info!("프린터 발견: {} ({})", found.display_name, found.model);
                found
            }
            None => {
                self.inner
                    .notifier
                    .warning("디스커버리 응답 없음 — 직접 연결을 시도합니다");
                PrinterIdentity::fallback(ip_address)
            }
        };
        if let Some(name) = &config.display_name_override {
            identity.display_name = name.clone();
        }

        // 상태/영상 채널 동시 시작
        let session_result = if config.video_enabled {
            let (session_result, video_result) = tokio::join!(
                PrinterSession::connect(
                    identity.clone(),
                    &config.status,
                    self.inner.notifier.clone()
                ),
                self.inner.decoder.connect(ip_address, &config.video)
            );
            if let Err(e) = video_result {
                // 영상 실패는 비치명 — 감독 루프가 재시도한다
                warn!("영상 채널 시작 실패 (재시도 예정): {e}");
            }
            session_result
        } else {
            PrinterSession::connect(identity.clone(), &config.status, self.inner.notifier.clone())
                .await
        };

        let session = match session_result {
            Ok(session) => Arc::new(session),
            Err(e) => {
                // 상태 채널 없이는 모니터링이 성립하지 않는다
                self.inner.decoder.disconnect().await;
                self.set_state(MonitorState::Error);
                return Err(e);
            }
        };

        *self.inner.session.write().await = Some(session);
        *self.inner.connection.write().await = Some(ConnectionContext {
            identity,
            config: config.clone(),
        });

        // 최근 프린터 목록 갱신 (실패해도 연결에는 영향 없음)
        let mut updated = config.clone();
        updated.push_recent_printer(ip_address);
        if let Err(e) = self.inner.provider.persist(updated) {
            warn!("최근 프린터 목록 저장 실패: {e}");
        }

        self.set_state(MonitorState::Connected);

        // 감독 루프 시작
        let handle = tokio::spawn(Inner::supervise(self.inner.clone()));
        *self.inner.supervisor.lock().await = Some(handle);

        Ok(())
    }

    /// 연결 해제.
    ///
    /// 양쪽 서브채널을 무조건 내리며, 어느 쪽이 이미 죽어 있어도
    /// 용인한다. 이후 같은 주소로 다시 연결할 수 있다.
    pub async fn disconnect(&self) {
        self.inner.user_disconnect.store(true, Ordering::Relaxed);
        if self.state() != MonitorState::Idle {
            self.set_state(MonitorState::Disconnecting);
        }

        if let Some(handle) = self.inner.supervisor.lock().await.take() {
            handle.abort();
        }
        if let Some(session) = self.inner.session.write().await.take() {
            session.disconnect().await;
        }
        self.inner.decoder.disconnect().await;
        *self.inner.connection.write().await = None;

        self.set_state(MonitorState::Idle);
        info!("프린터 연결 해제 완료");
    }

    fn set_state(&self, state: MonitorState) {
        self.inner.set_state(state);
    }
}

impl Inner {
    fn set_state(&self, state: MonitorState) {
        if *self.state_tx.borrow() != state {
            self.state_tx.send_replace(state);
            self.notifier.monitor_state_changed(state);
        }
    }

    /// 감독 루프.
    ///
    /// 주기적으로 두 서브채널 상태를 읽어 집계를 발행하고, 예기치 않은
    /// `Error` 채널을 제한 횟수 안에서 다시 붙인다.
    async fn supervise(inner: Arc<Inner>) {
        let mut status_attempts: u32 = 0;
        let mut video_attempts: u32 = 0;
        let mut status_abandoned = false;
        let mut video_abandoned = false;
        let mut ticker = tokio::time::interval(SUPERVISOR_TICK);

        loop {
            ticker.tick().await;
            if inner.user_disconnect.load(Ordering::Relaxed) {
                break;
            }
            let Some(context) = inner.connection.read().await.clone() else {
                break;
            };
            let retry = &context.config.retry;
            let video_enabled = context.config.video_enabled;

            let status_state = {
                let session = inner.session.read().await;
                session
                    .as_ref()
                    .map(|s| s.state())
                    .unwrap_or(ConnectionState::Error)
            };
            let video_state = inner.decoder.state();

            // 정상 관측 시 재시도 카운터 리셋
            if !status_state.is_error() {
                status_attempts = 0;
            }
            if !video_state.is_error() {
                video_attempts = 0;
            }

            inner.set_state(MonitorState::aggregate(
                status_state,
                video_state,
                video_enabled,
            ));

            // 상태 채널 재시도
            if status_state.is_error() && !status_abandoned {
                if status_attempts >= retry.max_attempts {
                    status_abandoned = true;
                    inner
                        .notifier
                        .warning("상태 채널 재시도 소진 — 지속 에러 상태입니다");
                    continue;
                }
                status_attempts += 1;
                info!(
                    "상태 채널 재연결 시도 {}/{}",
                    status_attempts, retry.max_attempts
                );
                retry_pause(retry).await;
                if inner.user_disconnect.load(Ordering::Relaxed) {
                    break;
                }
                match PrinterSession::connect(
                    context.identity.clone(),
                    &context.config.status,
                    inner.notifier.clone(),
                )
                .await
                {
                    Ok(session) => {
                        // 이전 세션 자원 정리 후 교체
                        if let Some(old) = inner.session.write().await.replace(Arc::new(session)) {
                            old.disconnect().await;
                        }
                        info!("상태 채널 재연결 성공");
                    }
                    Err(e) => debug!("상태 채널 재연결 실패: {e}"),
                }
            }

            // 영상 채널 재시도 (활성화된 경우만)
            if video_enabled && video_state.is_error() && !video_abandoned {
                if video_attempts >= retry.max_attempts {
                    video_abandoned = true;
                    inner
                        .notifier
                        .warning("영상 채널 재시도 소진 — 지속 에러 상태입니다");
                    continue;
                }
                video_attempts += 1;
                info!(
                    "영상 채널 재연결 시도 {}/{}",
                    video_attempts, retry.max_attempts
                );
                retry_pause(retry).await;
                if inner.user_disconnect.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = inner
                    .decoder
                    .connect(&context.identity.ip_address, &context.config.video)
                    .await
                {
                    debug!("영상 채널 재연결 실패: {e}");
                }
            }
        }
        debug!("감독 루프 종료");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dolbom_core::ports::notifier::NullNotifier;
    use dolbom_video::snapshot::FsSnapshotSink;

    struct FixedConfig(AppConfig);

    impl ConfigProvider for FixedConfig {
        fn snapshot(&self) -> AppConfig {
            self.0.clone()
        }
        fn persist(&self, _config: AppConfig) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn test_monitor(config: AppConfig) -> DeviceMonitor {
        DeviceMonitor::new(
            Arc::new(FixedConfig(config)),
            Arc::new(NullNotifier),
            Arc::new(FsSnapshotSink),
        )
    }

    #[tokio::test]
    async fn starts_idle_and_serves_placeholder() {
        let monitor = test_monitor(AppConfig::default());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(!monitor.latest_frame().is_live());
        assert!(monitor.latest_status().await.is_none());
    }

    #[tokio::test]
    async fn invalid_config_rejected_before_sockets() {
        let mut config = AppConfig::default();
        config.status.port = 0;
        let monitor = test_monitor(config);

        let result = monitor.connect("127.0.0.1").await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
        // 소켓을 연 적이 없으니 상태는 그대로
        assert_ne!(monitor.state(), MonitorState::Connected);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_tolerated() {
        let monitor = test_monitor(AppConfig::default());
        monitor.disconnect().await;
        monitor.disconnect().await;
        assert_eq!(monitor.state(), MonitorState::Idle);
    }
}
