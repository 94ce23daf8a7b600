//! 장치 모니터 통합 테스트.
//!
//! 모의 SDCP 장치를 상대로 집계 상태 머신, 서브채널 재시도,
//! 채널 독립성을 검증한다.

use dolbom_app::monitor::DeviceMonitor;
use dolbom_core::config::AppConfig;
use dolbom_core::error::CoreError;
use dolbom_core::models::connection::{ConnectionState, MonitorState, SubChannel};
use dolbom_core::models::status::PrintStatus;
use dolbom_core::ports::config_provider::ConfigProvider;
use dolbom_core::ports::notifier::MonitorNotifier;
use dolbom_video::snapshot::FsSnapshotSink;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// 고정 설정 제공자
struct FixedConfig(AppConfig);

impl ConfigProvider for FixedConfig {
    fn snapshot(&self) -> AppConfig {
        self.0.clone()
    }
    fn persist(&self, _config: AppConfig) -> Result<(), CoreError> {
        Ok(())
    }
}

/// 경고를 기록하는 노티파이어
#[derive(Default)]
struct RecordingNotifier {
    warnings: Mutex<Vec<String>>,
}

impl MonitorNotifier for RecordingNotifier {
    fn connection_changed(&self, _channel: SubChannel, _state: ConnectionState) {}
    fn monitor_state_changed(&self, _state: MonitorState) {}
    fn status_updated(&self, _status: &PrintStatus) {}
    fn frame_available(&self) {}
    fn warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

fn test_config(status_port: u16) -> AppConfig {
    let mut config = AppConfig::default();
    config.status.port = status_port;
    config.status.poll_interval_ms = 100;
    config.status.read_timeout_ms = 300;
    // 아무도 듣지 않는 디스커버리 포트 — 대체 식별자 경로로 진행
    config.discovery.probe_port = 59_999;
    config.discovery.listen_port = 0;
    config.discovery.timeout_ms = 100;
    config.video_enabled = false;
    config.retry.max_attempts = 2;
    config.retry.delay_ms = 100;
    config
}

fn build_monitor(config: AppConfig, notifier: Arc<dyn MonitorNotifier>) -> DeviceMonitor {
    DeviceMonitor::new(
        Arc::new(FixedConfig(config)),
        notifier,
        Arc::new(FsSnapshotSink),
    )
}

/// 모의 장치 — 모든 텍스트 요청에 진행률 푸시로 답한다.
/// `stop()`은 리스너와 살아 있는 연결을 모두 내린다.
struct MockDevice {
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MockDevice {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self::with_listener(listener, port)
    }

    async fn start_on(port: u16) -> Self {
        // 이전 장치 종료 직후 같은 포트를 되찾을 때까지 잠깐 재시도
        let listener = loop {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => break listener,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        };
        Self::with_listener(listener, port)
    }

    fn with_listener(listener: TcpListener, port: u16) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Self::accept_loop(listener, shutdown_rx));
        Self {
            port,
            shutdown_tx,
            handle,
        }
    }

    async fn accept_loop(listener: TcpListener, shutdown_rx: watch::Receiver<bool>) {
        loop {
            let mut accept_shutdown = shutdown_rx.clone();
            tokio::select! {
                _ = accept_shutdown.changed() => break,
                accepted = listener.accept() => {
                    let Ok((stream, _)) = accepted else { break };
                    tokio::spawn(Self::serve(stream, shutdown_rx.clone()));
                }
            }
        }
    }

    async fn serve(stream: tokio::net::TcpStream, mut shutdown_rx: watch::Receiver<bool>) {
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = ws.close(None).await;
                    break;
                }
                message = ws.next() => match message {
                    Some(Ok(Message::Text(_))) => {
                        let push = json!({
                            "Topic": "sdcp/status/ElegooPrinter",
                            "Data": {"Data": {"PrintInfo": {
                                "IsPrinting": true,
                                "CurrentLayer": 64,
                                "TotalLayer": 341
                            }}}
                        });
                        if ws.send(Message::text(push.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// 리스너와 살아 있는 연결을 전부 내린다
    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

#[tokio::test]
async fn connect_monitor_disconnect_cycle() {
    let device = MockDevice::start().await;
    let monitor = build_monitor(
        test_config(device.port),
        Arc::new(RecordingNotifier::default()),
    );

    monitor.connect("127.0.0.1").await.unwrap();
    assert_eq!(monitor.state(), MonitorState::Connected);

    // 디스커버리 무응답 → 대체 식별자
    let identity = monitor.identity().await.unwrap();
    assert_eq!(identity.id, "ElegooPrinter");
    assert_eq!(identity.ip_address, "127.0.0.1");

    // 폴 응답이 정규화되어 도착한다
    let mut status_rx = monitor.subscribe_status().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), status_rx.wait_for(|s| s.is_some()))
        .await
        .expect("상태가 제한 시간 안에 도착해야 함")
        .unwrap();
    let status = monitor.latest_status().await.unwrap();
    assert!(status.is_printing);
    assert_eq!(status.current_layer, 64);
    // 보고 진행률이 없으니 레이어에서 유도된다
    assert!((status.progress_percent - 64.0 / 341.0 * 100.0).abs() < 0.01);

    monitor.disconnect().await;
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert!(monitor.latest_status().await.is_none());

    device.stop();
}

#[tokio::test]
async fn dead_endpoint_connect_fails_with_error_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let monitor = build_monitor(test_config(port), Arc::new(RecordingNotifier::default()));
    let result = monitor.connect("127.0.0.1").await;

    assert!(matches!(result, Err(CoreError::Transport(_))));
    assert_eq!(monitor.state(), MonitorState::Error);

    // 실패한 뒤에도 해제와 재시작이 가능하다
    monitor.disconnect().await;
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[tokio::test]
async fn supervisor_reattaches_dropped_status_channel() {
    let device = MockDevice::start().await;
    let port = device.port;
    let monitor = build_monitor(test_config(port), Arc::new(RecordingNotifier::default()));

    monitor.connect("127.0.0.1").await.unwrap();
    let mut state_rx = monitor.subscribe_state();

    // 장치가 죽었다가 같은 포트로 되살아난다
    device.stop();
    let revived = MockDevice::start_on(port).await;

    // Error를 거쳐 다시 Connected로
    tokio::time::timeout(
        Duration::from_secs(10),
        state_rx.wait_for(|s| *s == MonitorState::Error),
    )
    .await
    .expect("채널 단절은 Error로 나타나야 함")
    .unwrap();

    tokio::time::timeout(
        Duration::from_secs(10),
        state_rx.wait_for(|s| *s == MonitorState::Connected),
    )
    .await
    .expect("감독 루프가 상태 채널을 다시 붙여야 함")
    .unwrap();

    monitor.disconnect().await;
    revived.stop();
}

#[tokio::test]
async fn exhausted_retries_surface_persistent_error() {
    let device = MockDevice::start().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = build_monitor(test_config(device.port), notifier.clone());

    monitor.connect("127.0.0.1").await.unwrap();

    // 장치를 완전히 내린다 — 재시도는 전부 실패해야 한다
    device.stop();

    let mut state_rx = monitor.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state_rx.wait_for(|s| *s == MonitorState::Error),
    )
    .await
    .expect("단절은 Error로 나타나야 함")
    .unwrap();

    // 제한 횟수 소진 후 지속 에러 경고
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let exhausted = notifier
            .warnings
            .lock()
            .unwrap()
            .iter()
            .any(|w| w.contains("재시도 소진"));
        if exhausted {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "지속 에러 경고가 제한 시간 안에 와야 함"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    monitor.disconnect().await;
}

#[tokio::test]
async fn video_failure_leaves_status_channel_untouched() {
    let device = MockDevice::start().await;
    let mut config = test_config(device.port);
    // 영상 활성 + 아무도 듣지 않는 RTSP 포트 → 영상 채널만 실패한다
    config.video_enabled = true;
    config.video.port = 59_998;
    let monitor = build_monitor(config, Arc::new(RecordingNotifier::default()));

    monitor.connect("127.0.0.1").await.unwrap();

    // 영상 실패가 집계에 반영될 때까지 대기 (ffmpeg 부재/접속 거부 어느 쪽이든)
    let mut state_rx = monitor.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(30),
        state_rx.wait_for(|s| *s == MonitorState::Error),
    )
    .await
    .expect("영상 채널 실패가 집계 Error로 나타나야 함")
    .unwrap();

    // 상태 루프는 독립적으로 계속 갱신된다
    let mut status_rx = monitor.subscribe_status().await.unwrap();
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), status_rx.changed())
            .await
            .expect("영상 에러 이후에도 상태 갱신이 계속돼야 함")
            .unwrap();
    }
    let status = monitor.latest_status().await.unwrap();
    assert!(status.is_printing);

    monitor.disconnect().await;
    device.stop();
}
