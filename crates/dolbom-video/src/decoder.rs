//! RTSP 프레임 디코더.
//!
//! 영상 전송 연결 하나를 소유한다. 스트림 소비는 감독되는 ffmpeg 자식
//! 프로세스가 맡고(설정된 전송 방식으로 RTSP 수신, stdout으로 MJPEG
//! 재다중화), 디코드 루프가 JPEG 경계로 잘라 최신 프레임 슬롯을
//! 갱신한다. 슬롯은 깊이 1 — 라이브 모니터에는 신선함이 완전함을
//! 이기므로 오래된 프레임은 큐잉 없이 버린다.
//!
//! 스트림 중간의 읽기/디코드 실패는 상태를 `Error`로 전이하고 루프를
//! 멈춘다. 연결된 척 굳은 프레임을 계속 내보내는 일은 없다 — 소비자는
//! 이 상태 전이에 의존해 "끊김"을 표시한다.

use crate::mjpeg::MjpegSplitter;
use crate::placeholder;
use crate::snapshot;
use dolbom_core::config::VideoConfig;
use dolbom_core::error::CoreError;
use dolbom_core::models::connection::{ConnectionState, SubChannel};
use dolbom_core::models::frame::{Frame, FrameKind};
use dolbom_core::ports::notifier::MonitorNotifier;
use dolbom_core::ports::snapshot_sink::SnapshotSink;
use image::ImageFormat;
use parking_lot::RwLock;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 스트림 실행 파일
const FFMPEG_BIN: &str = "ffmpeg";

/// 읽기 한 번의 최대 대기 — 이 간격 안에 해제/정체가 관측된다
const READ_STALL_TIMEOUT: Duration = Duration::from_secs(10);

/// 해제 시 루프 종료 대기
const DISCONNECT_WAIT: Duration = Duration::from_secs(2);

/// 한 번에 읽는 스트림 청크 크기
const READ_CHUNK_SIZE: usize = 32 * 1024;

/// 활성 스트림 핸들 (연결당 하나)
struct ActiveStream {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// 프레임 디코더
pub struct FrameDecoder {
    state_tx: watch::Sender<ConnectionState>,
    enabled: Arc<AtomicBool>,
    latest: Arc<RwLock<Option<Frame>>>,
    active: Mutex<Option<ActiveStream>>,
    sink: Arc<dyn SnapshotSink>,
    notifier: Arc<dyn MonitorNotifier>,
}

impl FrameDecoder {
    /// 새 디코더 생성 (연결 전 상태)
    pub fn new(notifier: Arc<dyn MonitorNotifier>, sink: Arc<dyn SnapshotSink>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx,
            enabled: Arc::new(AtomicBool::new(true)),
            latest: Arc::new(RwLock::new(None)),
            active: Mutex::new(None),
            sink,
            notifier,
        }
    }

    /// 현재 채널 상태
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// 채널 상태 변경 수신기
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// 디코드 일시정지/재개.
    ///
    /// 정지 중에는 디코드 작업을 멈추고(바이트는 소비하되 프레임을
    /// 만들지 않음) `latest_frame()`이 고정 일시정지 카드를 돌려준다.
    /// 상태 채널에는 아무 영향이 없다.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            info!("영상 디코드 {}", if enabled { "재개" } else { "일시정지" });
        }
    }

    /// 디코드 활성 여부
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// 최신 프레임 반환 — 항상 프레임 하나를 돌려준다.
    ///
    /// 연결 전/해제/에러 상태에서는 생성 카드를, 일시정지 중에는
    /// 내용이 변하지 않는 일시정지 카드를 반환하며, 블로킹하지 않는다.
    pub fn latest_frame(&self) -> Frame {
        if !self.is_enabled() {
            return placeholder::paused_card();
        }
        match self.state() {
            ConnectionState::Connected => self
                .latest
                .read()
                .clone()
                .unwrap_or_else(placeholder::connecting_card),
            ConnectionState::Connecting => placeholder::connecting_card(),
            ConnectionState::Disconnected | ConnectionState::Error => {
                placeholder::no_connection_card()
            }
        }
    }

    /// 스트림 연결 및 디코드 루프 시작.
    ///
    /// 설정은 이 연결이 사는 동안 읽기 전용 스냅샷이다 — 전송 방식이나
    /// 경로를 바꾸려면 끊고 다시 연결한다.
    pub async fn connect(&self, ip_address: &str, config: &VideoConfig) -> Result<(), CoreError> {
        // 남아 있는 이전 스트림 정리 (재시도 경로)
        self.teardown().await;

        let url = config.stream_url(ip_address);
        info!(
            "영상 스트림 연결: {url} (전송: {})",
            config.transport.as_str()
        );

        self.publish_state(ConnectionState::Connecting);
        *self.latest.write() = None;

        let mut child = Command::new(FFMPEG_BIN)
            .args([
                "-nostdin",
                "-loglevel",
                "error",
                "-rtsp_transport",
                config.transport.as_str(),
                "-i",
                &url,
                "-an",
                "-f",
                "mjpeg",
                "-q:v",
                "5",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.publish_state(ConnectionState::Error);
                CoreError::Transport(format!("{FFMPEG_BIN} 실행 실패: {e}"))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            self.publish_state(ConnectionState::Error);
            CoreError::Transport("스트림 stdout 파이프 없음".to_string())
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Self::decode_loop(
            child,
            stdout,
            self.latest.clone(),
            self.enabled.clone(),
            self.state_tx.clone(),
            shutdown_rx,
            self.notifier.clone(),
        ));

        *self.active.lock().await = Some(ActiveStream { shutdown_tx, task });
        Ok(())
    }

    /// 스트림 해제.
    ///
    /// 루프는 한 읽기 타임아웃 간격 안에 해제를 관측하고 자식 프로세스와
    /// 소켓을 놓는다. 이미 내려간 채널에 불러도 무해하다.
    pub async fn disconnect(&self) {
        self.teardown().await;
        *self.latest.write() = None;
        if self.state() != ConnectionState::Disconnected {
            self.publish_state(ConnectionState::Disconnected);
        }
    }

    /// 현재 라이브 프레임을 JPEG로 저장.
    ///
    /// 현재 프레임의 유계 동기 읽기다 — 재연결을 유발하지 않으며,
    /// 아직 프레임이 없으면 저장 경로 문제와 구별되는 에러를 낸다.
    pub async fn take_snapshot(&self, path: &Path, with_timestamp: bool) -> Result<(), CoreError> {
        let frame = self
            .latest
            .read()
            .clone()
            .ok_or_else(|| CoreError::Snapshot("아직 사용 가능한 프레임 없음".to_string()))?;

        let timestamp = with_timestamp.then(chrono::Local::now);
        let encoded = snapshot::encode_snapshot(&frame, timestamp)?;
        self.sink.write(path, &encoded).await
    }

    /// 활성 스트림 종료 (있으면)
    async fn teardown(&self) {
        let Some(stream) = self.active.lock().await.take() else {
            return;
        };
        let _ = stream.shutdown_tx.send(true);
        let abort = stream.task.abort_handle();
        if tokio::time::timeout(DISCONNECT_WAIT, stream.task)
            .await
            .is_err()
        {
            abort.abort();
        }
    }

    /// 상태 발행 + 알림
    fn publish_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            self.state_tx.send_replace(state);
            self.notifier.connection_changed(SubChannel::Video, state);
        }
    }

    /// 디코드 루프 본체.
    async fn decode_loop(
        mut child: Child,
        stdout: ChildStdout,
        latest: Arc<RwLock<Option<Frame>>>,
        enabled: Arc<AtomicBool>,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        notifier: Arc<dyn MonitorNotifier>,
    ) {
        let mut reader = tokio::io::BufReader::new(stdout);
        let mut splitter = MjpegSplitter::new();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut connected = false;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                read = tokio::time::timeout(READ_STALL_TIMEOUT, reader.read(&mut buf)) => {
                    match read {
                        Err(_) => {
                            Self::loop_error(&state_tx, &shutdown_rx, &notifier, "스트림 정체 (수신 타임아웃)");
                            break;
                        }
                        Ok(Err(e)) => {
                            Self::loop_error(&state_tx, &shutdown_rx, &notifier, &e.to_string());
                            break;
                        }
                        Ok(Ok(0)) => {
                            Self::loop_error(&state_tx, &shutdown_rx, &notifier, "스트림 종료");
                            break;
                        }
                        Ok(Ok(n)) => {
                            let frames = splitter.push(&buf[..n]);
                            // 일시정지: 바이트만 소비하고 디코드는 생략
                            if !enabled.load(Ordering::Relaxed) {
                                continue;
                            }
                            // 최신 프레임만 디코드 — 이전 것은 버린다
                            let Some(jpeg) = frames.into_iter().last() else {
                                continue;
                            };
                            match image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg) {
                                Ok(decoded) => {
                                    let rgb = decoded.to_rgb8();
                                    let (width, height) = rgb.dimensions();
                                    let Some(frame) =
                                        Frame::new_rgb8(width, height, FrameKind::Live, rgb.into_raw())
                                    else {
                                        continue;
                                    };
                                    *latest.write() = Some(frame);
                                    if !connected {
                                        connected = true;
                                        info!("영상 스트림 수신 시작 ({width}x{height})");
                                        state_tx.send_replace(ConnectionState::Connected);
                                        notifier.connection_changed(
                                            SubChannel::Video,
                                            ConnectionState::Connected,
                                        );
                                    }
                                    notifier.frame_available();
                                }
                                Err(e) => {
                                    Self::loop_error(
                                        &state_tx,
                                        &shutdown_rx,
                                        &notifier,
                                        &format!("프레임 디코드 실패: {e}"),
                                    );
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        let _ = child.kill().await;
        debug!("영상 디코드 루프 종료");
    }

    /// 루프 내 전송 에러 발행 (사용자 해제 중이면 무시)
    fn loop_error(
        state_tx: &watch::Sender<ConnectionState>,
        shutdown_rx: &watch::Receiver<bool>,
        notifier: &Arc<dyn MonitorNotifier>,
        reason: &str,
    ) {
        if *shutdown_rx.borrow() {
            return;
        }
        warn!("영상 채널 전송 에러: {reason}");
        if !state_tx.borrow().is_error() {
            state_tx.send_replace(ConnectionState::Error);
            notifier.connection_changed(SubChannel::Video, ConnectionState::Error);
        }
    }
}
