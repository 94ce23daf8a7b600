//! 프린터 상태 세션.
//!
//! 장치당 하나의 영속 WebSocket 채널을 소유하고 두 개의 루프를 돌린다:
//! 고정 간격으로 상태 질의를 보내는 폴링 루프와, 폴 응답/비요청 푸시를
//! 가리지 않고 받아 정규화하는 수신 루프. 요청은 fire-and-forget이며
//! 응답은 개별 요청이 아니라 세션에 매칭된다. 마지막에 도착한 정규화
//! 레코드가 최신 슬롯을 이긴다.
//!
//! 전송 실패 시 상태를 `Error`로 전이하고 멈출 뿐, 스스로 재연결하지
//! 않는다 — 재연결 정책은 오케스트레이터 소관.

use crate::codec;
use crate::envelope::{self, TopicKind};
use dolbom_core::config::StatusEndpointConfig;
use dolbom_core::error::CoreError;
use dolbom_core::models::connection::{ConnectionState, SubChannel};
use dolbom_core::models::printer::PrinterIdentity;
use dolbom_core::models::status::PrintStatus;
use dolbom_core::ports::notifier::MonitorNotifier;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// 상태 채널 WebSocket 경로
const WS_PATH: &str = "/websocket";

/// 채널 수립 제한 시간
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 프린터 상태 세션
pub struct PrinterSession {
    identity: PrinterIdentity,
    read_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    status_rx: watch::Receiver<Option<PrintStatus>>,
    shutdown_tx: watch::Sender<bool>,
    sink: Arc<Mutex<WsSink>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    notifier: Arc<dyn MonitorNotifier>,
}

impl PrinterSession {
    /// 상태 채널을 열고 폴링/수신 루프를 시작한다.
    ///
    /// 채널 수립에 실패하면 `CoreError::Transport` — 이 시도의 상태는
    /// `Error`로 끝나고, 재시도 여부는 호출자가 정한다.
    pub async fn connect(
        identity: PrinterIdentity,
        config: &StatusEndpointConfig,
        notifier: Arc<dyn MonitorNotifier>,
    ) -> Result<Self, CoreError> {
        let raw_url = format!("ws://{}:{}{}", identity.ip_address, config.port, WS_PATH);
        let url = url::Url::parse(&raw_url)
            .map_err(|e| CoreError::Config(format!("상태 엔드포인트 URL 오류: {raw_url}: {e}")))?;

        info!("상태 채널 연결: {url}");
        notifier.connection_changed(SubChannel::Status, ConnectionState::Connecting);

        let connected = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await;
        let (ws_stream, _) = match connected {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                notifier.connection_changed(SubChannel::Status, ConnectionState::Error);
                return Err(CoreError::Transport(format!("상태 채널 수립 실패: {e}")));
            }
            Err(_) => {
                notifier.connection_changed(SubChannel::Status, ConnectionState::Error);
                return Err(CoreError::Transport(format!(
                    "상태 채널 수립 타임아웃 ({}초)",
                    CONNECT_TIMEOUT.as_secs()
                )));
            }
        };

        let (sink, source) = ws_stream.split();
        let sink = Arc::new(Mutex::new(sink));

        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        let (status_tx, status_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let read_task = tokio::spawn(Self::read_loop(
            source,
            status_tx,
            state_tx.clone(),
            shutdown_rx.clone(),
            notifier.clone(),
        ));
        let poll_task = tokio::spawn(Self::poll_loop(
            sink.clone(),
            identity.id.clone(),
            config.poll_interval(),
            state_tx.clone(),
            shutdown_rx,
            notifier.clone(),
        ));

        notifier.connection_changed(SubChannel::Status, ConnectionState::Connected);
        info!("상태 채널 연결됨: {} ({})", identity.display_name, identity.ip_address);

        Ok(Self {
            identity,
            read_timeout: config.read_timeout(),
            state_tx,
            status_rx,
            shutdown_tx,
            sink,
            tasks: Mutex::new(vec![read_task, poll_task]),
            notifier,
        })
    }

    /// 연결된 프린터 식별 정보
    pub fn identity(&self) -> &PrinterIdentity {
        &self.identity
    }

    /// 현재 채널 상태
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// 채널 상태 변경 수신기
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// 최신 정규화 상태 (아직 수신 전이면 None)
    pub fn latest_status(&self) -> Option<PrintStatus> {
        self.status_rx.borrow().clone()
    }

    /// 새 상태 발행 때마다 깨어나는 수신기
    pub fn subscribe_status(&self) -> watch::Receiver<Option<PrintStatus>> {
        self.status_rx.clone()
    }

    /// 채널 해제.
    ///
    /// 루프들은 한 수신 타임아웃 간격 안에 해제를 관측하고 소켓을
    /// 놓는다. 이미 내려간 채널에 불러도 무해하다.
    pub async fn disconnect(&self) {
        info!("상태 채널 해제: {}", self.identity.ip_address);
        let _ = self.shutdown_tx.send(true);

        // Close 프레임은 최선 노력 — 이미 끊긴 채널이면 무시
        {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(self.read_timeout, task).await.is_err() {
                abort.abort();
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.notifier
            .connection_changed(SubChannel::Status, ConnectionState::Disconnected);
    }

    /// 수신 루프 — 폴 응답과 푸시를 같은 경로로 정규화해 발행.
    async fn read_loop(
        mut source: WsSource,
        status_tx: watch::Sender<Option<PrintStatus>>,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        notifier: Arc<dyn MonitorNotifier>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(status) = Self::handle_message(&text) {
                            debug!(
                                "상태 갱신: 출력={}, 진행률={:.1}%, 레이어={}/{}",
                                status.is_printing,
                                status.progress_percent,
                                status.current_layer,
                                status.total_layer
                            );
                            status_tx.send_replace(Some(status.clone()));
                            notifier.status_updated(&status);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        Self::publish_error(&state_tx, &shutdown_rx, &notifier, "원격 종료");
                        break;
                    }
                    // ping/pong은 라이브러리가 처리
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        Self::publish_error(&state_tx, &shutdown_rx, &notifier, &e.to_string());
                        break;
                    }
                },
            }
        }
        debug!("상태 수신 루프 종료");
    }

    /// 폴링 루프 — 고정 간격 fire-and-forget 상태 질의.
    async fn poll_loop(
        sink: Arc<Mutex<WsSink>>,
        device_id: String,
        interval: Duration,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        notifier: Arc<dyn MonitorNotifier>,
    ) {
        let mut state_rx = state_tx.subscribe();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = state_rx.changed() => {
                    if state_rx.borrow().is_error() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let request = envelope::status_request(&device_id);
                    let payload = match serde_json::to_string(&request) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("상태 질의 직렬화 실패, 이번 틱 건너뜀: {e}");
                            continue;
                        }
                    };
                    let mut guard = sink.lock().await;
                    if let Err(e) = guard.send(Message::text(payload)).await {
                        Self::publish_error(&state_tx, &shutdown_rx, &notifier, &e.to_string());
                        break;
                    }
                }
            }
        }
        debug!("상태 폴링 루프 종료");
    }

    /// 수신 메시지 한 건 처리.
    ///
    /// 깨진 JSON, 모르는 토픽, 쓸 데 없는 페이로드는 로그만 남기고
    /// 버린다 — 채널은 계속 산다.
    fn handle_message(text: &str) -> Option<PrintStatus> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("잘못된 메시지 드롭: {e}");
                return None;
            }
        };

        let kind = value
            .get("Topic")
            .and_then(Value::as_str)
            .map(envelope::classify_topic);

        match kind {
            Some(TopicKind::Response) | Some(TopicKind::Status) => {
                let fields = codec::extract_status_fields(&value)?;
                Some(codec::normalize_status(&fields))
            }
            Some(TopicKind::Notice) => {
                debug!("notice 수신");
                None
            }
            Some(TopicKind::Error) => {
                debug!("장치 에러 메시지 수신");
                None
            }
            Some(TopicKind::Unknown) => {
                debug!("알 수 없는 토픽, 드롭");
                None
            }
            // 토픽이 없어도 상태 필드가 보이면 최선 노력으로 파싱
            None => codec::extract_status_fields(&value).map(|fields| codec::normalize_status(&fields)),
        }
    }

    /// 전송 에러 발행 (사용자 해제 중이면 무시).
    fn publish_error(
        state_tx: &watch::Sender<ConnectionState>,
        shutdown_rx: &watch::Receiver<bool>,
        notifier: &Arc<dyn MonitorNotifier>,
        reason: &str,
    ) {
        if *shutdown_rx.borrow() {
            return;
        }
        warn!("상태 채널 전송 에러: {reason}");
        if !state_tx.borrow().is_error() {
            state_tx.send_replace(ConnectionState::Error);
            notifier.connection_changed(SubChannel::Status, ConnectionState::Error);
        }
    }
}

impl Drop for PrinterSession {
    fn drop(&mut self) {
        // disconnect 없이 떨어져도 루프는 해제 신호를 보고 소켓을 놓는다
        let _ = self.shutdown_tx.send(true);
    }
}
