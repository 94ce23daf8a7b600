//! 모의 SDCP 장치를 상대로 한 세션 통합 테스트.
//!
//! 실제 WebSocket 핸드셰이크 위에서 폴링 질의의 와이어 형태,
//! 푸시/응답 정규화, 해제와 전송 에러 전이를 검증한다.

use dolbom_core::config::StatusEndpointConfig;
use dolbom_core::models::connection::ConnectionState;
use dolbom_core::models::printer::PrinterIdentity;
use dolbom_core::ports::notifier::NullNotifier;
use dolbom_sdcp::session::PrinterSession;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn test_config(port: u16) -> StatusEndpointConfig {
    StatusEndpointConfig {
        port,
        poll_interval_ms: 100,
        read_timeout_ms: 500,
    }
}

fn test_identity() -> PrinterIdentity {
    PrinterIdentity {
        id: "12345".to_string(),
        display_name: "My Mars".to_string(),
        ip_address: "127.0.0.1".to_string(),
        model: "Mars 3 Pro".to_string(),
        firmware_version: "V4.5.3".to_string(),
        connection_kind: "ElegooPrinterAPI".to_string(),
    }
}

#[tokio::test]
async fn poll_request_shape_and_reply_publication() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // 첫 상태 질의의 와이어 형태 검증 후 응답
        while let Some(message) = ws.next().await {
            let message = message.unwrap();
            if let Message::Text(text) = message {
                let request: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(request["Topic"], "sdcp/request/12345");
                assert_eq!(request["Data"]["Cmd"], 255);
                assert_eq!(request["Data"]["MainboardID"], "12345");
                assert_eq!(request["Data"]["From"], 0);
                assert!(!request["Data"]["RequestID"].as_str().unwrap().is_empty());

                let reply = json!({
                    "Topic": "sdcp/response/12345",
                    "Data": {"Data": {
                        "PrintInfo": {
                            "IsPrinting": true,
                            "CurrentLayer": 64,
                            "TotalLayer": 341,
                            "Progress": 18.8,
                            "FileName": "benchy.goo"
                        },
                        "Temperature": {"UVTemp": 41.5}
                    }}
                });
                ws.send(Message::text(reply.to_string())).await.unwrap();
                break;
            }
        }
        // 클라이언트가 끊을 때까지 채널 유지
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    let session = PrinterSession::connect(test_identity(), &test_config(port), Arc::new(NullNotifier))
        .await
        .unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);

    let mut status_rx = session.subscribe_status();
    tokio::time::timeout(Duration::from_secs(3), status_rx.wait_for(|s| s.is_some()))
        .await
        .expect("폴 응답이 제한 시간 안에 발행돼야 함")
        .unwrap();

    let status = session.latest_status().unwrap();
    assert!(status.is_printing);
    assert_eq!(status.current_layer, 64);
    assert_eq!(status.total_layer, 341);
    assert_eq!(status.progress_percent, 18.8);
    assert_eq!(status.task_name, "benchy.goo");
    assert_eq!(status.uv_temperature, Some(41.5));

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn unsolicited_push_updates_latest_slot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // 요청을 기다리지 않는 푸시 두 건 — 마지막 것이 이겨야 한다
        for progress in [10.0, 55.0] {
            let push = json!({
                "Topic": "sdcp/status/12345",
                "Data": {"Data": {"PrintInfo": {"IsPrinting": true, "Progress": progress}}}
            });
            ws.send(Message::text(push.to_string())).await.unwrap();
        }
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    let session = PrinterSession::connect(test_identity(), &test_config(port), Arc::new(NullNotifier))
        .await
        .unwrap();

    let mut status_rx = session.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(3),
        status_rx.wait_for(|s| {
            s.as_ref()
                .map(|status| status.progress_percent == 55.0)
                .unwrap_or(false)
        }),
    )
    .await
    .expect("마지막 푸시가 최신 슬롯에 남아야 함")
    .unwrap();

    session.disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_inbound_does_not_kill_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // 깨진 JSON → 이어서 정상 상태
        ws.send(Message::text("{이건 JSON이 아님")).await.unwrap();
        let push = json!({
            "Topic": "sdcp/status/12345",
            "Data": {"Data": {"PrintInfo": {"Progress": 77.0}}}
        });
        ws.send(Message::text(push.to_string())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    let session = PrinterSession::connect(test_identity(), &test_config(port), Arc::new(NullNotifier))
        .await
        .unwrap();

    let mut status_rx = session.subscribe_status();
    tokio::time::timeout(Duration::from_secs(3), status_rx.wait_for(|s| s.is_some()))
        .await
        .expect("깨진 메시지 뒤의 정상 상태가 발행돼야 함")
        .unwrap();

    // 채널은 여전히 살아 있다
    assert_eq!(session.state(), ConnectionState::Connected);

    session.disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn remote_close_transitions_to_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        // 곧바로 연결을 떨어뜨린다
        drop(ws);
    });

    let session = PrinterSession::connect(test_identity(), &test_config(port), Arc::new(NullNotifier))
        .await
        .unwrap();

    let mut state_rx = session.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(3),
        state_rx.wait_for(|state| state.is_error()),
    )
    .await
    .expect("원격 종료는 Error 전이로 나타나야 함")
    .unwrap();

    // 세션은 스스로 재연결하지 않는다
    assert_eq!(session.state(), ConnectionState::Error);

    session.disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn repeated_connect_disconnect_releases_sockets() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                if let Ok(mut ws) = accept_async(stream).await {
                    while let Some(Ok(message)) = ws.next().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                }
            });
        }
    });

    // 같은 주소로 100회 재연결 — 소켓 고갈 없이 매번 성공해야 한다
    for _ in 0..100 {
        let session =
            PrinterSession::connect(test_identity(), &test_config(port), Arc::new(NullNotifier))
                .await
                .expect("재연결은 리소스 고갈 없이 성공해야 함");
        session.disconnect().await;
    }

    server.abort();
}

#[tokio::test]
async fn connect_to_dead_endpoint_is_transport_error() {
    // 아무도 듣지 않는 포트
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result =
        PrinterSession::connect(test_identity(), &test_config(port), Arc::new(NullNotifier)).await;
    assert!(matches!(
        result,
        Err(dolbom_core::error::CoreError::Transport(_))
    ));
}
