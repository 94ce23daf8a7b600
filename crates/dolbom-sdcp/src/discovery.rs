//! UDP 브로드캐스트 프린터 탐색.
//!
//! 고정 프로브를 브로드캐스트로 쏘고, 제한 시간 동안 응답 데이터그램을
//! 수집한다. 응답은 `id|name|ip|model|firmware[|kind]` 파이프 구분
//! 텍스트 레코드다. 소켓 에러(브로드캐스트 불가 등)는 빈 결과 + 경고로
//! 강등된다 — 디스커버리가 실패해도 직접 IP 연결은 항상 가능해야 한다.

use dolbom_core::config::DiscoveryConfig;
use dolbom_core::error::CoreError;
use dolbom_core::models::printer::PrinterIdentity;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// 디스커버리 프로브 페이로드 (고정 리터럴)
const DISCOVERY_PROBE: &[u8] = b"M99999";

/// 응답 데이터그램 최대 크기
const REPLY_BUFFER_SIZE: usize = 8_192;

/// `kind` 필드가 생략된 응답의 기본 연결 태그
const DEFAULT_CONNECTION_KIND: &str = "ElegooPrinterAPI";

/// 디스커버리 클라이언트
pub struct DiscoveryClient {
    config: DiscoveryConfig,
}

impl DiscoveryClient {
    /// 새 디스커버리 클라이언트 생성
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// 로컬 네트워크 브로드캐스트 탐색.
    ///
    /// 제한 시간을 넘겨 블로킹하지 않으며, 절대 에러를 내지 않는다 —
    /// 응답이 없으면 빈 목록, 소켓 에러면 빈 목록 + 경고 로그.
    pub async fn discover(&self) -> Vec<PrinterIdentity> {
        match self.run(None).await {
            Ok(printers) => printers,
            Err(e) => {
                warn!("디스커버리 불가, 빈 결과로 계속: {e}");
                Vec::new()
            }
        }
    }

    /// 알고 있는 호스트 하나에 유니캐스트 프로브.
    ///
    /// 직접 IP 연결 전에 장치 식별자를 얻는 최선 노력 경로.
    pub async fn probe_host(&self, ip_address: &str) -> Option<PrinterIdentity> {
        match self.run(Some(ip_address)).await {
            Ok(printers) => printers.into_iter().next(),
            Err(e) => {
                warn!("{ip_address} 프로브 실패: {e}");
                None
            }
        }
    }

    /// 프로브 송신 + 응답 수집 본체.
    async fn run(&self, target: Option<&str>) -> Result<Vec<PrinterIdentity>, CoreError> {
        let socket = self.bind_socket().await?;
        socket
            .set_broadcast(true)
            .map_err(|e| CoreError::Discovery(format!("브로드캐스트 설정 실패: {e}")))?;

        let destination: (Ipv4Addr, u16) = match target {
            Some(ip) => (
                ip.parse()
                    .map_err(|_| CoreError::Discovery(format!("잘못된 IP: {ip}")))?,
                self.config.probe_port,
            ),
            None => (Ipv4Addr::BROADCAST, self.config.probe_port),
        };

        socket
            .send_to(DISCOVERY_PROBE, destination)
            .await
            .map_err(|e| CoreError::Discovery(format!("프로브 송신 실패: {e}")))?;
        debug!("디스커버리 프로브 송신: {}:{}", destination.0, destination.1);

        // 제한 시간까지 응답 수집, 같은 id는 가장 최근 레코드 유지
        let deadline = Instant::now() + self.config.timeout();
        let mut found: Vec<PrinterIdentity> = Vec::new();
        let mut index_by_id: HashMap<String, usize> = HashMap::new();
        let mut buf = [0u8; REPLY_BUFFER_SIZE];

        loop {
            let reply = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, peer))) => {
                    debug!("디스커버리 응답 수신: {peer} ({len}바이트)");
                    parse_reply(&buf[..len])
                }
                Ok(Err(e)) => {
                    warn!("디스커버리 수신 에러, 수집 종료: {e}");
                    break;
                }
                // 제한 시간 도달 — 정상 종료
                Err(_) => break,
            };

            if let Some(identity) = reply {
                match index_by_id.get(&identity.id) {
                    Some(&slot) => found[slot] = identity,
                    None => {
                        index_by_id.insert(identity.id.clone(), found.len());
                        found.push(identity);
                    }
                }
            }
        }

        Ok(found)
    }

    /// 응답 대기 소켓 바인드.
    ///
    /// 설정된 포트가 점유 중이면 임시 포트로 물러난다.
    async fn bind_socket(&self) -> Result<UdpSocket, CoreError> {
        match UdpSocket::bind(("0.0.0.0", self.config.listen_port)).await {
            Ok(socket) => Ok(socket),
            Err(e) => {
                warn!(
                    "포트 {} 바인드 실패({e}), 임시 포트 사용",
                    self.config.listen_port
                );
                UdpSocket::bind(("0.0.0.0", 0))
                    .await
                    .map_err(|e| CoreError::Discovery(format!("소켓 바인드 실패: {e}")))
            }
        }
    }
}

/// 응답 데이터그램 파싱.
///
/// 필드 수가 5~6이 아니거나 id가 비어 있으면 버린다 (치명적 아님).
pub fn parse_reply(data: &[u8]) -> Option<PrinterIdentity> {
    let text = std::str::from_utf8(data).ok()?.trim();
    let parts: Vec<&str> = text.split('|').collect();
    if parts.len() < 5 || parts.len() > 6 {
        debug!("잘못된 디스커버리 레코드 (필드 {}개), 드롭", parts.len());
        return None;
    }
    if parts[0].is_empty() {
        debug!("빈 id의 디스커버리 레코드, 드롭");
        return None;
    }

    Some(PrinterIdentity {
        id: parts[0].to_string(),
        display_name: parts[1].to_string(),
        ip_address: parts[2].to_string(),
        model: parts[3].to_string(),
        firmware_version: parts[4].to_string(),
        connection_kind: parts
            .get(5)
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| DEFAULT_CONNECTION_KIND.to_string()),
    })
}
