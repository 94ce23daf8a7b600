//! # dolbom-sdcp
//!
//! SDCP 계열 상태 프로토콜 클라이언트.
//!
//! ## 구조
//!
//! - [`discovery`] — UDP 브로드캐스트 프린터 탐색
//! - [`codec`] — 펌웨어별 필드명/상태 코드를 정규화하는 순수 함수
//! - [`envelope`] — 메시지 봉투 타입과 토픽 분류
//! - [`session`] — WebSocket 상태 채널 (폴링 루프 + 푸시 수신)
//!
//! 느슨한 JSON은 [`codec`] 경계 안에서만 다루며, 세션 밖으로는 항상
//! 정규화된 [`dolbom_core::models::PrintStatus`] 스냅샷만 나간다.

pub mod codec;
pub mod discovery;
pub mod envelope;
pub mod session;
