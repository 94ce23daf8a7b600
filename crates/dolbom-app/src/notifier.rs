//! 로그 기반 표시 레이어 콜백.
//!
//! GUI 셸이 없는 실행에서 연결 전이와 상태 갱신을 로그로 내보낸다.

use dolbom_core::models::connection::{ConnectionState, MonitorState, SubChannel};
use dolbom_core::models::status::PrintStatus;
use dolbom_core::ports::notifier::MonitorNotifier;
use tracing::{debug, info, trace, warn};

/// tracing으로 이벤트를 내보내는 노티파이어
pub struct LogNotifier;

impl MonitorNotifier for LogNotifier {
    fn connection_changed(&self, channel: SubChannel, state: ConnectionState) {
        info!("{channel} 채널 → {state}");
    }

    fn monitor_state_changed(&self, state: MonitorState) {
        info!("모니터 상태 → {state}");
    }

    fn status_updated(&self, status: &PrintStatus) {
        // 매초 오는 갱신이라 debug 레벨
        debug!(
            "상태: 출력={}, 진행률={:.1}%, 레이어={}/{}, 남은 시간={}",
            status.is_printing,
            status.progress_percent,
            status.current_layer,
            status.total_layer,
            status.format_remaining()
        );
    }

    fn frame_available(&self) {
        trace!("새 프레임");
    }

    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}
