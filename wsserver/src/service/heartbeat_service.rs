//! 하트비트 서비스
//!
//! 고정 간격으로 생존 스윕을 수행합니다. 애플리케이션 메시지와는
//! 독립적으로 동작하며, 생존 플래그가 꺼진 연결을 종료하고 나머지에는
//! Ping을 보낸 뒤 플래그를 지웁니다.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::service::ConnectionService;

/// 하트비트 통계
#[derive(Debug, Clone, Default)]
pub struct HeartbeatStats {
    pub total_sweeps: u64,
    pub total_closed: u64,
    /// 마지막 스윕 시간 (Unix timestamp)
    pub last_sweep_timestamp: Option<i64>,
}

/// 하트비트 서비스
pub struct HeartbeatService {
    connection_service: Arc<ConnectionService>,
    is_running: Arc<Mutex<bool>>,
    sweep_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    sweep_interval_secs: u64,
    heartbeat_stats: Arc<Mutex<HeartbeatStats>>,
}

impl HeartbeatService {
    /// 새로운 하트비트 서비스 생성
    pub fn new(connection_service: Arc<ConnectionService>, sweep_interval_secs: u64) -> Self {
        Self {
            connection_service,
            is_running: Arc::new(Mutex::new(false)),
            sweep_handle: Arc::new(Mutex::new(None)),
            sweep_interval_secs,
            heartbeat_stats: Arc::new(Mutex::new(HeartbeatStats::default())),
        }
    }

    /// 기본 설정으로 생성 (30초 간격)
    pub fn with_default_config(connection_service: Arc<ConnectionService>) -> Self {
        Self::new(connection_service, 30)
    }

    /// 하트비트 시스템 시작
    pub async fn start(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if *is_running {
            warn!("하트비트 시스템이 이미 실행 중입니다");
            return Ok(());
        }

        *is_running = true;
        drop(is_running);

        info!("🔄 하트비트 시스템 시작 ({}초 간격)", self.sweep_interval_secs);

        let connection_service = self.connection_service.clone();
        let is_running_ref = self.is_running.clone();
        let stats_ref = self.heartbeat_stats.clone();
        let interval_secs = self.sweep_interval_secs;

        let handle = tokio::spawn(async move {
            let mut sweep_interval = interval(Duration::from_secs(interval_secs));
            // 첫 틱은 즉시 발화하므로 건너뛴다
            sweep_interval.tick().await;

            while *is_running_ref.lock().await {
                sweep_interval.tick().await;

                let closed = connection_service.sweep_once().await;
                let current = connection_service.get_connection_count();

                {
                    let mut stats = stats_ref.lock().await;
                    stats.total_sweeps += 1;
                    stats.total_closed += closed as u64;
                    stats.last_sweep_timestamp = Some(chrono::Utc::now().timestamp());
                }

                if closed > 0 {
                    info!("하트비트 스윕: {}개 연결 종료 (활성: {}개)", closed, current);
                } else if current > 0 {
                    debug!("하트비트 스윕 완료 - 활성 연결: {}개", current);
                }
            }

            info!("하트비트 스윕 작업 종료");
        });

        *self.sweep_handle.lock().await = Some(handle);

        Ok(())
    }

    /// 하트비트 시스템 중지
    pub async fn stop(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if !*is_running {
            warn!("하트비트 시스템이 이미 중지되어 있습니다");
            return Ok(());
        }

        *is_running = false;
        drop(is_running);

        info!("🛑 하트비트 시스템 중지 중...");

        let mut handle_option = self.sweep_handle.lock().await;
        if let Some(handle) = handle_option.take() {
            handle.abort();
            debug!("하트비트 스윕 작업 핸들 종료됨");
        }

        info!("✅ 하트비트 시스템 중지 완료");
        Ok(())
    }

    /// 하트비트 시스템 실행 상태 확인
    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// 수동으로 스윕 수행 (테스트/관리용)
    pub async fn sweep_now(&self) -> usize {
        let closed = self.connection_service.sweep_once().await;

        let mut stats = self.heartbeat_stats.lock().await;
        stats.total_sweeps += 1;
        stats.total_closed += closed as u64;
        stats.last_sweep_timestamp = Some(chrono::Utc::now().timestamp());

        closed
    }

    /// 하트비트 통계 조회
    pub async fn get_heartbeat_stats(&self) -> HeartbeatStats {
        self.heartbeat_stats.lock().await.clone()
    }

    /// 하트비트 설정 조회
    pub fn get_config(&self) -> u64 {
        self.sweep_interval_secs
    }
}
