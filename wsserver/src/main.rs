//! 실시간 방 동기화 WebSocket 서버 - 진입점
//!
//! 하나의 지속 연결 위에서 게임 세션과 음성 세션을 다중화합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use shared::service::{InMemoryScoreRepository, ScoreRepository, SessionService};

mod config;
mod handler;
mod protocol;
mod service;
mod tool;

use config::{validate_config, WsServerConfig};
use handler::game_handler::GameConfig;
use handler::{ConnectionHandler, GameSyncHandler, MessageDispatcher, VoiceChatHandler};
use service::{BroadcastService, ConnectionService, HeartbeatService};

/// WebSocket 동기화 서버
pub struct WsServer {
    connection_service: Arc<ConnectionService>,
    heartbeat_service: Arc<HeartbeatService>,
    connection_handler: Arc<ConnectionHandler>,
    is_running: Arc<Mutex<bool>>,
}

impl WsServer {
    /// 새로운 서버 생성
    ///
    /// 서비스와 핸들러를 조립합니다. 점수 영속화는 기본 인메모리
    /// 구현체를 사용하며, 외부 저장소 구현체로 교체할 수 있습니다.
    pub fn new(config: &WsServerConfig) -> Self {
        let score_repository: Arc<dyn ScoreRepository> = Arc::new(InMemoryScoreRepository::new());

        let connection_service = Arc::new(ConnectionService::new(config.max_connections));
        let heartbeat_service = Arc::new(HeartbeatService::new(
            connection_service.clone(),
            config.heartbeat_interval_secs,
        ));
        let broadcast_service = Arc::new(BroadcastService::new(connection_service.clone()));
        let session_service = Arc::new(SessionService::new());

        let game_handler = Arc::new(GameSyncHandler::new(
            connection_service.clone(),
            broadcast_service.clone(),
            score_repository,
            GameConfig {
                game_duration_secs: config.game_duration_secs,
                explosion_radius: config.explosion_radius,
                explosion_damage: config.explosion_damage,
                ..GameConfig::default()
            },
        ));
        let voice_handler = Arc::new(VoiceChatHandler::new(
            connection_service.clone(),
            broadcast_service,
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            connection_service.clone(),
            session_service.clone(),
            game_handler.clone(),
            voice_handler.clone(),
        ));
        let connection_handler = Arc::new(ConnectionHandler::new(
            connection_service.clone(),
            session_service,
            game_handler,
            voice_handler,
            dispatcher,
        ));

        Self {
            connection_service,
            heartbeat_service,
            connection_handler,
            is_running: Arc::new(Mutex::new(false)),
        }
    }

    /// 서버 시작
    pub async fn start(&self, bind_addr: &str) -> Result<()> {
        info!("🚀 WebSocket 서버 시작 중... ({})", bind_addr);

        let listener = TcpListener::bind(bind_addr)
            .await
            .context("WebSocket 리스너 바인드 실패")?;

        info!("✅ WebSocket 서버가 {}에서 실행 중입니다", bind_addr);

        *self.is_running.lock().await = true;

        // 하트비트 시스템 시작
        self.heartbeat_service.start().await?;

        // 클라이언트 연결 처리 루프
        while *self.is_running.lock().await {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("새 사용자 연결: {}", addr);
                    let connection_handler = self.connection_handler.clone();

                    tokio::spawn(async move {
                        if let Err(e) = connection_handler
                            .handle_new_connection(stream, addr.to_string())
                            .await
                        {
                            error!("사용자 연결 처리 오류: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("사용자 연결 수락 실패: {}", e);
                }
            }
        }

        Ok(())
    }

    /// 서버 중지
    pub async fn stop(&self) -> Result<()> {
        info!("🛑 WebSocket 서버 중지 중...");

        *self.is_running.lock().await = false;

        // 하트비트 시스템 중지
        self.heartbeat_service.stop().await?;

        info!(
            "✅ WebSocket 서버가 중지되었습니다 (잔여 연결: {}개)",
            self.connection_service.get_connection_count()
        );
        Ok(())
    }
}

/// WebSocket 서버 메인 진입점
///
/// 환경변수:
/// - ws_host: 서버 호스트 (기본값: "127.0.0.1")
/// - ws_port: 서버 포트 (기본값: "5000")
/// - ws_max_connections: 최대 동시 연결 수 (기본값: "1000")
/// - ws_heartbeat_interval_secs: 생존 스윕 간격 (기본값: "30")
/// - game_duration_secs: 게임 제한 시간 (기본값: "300")
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드
    let config = WsServerConfig::from_env()?;

    // 설정 검증
    validate_config(&config)?;

    info!("=== WebSocket 동기화 서버 설정 ===");
    info!("바인드 주소: {}", config.bind_address());
    info!("최대 연결 수: {}", config.max_connections);
    info!("하트비트 간격: {}초", config.heartbeat_interval_secs);
    info!("게임 제한 시간: {}초", config.game_duration_secs);
    info!("==================================");

    let server = Arc::new(WsServer::new(&config));

    let bind_addr = config.bind_address();
    let server_ref = server.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server_ref.start(&bind_addr).await {
            error!("WebSocket 서버 실행 오류: {}", e);
        }
    });

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    server.stop().await?;
    server_handle.abort();

    Ok(())
}
