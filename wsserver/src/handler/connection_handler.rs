//! 연결 핸들러
//!
//! WebSocket 핸드셰이크 수락, 연결별 reader/writer 태스크 구동, 연결
//! 종료 시 두 도메인의 방 정리를 담당합니다. 연결 하나당 reader 태스크가
//! 하나이므로 같은 연결에서 온 메시지는 도착 순서대로 처리됩니다.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use shared::service::{ConnId, SessionService};

use crate::handler::{GameSyncHandler, MessageDispatcher, VoiceChatHandler};
use crate::service::ConnectionService;

/// 연결 핸들러
pub struct ConnectionHandler {
    connection_service: Arc<ConnectionService>,
    session_service: Arc<SessionService>,
    game_handler: Arc<GameSyncHandler>,
    voice_handler: Arc<VoiceChatHandler>,
    dispatcher: Arc<MessageDispatcher>,
}

impl ConnectionHandler {
    /// 새로운 연결 핸들러 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        session_service: Arc<SessionService>,
        game_handler: Arc<GameSyncHandler>,
        voice_handler: Arc<VoiceChatHandler>,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Self {
        Self {
            connection_service,
            session_service,
            game_handler,
            voice_handler,
            dispatcher,
        }
    }

    /// 새 연결 처리
    ///
    /// 핸드셰이크를 수락하고 레지스트리에 연결을 등록한 뒤, writer
    /// 태스크를 분리하고 현재 태스크에서 reader 루프를 돌립니다. 루프가
    /// 어떤 이유로든 끝나면 정리 경로가 실행됩니다.
    pub async fn handle_new_connection(&self, stream: TcpStream, addr: String) -> Result<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .context("WebSocket 핸드셰이크 실패")?;
        let (mut sink, mut stream) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let shutdown = Arc::new(Notify::new());

        let conn_id = match self
            .connection_service
            .admit(addr.clone(), tx, shutdown.clone())
            .await
        {
            Ok(conn_id) => conn_id,
            Err(e) => {
                // 정원 초과: 핸드셰이크는 끝났으므로 정중히 닫는다
                let _ = sink.send(Message::Close(None)).await;
                return Err(e);
            }
        };

        // writer 태스크: 채널에 쌓인 메시지를 소켓으로 내보낸다
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() {
                    break;
                }
                if is_close {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // reader 루프: 한 연결의 메시지는 이 루프에서 순서대로 처리된다
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("연결 {} 종료 신호 수신", conn_id);
                    break;
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.dispatcher.dispatch(conn_id, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        self.connection_service.mark_alive(conn_id).await;
                    }
                    // Ping에 대한 Pong 응답은 tungstenite가 자동 처리한다
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("연결 {} 상대측 종료", conn_id);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("연결 {} 수신 오류: {}", conn_id, e);
                        break;
                    }
                },
            }
        }

        self.cleanup(conn_id).await;
        Ok(())
    }

    /// 연결 종료 정리
    ///
    /// 두 도메인(게임/음성)의 방에서 멤버를 제거하고, 세션과 레지스트리
    /// 항목을 정리합니다.
    async fn cleanup(&self, conn_id: ConnId) {
        if let Some(identity) = self.connection_service.identity_of(conn_id) {
            if let Err(e) = self
                .game_handler
                .handle_disconnect(identity.user_id, conn_id)
                .await
            {
                warn!("게임 방 정리 실패 (사용자 {}): {}", identity.user_id, e);
            }
            if let Err(e) = self
                .voice_handler
                .handle_disconnect(identity.user_id, conn_id)
                .await
            {
                warn!("음성 방 정리 실패 (사용자 {}): {}", identity.user_id, e);
            }
            self.session_service.end_session(identity.user_id, conn_id);
        }

        self.connection_service.remove_connection(conn_id).await;
        info!("연결 {} 정리 완료", conn_id);
    }
}
