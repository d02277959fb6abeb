//! 메시지 디스패처
//!
//! 봉투의 `type` 문자열로 핸들러를 찾는 명시적 디스패치 테이블입니다.
//! 연결별 컨텍스트(인증된 신원)는 connect 처리 시 레지스트리에
//! 바인딩되고, 이후 모든 메시지는 그 신원으로 처리됩니다.
//!
//! 에러 정책:
//! - 잘못된(파싱 불가) 입력: 로그만 남기고 연결 유지
//! - 알 수 없는 타입: 로그만 남기고 무시
//! - 핸들러 내부 에러: 로그만 남김. 어떤 메시지도 프로세스를 죽이거나
//!   다른 방의 상태를 오염시키지 않는다

use std::sync::Arc;
use tracing::{debug, error, warn};

use shared::model::Identity;
use shared::service::{ConnId, SessionService};

use crate::handler::{GameSyncHandler, VoiceChatHandler};
use crate::protocol::{ConnectData, Envelope};
use crate::service::ConnectionService;
use crate::tool::error::WsServerError;

/// 메시지 디스패처
pub struct MessageDispatcher {
    connection_service: Arc<ConnectionService>,
    session_service: Arc<SessionService>,
    game_handler: Arc<GameSyncHandler>,
    voice_handler: Arc<VoiceChatHandler>,
}

impl MessageDispatcher {
    /// 새로운 디스패처 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        session_service: Arc<SessionService>,
        game_handler: Arc<GameSyncHandler>,
        voice_handler: Arc<VoiceChatHandler>,
    ) -> Self {
        Self {
            connection_service,
            session_service,
            game_handler,
            voice_handler,
        }
    }

    /// 수신 텍스트 프레임 처리
    ///
    /// 파싱과 디스패치, 에러 분류까지 담당합니다. 이 함수는 어떤 입력에
    /// 대해서도 패닉하거나 에러를 전파하지 않습니다.
    pub async fn dispatch(&self, conn_id: ConnId, raw: &str) {
        let envelope = match Envelope::from_text(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = WsServerError::Protocol { message: e.to_string() };
                warn!("연결 {} 잘못된 메시지 무시: {}", conn_id, err);
                return;
            }
        };

        // 인증 전에도 허용되는 메시지
        match envelope.kind.as_str() {
            "connect" => {
                self.handle_connect(conn_id, &envelope).await;
                return;
            }
            "heartbeat" => {
                self.connection_service.mark_alive(conn_id).await;
                let response = Envelope::event(
                    "heartbeat_response",
                    serde_json::json!({ "timestamp": chrono::Utc::now().timestamp() }),
                );
                self.connection_service.send_to_conn(conn_id, &response);
                return;
            }
            _ => {}
        }

        // 이후의 모든 메시지는 연결 컨텍스트의 신원이 필요하다
        let identity = match self.connection_service.identity_of(conn_id) {
            Some(identity) => identity,
            None => {
                let err = WsServerError::NotAuthenticated { conn_id };
                debug!("{} ({} 메시지 무시)", err, envelope.kind);
                return;
            }
        };

        if let Err(e) = self.route(conn_id, &identity, &envelope).await {
            error!(
                "메시지 처리 오류 (연결 {}, 타입 {}): {}",
                conn_id, envelope.kind, e
            );
        }
    }

    /// 타입별 라우팅
    async fn route(
        &self,
        conn_id: ConnId,
        identity: &Identity,
        envelope: &Envelope,
    ) -> anyhow::Result<()> {
        let user_id = identity.user_id;

        match envelope.kind.as_str() {
            // === 게임 도메인 ===
            "room_create" => match envelope.parse_data() {
                Ok(data) => {
                    self.game_handler.create_room(identity, conn_id, data).await?;
                }
                Err(e) => warn!("room_create 페이로드 오류: {}", e),
            },
            "room_join" => match (&envelope.room_id, envelope.parse_data()) {
                (Some(room_id), Ok(data)) => {
                    self.game_handler
                        .join_room(identity, conn_id, room_id, data)
                        .await?;
                }
                (None, _) => warn!("room_join에 roomId가 없습니다"),
                (_, Err(e)) => warn!("room_join 페이로드 오류: {}", e),
            },
            "room_leave" => {
                if let Some(room_id) = &envelope.room_id {
                    self.game_handler.leave_room(user_id, room_id).await?;
                } else if let Some(room_id) = self.game_handler.get_user_room(user_id) {
                    self.game_handler.leave_room(user_id, &room_id).await?;
                }
            }
            "player_ready" => match envelope.parse_data::<crate::protocol::ReadyData>() {
                Ok(data) => self.game_handler.set_ready(user_id, data.is_ready).await?,
                Err(e) => warn!("player_ready 페이로드 오류: {}", e),
            },
            "game_start" => self.game_handler.start_game(user_id).await?,
            "game_pause" => self.game_handler.pause_game(user_id).await?,
            "game_resume" => self.game_handler.resume_game(user_id).await?,
            "game_end" => match envelope.parse_data::<crate::protocol::EndGameData>() {
                Ok(data) => self.game_handler.end_game(user_id, data.reason).await?,
                // data가 아예 없는 game_end도 허용한다
                Err(_) => self.game_handler.end_game(user_id, None).await?,
            },
            "player_move" => match envelope.parse_data() {
                Ok(data) => self.game_handler.player_move(user_id, data).await?,
                Err(e) => warn!("player_move 페이로드 오류: {}", e),
            },
            "player_score" => match envelope.parse_data() {
                Ok(data) => self.game_handler.player_score(user_id, data).await?,
                Err(e) => warn!("player_score 페이로드 오류: {}", e),
            },
            "game_state_update" => {
                if let Some(data) = envelope.data.clone() {
                    self.game_handler.game_state_update(user_id, data).await?;
                }
            }
            "fruit_spawn" => {
                if let Some(data) = envelope.data.clone() {
                    self.game_handler.fruit_spawn(user_id, data).await?;
                }
            }
            "bomb_explosion" => match envelope.parse_data() {
                Ok(data) => self.game_handler.bomb_explosion(user_id, data).await?,
                Err(e) => warn!("bomb_explosion 페이로드 오류: {}", e),
            },

            // === 음성 도메인 ===
            "voice_room_create" => match envelope.parse_data() {
                Ok(data) => {
                    self.voice_handler.create_room(identity, conn_id, data).await?;
                }
                Err(e) => warn!("voice_room_create 페이로드 오류: {}", e),
            },
            "voice_room_join" => match (&envelope.room_id, envelope.parse_data()) {
                (Some(room_id), Ok(data)) => {
                    self.voice_handler
                        .join_room(identity, conn_id, room_id, data)
                        .await?;
                }
                (Some(room_id), Err(_)) => {
                    // 비밀번호 없는 입장은 data가 생략될 수 있다
                    self.voice_handler
                        .join_room(identity, conn_id, room_id, Default::default())
                        .await?;
                }
                (None, _) => warn!("voice_room_join에 roomId가 없습니다"),
            },
            "voice_room_leave" => {
                if let Some(room_id) = &envelope.room_id {
                    self.voice_handler.leave_room(user_id, room_id).await?;
                } else if let Some(room_id) = self.voice_handler.get_user_room(user_id) {
                    self.voice_handler.leave_room(user_id, &room_id).await?;
                }
            }
            "voice_start_speaking" => self.voice_handler.set_speaking(user_id, true).await?,
            "voice_stop_speaking" => self.voice_handler.set_speaking(user_id, false).await?,
            "voice_audio_data" => {
                if let Some(data) = envelope.data.clone() {
                    self.voice_handler.relay_audio(user_id, data).await?;
                }
            }
            "voice_mute" => self.voice_handler.set_muted(user_id, true).await?,
            "voice_unmute" => self.voice_handler.set_muted(user_id, false).await?,
            "voice_quality_change" => match envelope.parse_data() {
                Ok(data) => self.voice_handler.quality_change(user_id, data).await?,
                Err(e) => warn!("voice_quality_change 페이로드 오류: {}", e),
            },
            "voice_noise_reduction" => match envelope.parse_data() {
                Ok(data) => self.voice_handler.noise_reduction(user_id, data).await?,
                Err(e) => warn!("voice_noise_reduction 페이로드 오류: {}", e),
            },
            "voice_room_settings" => match envelope.parse_data() {
                Ok(data) => self.voice_handler.room_settings(user_id, data).await?,
                Err(e) => warn!("voice_room_settings 페이로드 오류: {}", e),
            },
            "voice_user_status" => match envelope.parse_data() {
                Ok(data) => self.voice_handler.user_status(user_id, data).await?,
                Err(e) => warn!("voice_user_status 페이로드 오류: {}", e),
            },
            "voice_echo_test" => {
                let payload = envelope.data.clone().unwrap_or(serde_json::Value::Null);
                self.voice_handler.echo_test(user_id, conn_id, payload).await?;
            }

            // 알 수 없는 타입은 로그만 남기고 무시한다. 연결은 유지된다.
            unknown => {
                warn!("알 수 없는 메시지 타입 무시: {} (연결 {})", unknown, conn_id);
            }
        }

        Ok(())
    }

    /// 인증 처리 (connect)
    ///
    /// 외부 세션 레이어가 검증한 신원을 연결 컨텍스트에 바인딩합니다.
    /// 같은 사용자의 기존 활성 연결은 무효화(종료)됩니다.
    async fn handle_connect(&self, conn_id: ConnId, envelope: &Envelope) {
        let data: ConnectData = match envelope.parse_data() {
            Ok(data) => data,
            Err(e) => {
                warn!("connect 페이로드 오류 (연결 {}): {}", conn_id, e);
                return;
            }
        };

        let identity = Identity::new(data.user_id, data.nickname, data.is_admin);

        // 단일 활성 세션: 이전 연결은 종료한다
        if let Some(old_conn) = self.session_service.register(identity.user_id, conn_id) {
            self.connection_service.close_connection(old_conn);
        }

        self.connection_service.bind_identity(conn_id, identity.clone());

        let connected = Envelope::event(
            "connected",
            serde_json::json!({
                "userId": identity.user_id,
                "nickname": &identity.nickname,
                "isAdmin": identity.is_admin,
            }),
        );
        self.connection_service.send_to_conn(conn_id, &connected);

        debug!("연결 {} 인증 완료: 사용자 {}", conn_id, identity.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::game_handler::GameConfig;
    use crate::service::BroadcastService;
    use shared::service::InMemoryScoreRepository;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Notify;
    use tokio_tungstenite::tungstenite::Message;

    fn dispatcher() -> (Arc<MessageDispatcher>, Arc<ConnectionService>) {
        let connection_service = Arc::new(ConnectionService::new(100));
        let broadcast_service = Arc::new(BroadcastService::new(connection_service.clone()));
        let session_service = Arc::new(SessionService::new());
        let game_handler = Arc::new(GameSyncHandler::new(
            connection_service.clone(),
            broadcast_service.clone(),
            Arc::new(InMemoryScoreRepository::new()),
            GameConfig::default(),
        ));
        let voice_handler = Arc::new(VoiceChatHandler::new(
            connection_service.clone(),
            broadcast_service,
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            connection_service.clone(),
            session_service,
            game_handler,
            voice_handler,
        ));
        (dispatcher, connection_service)
    }

    async fn admit(
        connection_service: &ConnectionService,
        port: u16,
    ) -> (ConnId, UnboundedReceiver<Message>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let conn_id = connection_service
            .admit(format!("127.0.0.1:{}", port), tx, Arc::new(Notify::new()))
            .await
            .unwrap();
        (conn_id, rx)
    }

    fn drain_kinds(rx: &mut UnboundedReceiver<Message>) -> Vec<String> {
        let mut kinds = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                kinds.push(Envelope::from_text(&text).unwrap().kind);
            }
        }
        kinds
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages_ignored() {
        let (dispatcher, connection_service) = dispatcher();
        let (conn_id, mut rx) = admit(&connection_service, 1).await;

        // 잘못된 JSON과 알 수 없는 타입 모두 패닉 없이 무시되어야 한다
        dispatcher.dispatch(conn_id, "이건 JSON이 아님 {{{").await;
        dispatcher
            .dispatch(conn_id, r#"{"type":"warp_drive","timestamp":0}"#)
            .await;

        // 연결은 살아있다
        assert!(connection_service.is_open(conn_id));
        assert!(drain_kinds(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_connect_binds_identity_and_acks() {
        let (dispatcher, connection_service) = dispatcher();
        let (conn_id, mut rx) = admit(&connection_service, 1).await;

        dispatcher
            .dispatch(
                conn_id,
                r#"{"type":"connect","data":{"userId":7,"nickname":"철수"},"timestamp":0}"#,
            )
            .await;

        let identity = connection_service.identity_of(conn_id).unwrap();
        assert_eq!(identity.user_id, 7);
        assert_eq!(identity.nickname, "철수");
        assert!(drain_kinds(&mut rx).contains(&"connected".to_string()));
    }

    #[tokio::test]
    async fn test_second_session_kicks_first() {
        let (dispatcher, connection_service) = dispatcher();
        let (conn1, mut rx1) = admit(&connection_service, 1).await;
        let (conn2, _rx2) = admit(&connection_service, 2).await;

        let connect = r#"{"type":"connect","data":{"userId":7,"nickname":"철수"},"timestamp":0}"#;
        dispatcher.dispatch(conn1, connect).await;
        dispatcher.dispatch(conn2, connect).await;

        // 이전 연결에는 Close 프레임이 전달된다
        let mut saw_close = false;
        while let Ok(msg) = rx1.try_recv() {
            if matches!(msg, Message::Close(_)) {
                saw_close = true;
            }
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn test_unauthenticated_requests_dropped() {
        let (dispatcher, connection_service) = dispatcher();
        let (conn_id, mut rx) = admit(&connection_service, 1).await;

        dispatcher
            .dispatch(
                conn_id,
                r#"{"type":"room_create","data":{"name":"방","gameType":"fruit_catch"},"timestamp":0}"#,
            )
            .await;

        // 인증 전이므로 응답도 상태 변경도 없다
        assert!(drain_kinds(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_full_game_flow_through_dispatch() {
        let (dispatcher, connection_service) = dispatcher();
        let (conn_id, mut rx) = admit(&connection_service, 1).await;

        dispatcher
            .dispatch(
                conn_id,
                r#"{"type":"connect","data":{"userId":1,"nickname":"호스트"},"timestamp":0}"#,
            )
            .await;
        dispatcher
            .dispatch(
                conn_id,
                r#"{"type":"room_create","data":{"name":"방","gameType":"fruit_catch"},"timestamp":0}"#,
            )
            .await;
        dispatcher
            .dispatch(
                conn_id,
                r#"{"type":"player_ready","data":{"isReady":true},"timestamp":0}"#,
            )
            .await;
        dispatcher
            .dispatch(conn_id, r#"{"type":"game_start","timestamp":0}"#)
            .await;

        let kinds = drain_kinds(&mut rx);
        assert!(kinds.contains(&"connected".to_string()));
        assert!(kinds.contains(&"room_created".to_string()));
        assert!(kinds.contains(&"player_ready".to_string()));
        assert!(kinds.contains(&"game_started".to_string()));

        // 타이머 정리를 위해 종료
        dispatcher
            .dispatch(conn_id, r#"{"type":"game_end","timestamp":0}"#)
            .await;
        assert!(drain_kinds(&mut rx).contains(&"game_ended".to_string()));
    }

    #[tokio::test]
    async fn test_heartbeat_answered_before_auth() {
        let (dispatcher, connection_service) = dispatcher();
        let (conn_id, mut rx) = admit(&connection_service, 1).await;

        dispatcher
            .dispatch(conn_id, r#"{"type":"heartbeat","timestamp":0}"#)
            .await;
        assert!(drain_kinds(&mut rx).contains(&"heartbeat_response".to_string()));
    }
}
