//! 브로드캐스트 팬아웃 서비스
//!
//! 게임/음성 매니저가 공유하는 멀티캐스트 프리미티브입니다. 한 번만
//! 직렬화한 뒤 방의 현재 멤버 연결에 전송하며, 제외 대상과 닫힌 연결은
//! 건너뜁니다. best-effort 전달만 보장합니다. 재시도와 백프레셔는 없고,
//! 죽은 수신자는 이 경로가 아니라 다음 생존 스윕이 정리합니다.

use std::sync::Arc;
use tracing::warn;

use shared::model::UserId;
use shared::service::ConnId;

use crate::protocol::Envelope;
use crate::service::ConnectionService;

/// 방 멤버의 전송 대상 정보 (user_id + 연결)
#[derive(Debug, Clone, Copy)]
pub struct Recipient {
    pub user_id: UserId,
    pub conn_id: ConnId,
}

/// 브로드캐스트 서비스
pub struct BroadcastService {
    connection_service: Arc<ConnectionService>,
}

impl BroadcastService {
    pub fn new(connection_service: Arc<ConnectionService>) -> Self {
        Self { connection_service }
    }

    /// 멤버 목록에 봉투를 팬아웃
    ///
    /// `exclude_user`가 지정되면 해당 사용자를 건너뜁니다. 전송에
    /// 성공한(= 시도한) 연결 수를 반환합니다.
    pub fn fan_out(
        &self,
        recipients: &[Recipient],
        envelope: &Envelope,
        exclude_user: Option<UserId>,
    ) -> usize {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!("브로드캐스트 직렬화 실패: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for recipient in recipients {
            if Some(recipient.user_id) == exclude_user {
                continue;
            }
            if !self.connection_service.is_open(recipient.conn_id) {
                continue;
            }
            self.connection_service
                .send_text_to_conn(recipient.conn_id, text.clone());
            sent += 1;
        }
        sent
    }

    /// 단일 연결로 봉투 전송 (요청자 전용 응답 경로)
    pub fn send_to(&self, conn_id: ConnId, envelope: &Envelope) {
        self.connection_service.send_to_conn(conn_id, envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::sync::Notify;
    use tokio_tungstenite::tungstenite::Message;

    async fn admit(
        service: &ConnectionService,
        addr: &str,
    ) -> (ConnId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = service
            .admit(addr.to_string(), tx, Arc::new(Notify::new()))
            .await
            .unwrap();
        (conn_id, rx)
    }

    #[tokio::test]
    async fn test_fan_out_excludes_sender() {
        let connection_service = Arc::new(ConnectionService::new(10));
        let broadcast = BroadcastService::new(connection_service.clone());

        let (conn1, mut rx1) = admit(&connection_service, "127.0.0.1:1").await;
        let (conn2, mut rx2) = admit(&connection_service, "127.0.0.1:2").await;

        let recipients = vec![
            Recipient { user_id: 1, conn_id: conn1 },
            Recipient { user_id: 2, conn_id: conn2 },
        ];

        let envelope = Envelope::room_event("player_joined", "r1", serde_json::json!({}));
        let sent = broadcast.fan_out(&recipients, &envelope, Some(1));

        assert_eq!(sent, 1);
        assert!(rx1.try_recv().is_err());
        assert!(matches!(rx2.try_recv(), Ok(Message::Text(_))));
    }

    #[tokio::test]
    async fn test_fan_out_skips_closed_connections() {
        let connection_service = Arc::new(ConnectionService::new(10));
        let broadcast = BroadcastService::new(connection_service.clone());

        let (conn1, mut rx1) = admit(&connection_service, "127.0.0.1:1").await;
        let (conn2, _rx2) = admit(&connection_service, "127.0.0.1:2").await;

        // conn2가 레지스트리에서 제거된 상태 (닫힌 소켓)
        connection_service.remove_connection(conn2).await;

        let recipients = vec![
            Recipient { user_id: 1, conn_id: conn1 },
            Recipient { user_id: 2, conn_id: conn2 },
        ];

        let envelope = Envelope::room_event("voice_user_joined", "general", serde_json::json!({}));
        let sent = broadcast.fan_out(&recipients, &envelope, None);

        assert_eq!(sent, 1);
        assert!(matches!(rx1.try_recv(), Ok(Message::Text(_))));
    }
}
