//! 연결 레지스트리 서비스
//!
//! 살아있는 WebSocket 연결과 그 송신 채널, 생존 플래그, 인증된 신원을
//! 관리합니다. DashMap 기반으로 연결별 상태를 추적하며, 닫힌 소켓으로의
//! 전송은 no-op으로 처리되어 핸들러에 에러로 전파되지 않습니다.

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use shared::model::Identity;
use shared::service::ConnId;

use crate::protocol::Envelope;
use crate::tool::SimpleUtils;

/// 개별 클라이언트 연결 정보
pub struct ClientConnection {
    pub conn_id: ConnId,
    pub addr: String,
    /// 인증 시점에 바인딩되는 신원 (connect 메시지 처리 전에는 None)
    pub identity: Option<Identity>,
    /// 아웃바운드 송신 채널 (writer 태스크가 소비)
    sender: UnboundedSender<Message>,
    /// 생존 플래그: 스윕이 지우고, Pong/하트비트가 다시 세운다
    pub alive: bool,
    pub connected_at: i64,
    /// reader 태스크 종료 신호 (강제 종료/킥 경로)
    shutdown: Arc<Notify>,
}

impl ClientConnection {
    /// 메시지 전송 (닫힌 소켓이면 no-op)
    fn send(&self, message: Message) {
        if self.sender.send(message).is_err() {
            debug!("연결 {} 송신 채널이 닫혀 메시지를 버립니다", self.conn_id);
        }
    }
}

/// 연결 통계
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub current_connections: u32,
    pub peak_connections: u32,
    pub closed_by_sweep: u64,
    pub pings_sent: u64,
    pub heartbeats_received: u64,
}

/// 연결 레지스트리 서비스
pub struct ConnectionService {
    /// 연결 정보: conn_id -> ClientConnection
    connections: DashMap<ConnId, ClientConnection>,
    next_conn_id: AtomicU64,
    max_connections: u32,
    stats: Mutex<ConnectionStats>,
}

impl ConnectionService {
    /// 새로운 연결 서비스 생성
    pub fn new(max_connections: u32) -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
            max_connections,
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    /// 새 연결 수용
    ///
    /// 최대 연결 수를 확인하고 연결 ID를 할당합니다. 연결은 생존
    /// 상태로 등록됩니다.
    pub async fn admit(
        &self,
        addr: String,
        sender: UnboundedSender<Message>,
        shutdown: Arc<Notify>,
    ) -> Result<ConnId> {
        if self.connections.len() >= self.max_connections as usize {
            warn!(
                "최대 연결 수 초과: {}/{}",
                self.connections.len(),
                self.max_connections
            );
            return Err(anyhow!("서버가 가득 참"));
        }

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection {
            conn_id,
            addr: addr.clone(),
            identity: None,
            sender,
            alive: true,
            connected_at: SimpleUtils::current_timestamp(),
            shutdown,
        };
        self.connections.insert(conn_id, connection);

        let mut stats = self.stats.lock().await;
        stats.total_connections += 1;
        stats.current_connections = self.connections.len() as u32;
        stats.peak_connections = stats.peak_connections.max(stats.current_connections);
        drop(stats);

        info!("✅ 연결 {} 수용 완료 ({})", conn_id, addr);
        Ok(conn_id)
    }

    /// 연결 제거
    ///
    /// 레지스트리에서 연결을 제거하고, 바인딩되어 있던 신원을
    /// 반환합니다 (방 정리 경로에서 사용).
    pub async fn remove_connection(&self, conn_id: ConnId) -> Option<Identity> {
        let removed = self.connections.remove(&conn_id);

        if removed.is_some() {
            let mut stats = self.stats.lock().await;
            stats.current_connections = self.connections.len() as u32;
            info!("연결 {} 제거 완료", conn_id);
        }

        removed.and_then(|(_, conn)| conn.identity)
    }

    /// 인증된 신원을 연결에 바인딩
    pub fn bind_identity(&self, conn_id: ConnId, identity: Identity) {
        if let Some(mut conn) = self.connections.get_mut(&conn_id) {
            conn.identity = Some(identity);
        }
    }

    /// 연결에 바인딩된 신원 조회
    pub fn identity_of(&self, conn_id: ConnId) -> Option<Identity> {
        self.connections
            .get(&conn_id)
            .and_then(|conn| conn.identity.clone())
    }

    /// 봉투 전송 (직렬화 포함)
    ///
    /// 닫힌/없는 연결로의 전송은 no-op입니다. 에러를 반환하지 않습니다.
    pub fn send_to_conn(&self, conn_id: ConnId, envelope: &Envelope) {
        match envelope.to_text() {
            Ok(text) => self.send_text_to_conn(conn_id, text),
            Err(e) => warn!("봉투 직렬화 실패: {}", e),
        }
    }

    /// 직렬화된 텍스트 전송 (브로드캐스트의 serialize-once 경로)
    pub fn send_text_to_conn(&self, conn_id: ConnId, text: String) {
        if let Some(conn) = self.connections.get(&conn_id) {
            conn.send(Message::Text(text));
        } else {
            debug!("연결 {}이 없어 메시지를 버립니다", conn_id);
        }
    }

    /// 연결이 열려 있는지 확인
    pub fn is_open(&self, conn_id: ConnId) -> bool {
        self.connections.contains_key(&conn_id)
    }

    /// 생존 플래그 설정 (Pong 프레임 / 하트비트 메시지 수신 시)
    pub async fn mark_alive(&self, conn_id: ConnId) {
        if let Some(mut conn) = self.connections.get_mut(&conn_id) {
            conn.alive = true;
        }
        self.stats.lock().await.heartbeats_received += 1;
    }

    /// 연결 강제 종료
    ///
    /// Close 프레임을 보내고 reader 태스크에 종료 신호를 전달합니다.
    /// 방 정리는 reader 태스크의 종료 경로에서 수행됩니다.
    pub fn close_connection(&self, conn_id: ConnId) {
        if let Some(conn) = self.connections.get(&conn_id) {
            conn.send(Message::Close(None));
            conn.shutdown.notify_one();
            info!("연결 {} 종료 요청", conn_id);
        }
    }

    /// 생존 스윕 1회 수행
    ///
    /// 생존 플래그가 꺼진 연결은 종료하고, 나머지에는 Ping을 보낸 뒤
    /// 플래그를 지웁니다. 다음 스윕 전까지 Pong으로 재확인되어야
    /// 합니다. 종료된 연결 수를 반환합니다.
    pub async fn sweep_once(&self) -> usize {
        let mut dead = Vec::new();
        let mut pinged = 0u64;

        for mut entry in self.connections.iter_mut() {
            if entry.alive {
                entry.send(Message::Ping(Vec::new()));
                entry.alive = false;
                pinged += 1;
            } else {
                dead.push(entry.conn_id);
            }
        }

        for conn_id in &dead {
            warn!("연결 {} 하트비트 응답 없음, 종료합니다", conn_id);
            self.close_connection(*conn_id);
        }

        let mut stats = self.stats.lock().await;
        stats.pings_sent += pinged;
        stats.closed_by_sweep += dead.len() as u64;

        dead.len()
    }

    /// 현재 연결 수 조회
    pub fn get_connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 연결 통계 조회
    pub async fn get_stats(&self) -> ConnectionStats {
        self.stats.lock().await.clone()
    }
}
