//! 통합 테스트
//!
//! 디스패처를 통해 JSON 봉투를 흘려보내 전체 경로(파싱 → 디스패치 →
//! 방 상태 변경 → 팬아웃)를 검증합니다. 가짜 연결은 채널로 수신측을
//! 관찰합니다.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

use shared::service::{ConnId, InMemoryScoreRepository, SessionService};

use crate::handler::game_handler::GameConfig;
use crate::handler::{GameSyncHandler, MessageDispatcher, VoiceChatHandler};
use crate::protocol::Envelope;
use crate::service::{BroadcastService, ConnectionService};

struct TestServer {
    dispatcher: Arc<MessageDispatcher>,
    connection_service: Arc<ConnectionService>,
    game_handler: Arc<GameSyncHandler>,
}

fn server_with_game_config(game_config: GameConfig) -> TestServer {
    let connection_service = Arc::new(ConnectionService::new(100));
    let broadcast_service = Arc::new(BroadcastService::new(connection_service.clone()));
    let session_service = Arc::new(SessionService::new());
    let game_handler = Arc::new(GameSyncHandler::new(
        connection_service.clone(),
        broadcast_service.clone(),
        Arc::new(InMemoryScoreRepository::new()),
        game_config,
    ));
    let voice_handler = Arc::new(VoiceChatHandler::new(
        connection_service.clone(),
        broadcast_service,
    ));
    let dispatcher = Arc::new(MessageDispatcher::new(
        connection_service.clone(),
        session_service,
        game_handler.clone(),
        voice_handler,
    ));
    TestServer {
        dispatcher,
        connection_service,
        game_handler,
    }
}

fn server() -> TestServer {
    server_with_game_config(GameConfig::default())
}

/// 연결을 수용하고 connect 봉투로 인증까지 마친다
async fn connect_client(
    server: &TestServer,
    user_id: u32,
    nickname: &str,
) -> (ConnId, UnboundedReceiver<Message>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let conn_id = server
        .connection_service
        .admit(format!("127.0.0.1:{}", user_id), tx, Arc::new(Notify::new()))
        .await
        .unwrap();
    let connect = format!(
        r#"{{"type":"connect","data":{{"userId":{},"nickname":"{}"}},"timestamp":0}}"#,
        user_id, nickname
    );
    server.dispatcher.dispatch(conn_id, &connect).await;
    (conn_id, rx)
}

fn drain_all(rx: &mut UnboundedReceiver<Message>) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            envelopes.push(Envelope::from_text(&text).unwrap());
        }
    }
    envelopes
}

fn find_kind(envelopes: &[Envelope], kind: &str) -> Option<Envelope> {
    envelopes.iter().find(|e| e.kind == kind).cloned()
}

/// 게임 제한 시간이 지나면 "timeout" 사유로 강제 종료된다
#[tokio::test]
async fn test_game_timer_force_ends_with_timeout() {
    let server = server_with_game_config(GameConfig {
        game_duration_secs: 1,
        ..GameConfig::default()
    });
    let (host_conn, mut host_rx) = connect_client(&server, 1, "호스트").await;

    server
        .dispatcher
        .dispatch(
            host_conn,
            r#"{"type":"room_create","data":{"name":"방","gameType":"fruit_catch"},"timestamp":0}"#,
        )
        .await;
    server
        .dispatcher
        .dispatch(
            host_conn,
            r#"{"type":"player_ready","data":{"isReady":true},"timestamp":0}"#,
        )
        .await;
    server
        .dispatcher
        .dispatch(host_conn, r#"{"type":"game_start","timestamp":0}"#)
        .await;

    tokio::time::sleep(tokio::time::Duration::from_millis(1300)).await;

    let envelopes = drain_all(&mut host_rx);
    let ended = find_kind(&envelopes, "game_ended").expect("타임아웃 종료 이벤트가 와야 한다");
    assert_eq!(ended.data.unwrap()["reason"], "timeout");

    let room_id = ended.room_id.unwrap();
    let details = server.game_handler.get_room_details(&room_id).await.unwrap();
    assert_eq!(details["status"], "finished");
}

/// 명시적 종료는 타이머를 취소해 죽은 방에 타이머가 발화하지 않는다
#[tokio::test]
async fn test_explicit_end_cancels_timer() {
    let server = server_with_game_config(GameConfig {
        game_duration_secs: 1,
        ..GameConfig::default()
    });
    let (host_conn, mut host_rx) = connect_client(&server, 1, "호스트").await;

    server
        .dispatcher
        .dispatch(
            host_conn,
            r#"{"type":"room_create","data":{"name":"방","gameType":"fruit_catch"},"timestamp":0}"#,
        )
        .await;
    server
        .dispatcher
        .dispatch(
            host_conn,
            r#"{"type":"player_ready","data":{"isReady":true},"timestamp":0}"#,
        )
        .await;
    server
        .dispatcher
        .dispatch(host_conn, r#"{"type":"game_start","timestamp":0}"#)
        .await;
    server
        .dispatcher
        .dispatch(
            host_conn,
            r#"{"type":"game_end","data":{"reason":"host_ended"},"timestamp":0}"#,
        )
        .await;

    // 타이머가 살아있었다면 이 시점 이후 두 번째 game_ended가 왔을 것
    tokio::time::sleep(tokio::time::Duration::from_millis(1300)).await;

    let envelopes = drain_all(&mut host_rx);
    let ended: Vec<_> = envelopes.iter().filter(|e| e.kind == "game_ended").collect();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].data.clone().unwrap()["reason"], "host_ended");
}

/// 스펙 시나리오: 두 클라이언트가 general에 입장, A가 음소거하면 B는
/// voice_mute{isMuted:true}를 받고, 음소거 해제 전까지 A의
/// voice_start_speaking을 받지 않는다
#[tokio::test]
async fn test_voice_mute_scenario() {
    let server = server();
    let (conn_a, mut rx_a) = connect_client(&server, 1, "A").await;
    let (conn_b, mut rx_b) = connect_client(&server, 2, "B").await;

    server
        .dispatcher
        .dispatch(
            conn_a,
            r#"{"type":"voice_room_join","roomId":"general","timestamp":0}"#,
        )
        .await;
    server
        .dispatcher
        .dispatch(
            conn_b,
            r#"{"type":"voice_room_join","roomId":"general","timestamp":0}"#,
        )
        .await;
    drain_all(&mut rx_a);
    drain_all(&mut rx_b);

    // A 음소거
    server
        .dispatcher
        .dispatch(conn_a, r#"{"type":"voice_mute","timestamp":0}"#)
        .await;

    let envelopes = drain_all(&mut rx_b);
    let mute = find_kind(&envelopes, "voice_mute").expect("B는 voice_mute를 받아야 한다");
    let data = mute.data.unwrap();
    assert_eq!(data["userId"], 1);
    assert_eq!(data["isMuted"], true);

    // 음소거 중 발화 시작은 B에게 전달되지 않는다
    server
        .dispatcher
        .dispatch(conn_a, r#"{"type":"voice_start_speaking","timestamp":0}"#)
        .await;
    assert!(find_kind(&drain_all(&mut rx_b), "voice_start_speaking").is_none());

    // 음소거 해제 후에는 전달된다
    server
        .dispatcher
        .dispatch(conn_a, r#"{"type":"voice_unmute","timestamp":0}"#)
        .await;
    server
        .dispatcher
        .dispatch(conn_a, r#"{"type":"voice_start_speaking","timestamp":0}"#)
        .await;
    let envelopes = drain_all(&mut rx_b);
    assert!(find_kind(&envelopes, "voice_unmute").is_some());
    assert!(find_kind(&envelopes, "voice_start_speaking").is_some());
}

/// 한 연결이 게임 방과 음성 방에 동시에 속할 수 있다 (도메인별 독립
/// 멤버십). 같은 도메인 안에서는 방 하나만 허용된다.
#[tokio::test]
async fn test_domains_are_independent_over_one_connection() {
    let server = server();
    let (conn, mut rx) = connect_client(&server, 1, "유저").await;

    server
        .dispatcher
        .dispatch(
            conn,
            r#"{"type":"room_create","data":{"name":"게임방","gameType":"fruit_catch"},"timestamp":0}"#,
        )
        .await;
    server
        .dispatcher
        .dispatch(
            conn,
            r#"{"type":"voice_room_join","roomId":"gaming","timestamp":0}"#,
        )
        .await;

    let envelopes = drain_all(&mut rx);
    let game_room = find_kind(&envelopes, "room_created").unwrap().room_id.unwrap();
    assert!(find_kind(&envelopes, "voice_room_joined").is_some());

    // 게임 멤버십과 음성 멤버십이 서로를 침범하지 않는다
    assert_eq!(
        server.game_handler.get_user_room(1).as_deref(),
        Some(game_room.as_str())
    );

    // 게임 방을 떠나도 음성 멤버십은 유지된다
    server
        .dispatcher
        .dispatch(conn, r#"{"type":"room_leave","timestamp":0}"#)
        .await;
    assert_eq!(server.game_handler.get_user_room(1), None);

    let envelopes = drain_all(&mut rx);
    assert!(find_kind(&envelopes, "voice_user_left").is_none());
}

/// 악의적/깨진 메시지 연타가 다른 방의 상태를 오염시키지 않는다
#[tokio::test]
async fn test_hostile_messages_do_not_corrupt_other_rooms() {
    let server = server();
    let (good_conn, mut good_rx) = connect_client(&server, 1, "정상").await;
    let (bad_conn, _bad_rx) = connect_client(&server, 2, "악성").await;

    server
        .dispatcher
        .dispatch(
            good_conn,
            r#"{"type":"room_create","data":{"name":"방","gameType":"fruit_catch"},"timestamp":0}"#,
        )
        .await;
    let room_id = find_kind(&drain_all(&mut good_rx), "room_created")
        .unwrap()
        .room_id
        .unwrap();

    // 깨진 JSON, 알 수 없는 타입, 엉뚱한 방 ID, 잘못된 페이로드 연타
    for raw in [
        "{{{{",
        r#"{"type":"game_start","timestamp":0}"#,
        r#"{"type":"room_join","roomId":"없는방","data":{},"timestamp":0}"#,
        r#"{"type":"player_move","data":{"x":"문자열"},"timestamp":0}"#,
        r#"{"type":"bomb_explosion","data":null,"timestamp":0}"#,
    ] {
        server.dispatcher.dispatch(bad_conn, raw).await;
    }

    // 정상 사용자의 방은 멀쩡하다
    let details = server.game_handler.get_room_details(&room_id).await.unwrap();
    assert_eq!(details["players"].as_array().unwrap().len(), 1);
    assert_eq!(details["status"], "waiting");
    assert!(server.connection_service.is_open(bad_conn));
}
