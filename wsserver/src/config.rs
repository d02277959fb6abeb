//! WebSocket 서버 환경 설정 모듈
//!
//! .env 파일에서 환경변수를 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

/// WebSocket 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    /// 서버 호스트 주소
    pub host: String,
    /// 서버 포트 번호
    pub port: u16,
    /// 최대 동시 연결 수
    pub max_connections: u32,
    /// 하트비트 스윕 간격 (초)
    pub heartbeat_interval_secs: u64,
    /// 게임 제한 시간 (초)
    pub game_duration_secs: u64,
    /// 폭발 기본 반경
    pub explosion_radius: f64,
    /// 폭발 기본 피해량 (목숨)
    pub explosion_damage: u32,
}

impl WsServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 상위 디렉토리의 .env 파일
    /// 2. 현재 디렉토리의 .env 파일
    /// 3. 시스템 환경변수
    /// 4. 기본값
    pub fn from_env() -> Result<Self> {
        // .env 파일 로드 시도
        Self::load_env_file();

        // 환경변수에서 값 읽기 (기본값 포함)
        let config = Self {
            host: std::env::var("ws_host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("ws_port")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            max_connections: std::env::var("ws_max_connections")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            heartbeat_interval_secs: std::env::var("ws_heartbeat_interval_secs")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            game_duration_secs: std::env::var("game_duration_secs")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            explosion_radius: std::env::var("explosion_radius")
                .unwrap_or_else(|_| "60.0".to_string())
                .parse()
                .unwrap_or(60.0),
            explosion_damage: std::env::var("explosion_damage")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
        };

        info!("WebSocket 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        // 여러 위치에서 .env 파일 찾기
        let env_paths = vec![
            "../.env", // 상위 디렉토리
            ".env",    // 현재 디렉토리
        ];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_connections: 1000,
            heartbeat_interval_secs: 30,
            game_duration_secs: 300,
            explosion_radius: 60.0,
            explosion_damage: 1,
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &WsServerConfig) -> Result<()> {
    if config.port == 0 {
        anyhow::bail!("유효하지 않은 포트 번호: {}", config.port);
    }

    if config.host.is_empty() {
        anyhow::bail!("호스트 주소가 비어있습니다");
    }

    if config.max_connections == 0 {
        anyhow::bail!("최대 연결 수는 1 이상이어야 합니다");
    }

    if config.heartbeat_interval_secs == 0 {
        anyhow::bail!("하트비트 간격은 1초 이상이어야 합니다");
    }

    if config.game_duration_secs == 0 {
        anyhow::bail!("게임 제한 시간은 1초 이상이어야 합니다");
    }

    if config.explosion_radius <= 0.0 {
        anyhow::bail!("폭발 반경은 0보다 커야 합니다");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WsServerConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = WsServerConfig::default();
        config.port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = WsServerConfig::default();
        config.explosion_radius = -1.0;
        assert!(validate_config(&config).is_err());
    }
}
