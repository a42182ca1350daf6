//! Session configuration.

use std::time::Duration;

use crate::{domain::DeviceInfo, usecase::ReconnectPolicy};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:3000/ws";
pub const DEFAULT_USER_AGENT: &str = "QureClinics-Mobile-App";
pub const DEFAULT_MAX_QUEUE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// REST base URL, without trailing slash
    pub api_base_url: String,
    /// Realtime endpoint
    pub ws_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Delay before the status poll that follows a completion
    pub completion_refresh_delay: Duration,
    pub request_timeout: Duration,
    pub device_user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
            completion_refresh_delay: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(30),
            device_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            delay: self.reconnect_delay,
        }
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            user_agent: self.device_user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reconnect_policy() {
        // テスト項目: 既定の再接続ポリシーは 3 回・1 秒間隔
        // given (前提条件):
        let config = SessionConfig::default();

        // when (操作):
        let policy = config.reconnect_policy();

        // then (期待する結果):
        assert_eq!(policy, ReconnectPolicy::default());
        assert_eq!(config.device_info().user_agent, "QureClinics-Mobile-App");
    }
}
