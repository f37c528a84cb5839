use std::time::Duration;

use tracing::warn;

use crate::analysis::{AnalysisConfig, DEFAULT_ANALYSIS_URL};
use crate::media::MediaConstraints;
use crate::negotiation::PeerConfig;
use crate::recorder::RecorderConfig;

pub const DEFAULT_ROOM_PREFIX: &str = "observable-";
pub const DEFAULT_UPDATE_CAPACITY: usize = 64;

pub const ENV_ANALYSIS_URL: &str = "INTERVIEW_ANALYSIS_URL";
pub const ENV_ANALYSIS_TIMEOUT_SECS: &str = "INTERVIEW_ANALYSIS_TIMEOUT_SECS";
pub const ENV_ICE_SERVERS: &str = "INTERVIEW_ICE_SERVERS";
pub const ENV_ROOM_PREFIX: &str = "INTERVIEW_ROOM_PREFIX";

const TARGET: &str = "call_session";

/// 一次通话用到的全部配置。
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub room_prefix: String,
    pub peer: PeerConfig,
    pub media: MediaConstraints,
    pub recorder: RecorderConfig,
    /// 由 `CallServices::with_http_analysis` 用来构建上传客户端。
    pub analysis: AnalysisConfig,
    /// 生命周期广播通道容量。
    pub update_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            room_prefix: DEFAULT_ROOM_PREFIX.to_string(),
            peer: PeerConfig::default(),
            media: MediaConstraints::default(),
            recorder: RecorderConfig::default(),
            analysis: AnalysisConfig::default(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

impl CallConfig {
    /// 用环境变量覆盖默认值。
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 非法取值会记录告警并保留默认值。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = read(ENV_ANALYSIS_URL) {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.analysis.endpoint = url;
            } else {
                warn!(
                    target: TARGET,
                    key = ENV_ANALYSIS_URL,
                    value = %url,
                    default = DEFAULT_ANALYSIS_URL,
                    "ignoring analysis url without http scheme"
                );
            }
        }

        if let Some(raw) = read(ENV_ANALYSIS_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.analysis.timeout = Duration::from_secs(secs),
                _ => warn!(
                    target: TARGET,
                    key = ENV_ANALYSIS_TIMEOUT_SECS,
                    value = %raw,
                    "ignoring invalid analysis timeout"
                ),
            }
        }

        if let Some(raw) = read(ENV_ICE_SERVERS) {
            let servers: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|server| !server.is_empty())
                .map(str::to_string)
                .collect();
            if servers.is_empty() {
                warn!(target: TARGET, key = ENV_ICE_SERVERS, "ignoring empty ice server list");
            } else {
                config.peer.ice_servers = servers;
            }
        }

        if let Some(prefix) = read(ENV_ROOM_PREFIX) {
            config.room_prefix = prefix;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> CallConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        CallConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_overrides() {
        let config = from_pairs(&[]);

        assert_eq!(config.room_prefix, "observable-");
        assert_eq!(config.analysis.endpoint, "http://localhost:3001/save-audio");
        assert_eq!(config.analysis.timeout, Duration::from_secs(120));
        assert_eq!(
            config.peer.ice_servers,
            vec!["stun:stun.l.google.com:19302".to_string()]
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            (ENV_ANALYSIS_URL, "https://analysis.internal/save-audio"),
            (ENV_ANALYSIS_TIMEOUT_SECS, " 30 "),
            (ENV_ICE_SERVERS, "stun:a.example:3478, turn:b.example:3478,"),
            (ENV_ROOM_PREFIX, "mock-interview-"),
        ]);

        assert_eq!(config.analysis.endpoint, "https://analysis.internal/save-audio");
        assert_eq!(config.analysis.timeout, Duration::from_secs(30));
        assert_eq!(
            config.peer.ice_servers,
            vec!["stun:a.example:3478".to_string(), "turn:b.example:3478".to_string()]
        );
        assert_eq!(config.room_prefix, "mock-interview-");
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = from_pairs(&[
            (ENV_ANALYSIS_URL, "localhost:3001"),
            (ENV_ANALYSIS_TIMEOUT_SECS, "0"),
            (ENV_ICE_SERVERS, " , "),
            (ENV_ROOM_PREFIX, "   "),
        ]);

        assert_eq!(config.analysis.endpoint, DEFAULT_ANALYSIS_URL);
        assert_eq!(config.analysis.timeout, Duration::from_secs(120));
        assert_eq!(config.peer.ice_servers.len(), 1);
        assert_eq!(config.room_prefix, DEFAULT_ROOM_PREFIX);
    }
}
