//! 核心配置

use std::fs;
use std::path::Path;

use dubfm_player::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::{Bitrate, CoreError};

/// 核心配置，构造 [`MediaCore`](crate::MediaCore) 时显式传入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub engine: EngineConfig,
    /// 偏好中没有有效选择时使用的码率
    pub default_bitrate: Bitrate,
    /// 可降低音量（duck）时的输出增益
    pub duck_volume: f32,
    /// 没有曲目标题时通知里显示的名字
    pub station_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            default_bitrate: Bitrate::default(),
            duck_volume: 0.2,
            station_name: "dubstep.fm".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let mut config: CoreConfig = serde_json::from_str(text)?;
        config.duck_volume = config.duck_volume.clamp(0.0, 1.0);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = CoreConfig::from_json(r#"{ "default_bitrate": 64 }"#).unwrap();
        assert_eq!(config.default_bitrate, Bitrate::Kbps64);
        assert_eq!(config.station_name, "dubstep.fm");
        assert!((config.duck_volume - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.engine.user_agent, "dubstep.fm");
    }

    #[test]
    fn test_nested_engine_config() {
        let config = CoreConfig::from_json(
            r#"{ "engine": { "connect_timeout_secs": 3 }, "duck_volume": 4.0 }"#,
        )
        .unwrap();
        assert_eq!(config.engine.connect_timeout_secs, 3);
        assert_eq!(config.engine.read_timeout_secs, 15);
        assert_eq!(config.duck_volume, 1.0);
    }

    #[test]
    fn test_rejects_unknown_bitrate() {
        let err = CoreConfig::from_json(r#"{ "default_bitrate": 100 }"#).unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CoreConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
