//! 偏好存储
//!
//! UI 层写入所选流的 URL，核心只在构造时读取一次。

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::{self, Stream};
use crate::{Bitrate, CoreError};

/// 保存所选流 URL 的键
pub const KEY_STREAM_LINK: &str = "link";

/// 键值偏好存储
pub trait PreferenceStore: Send {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&mut self, key: &str, value: &str) -> Result<(), CoreError>;
}

/// 内存实现
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    values: HashMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// 扁平 JSON 对象文件，每次写入整体落盘
#[derive(Debug)]
pub struct JsonPreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonPreferences {
    /// 打开偏好文件；文件不存在时视为空
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    fn save(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for JsonPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }
}

/// 读取所选的流；缺失或未知 URL 回落到默认码率
pub fn selected_stream(prefs: &dyn PreferenceStore, default: Bitrate) -> &'static Stream {
    match prefs.get_string(KEY_STREAM_LINK) {
        Some(url) => catalog::find_by_url(&url).unwrap_or_else(|| {
            log::warn!(
                "[Prefs] unknown stream link {:?}, using {} kbps",
                url,
                default
            );
            catalog::stream(default)
        }),
        None => catalog::stream(default),
    }
}

/// 记住所选的流
pub fn remember_stream(prefs: &mut dyn PreferenceStore, stream: &Stream) -> Result<(), CoreError> {
    prefs.set_string(KEY_STREAM_LINK, stream.url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_roundtrips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = JsonPreferences::open(&path).unwrap();
        assert_eq!(
            selected_stream(&prefs, Bitrate::Kbps128).bitrate,
            Bitrate::Kbps128
        );
        remember_stream(&mut prefs, catalog::stream(Bitrate::Kbps24)).unwrap();

        let reopened = JsonPreferences::open(&path).unwrap();
        assert_eq!(
            reopened.get_string(KEY_STREAM_LINK).as_deref(),
            Some("http://stream.dubstep.fm/24mp3")
        );
        assert_eq!(
            selected_stream(&reopened, Bitrate::Kbps128).bitrate,
            Bitrate::Kbps24
        );
    }

    #[test]
    fn test_unknown_link_falls_back_to_default() {
        let mut prefs = MemoryPreferences::new();
        prefs
            .set_string(KEY_STREAM_LINK, "http://example.com/old")
            .unwrap();
        assert_eq!(
            selected_stream(&prefs, Bitrate::Kbps64).bitrate,
            Bitrate::Kbps64
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonPreferences::open(&path),
            Err(CoreError::Json(_))
        ));
    }
}
