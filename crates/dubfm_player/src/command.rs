//! 播放命令、状态和回调定义

use crossbeam_channel::Sender;

/// 引擎命令（调用方 -> 引擎线程）
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    /// 播放指定流；`generation` 用于丢弃过期会话的回调
    Play { url: String, generation: u64 },
    /// 停止当前会话
    Stop,
    /// 设置音量 (0.0 - 1.0)
    SetVolume(f32),
    /// 关闭引擎
    Shutdown,
}

/// 引擎事件（引擎 -> 监听者）
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// 状态变更
    StatusChanged(PlaybackStatus),
    /// 流内曲目名变更（ICY StreamTitle）
    TrackChanged(String),
}

/// 播放状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error(String),
}

impl PlaybackStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }

    /// 正在缓冲或播放
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackStatus::Loading | PlaybackStatus::Playing)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Error(message) => write!(f, "error: {}", message),
            other => f.write_str(other.label()),
        }
    }
}

/// 播放失败，只携带可读信息
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PlaybackError {
    pub message: String,
}

impl PlaybackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<PlaybackError> for PlaybackStatus {
    fn from(err: PlaybackError) -> Self {
        PlaybackStatus::Error(err.message)
    }
}

/// 引擎回调
///
/// 每次底层状态变化或曲目名变化时，恰好调用其中一个方法，
/// 调用发生在观察到该变化的引擎线程上。实现方不得在回调内
/// 同步回调引擎（`play`/`stop`），应转投到自己的队列。
pub trait PlayerListener: Send + Sync {
    fn on_status_changed(&self, status: PlaybackStatus);
    fn on_track_changed(&self, title: String);
}

impl PlayerListener for Sender<PlayerEvent> {
    fn on_status_changed(&self, status: PlaybackStatus) {
        let _ = self.send(PlayerEvent::StatusChanged(status));
    }

    fn on_track_changed(&self, title: String) {
        let _ = self.send(PlayerEvent::TrackChanged(title));
    }
}
