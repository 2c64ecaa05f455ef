//! 媒体会话
//!
//! 把当前播放状态和曲目元数据镜像到系统的媒体会话对象上。
//! 状态码和动作位沿用 Android `PlaybackStateCompat` 的数值。

use std::ops::BitOr;

use dubfm_player::PlaybackStatus;

use crate::CoreError;

/// 直播流的占位时长
pub const PLACEHOLDER_DURATION_MS: u64 = 10_000;

/// 会话允许的传输动作（位集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actions(u64);

impl Actions {
    pub const NONE: Actions = Actions(0);
    pub const STOP: Actions = Actions(1);
    pub const PAUSE: Actions = Actions(2);
    pub const PLAY: Actions = Actions(4);
    pub const PLAY_PAUSE: Actions = Actions(512);

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        Actions(self.0 | rhs.0)
    }
}

/// 会话播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPlayback {
    None,
    Stopped,
    Paused,
    Playing,
    Buffering,
    Error,
}

impl SessionPlayback {
    pub fn code(self) -> i32 {
        match self {
            SessionPlayback::None => 0,
            SessionPlayback::Stopped => 1,
            SessionPlayback::Paused => 2,
            SessionPlayback::Playing => 3,
            SessionPlayback::Buffering => 6,
            SessionPlayback::Error => 7,
        }
    }
}

/// 推送给会话的一次状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: SessionPlayback,
    pub actions: Actions,
    pub speed: f32,
    pub error_message: Option<String>,
}

impl PlaybackSnapshot {
    pub fn for_status(status: &PlaybackStatus) -> Self {
        let (state, actions) = match status {
            PlaybackStatus::Idle => (SessionPlayback::None, Actions::PLAY),
            PlaybackStatus::Loading => (SessionPlayback::Buffering, Actions::PAUSE | Actions::STOP),
            PlaybackStatus::Playing => (SessionPlayback::Playing, Actions::PAUSE | Actions::STOP),
            PlaybackStatus::Paused => (SessionPlayback::Paused, Actions::PLAY | Actions::STOP),
            PlaybackStatus::Stopped => (SessionPlayback::Stopped, Actions::PLAY),
            PlaybackStatus::Error(_) => (SessionPlayback::Error, Actions::PLAY),
        };

        Self {
            state,
            actions,
            speed: if status.is_playing() { 1.0 } else { 0.0 },
            error_message: match status {
                PlaybackStatus::Error(message) => Some(message.clone()),
                _ => None,
            },
        }
    }
}

/// 曲目元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
}

impl TrackMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: String::new(),
            duration_ms: PLACEHOLDER_DURATION_MS,
        }
    }
}

/// 平台媒体会话对象
pub trait SessionSink: Send {
    fn set_playback_state(&mut self, snapshot: &PlaybackSnapshot);
    fn set_metadata(&mut self, metadata: &TrackMetadata);
    fn release(&mut self) -> Result<(), CoreError>;
}

/// 通知构建时看到的会话内容
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub status: &'a PlaybackStatus,
    pub metadata: &'a TrackMetadata,
}

/// 会话状态：一个播放状态 + 一份元数据 + 平台句柄
pub struct MediaSession {
    sink: Box<dyn SessionSink>,
    status: PlaybackStatus,
    metadata: TrackMetadata,
}

impl MediaSession {
    /// 创建会话并立即发布初始状态和元数据
    pub fn new(
        mut sink: Box<dyn SessionSink>,
        status: PlaybackStatus,
        metadata: TrackMetadata,
    ) -> Self {
        sink.set_playback_state(&PlaybackSnapshot::for_status(&status));
        sink.set_metadata(&metadata);
        Self {
            sink,
            status,
            metadata,
        }
    }

    pub fn status(&self) -> &PlaybackStatus {
        &self.status
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            status: &self.status,
            metadata: &self.metadata,
        }
    }

    /// 发布新状态；与当前状态相同时不发布，返回 `false`
    pub fn publish_status(&mut self, status: &PlaybackStatus) -> bool {
        if self.status == *status {
            return false;
        }
        self.status = status.clone();
        self.sink
            .set_playback_state(&PlaybackSnapshot::for_status(status));
        true
    }

    /// 更新标题；相同标题不发布
    pub fn publish_title(&mut self, title: &str) -> bool {
        if self.metadata.title == title {
            return false;
        }
        self.metadata.title = title.to_string();
        self.sink.set_metadata(&self.metadata);
        true
    }

    pub fn release(mut self) -> Result<(), CoreError> {
        self.sink.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<PlaybackSnapshot>>>);

    impl SessionSink for Recorded {
        fn set_playback_state(&mut self, snapshot: &PlaybackSnapshot) {
            self.0.lock().unwrap().push(snapshot.clone());
        }

        fn set_metadata(&mut self, _metadata: &TrackMetadata) {}

        fn release(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_action_sets_follow_status() {
        let playing = PlaybackSnapshot::for_status(&PlaybackStatus::Playing);
        assert_eq!(playing.state.code(), 3);
        assert_eq!(playing.actions.bits(), 3);
        assert_eq!(playing.speed, 1.0);

        let loading = PlaybackSnapshot::for_status(&PlaybackStatus::Loading);
        assert_eq!(loading.state, SessionPlayback::Buffering);
        assert_eq!(loading.speed, 0.0);

        let paused = PlaybackSnapshot::for_status(&PlaybackStatus::Paused);
        assert!(paused.actions.contains(Actions::PLAY | Actions::STOP));
        assert!(!paused.actions.contains(Actions::PAUSE));

        let stopped = PlaybackSnapshot::for_status(&PlaybackStatus::Stopped);
        assert_eq!(stopped.actions, Actions::PLAY);
    }

    #[test]
    fn test_error_snapshot_carries_message() {
        let snapshot =
            PlaybackSnapshot::for_status(&PlaybackStatus::Error("network timeout".into()));
        assert_eq!(snapshot.state.code(), 7);
        assert_eq!(snapshot.error_message.as_deref(), Some("network timeout"));
        assert_eq!(snapshot.actions, Actions::PLAY);
    }

    #[test]
    fn test_identical_status_not_republished() {
        let sink = Recorded::default();
        let mut session = MediaSession::new(
            Box::new(sink.clone()),
            PlaybackStatus::Stopped,
            TrackMetadata::titled("dubstep.fm"),
        );

        assert!(session.publish_status(&PlaybackStatus::Loading));
        assert!(!session.publish_status(&PlaybackStatus::Loading));
        assert!(session.publish_status(&PlaybackStatus::Playing));

        let states: Vec<_> = sink.0.lock().unwrap().iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                SessionPlayback::Stopped,
                SessionPlayback::Buffering,
                SessionPlayback::Playing
            ]
        );
    }

    #[test]
    fn test_placeholder_metadata() {
        let meta = TrackMetadata::titled("Artist - Song");
        assert_eq!(meta.artist, "");
        assert_eq!(meta.duration_ms, 10_000);
    }
}
