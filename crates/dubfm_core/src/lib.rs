//! dubfm 播放编排核心
//!
//! 把 UI、硬件媒体键、系统音频焦点和播放引擎的回调统一成
//! [`MediaEvent`]，在单个调度线程上驱动播放状态机。

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod focus;
pub mod keys;
pub mod notification;
pub mod orchestrator;
pub mod prefs;
pub mod session;

#[cfg(test)]
mod testing;

pub use catalog::{Bitrate, Stream};
pub use config::CoreConfig;
pub use dispatch::{spawn_core, CoreEventSink, CoreHandle, CoreSnapshot};
pub use error::CoreError;
pub use event::{Command, MediaEvent};
pub use focus::{AudioFocusManager, FocusChange};
pub use keys::{KeyEvent, MediaKey};
pub use notification::{
    DefaultNotificationBuilder, ForegroundHost, Notification, NotificationBuilder,
    NotificationStatus,
};
pub use orchestrator::{MediaCore, Platform};
pub use prefs::{JsonPreferences, MemoryPreferences, PreferenceStore};
pub use session::{PlaybackSnapshot, SessionSink, TrackMetadata};

pub use dubfm_player::{PlaybackStatus, PlayerEngine, PlayerEvent};
