//! 调度事件

use dubfm_player::PlayerEvent;

use crate::focus::FocusChange;
use crate::keys::KeyEvent;
use crate::Bitrate;

/// 用户或系统发出的传输命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    /// 根据当前是否在播放决定播放或停止
    Toggle,
}

/// 核心处理的所有输入
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// 应用内 UI
    User(Command),
    /// 系统媒体会话回调（onPlay / onPause / onStop）
    Transport(Command),
    MediaKey(KeyEvent),
    /// 耳机拔出
    BecomingNoisy,
    FocusChanged(FocusChange),
    SelectStream(Bitrate),
    Player(PlayerEvent),
    Destroy,
}

impl From<PlayerEvent> for MediaEvent {
    fn from(event: PlayerEvent) -> Self {
        MediaEvent::Player(event)
    }
}
