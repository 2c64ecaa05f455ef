//! 硬件媒体键

use crate::event::Command;

pub const KEYCODE_HEADSETHOOK: i32 = 79;
pub const KEYCODE_MEDIA_PLAY_PAUSE: i32 = 85;
pub const KEYCODE_MEDIA_STOP: i32 = 86;
pub const KEYCODE_MEDIA_PLAY: i32 = 126;
pub const KEYCODE_MEDIA_PAUSE: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    Play,
    Pause,
    PlayPause,
    Stop,
    HeadsetHook,
    Other(i32),
}

impl MediaKey {
    pub fn from_keycode(code: i32) -> Self {
        match code {
            KEYCODE_MEDIA_PLAY => MediaKey::Play,
            KEYCODE_MEDIA_PAUSE => MediaKey::Pause,
            KEYCODE_MEDIA_PLAY_PAUSE => MediaKey::PlayPause,
            KEYCODE_MEDIA_STOP => MediaKey::Stop,
            KEYCODE_HEADSETHOOK => MediaKey::HeadsetHook,
            other => MediaKey::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key: MediaKey,
}

impl KeyEvent {
    pub fn down(key: MediaKey) -> Self {
        Self {
            action: KeyAction::Down,
            key,
        }
    }

    /// `action` 为 Android `KeyEvent.ACTION_*`（0 = DOWN）
    pub fn from_android(action: i32, code: i32) -> Self {
        Self {
            action: if action == 0 {
                KeyAction::Down
            } else {
                KeyAction::Up
            },
            key: MediaKey::from_keycode(code),
        }
    }

    /// 只处理按下；其它按键和抬起返回 `None`
    pub fn command(&self) -> Option<Command> {
        if self.action != KeyAction::Down {
            return None;
        }
        match self.key {
            MediaKey::Play => Some(Command::Play),
            MediaKey::Pause => Some(Command::Pause),
            MediaKey::Stop => Some(Command::Stop),
            MediaKey::PlayPause | MediaKey::HeadsetHook => Some(Command::Toggle),
            MediaKey::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_android_key_mapping() {
        assert_eq!(KeyEvent::from_android(0, 126).command(), Some(Command::Play));
        assert_eq!(KeyEvent::from_android(0, 127).command(), Some(Command::Pause));
        assert_eq!(KeyEvent::from_android(0, 86).command(), Some(Command::Stop));
        assert_eq!(KeyEvent::from_android(0, 85).command(), Some(Command::Toggle));
        assert_eq!(KeyEvent::from_android(0, 79).command(), Some(Command::Toggle));
    }

    #[test]
    fn test_key_up_and_unknown_not_handled() {
        assert_eq!(KeyEvent::from_android(1, 126).command(), None);
        assert_eq!(KeyEvent::from_android(0, 24).command(), None);
        assert_eq!(MediaKey::from_keycode(24), MediaKey::Other(24));
    }
}
