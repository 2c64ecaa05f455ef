//! 通知展示
//!
//! 构建器只负责生成内容，前台宿主负责显示/隐藏的副作用。

use dubfm_player::PlaybackStatus;

use crate::session::{Actions, SessionView};

/// 通知变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Loading,
    Play,
    Pause,
    Error,
}

impl NotificationStatus {
    pub fn code(self) -> i32 {
        match self {
            NotificationStatus::Loading => 0,
            NotificationStatus::Play => 1,
            NotificationStatus::Pause => 2,
            NotificationStatus::Error => 3,
        }
    }
}

/// 已构建的通知
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub status: NotificationStatus,
    pub title: String,
    pub text: String,
    pub actions: Actions,
}

pub trait NotificationBuilder: Send {
    fn build(&self, session: &SessionView<'_>, status: NotificationStatus) -> Notification;
}

/// 前台服务宿主
pub trait ForegroundHost: Send {
    /// 以前台方式显示（或替换）通知
    fn show_foreground(&mut self, notification: Notification);
    /// 退出前台；`Some` 时保留一条可划掉的通知
    fn hide_foreground(&mut self, notification: Option<Notification>);
}

/// 默认构建器
#[derive(Debug, Clone)]
pub struct DefaultNotificationBuilder {
    station_name: String,
}

impl DefaultNotificationBuilder {
    pub fn new(station_name: impl Into<String>) -> Self {
        Self {
            station_name: station_name.into(),
        }
    }
}

impl NotificationBuilder for DefaultNotificationBuilder {
    fn build(&self, session: &SessionView<'_>, status: NotificationStatus) -> Notification {
        let title = if session.metadata.title.trim().is_empty() {
            self.station_name.clone()
        } else {
            session.metadata.title.clone()
        };

        let text = match (status, session.status) {
            (NotificationStatus::Error, PlaybackStatus::Error(message)) => message.clone(),
            (NotificationStatus::Error, _) => "Playback failed".to_string(),
            (NotificationStatus::Loading, _) => "Buffering...".to_string(),
            (NotificationStatus::Play, _) => format!("Listening to {}", self.station_name),
            (NotificationStatus::Pause, _) => "Paused".to_string(),
        };

        let actions = match status {
            NotificationStatus::Loading | NotificationStatus::Play => Actions::STOP,
            NotificationStatus::Pause | NotificationStatus::Error => Actions::PLAY,
        };

        Notification {
            status,
            title,
            text,
            actions,
        }
    }
}

/// 通知的呈现方式，完全由播放状态决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Foreground(NotificationStatus),
    Detached(NotificationStatus),
    Hidden,
}

impl Presentation {
    pub fn for_status(status: &PlaybackStatus) -> Self {
        match status {
            PlaybackStatus::Loading => Presentation::Foreground(NotificationStatus::Loading),
            PlaybackStatus::Playing => Presentation::Foreground(NotificationStatus::Play),
            PlaybackStatus::Paused => Presentation::Detached(NotificationStatus::Pause),
            PlaybackStatus::Error(_) => Presentation::Detached(NotificationStatus::Error),
            PlaybackStatus::Idle | PlaybackStatus::Stopped => Presentation::Hidden,
        }
    }

    pub fn is_visible(self) -> bool {
        !matches!(self, Presentation::Hidden)
    }

    pub fn is_foreground(self) -> bool {
        matches!(self, Presentation::Foreground(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TrackMetadata;

    #[test]
    fn test_presentation_for_status() {
        assert_eq!(
            Presentation::for_status(&PlaybackStatus::Loading),
            Presentation::Foreground(NotificationStatus::Loading)
        );
        assert_eq!(
            Presentation::for_status(&PlaybackStatus::Playing),
            Presentation::Foreground(NotificationStatus::Play)
        );
        assert_eq!(
            Presentation::for_status(&PlaybackStatus::Paused),
            Presentation::Detached(NotificationStatus::Pause)
        );
        assert_eq!(
            Presentation::for_status(&PlaybackStatus::Error("x".into())),
            Presentation::Detached(NotificationStatus::Error)
        );
        assert!(!Presentation::for_status(&PlaybackStatus::Stopped).is_visible());
        assert!(!Presentation::for_status(&PlaybackStatus::Idle).is_visible());
    }

    #[test]
    fn test_default_builder_falls_back_to_station_name() {
        let builder = DefaultNotificationBuilder::new("dubstep.fm");
        let status = PlaybackStatus::Playing;
        let metadata = TrackMetadata::titled("");
        let view = SessionView {
            status: &status,
            metadata: &metadata,
        };

        let n = builder.build(&view, NotificationStatus::Play);
        assert_eq!(n.title, "dubstep.fm");
        assert_eq!(n.actions, Actions::STOP);
    }

    #[test]
    fn test_error_notification_shows_message() {
        let builder = DefaultNotificationBuilder::new("dubstep.fm");
        let status = PlaybackStatus::Error("network timeout".into());
        let metadata = TrackMetadata::titled("Artist - Song");
        let view = SessionView {
            status: &status,
            metadata: &metadata,
        };

        let n = builder.build(&view, NotificationStatus::Error);
        assert_eq!(n.title, "Artist - Song");
        assert_eq!(n.text, "network timeout");
        assert_eq!(n.actions, Actions::PLAY);
    }
}
