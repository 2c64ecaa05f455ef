//! 播放编排
//!
//! [`MediaCore`] 是播放状态的唯一持有者。所有输入（UI、硬件键、系统
//! 焦点、引擎回调）都变成 [`MediaEvent`]，由 [`MediaCore::dispatch`]
//! 在同一线程上依次处理；状态变化后再同步到会话和通知。

use dubfm_player::{PlaybackStatus, PlayerEngine, PlayerEvent};

use crate::catalog::{self, Stream};
use crate::event::{Command, MediaEvent};
use crate::focus::{AudioFocusArbiter, AudioFocusManager, FocusChange, FocusDecision};
use crate::notification::{
    ForegroundHost, Notification, NotificationBuilder, NotificationStatus, Presentation,
};
use crate::prefs::{self, PreferenceStore};
use crate::session::{MediaSession, SessionSink, TrackMetadata};
use crate::{Bitrate, CoreConfig};

/// 平台侧协作者
pub struct Platform {
    pub session: Box<dyn SessionSink>,
    pub foreground: Box<dyn ForegroundHost>,
    pub focus: Box<dyn AudioFocusManager>,
    pub notifications: Box<dyn NotificationBuilder>,
}

pub struct MediaCore {
    config: CoreConfig,
    status: PlaybackStatus,
    current: &'static Stream,
    engine: Option<Box<dyn PlayerEngine>>,
    session: Option<MediaSession>,
    foreground: Box<dyn ForegroundHost>,
    notifications: Box<dyn NotificationBuilder>,
    focus: AudioFocusArbiter,
    presentation: Presentation,
    destroyed: bool,
}

impl MediaCore {
    /// 创建核心；所选流从偏好中读取一次
    pub fn new(
        config: CoreConfig,
        prefs: &dyn PreferenceStore,
        engine: Box<dyn PlayerEngine>,
        platform: Platform,
    ) -> Self {
        let current = prefs::selected_stream(prefs, config.default_bitrate);
        let status = PlaybackStatus::Stopped;
        let session = MediaSession::new(
            platform.session,
            status.clone(),
            TrackMetadata::titled(config.station_name.as_str()),
        );

        log::info!(
            "[Core] ready, stream {} kbps ({})",
            current.bitrate,
            current.url
        );

        Self {
            config,
            status,
            current,
            engine: Some(engine),
            session: Some(session),
            foreground: platform.foreground,
            notifications: platform.notifications,
            focus: AudioFocusArbiter::new(platform.focus),
            presentation: Presentation::Hidden,
            destroyed: false,
        }
    }

    pub fn status(&self) -> &PlaybackStatus {
        &self.status
    }

    pub fn current_stream(&self) -> &'static Stream {
        self.current
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.session.as_ref().map(|s| s.metadata())
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// 处理一个事件
    ///
    /// 媒体键返回是否被消费（只有处理了的按下事件为 `true`）；
    /// 其它事件在核心存活时返回 `true`。
    pub fn dispatch(&mut self, event: MediaEvent) -> bool {
        if self.destroyed {
            log::debug!("[Core] ignoring {:?} after destroy", event);
            return false;
        }
        log::debug!("[Core] dispatch {:?} while {}", event, self.status);

        match event {
            MediaEvent::User(command) | MediaEvent::Transport(command) => {
                self.run_command(command);
            }
            MediaEvent::MediaKey(key) => match key.command() {
                Some(command) => self.run_command(command),
                None => return false,
            },
            MediaEvent::BecomingNoisy => {
                if self.status.is_active() {
                    log::info!("[Core] audio output becoming noisy, stopping");
                    self.halt(PlaybackStatus::Stopped);
                }
            }
            MediaEvent::FocusChanged(change) => self.on_focus_changed(change),
            MediaEvent::SelectStream(bitrate) => self.select_stream(bitrate),
            MediaEvent::Player(PlayerEvent::StatusChanged(status)) => self.on_engine_status(status),
            MediaEvent::Player(PlayerEvent::TrackChanged(title)) => self.on_track_changed(&title),
            MediaEvent::Destroy => self.destroy(),
        }
        true
    }

    /// 拆除引擎和会话；之后的事件都被忽略
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        log::info!("[Core] destroying");

        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.destroy() {
                log::error!("[Core] engine teardown failed: {}", e);
            }
        }

        self.focus.abandon();
        if self.presentation.is_visible() {
            self.foreground.hide_foreground(None);
            self.presentation = Presentation::Hidden;
        }

        self.status = PlaybackStatus::Stopped;
        if let Some(mut session) = self.session.take() {
            session.publish_status(&self.status);
            if let Err(e) = session.release() {
                log::error!("[Core] media session release failed: {}", e);
            }
        }
    }

    fn run_command(&mut self, command: Command) {
        self.focus.clear_resume();
        match command {
            Command::Play => self.start(),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
            Command::Toggle if self.status.is_playing() => self.stop(),
            Command::Toggle => self.start(),
        }
    }

    fn start(&mut self) {
        if self.status.is_active() {
            log::debug!("[Core] already {}, ignoring play", self.status);
            return;
        }

        self.focus.request();
        self.transition(PlaybackStatus::Loading, true);

        log::info!("[Core] starting {}", self.current.url);
        if let Some(engine) = &self.engine {
            engine.play(self.current.url);
        }
    }

    fn stop(&mut self) {
        if matches!(self.status, PlaybackStatus::Stopped | PlaybackStatus::Idle) {
            log::debug!("[Core] nothing to stop");
            return;
        }
        self.halt(PlaybackStatus::Stopped);
    }

    fn pause(&mut self) {
        if !self.status.is_active() {
            log::debug!("[Core] nothing to pause while {}", self.status);
            return;
        }
        self.halt(PlaybackStatus::Paused);
    }

    /// 所有停止路径：停引擎、释放焦点、切换状态
    fn halt(&mut self, next: PlaybackStatus) {
        if let Some(engine) = &self.engine {
            engine.stop();
        }
        self.focus.abandon();
        self.transition(next, true);
    }

    fn on_engine_status(&mut self, status: PlaybackStatus) {
        // 引擎只能由核心启动；核心不在缓冲/播放时收到的报告来自已停止的会话
        if !self.status.is_active() {
            log::debug!(
                "[Core] dropping engine status {} while {}",
                status,
                self.status
            );
            return;
        }

        match status {
            PlaybackStatus::Loading => self.transition(PlaybackStatus::Loading, false),
            PlaybackStatus::Playing => self.transition(PlaybackStatus::Playing, true),
            PlaybackStatus::Error(message) => {
                log::warn!("[Core] playback failed: {}", message);
                self.focus.abandon();
                self.transition(PlaybackStatus::Error(message), true);
            }
            PlaybackStatus::Stopped => {
                log::info!("[Core] stream ended");
                self.focus.abandon();
                self.transition(PlaybackStatus::Stopped, true);
            }
            PlaybackStatus::Idle | PlaybackStatus::Paused => {
                log::debug!("[Core] ignoring engine status {}", status);
            }
        }
    }

    fn on_track_changed(&mut self, title: &str) {
        let changed = match self.session.as_mut() {
            Some(session) => session.publish_title(title),
            None => false,
        };
        if !changed {
            return;
        }

        log::info!("[Core] now playing: {}", title);
        if self.presentation.is_visible() {
            self.apply(self.presentation);
        }
    }

    fn on_focus_changed(&mut self, change: FocusChange) {
        match self.focus.on_change(change, self.status.is_playing()) {
            FocusDecision::Ignore => {
                log::debug!("[Core] focus {:?} ignored while {}", change, self.status);
            }
            FocusDecision::Stop => {
                log::info!("[Core] audio focus lost ({:?}), stopping", change);
                self.halt(PlaybackStatus::Stopped);
            }
            FocusDecision::Duck => {
                if let Some(engine) = &self.engine {
                    engine.set_volume(self.config.duck_volume);
                }
            }
            FocusDecision::Regained { resume } => {
                if let Some(engine) = &self.engine {
                    engine.set_volume(1.0);
                }
                if resume && !self.status.is_active() {
                    log::info!("[Core] audio focus regained, resuming");
                    self.start();
                }
            }
        }
    }

    fn select_stream(&mut self, bitrate: Bitrate) {
        let stream = catalog::stream(bitrate);
        if stream.url == self.current.url {
            log::debug!("[Core] {} kbps already selected", bitrate);
            return;
        }
        log::info!(
            "[Core] stream switched to {} kbps, applies on next play",
            bitrate
        );
        self.current = stream;
    }

    /// 切换状态并同步会话；`refresh` 为 `false` 时只在前台/非前台
    /// 发生变化时才更新通知
    fn transition(&mut self, next: PlaybackStatus, refresh: bool) {
        if self.status == next {
            return;
        }
        log::info!("[Core] {} -> {}", self.status, next);
        self.status = next;

        if let Some(session) = self.session.as_mut() {
            session.publish_status(&self.status);
        }

        let target = Presentation::for_status(&self.status);
        if !refresh && target.is_foreground() && self.presentation.is_foreground() {
            return;
        }
        self.apply(target);
    }

    fn apply(&mut self, target: Presentation) {
        match target {
            Presentation::Foreground(status) => {
                if let Some(notification) = self.build(status) {
                    self.foreground.show_foreground(notification);
                }
            }
            Presentation::Detached(status) => {
                let notification = self.build(status);
                self.foreground.hide_foreground(notification);
            }
            Presentation::Hidden => {
                if self.presentation.is_visible() {
                    self.foreground.hide_foreground(None);
                }
            }
        }
        self.presentation = target;
    }

    fn build(&self, status: NotificationStatus) -> Option<Notification> {
        let session = self.session.as_ref()?;
        Some(self.notifications.build(&session.view(), status))
    }
}

impl Drop for MediaCore {
    fn drop(&mut self) {
        self.destroy();
    }
}
