//! 测试替身：记录所有平台调用

use std::sync::{Arc, Mutex};

use dubfm_player::{PlayerEngine, PlayerError};

use crate::focus::AudioFocusManager;
use crate::notification::{DefaultNotificationBuilder, ForegroundHost, Notification, NotificationStatus};
use crate::orchestrator::{MediaCore, Platform};
use crate::prefs::{MemoryPreferences, PreferenceStore};
use crate::session::{PlaybackSnapshot, SessionPlayback, SessionSink, TrackMetadata};
use crate::{CoreConfig, CoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Play(String),
    Stop,
    Volume(f32),
    EngineDestroy,
    Session(SessionPlayback),
    Metadata(String),
    SessionRelease,
    Show(NotificationStatus, String),
    Hide(Option<NotificationStatus>),
    FocusRequest,
    FocusAbandon,
}

#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<Call>>>);

impl Calls {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    /// 取出并清空已记录的调用
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

#[derive(Default)]
pub struct Failures {
    pub engine_destroy: bool,
    pub session_release: bool,
    pub focus_denied: bool,
}

struct FakeEngine {
    calls: Calls,
    fail_destroy: bool,
}

impl PlayerEngine for FakeEngine {
    fn play(&self, url: &str) {
        self.calls.push(Call::Play(url.to_string()));
    }

    fn stop(&self) {
        self.calls.push(Call::Stop);
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn set_volume(&self, volume: f32) {
        self.calls.push(Call::Volume(volume));
    }

    fn destroy(&self) -> Result<(), PlayerError> {
        self.calls.push(Call::EngineDestroy);
        if self.fail_destroy {
            Err(PlayerError::EngineGone)
        } else {
            Ok(())
        }
    }
}

struct FakeSession {
    calls: Calls,
    fail_release: bool,
}

impl SessionSink for FakeSession {
    fn set_playback_state(&mut self, snapshot: &PlaybackSnapshot) {
        self.calls.push(Call::Session(snapshot.state));
    }

    fn set_metadata(&mut self, metadata: &TrackMetadata) {
        self.calls.push(Call::Metadata(metadata.title.clone()));
    }

    fn release(&mut self) -> Result<(), CoreError> {
        self.calls.push(Call::SessionRelease);
        if self.fail_release {
            Err(CoreError::Session("session already released".into()))
        } else {
            Ok(())
        }
    }
}

struct FakeHost {
    calls: Calls,
}

impl ForegroundHost for FakeHost {
    fn show_foreground(&mut self, notification: Notification) {
        self.calls
            .push(Call::Show(notification.status, notification.title));
    }

    fn hide_foreground(&mut self, notification: Option<Notification>) {
        self.calls.push(Call::Hide(notification.map(|n| n.status)));
    }
}

struct FakeFocus {
    calls: Calls,
    grant: bool,
}

impl AudioFocusManager for FakeFocus {
    fn request_focus(&mut self) -> bool {
        self.calls.push(Call::FocusRequest);
        self.grant
    }

    fn abandon_focus(&mut self) {
        self.calls.push(Call::FocusAbandon);
    }
}

pub fn platform(calls: &Calls, failures: &Failures) -> Platform {
    Platform {
        session: Box::new(FakeSession {
            calls: calls.clone(),
            fail_release: failures.session_release,
        }),
        foreground: Box::new(FakeHost {
            calls: calls.clone(),
        }),
        focus: Box::new(FakeFocus {
            calls: calls.clone(),
            grant: !failures.focus_denied,
        }),
        notifications: Box::new(DefaultNotificationBuilder::new("dubstep.fm")),
    }
}

pub fn engine(calls: &Calls, failures: &Failures) -> Box<dyn PlayerEngine> {
    Box::new(FakeEngine {
        calls: calls.clone(),
        fail_destroy: failures.engine_destroy,
    })
}

/// 使用默认配置和空偏好构造，并清空构造期间的调用
pub fn core(calls: &Calls) -> MediaCore {
    core_with(calls, &MemoryPreferences::new(), Failures::default())
}

pub fn core_with(calls: &Calls, prefs: &dyn PreferenceStore, failures: Failures) -> MediaCore {
    let core = MediaCore::new(
        CoreConfig::default(),
        prefs,
        engine(calls, &failures),
        platform(calls, &failures),
    );
    calls.take();
    core
}
