//! 调度线程
//!
//! 一个专用线程独占 [`MediaCore`]，从无界通道依次读取事件。UI、硬件键、
//! 系统焦点和引擎回调都只往通道里投递，状态变化因此是线性的。

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dubfm_player::{PlaybackStatus, PlayerEngine, PlayerEvent, PlayerListener};

use crate::event::{Command, MediaEvent};
use crate::focus::FocusChange;
use crate::keys::KeyEvent;
use crate::orchestrator::{MediaCore, Platform};
use crate::prefs::PreferenceStore;
use crate::{Bitrate, CoreConfig, CoreError};

/// 把引擎回调转投到调度队列
#[derive(Debug, Clone)]
pub struct CoreEventSink {
    tx: Sender<MediaEvent>,
}

impl CoreEventSink {
    pub fn post(&self, event: MediaEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl PlayerListener for CoreEventSink {
    fn on_status_changed(&self, status: PlaybackStatus) {
        self.post(PlayerEvent::StatusChanged(status).into());
    }

    fn on_track_changed(&self, title: String) {
        self.post(PlayerEvent::TrackChanged(title).into());
    }
}

/// 每个事件处理完后发布的状态
#[derive(Debug, Clone, PartialEq)]
pub struct CoreSnapshot {
    pub status: PlaybackStatus,
    pub bitrate: Bitrate,
    pub title: String,
}

impl CoreSnapshot {
    fn of(core: &MediaCore) -> Self {
        Self {
            status: core.status().clone(),
            bitrate: core.current_stream().bitrate,
            title: core
                .metadata()
                .map(|m| m.title.clone())
                .unwrap_or_default(),
        }
    }
}

/// 调度线程句柄
pub struct CoreHandle {
    tx: Sender<MediaEvent>,
    snapshot: Arc<Mutex<CoreSnapshot>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// 构造核心并启动调度线程
///
/// `make_engine` 拿到指向本队列的回调接收者，用它创建引擎。
pub fn spawn_core<F>(
    config: CoreConfig,
    prefs: &dyn PreferenceStore,
    platform: Platform,
    make_engine: F,
) -> Result<CoreHandle, CoreError>
where
    F: FnOnce(CoreEventSink) -> Box<dyn PlayerEngine>,
{
    let (tx, rx) = unbounded();
    let engine = make_engine(CoreEventSink { tx: tx.clone() });
    let core = MediaCore::new(config, prefs, engine, platform);

    let snapshot = Arc::new(Mutex::new(CoreSnapshot::of(&core)));
    let shared = snapshot.clone();

    let thread = thread::Builder::new()
        .name("dubfm-core".to_string())
        .spawn(move || run_dispatch(core, rx, shared))
        .map_err(|e| CoreError::Spawn(e.to_string()))?;

    Ok(CoreHandle {
        tx,
        snapshot,
        thread: Mutex::new(Some(thread)),
    })
}

fn lock_snapshot(snapshot: &Mutex<CoreSnapshot>) -> MutexGuard<'_, CoreSnapshot> {
    snapshot.lock().unwrap_or_else(|e| e.into_inner())
}

fn run_dispatch(mut core: MediaCore, rx: Receiver<MediaEvent>, snapshot: Arc<Mutex<CoreSnapshot>>) {
    log::debug!("[Core] dispatch thread started");

    // 引擎持有发送端，通道不会自行断开，只有 Destroy 结束循环
    for event in rx.iter() {
        let last = matches!(event, MediaEvent::Destroy);
        core.dispatch(event);
        *lock_snapshot(&snapshot) = CoreSnapshot::of(&core);
        if last {
            break;
        }
    }

    core.destroy();
    *lock_snapshot(&snapshot) = CoreSnapshot::of(&core);
    log::debug!("[Core] dispatch thread exiting");
}

impl CoreHandle {
    /// 投递事件；核心已销毁时返回 `false`
    pub fn send(&self, event: MediaEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn play(&self) {
        self.send(MediaEvent::User(Command::Play));
    }

    pub fn pause(&self) {
        self.send(MediaEvent::User(Command::Pause));
    }

    pub fn stop(&self) {
        self.send(MediaEvent::User(Command::Stop));
    }

    pub fn toggle(&self) {
        self.send(MediaEvent::User(Command::Toggle));
    }

    /// 投递媒体键，返回是否会被处理
    pub fn media_key(&self, key: KeyEvent) -> bool {
        if key.command().is_none() {
            return false;
        }
        self.send(MediaEvent::MediaKey(key))
    }

    pub fn becoming_noisy(&self) {
        self.send(MediaEvent::BecomingNoisy);
    }

    pub fn focus_changed(&self, change: FocusChange) {
        self.send(MediaEvent::FocusChanged(change));
    }

    pub fn select_stream(&self, bitrate: Bitrate) {
        self.send(MediaEvent::SelectStream(bitrate));
    }

    pub fn event_sink(&self) -> CoreEventSink {
        CoreEventSink {
            tx: self.tx.clone(),
        }
    }

    pub fn snapshot(&self) -> CoreSnapshot {
        lock_snapshot(&self.snapshot).clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        lock_snapshot(&self.snapshot).status.clone()
    }

    /// 销毁核心并等待调度线程退出；可重复调用
    pub fn destroy(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(handle) = handle {
            let _ = self.tx.send(MediaEvent::Destroy);
            if handle.join().is_err() {
                log::error!("[Core] dispatch thread panicked");
            }
        }
    }
}

impl Drop for CoreHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
