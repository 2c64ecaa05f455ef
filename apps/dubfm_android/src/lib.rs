//! dubfm Android JNI 绑定
//!
//! `com.dubstep.fm.NativeCore` 的本地实现。Kotlin 侧传入一个监听对象，
//! 核心通过它回调媒体会话、前台通知和音频焦点；所有回调都发生在
//! 核心的调度线程上（已永久附加到 JVM）。
//!
//! 交给 Kotlin 的句柄是注册表里的编号而不是指针，重复 `destroy` 或
//! 销毁后的调用都只是空操作。

use std::collections::BTreeMap;
use std::ptr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::{jboolean, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};

use dubfm_core::prefs::{PreferenceStore, KEY_STREAM_LINK};
use dubfm_core::{
    spawn_core, AudioFocusManager, Bitrate, CoreConfig, CoreError, CoreHandle,
    DefaultNotificationBuilder, FocusChange, ForegroundHost, KeyEvent, MemoryPreferences,
    Notification, PlaybackSnapshot, Platform, SessionSink, TrackMetadata,
};
use dubfm_player::StreamPlayer;

/// 初始化日志（Android）
#[cfg(target_os = "android")]
fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("DubFM"),
    );
}

#[cfg(not(target_os = "android"))]
fn init_logging() {}

#[derive(thiserror::Error, Debug)]
enum BridgeError {
    #[error("JNI error: {0}")]
    Jni(#[from] jni::errors::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Kotlin 监听对象
struct JavaListener {
    vm: JavaVM,
    listener: GlobalRef,
}

impl JavaListener {
    fn invoke<T: Default>(
        &self,
        name: &str,
        f: impl FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<T>,
    ) -> T {
        let mut env = match self.vm.attach_current_thread_permanently() {
            Ok(env) => env,
            Err(e) => {
                log::error!("[Jni] attach for {} failed: {}", name, e);
                return T::default();
            }
        };

        let listener = self.listener.as_obj();
        match env.with_local_frame(8, |env| f(env, listener)) {
            Ok(value) => value,
            Err(e) => {
                log::error!("[Jni] {} failed: {}", name, e);
                if env.exception_check().unwrap_or(false) {
                    let _ = env.exception_describe();
                    let _ = env.exception_clear();
                }
                T::default()
            }
        }
    }
}

fn optional_string<'local>(
    env: &mut JNIEnv<'local>,
    value: Option<&str>,
) -> jni::errors::Result<JObject<'local>> {
    match value {
        Some(s) => Ok(env.new_string(s)?.into()),
        None => Ok(JObject::null()),
    }
}

struct JavaSession(Arc<JavaListener>);

impl SessionSink for JavaSession {
    fn set_playback_state(&mut self, snapshot: &PlaybackSnapshot) {
        self.0.invoke("onPlaybackState", |env, listener| {
            let message = optional_string(env, snapshot.error_message.as_deref())?;
            env.call_method(
                listener,
                "onPlaybackState",
                "(IJFLjava/lang/String;)V",
                &[
                    JValue::Int(snapshot.state.code()),
                    JValue::Long(snapshot.actions.bits() as jlong),
                    JValue::Float(snapshot.speed),
                    JValue::Object(&message),
                ],
            )?;
            Ok(())
        })
    }

    fn set_metadata(&mut self, metadata: &TrackMetadata) {
        self.0.invoke("onMetadata", |env, listener| {
            let title: JObject = env.new_string(&metadata.title)?.into();
            let artist: JObject = env.new_string(&metadata.artist)?.into();
            env.call_method(
                listener,
                "onMetadata",
                "(Ljava/lang/String;Ljava/lang/String;J)V",
                &[
                    JValue::Object(&title),
                    JValue::Object(&artist),
                    JValue::Long(metadata.duration_ms as jlong),
                ],
            )?;
            Ok(())
        })
    }

    fn release(&mut self) -> Result<(), CoreError> {
        let released = self.0.invoke("releaseSession", |env, listener| {
            env.call_method(listener, "releaseSession", "()V", &[])?;
            Ok(true)
        });
        if released {
            Ok(())
        } else {
            Err(CoreError::Session("releaseSession callback failed".to_string()))
        }
    }
}

struct JavaForeground(Arc<JavaListener>);

impl ForegroundHost for JavaForeground {
    fn show_foreground(&mut self, notification: Notification) {
        self.0.invoke("showForeground", |env, listener| {
            let title: JObject = env.new_string(&notification.title)?.into();
            let text: JObject = env.new_string(&notification.text)?.into();
            env.call_method(
                listener,
                "showForeground",
                "(ILjava/lang/String;Ljava/lang/String;)V",
                &[
                    JValue::Int(notification.status.code()),
                    JValue::Object(&title),
                    JValue::Object(&text),
                ],
            )?;
            Ok(())
        })
    }

    /// 不保留通知时状态码为 -1，标题和正文为 null
    fn hide_foreground(&mut self, notification: Option<Notification>) {
        self.0.invoke("hideForeground", |env, listener| {
            let code = notification.as_ref().map_or(-1, |n| n.status.code());
            let title = optional_string(env, notification.as_ref().map(|n| n.title.as_str()))?;
            let text = optional_string(env, notification.as_ref().map(|n| n.text.as_str()))?;
            env.call_method(
                listener,
                "hideForeground",
                "(ILjava/lang/String;Ljava/lang/String;)V",
                &[JValue::Int(code), JValue::Object(&title), JValue::Object(&text)],
            )?;
            Ok(())
        })
    }
}

struct JavaFocus(Arc<JavaListener>);

impl AudioFocusManager for JavaFocus {
    fn request_focus(&mut self) -> bool {
        self.0.invoke("requestAudioFocus", |env, listener| {
            env.call_method(listener, "requestAudioFocus", "()Z", &[])?.z()
        })
    }

    fn abandon_focus(&mut self) {
        self.0.invoke("abandonAudioFocus", |env, listener| {
            env.call_method(listener, "abandonAudioFocus", "()V", &[])?;
            Ok(())
        })
    }
}

fn init_impl(
    env: &mut JNIEnv<'_>,
    listener: JObject<'_>,
    link: JString<'_>,
) -> Result<CoreHandle, BridgeError> {
    let callbacks = Arc::new(JavaListener {
        vm: env.get_java_vm()?,
        listener: env.new_global_ref(listener)?,
    });

    let mut prefs = MemoryPreferences::new();
    if !link.is_null() {
        let link: String = env.get_string(&link)?.into();
        prefs.set_string(KEY_STREAM_LINK, &link)?;
    }

    let config = CoreConfig::default();
    let platform = Platform {
        session: Box::new(JavaSession(callbacks.clone())),
        foreground: Box::new(JavaForeground(callbacks.clone())),
        focus: Box::new(JavaFocus(callbacks)),
        notifications: Box::new(DefaultNotificationBuilder::new(config.station_name.as_str())),
    };

    let engine_config = config.engine.clone();
    let core = spawn_core(config, &prefs, platform, |events| {
        Box::new(StreamPlayer::spawn(engine_config, Arc::new(events)))
    })?;
    Ok(core)
}

/// 存活的核心，键即 `init` 返回给 Kotlin 的句柄
static CORES: Mutex<BTreeMap<jlong, Arc<CoreHandle>>> = Mutex::new(BTreeMap::new());
static NEXT_HANDLE: AtomicI64 = AtomicI64::new(1);

fn cores() -> MutexGuard<'static, BTreeMap<jlong, Arc<CoreHandle>>> {
    CORES.lock().unwrap_or_else(|e| e.into_inner())
}

fn register(core: CoreHandle) -> jlong {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    cores().insert(handle, Arc::new(core));
    handle
}

fn core_ref(handle: jlong) -> Option<Arc<CoreHandle>> {
    let core = cores().get(&handle).cloned();
    if core.is_none() {
        log::warn!("[Jni] call on unknown core handle {}", handle);
    }
    core
}

/// 注销并销毁核心；句柄未知或已销毁时返回 `false`
fn destroy_core(handle: jlong) -> bool {
    let core = cores().remove(&handle);
    match core {
        Some(core) => {
            core.destroy();
            true
        }
        None => {
            log::debug!("[Jni] core handle {} already destroyed", handle);
            false
        }
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// JNI: 创建核心
///
/// @param listener 回调对象
/// @param link 已保存的流地址（偏好键 "link"），可为 null
/// @return 核心句柄；失败返回 0
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_init<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    listener: JObject<'local>,
    link: JString<'local>,
) -> jlong {
    init_logging();
    match init_impl(&mut env, listener, link) {
        Ok(core) => register(core),
        Err(e) => {
            log::error!("[Jni] init failed: {}", e);
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_play(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if let Some(core) = core_ref(handle) {
        core.play();
    }
}

#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_pause(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if let Some(core) = core_ref(handle) {
        core.pause();
    }
}

#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_stop(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if let Some(core) = core_ref(handle) {
        core.stop();
    }
}

#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_toggle(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if let Some(core) = core_ref(handle) {
        core.toggle();
    }
}

/// JNI: 媒体键
///
/// @param action KeyEvent.getAction()
/// @param code KeyEvent.getKeyCode()
/// @return 是否消费
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_mediaKey(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    action: jint,
    code: jint,
) -> jboolean {
    let handled = core_ref(handle)
        .map(|core| core.media_key(KeyEvent::from_android(action, code)))
        .unwrap_or(false);
    to_jboolean(handled)
}

/// JNI: ACTION_AUDIO_BECOMING_NOISY
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_becomingNoisy(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if let Some(core) = core_ref(handle) {
        core.becoming_noisy();
    }
}

/// JNI: OnAudioFocusChangeListener
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_focusChanged(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    change: jint,
) {
    let Some(core) = core_ref(handle) else {
        return;
    };
    match FocusChange::from_android(change) {
        Some(change) => core.focus_changed(change),
        None => log::debug!("[Jni] ignoring audio focus code {}", change),
    }
}

/// JNI: 切换码率
///
/// @return 码率未知时返回 false
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_selectBitrate(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    kbps: jint,
) -> jboolean {
    let Some(core) = core_ref(handle) else {
        return JNI_FALSE;
    };
    match u32::try_from(kbps).ok().and_then(Bitrate::from_kbps) {
        Some(bitrate) => {
            core.select_stream(bitrate);
            JNI_TRUE
        }
        None => {
            log::warn!("[Jni] unknown bitrate {}", kbps);
            JNI_FALSE
        }
    }
}

/// JNI: 当前状态文本（如 "playing"、"error: ..."）
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_status<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
) -> jstring {
    let Some(core) = core_ref(handle) else {
        return ptr::null_mut();
    };
    match env.new_string(core.status().to_string()) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            log::error!("[Jni] status string failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// JNI: 销毁核心并释放句柄；可重复调用
#[no_mangle]
pub extern "system" fn Java_com_dubstep_fm_NativeCore_destroy(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    destroy_core(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dubfm_core::PlaybackStatus;
    use dubfm_player::{PlayerEngine, PlayerError};

    /// 什么都不做的平台和引擎
    struct Quiet;

    impl SessionSink for Quiet {
        fn set_playback_state(&mut self, _: &PlaybackSnapshot) {}
        fn set_metadata(&mut self, _: &TrackMetadata) {}
        fn release(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    impl ForegroundHost for Quiet {
        fn show_foreground(&mut self, _: Notification) {}
        fn hide_foreground(&mut self, _: Option<Notification>) {}
    }

    impl AudioFocusManager for Quiet {
        fn request_focus(&mut self) -> bool {
            true
        }
        fn abandon_focus(&mut self) {}
    }

    impl PlayerEngine for Quiet {
        fn play(&self, _: &str) {}
        fn stop(&self) {}
        fn is_playing(&self) -> bool {
            false
        }
        fn set_volume(&self, _: f32) {}
        fn destroy(&self) -> Result<(), PlayerError> {
            Ok(())
        }
    }

    fn quiet_core() -> CoreHandle {
        let platform = Platform {
            session: Box::new(Quiet),
            foreground: Box::new(Quiet),
            focus: Box::new(Quiet),
            notifications: Box::new(DefaultNotificationBuilder::new("dubstep.fm")),
        };
        spawn_core(CoreConfig::default(), &MemoryPreferences::new(), platform, |_| {
            Box::new(Quiet)
        })
        .unwrap()
    }

    #[test]
    fn test_destroy_twice_is_noop() {
        let handle = register(quiet_core());
        assert_ne!(handle, 0);

        let core = core_ref(handle).unwrap();
        core.play();
        assert!(destroy_core(handle));
        assert_eq!(core.status(), PlaybackStatus::Stopped);

        assert!(!destroy_core(handle));
        assert!(core_ref(handle).is_none());
        assert!(!core.send(dubfm_core::MediaEvent::User(dubfm_core::Command::Play)));
    }

    #[test]
    fn test_unknown_handles_are_ignored() {
        assert!(core_ref(0).is_none());
        assert!(!destroy_core(0));
        assert!(!destroy_core(-42));
    }
}
