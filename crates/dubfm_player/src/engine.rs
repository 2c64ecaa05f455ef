//! 播放引擎

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{
    AudioDecoder, AudioOutput, DecoderError, HttpAudioStream, OutputConfig, OutputError,
    PlaybackError, PlaybackStatus, PlayerCommand, PlayerListener, SharedVolume, StreamError,
};

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// 单次网络读取的超时
    pub read_timeout_secs: u64,
    /// 开始出声前需要排队的采样包数量
    pub prebuffer_packets: usize,
    pub output_buffer_packets: usize,
    /// 是否使用环境变量中的 HTTP 代理
    pub system_proxy: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "dubstep.fm".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 15,
            prebuffer_packets: 32,
            output_buffer_packets: 128,
            system_proxy: true,
        }
    }
}

/// 引擎错误
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error("Audio output error: {0}")]
    Output(#[from] OutputError),

    #[error("Player engine thread is gone")]
    EngineGone,

    #[error("Player engine thread panicked")]
    EnginePanicked,
}

impl From<PlayerError> for PlaybackError {
    fn from(err: PlayerError) -> Self {
        PlaybackError::new(err.to_string())
    }
}

/// 编排层看到的播放器契约
///
/// `play`/`stop` 立即返回，结果通过 [`PlayerListener`] 异步回报。
pub trait PlayerEngine: Send {
    /// 中止当前播放并开始缓冲 `url`
    fn play(&self, url: &str);
    fn stop(&self);
    fn is_playing(&self) -> bool;
    fn set_volume(&self, volume: f32);
    /// 释放全部资源，可重复调用
    fn destroy(&self) -> Result<(), PlayerError>;
}

struct GateState {
    generation: u64,
    status: PlaybackStatus,
}

/// 回调闸门：只有当前代的会话可以上报状态
struct StatusGate {
    state: Mutex<GateState>,
    listener: Arc<dyn PlayerListener>,
}

impl StatusGate {
    fn new(listener: Arc<dyn PlayerListener>) -> Self {
        Self {
            state: Mutex::new(GateState {
                generation: 0,
                status: PlaybackStatus::Idle,
            }),
            listener,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 开启新的一代，之前所有会话的回调从此失效
    fn advance(&self, status: PlaybackStatus) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.status = status;
        state.generation
    }

    fn emit_status(&self, generation: u64, status: PlaybackStatus) {
        let mut state = self.lock();
        if state.generation != generation || state.status == status {
            return;
        }
        state.status = status.clone();
        log::debug!("[Engine] status -> {}", status);
        self.listener.on_status_changed(status);
    }

    fn emit_track(&self, generation: u64, title: String) {
        let state = self.lock();
        if state.generation == generation {
            log::debug!("[Engine] track -> {}", title);
            self.listener.on_track_changed(title);
        }
    }

    fn status(&self) -> PlaybackStatus {
        self.lock().status.clone()
    }
}

/// 基于 HTTP 流的播放引擎
pub struct StreamPlayer {
    cmd_tx: Sender<PlayerCommand>,
    gate: Arc<StatusGate>,
    engine_thread: Mutex<Option<JoinHandle<()>>>,
}

impl StreamPlayer {
    /// 启动引擎线程
    pub fn spawn(config: EngineConfig, listener: Arc<dyn PlayerListener>) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let gate = Arc::new(StatusGate::new(listener));
        let engine_gate = gate.clone();

        let handle = thread::Builder::new()
            .name("dubfm-engine".to_string())
            .spawn(move || run_engine(cmd_rx, config, engine_gate))
            .ok();
        if handle.is_none() {
            log::error!("[Engine] failed to spawn engine thread");
        }

        Self {
            cmd_tx,
            gate,
            engine_thread: Mutex::new(handle),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.gate.status()
    }

    fn send(&self, cmd: PlayerCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            log::warn!("[Engine] command dropped, engine is gone");
        }
    }
}

impl PlayerEngine for StreamPlayer {
    fn play(&self, url: &str) {
        let generation = self.gate.advance(PlaybackStatus::Idle);
        log::info!("[Engine] play {} (generation {})", url, generation);
        self.send(PlayerCommand::Play {
            url: url.to_string(),
            generation,
        });
    }

    fn stop(&self) {
        self.gate.advance(PlaybackStatus::Stopped);
        self.send(PlayerCommand::Stop);
    }

    fn is_playing(&self) -> bool {
        self.gate.status().is_playing()
    }

    fn set_volume(&self, volume: f32) {
        self.send(PlayerCommand::SetVolume(volume));
    }

    fn destroy(&self) -> Result<(), PlayerError> {
        let handle = self
            .engine_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        self.gate.advance(PlaybackStatus::Stopped);
        let _ = self.cmd_tx.send(PlayerCommand::Shutdown);
        handle.join().map_err(|_| PlayerError::EnginePanicked)
    }
}

impl Drop for StreamPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::error!("[Engine] teardown failed: {}", e);
        }
    }
}

/// 正在运行的播放会话
struct PlaybackWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PlaybackWorker {
    /// 置位停止标志并等待会话线程退出
    ///
    /// 会话里的每个等待点都按固定间隔检查停止标志，这里最多等一个轮询周期。
    fn cancel(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            log::error!("[Engine] playback thread panicked");
        }
    }
}

fn run_engine(cmd_rx: Receiver<PlayerCommand>, config: EngineConfig, gate: Arc<StatusGate>) {
    let volume = SharedVolume::default();
    let mut current: Option<PlaybackWorker> = None;

    for cmd in cmd_rx.iter() {
        match cmd {
            PlayerCommand::Play { url, generation } => {
                if let Some(worker) = current.take() {
                    worker.cancel();
                }
                current = spawn_worker(url, generation, &config, &gate, &volume);
            }
            PlayerCommand::Stop => {
                if let Some(worker) = current.take() {
                    worker.cancel();
                }
            }
            PlayerCommand::SetVolume(v) => {
                volume.set(v);
            }
            PlayerCommand::Shutdown => break,
        }
    }

    if let Some(worker) = current.take() {
        worker.cancel();
    }
    log::debug!("[Engine] engine thread exited");
}

fn spawn_worker(
    url: String,
    generation: u64,
    config: &EngineConfig,
    gate: &Arc<StatusGate>,
    volume: &SharedVolume,
) -> Option<PlaybackWorker> {
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();
    let config = config.clone();
    let gate = gate.clone();
    let volume = volume.clone();

    let spawned = thread::Builder::new()
        .name(format!("dubfm-playback-{}", generation))
        .spawn(move || run_playback(url, generation, config, gate, volume, worker_stop));

    match spawned {
        Ok(handle) => Some(PlaybackWorker { stop, handle }),
        Err(e) => {
            log::error!("[Engine] failed to spawn playback thread: {}", e);
            None
        }
    }
}

enum Finished {
    Ended,
    Cancelled,
}

fn run_playback(
    url: String,
    generation: u64,
    config: EngineConfig,
    gate: Arc<StatusGate>,
    volume: SharedVolume,
    stop: Arc<AtomicBool>,
) {
    gate.emit_status(generation, PlaybackStatus::Loading);

    match stream_and_play(&url, generation, &config, &gate, volume, &stop) {
        Ok(Finished::Ended) => {
            log::info!("[Engine] stream ended: {}", url);
            gate.emit_status(generation, PlaybackStatus::Stopped);
        }
        Ok(Finished::Cancelled) => {
            log::debug!("[Engine] playback cancelled: {}", url);
        }
        Err(e) if stop.load(Ordering::Relaxed) => {
            log::debug!("[Engine] error after cancel ignored: {}", e);
        }
        Err(e) => {
            log::error!("[Engine] playback failed: {}", e);
            gate.emit_status(generation, PlaybackError::from(e).into());
        }
    }
}

fn stream_and_play(
    url: &str,
    generation: u64,
    config: &EngineConfig,
    gate: &Arc<StatusGate>,
    volume: SharedVolume,
    stop: &Arc<AtomicBool>,
) -> Result<Finished, PlayerError> {
    let title_gate = gate.clone();
    let stream = HttpAudioStream::connect(url, config, stop.clone(), move |title| {
        title_gate.emit_track(generation, title)
    })?;

    let hint = stream.info.format_hint();
    let (reader, _network) = stream.into_parts();
    let mut decoder = AudioDecoder::new(Box::new(reader), hint)?;
    if stop.load(Ordering::Relaxed) {
        return Ok(Finished::Cancelled);
    }

    let info = decoder.info.clone();
    log::info!(
        "[Engine] decoding {} at {} Hz, {} channel(s)",
        info.codec,
        info.sample_rate,
        info.channels
    );

    let output = AudioOutput::new(
        OutputConfig {
            sample_rate: info.sample_rate,
            channels: info.channels as u16,
            buffer_packets: config.output_buffer_packets,
        },
        volume,
    )?;
    let prebuffer = config.prebuffer_packets.clamp(1, output.capacity());

    let finished = feed_output(&mut decoder, &output, prebuffer, generation, gate, stop);
    output.set_playing(false);
    if output.underruns() > 0 {
        log::debug!("[Engine] session had {} underrun(s)", output.underruns());
    }
    finished
}

fn feed_output(
    decoder: &mut AudioDecoder,
    output: &AudioOutput,
    prebuffer: usize,
    generation: u64,
    gate: &StatusGate,
    stop: &AtomicBool,
) -> Result<Finished, PlayerError> {
    let mut started = false;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(Finished::Cancelled);
        }

        match decoder.decode_next()? {
            Some(samples) => {
                if !output.push(samples, stop)? {
                    return Ok(Finished::Cancelled);
                }
                if !started && output.queued() >= prebuffer {
                    output.set_playing(true);
                    started = true;
                    gate.emit_status(generation, PlaybackStatus::Playing);
                }
            }
            None if stop.load(Ordering::Relaxed) => return Ok(Finished::Cancelled),
            None => {
                // 播完已排队的尾部再结束
                output.set_playing(true);
                output.drain(stop)?;
                return Ok(Finished::Ended);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlayerEvent;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    fn local_config() -> EngineConfig {
        EngineConfig {
            system_proxy: false,
            ..Default::default()
        }
    }

    fn channel_listener() -> (Arc<dyn PlayerListener>, Receiver<PlayerEvent>) {
        let (tx, rx) = unbounded::<PlayerEvent>();
        (Arc::new(tx), rx)
    }

    /// 本地 HTTP 服务，只回应一次固定的响应
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf);
                let _ = socket.write_all(response.as_bytes());
            }
        });
        format!("http://{}/128mp3", addr)
    }

    #[test]
    fn test_gate_drops_stale_generation() {
        let (listener, rx) = channel_listener();
        let gate = StatusGate::new(listener);

        let old = gate.advance(PlaybackStatus::Idle);
        let current = gate.advance(PlaybackStatus::Idle);

        gate.emit_status(old, PlaybackStatus::Playing);
        gate.emit_track(old, "stale".to_string());
        gate.emit_status(current, PlaybackStatus::Loading);
        gate.emit_status(current, PlaybackStatus::Loading);
        gate.emit_track(current, "fresh".to_string());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PlayerEvent::StatusChanged(PlaybackStatus::Loading),
                PlayerEvent::TrackChanged("fresh".to_string()),
            ]
        );
        assert_eq!(gate.status(), PlaybackStatus::Loading);
    }

    #[test]
    fn test_http_error_reported_as_error_status() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let (listener, rx) = channel_listener();
        let player = StreamPlayer::spawn(local_config(), listener);

        player.play(&url);

        let first = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(first, PlayerEvent::StatusChanged(PlaybackStatus::Loading));

        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            PlayerEvent::StatusChanged(PlaybackStatus::Error(message)) => {
                assert!(message.contains("404"), "unexpected message: {}", message);
            }
            other => panic!("expected error status, got {:?}", other),
        }
        assert!(!player.is_playing());
        player.destroy().unwrap();
    }

    #[test]
    fn test_stop_silences_in_flight_session() {
        let url = serve_once("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n");
        let (listener, rx) = channel_listener();
        let player = StreamPlayer::spawn(local_config(), listener);

        player.play(&url);
        player.stop();

        // 被停止的会话不会再上报任何状态
        thread::sleep(Duration::from_millis(500));
        let events: Vec<_> = rx.try_iter().collect();
        assert!(
            events
                .iter()
                .all(|e| *e == PlayerEvent::StatusChanged(PlaybackStatus::Loading)),
            "unexpected events: {:?}",
            events
        );
        assert_eq!(player.status(), PlaybackStatus::Stopped);
        player.destroy().unwrap();
    }

    #[test]
    fn test_destroy_releases_stalled_connection() {
        // 服务端接受连接但从不响应，客户端关闭连接时通知
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/128mp3", server.local_addr().unwrap());
        let (closed_tx, closed_rx) = unbounded();
        thread::spawn(move || {
            if let Ok((mut socket, _)) = server.accept() {
                let mut buf = [0u8; 1024];
                while matches!(socket.read(&mut buf), Ok(n) if n > 0) {}
                let _ = closed_tx.send(());
            }
        });

        let (listener, rx) = channel_listener();
        let player = StreamPlayer::spawn(local_config(), listener);
        player.play(&url);

        let first = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(first, PlayerEvent::StatusChanged(PlaybackStatus::Loading));
        thread::sleep(Duration::from_millis(300));

        let started = std::time::Instant::now();
        player.destroy().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));

        // destroy 返回前会话线程和网络线程都已退出，连接随之关闭
        closed_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(rx.try_iter().all(|e| !matches!(
            e,
            PlayerEvent::StatusChanged(PlaybackStatus::Error(_))
        )));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (listener, _rx) = channel_listener();
        let player = StreamPlayer::spawn(local_config(), listener);

        assert!(player.destroy().is_ok());
        assert!(player.destroy().is_ok());
        // 销毁后的命令被安全丢弃
        player.play("http://127.0.0.1:9/none");
        assert!(!player.is_playing());
    }
}
