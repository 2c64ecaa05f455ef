//! HTTP 音频流
//!
//! 网络线程在自己的 tokio 运行时上读取 HTTP 响应体、剥离 ICY 元数据，
//! 把纯音频字节通过通道交给 [`ChannelReader`]，后者作为 symphonia 的
//! 只读 MediaSource。所有等待点都会检查退出标志。

use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::{EngineConfig, IcyDemuxer};

const AUDIO_CHANNEL_BOUND: usize = 32;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 流错误
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Stream cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 响应头中的电台信息
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    pub content_type: Option<String>,
    pub station_name: Option<String>,
    pub bitrate: Option<u32>,
    pub metaint: usize,
}

impl StreamInfo {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        };

        Self {
            content_type: text("content-type"),
            station_name: text("icy-name"),
            bitrate: text("icy-br").and_then(|v| v.parse().ok()),
            metaint: text("icy-metaint")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    /// 解码器探测提示
    pub fn format_hint(&self) -> Option<&'static str> {
        self.content_type.as_deref().and_then(extension_hint)
    }
}

/// 根据 Content-Type 推断扩展名
pub fn extension_hint(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Some("mp3"),
        "audio/aac" | "audio/aacp" | "audio/x-aac" => Some("aac"),
        "audio/mp4" | "audio/m4a" => Some("m4a"),
        "audio/ogg" | "application/ogg" | "audio/vorbis" => Some("ogg"),
        _ => None,
    }
}

/// 网络线程句柄
///
/// 释放时通知网络线程退出并等待它结束，连接随线程内的运行时一起关闭。
pub struct NetworkThread {
    halt: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.halt.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Stream] network thread panicked");
            }
        }
    }
}

/// 已连接的 HTTP 音频流
pub struct HttpAudioStream {
    pub info: StreamInfo,
    reader: ChannelReader,
    network: NetworkThread,
}

impl HttpAudioStream {
    /// 在网络线程上发起请求，等待响应头
    ///
    /// 等待期间 `stop` 置位时返回 [`StreamError::Cancelled`]。
    /// `on_title` 在网络线程上被调用，每个新的 StreamTitle 一次。
    pub fn connect<F>(
        url: &str,
        config: &EngineConfig,
        stop: Arc<AtomicBool>,
        on_title: F,
    ) -> Result<Self, StreamError>
    where
        F: Fn(String) + Send + 'static,
    {
        let halt = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = bounded(1);
        let (chunk_tx, chunk_rx) = bounded(AUDIO_CHANNEL_BOUND);

        let url = url.to_string();
        let config = config.clone();
        let net_halt = halt.clone();
        let handle = thread::Builder::new()
            .name("dubfm-net".to_string())
            .spawn(move || run_network(url, config, ready_tx, chunk_tx, net_halt, on_title))?;
        let network = NetworkThread {
            halt,
            handle: Some(handle),
        };

        let info = loop {
            if stop.load(Ordering::Relaxed) {
                return Err(StreamError::Cancelled);
            }
            match ready_rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => break result?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(StreamError::Cancelled),
            }
        };

        Ok(Self {
            info,
            reader: ChannelReader::new(chunk_rx, stop),
            network,
        })
    }

    /// 拆出解码用的读取端；网络线程句柄需要保留到读取结束
    pub fn into_parts(self) -> (ChannelReader, NetworkThread) {
        (self.reader, self.network)
    }
}

type ChunkSender = Sender<io::Result<Vec<u8>>>;

fn run_network<F>(
    url: String,
    config: EngineConfig,
    ready_tx: Sender<Result<StreamInfo, StreamError>>,
    chunk_tx: ChunkSender,
    halt: Arc<AtomicBool>,
    on_title: F,
) where
    F: Fn(String),
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    runtime.block_on(async {
        let response = match open_stream(&url, &config, &halt).await {
            Ok(response) => response,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let info = StreamInfo::from_headers(response.headers());
        log::info!(
            "[Stream] connected to {} (type: {:?}, metaint: {}, name: {:?})",
            url,
            info.content_type,
            info.metaint,
            info.station_name
        );
        let demuxer = IcyDemuxer::new(info.metaint);
        if ready_tx.send(Ok(info)).is_err() {
            return;
        }

        let read_timeout = Duration::from_secs(config.read_timeout_secs);
        pump_network(response, demuxer, &chunk_tx, &halt, read_timeout, &on_title).await;
    });
    log::debug!("[Stream] network thread exited");
}

async fn open_stream(
    url: &str,
    config: &EngineConfig,
    halt: &AtomicBool,
) -> Result<reqwest::Response, StreamError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
    if !config.system_proxy {
        builder = builder.no_proxy();
    }
    let client = builder.build()?;

    let request = client.get(url).header("Icy-MetaData", "1").send();
    let limit = Duration::from_secs(config.connect_timeout_secs + config.read_timeout_secs);
    let response = match until_halted(request, halt, limit).await {
        Polled::Ready(result) => result?,
        Polled::Halted => return Err(StreamError::Cancelled),
        Polled::TimedOut => return Err(StreamError::Timeout),
    };

    if !response.status().is_success() {
        return Err(StreamError::HttpStatus(response.status().as_u16()));
    }
    Ok(response)
}

async fn pump_network<F>(
    mut response: reqwest::Response,
    mut demuxer: IcyDemuxer,
    chunk_tx: &ChunkSender,
    halt: &AtomicBool,
    read_timeout: Duration,
    on_title: &F,
) where
    F: Fn(String),
{
    loop {
        let chunk = match until_halted(response.chunk(), halt, read_timeout).await {
            Polled::Ready(Ok(Some(chunk))) => chunk,
            Polled::Ready(Ok(None)) => {
                log::info!("[Stream] server closed the stream");
                return;
            }
            Polled::Ready(Err(e)) => {
                log::warn!("[Stream] network read failed: {}", e);
                deliver(Err(io::Error::other(e)), chunk_tx, halt);
                return;
            }
            Polled::TimedOut => {
                log::warn!("[Stream] no data for {:?}", read_timeout);
                let err = io::Error::new(io::ErrorKind::TimedOut, "network read timed out");
                deliver(Err(err), chunk_tx, halt);
                return;
            }
            Polled::Halted => return,
        };

        if !forward_chunk(&chunk, &mut demuxer, chunk_tx, halt, on_title) {
            return;
        }
    }
}

enum Polled<T> {
    Ready(T),
    Halted,
    TimedOut,
}

/// 轮询 `fut`，每隔 [`POLL_INTERVAL`] 检查一次退出标志
async fn until_halted<F: Future>(fut: F, halt: &AtomicBool, limit: Duration) -> Polled<F::Output> {
    let mut fut = pin!(fut);
    let deadline = Instant::now() + limit;
    loop {
        if halt.load(Ordering::Relaxed) {
            return Polled::Halted;
        }
        let now = Instant::now();
        if now >= deadline {
            return Polled::TimedOut;
        }
        let wait = POLL_INTERVAL.min(deadline - now);
        if let Ok(output) = tokio::time::timeout(wait, fut.as_mut()).await {
            return Polled::Ready(output);
        }
    }
}

/// 剥离元数据后把音频交给解码端；返回 `false` 表示应当退出
fn forward_chunk<F>(
    input: &[u8],
    demuxer: &mut IcyDemuxer,
    chunk_tx: &ChunkSender,
    halt: &AtomicBool,
    on_title: &F,
) -> bool
where
    F: Fn(String),
{
    let mut audio = Vec::with_capacity(input.len());
    for title in demuxer.feed(input, &mut audio) {
        on_title(title);
    }
    if audio.is_empty() {
        return true;
    }
    deliver(Ok(audio), chunk_tx, halt)
}

/// 解码端消费慢时阻塞在这里，同时响应退出标志
fn deliver(item: io::Result<Vec<u8>>, chunk_tx: &ChunkSender, halt: &AtomicBool) -> bool {
    let mut pending = item;
    loop {
        match chunk_tx.send_timeout(pending, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if halt.load(Ordering::Relaxed) {
                    return false;
                }
                pending = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// 从通道读取音频字节的只读源
pub struct ChannelReader {
    current: Vec<u8>,
    pos: usize,
    receiver: Receiver<io::Result<Vec<u8>>>,
    stop: Arc<AtomicBool>,
}

impl ChannelReader {
    pub fn new(receiver: Receiver<io::Result<Vec<u8>>>, stop: Arc<AtomicBool>) -> Self {
        Self {
            current: Vec::new(),
            pos: 0,
            receiver,
            stop,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.current.len() {
            if self.stop.load(Ordering::Relaxed) {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream stopped",
                ));
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => continue,
                // 网络线程退出：流结束
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for ChannelReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live stream is not seekable",
        ))
    }
}

impl symphonia::core::io::MediaSource for ChannelReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
