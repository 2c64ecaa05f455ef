//! 音频输出
//!
//! 使用 cpal 播放解码后的采样。解码线程通过有界通道推送采样包，
//! 通道满时阻塞，从而对网络读取形成反压。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{bounded, SendTimeoutError, Sender};

const PUSH_POLL: Duration = Duration::from_millis(50);
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// 音频输出错误
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,
    #[error("No supported config for {channels} channel(s) at {sample_rate} Hz")]
    NoConfig { sample_rate: u32, channels: u16 },
    #[error("Stream error: {0}")]
    Stream(String),
}

/// 音频输出配置
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// 通道中最多排队的采样包数量
    pub buffer_packets: usize,
}

/// 跨线程共享的音量（f32 位模式存入原子量）
#[derive(Debug, Clone)]
pub struct SharedVolume(Arc<AtomicU32>);

impl SharedVolume {
    pub fn new(volume: f32) -> Self {
        Self(Arc::new(AtomicU32::new(volume.clamp(0.0, 1.0).to_bits())))
    }

    pub fn set(&self, volume: f32) {
        self.0
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl Default for SharedVolume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// 输出流运行中的故障，由 cpal 错误回调写入
#[derive(Debug, Clone, Default)]
pub struct StreamFailure(Arc<Mutex<Option<String>>>);

impl StreamFailure {
    /// 只保留第一次故障
    pub fn report(&self, message: impl Into<String>) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(message.into());
        }
    }

    pub fn check(&self) -> Result<(), OutputError> {
        let slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(message) => Err(OutputError::Stream(message.clone())),
            None => Ok(()),
        }
    }
}

/// 送往输出回调的采样队列
///
/// 等待期间同时观察停止标志和输出故障，设备丢失时不会永久阻塞。
pub struct SampleQueue {
    tx: Sender<Vec<f32>>,
    failure: StreamFailure,
}

impl SampleQueue {
    pub fn new(tx: Sender<Vec<f32>>, failure: StreamFailure) -> Self {
        Self { tx, failure }
    }

    /// 推送采样包；`stop` 置位或输出已关闭时返回 `Ok(false)`
    pub fn push(&self, samples: Vec<f32>, stop: &AtomicBool) -> Result<bool, OutputError> {
        let mut pending = samples;
        loop {
            self.failure.check()?;
            match self.tx.send_timeout(pending, PUSH_POLL) {
                Ok(()) => return Ok(true),
                Err(SendTimeoutError::Timeout(back)) => {
                    if stop.load(Ordering::Relaxed) {
                        return Ok(false);
                    }
                    pending = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Ok(false),
            }
        }
    }

    /// 等待已排队的采样播完
    pub fn drain(&self, stop: &AtomicBool) -> Result<(), OutputError> {
        while !self.tx.is_empty() && !stop.load(Ordering::Relaxed) {
            self.failure.check()?;
            std::thread::sleep(DRAIN_POLL);
        }
        self.failure.check()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// 音频输出流
pub struct AudioOutput {
    _stream: Stream,
    queue: SampleQueue,
    playing: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
    capacity: usize,
}

impl AudioOutput {
    /// 在默认输出设备上创建
    pub fn new(config: OutputConfig, volume: SharedVolume) -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(OutputError::NoDevice)?;

        Self::with_device(&device, config, volume)
    }

    /// 使用指定设备创建；单声道源在只支持立体声的设备上会被复制到两个声道
    pub fn with_device(
        device: &Device,
        config: OutputConfig,
        volume: SharedVolume,
    ) -> Result<Self, OutputError> {
        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| OutputError::Stream(e.to_string()))?
            .collect();

        let supports = |channels: u16| {
            ranges.iter().find(|c| {
                c.channels() == channels
                    && c.min_sample_rate().0 <= config.sample_rate
                    && c.max_sample_rate().0 >= config.sample_rate
                    && c.sample_format() == SampleFormat::F32
            })
        };

        let (range, upmix) = match supports(config.channels) {
            Some(range) => (range.clone(), false),
            None if config.channels == 1 => match supports(2) {
                Some(range) => (range.clone(), true),
                None => return Err(no_config(&config)),
            },
            None => return Err(no_config(&config)),
        };

        let stream_config: StreamConfig = range
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();

        let capacity = config.buffer_packets.max(1);
        let (sample_tx, sample_rx) = bounded::<Vec<f32>>(capacity);
        let playing = Arc::new(AtomicBool::new(false));
        let underruns = Arc::new(AtomicU64::new(0));

        let failure = StreamFailure::default();
        let cb_failure = failure.clone();

        let cb_playing = playing.clone();
        let cb_underruns = underruns.clone();
        let mut pending: Vec<f32> = Vec::new();
        let mut pos = 0usize;

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !cb_playing.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let gain = volume.get();
                    let mut out = 0;
                    while out < data.len() {
                        if pos >= pending.len() {
                            match sample_rx.try_recv() {
                                Ok(next) => {
                                    pending = next;
                                    pos = 0;
                                    continue;
                                }
                                Err(_) => {
                                    cb_underruns.fetch_add(1, Ordering::Relaxed);
                                    break;
                                }
                            }
                        }

                        let sample = pending[pos] * gain;
                        pos += 1;
                        data[out] = sample;
                        out += 1;
                        if upmix && out < data.len() {
                            data[out] = sample;
                            out += 1;
                        }
                    }
                    data[out..].fill(0.0);
                },
                move |err| {
                    log::error!("[Output] audio stream error: {}", err);
                    cb_failure.report(err.to_string());
                },
                None,
            )
            .map_err(|e| OutputError::Stream(e.to_string()))?;

        stream.play().map_err(|e| OutputError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            queue: SampleQueue::new(sample_tx, failure),
            playing,
            underruns,
            capacity,
        })
    }

    /// 推送采样包，通道满时等待
    pub fn push(&self, samples: Vec<f32>, stop: &AtomicBool) -> Result<bool, OutputError> {
        self.queue.push(samples, stop)
    }

    /// 播完已排队的尾部
    pub fn drain(&self, stop: &AtomicBool) -> Result<(), OutputError> {
        self.queue.drain(stop)
    }

    /// 当前排队的采样包数量
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    /// 回调中没有可用采样的次数
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

fn no_config(config: &OutputConfig) -> OutputError {
    OutputError::NoConfig {
        sample_rate: config.sample_rate,
        channels: config.channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_volume_clamps() {
        let volume = SharedVolume::new(1.5);
        assert_eq!(volume.get(), 1.0);

        let handle = volume.clone();
        handle.set(0.2);
        assert!((volume.get() - 0.2).abs() < f32::EPSILON);

        volume.set(-1.0);
        assert_eq!(handle.get(), 0.0);
    }

    #[test]
    fn test_push_fails_when_device_is_lost() {
        let (tx, _rx) = bounded(1);
        let failure = StreamFailure::default();
        let queue = SampleQueue::new(tx, failure.clone());
        let stop = AtomicBool::new(false);

        assert!(queue.push(vec![0.0; 4], &stop).unwrap());

        // 回调不再消费，队列已满；故障在等待期间到达
        let reporter = failure.clone();
        let lost = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(120));
            reporter.report("device not available");
            reporter.report("later failure");
        });

        match queue.push(vec![0.0; 4], &stop) {
            Err(OutputError::Stream(message)) => assert_eq!(message, "device not available"),
            other => panic!("expected stream error, got {:?}", other),
        }
        assert!(matches!(queue.drain(&stop), Err(OutputError::Stream(_))));
        lost.join().unwrap();
    }

    #[test]
    fn test_push_returns_false_on_stop() {
        let (tx, rx) = bounded(1);
        let queue = SampleQueue::new(tx, StreamFailure::default());
        let stop = AtomicBool::new(false);

        assert!(queue.push(vec![1.0], &stop).unwrap());
        stop.store(true, Ordering::Relaxed);
        assert!(!queue.push(vec![2.0], &stop).unwrap());

        // 停止时不等待尾部
        assert!(queue.drain(&stop).is_ok());
        assert_eq!(rx.try_recv().unwrap(), vec![1.0]);
        assert!(queue.is_empty());
    }
}
