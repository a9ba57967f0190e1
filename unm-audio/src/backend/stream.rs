// 标准库导入
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender, TryRecvError},
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// 第三方 crate 导入
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info, warn};
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};

// 当前 crate 内部模块导入
use crate::backend::{MediaPlatform, MusicErrorKind, MusicEvent, MusicNotify, MusicStream};
use crate::decoder::TrackReader;
use crate::error::MusicError;

/// 解码线程在 seek 后等待输出回调清空环形缓冲的上限
const FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// 桌面端流式音乐后端：symphonia 解码线程 + cpal 输出
pub struct StreamingMedia {
    buffer_frames: usize,
}

impl StreamingMedia {
    pub fn new(buffer_frames: usize) -> Self {
        Self { buffer_frames }
    }
}

impl MediaPlatform for StreamingMedia {
    fn startup(&mut self) -> Result<(), MusicError> {
        cpal::default_host()
            .default_output_device()
            .map(|_| ())
            .ok_or_else(|| MusicError::Device("no audio output device".into()))
    }

    fn shutdown(&mut self) {
        debug!("Streaming media subsystem released");
    }

    fn create_stream(&mut self, notify: Arc<MusicNotify>) -> Result<Box<dyn MusicStream>, MusicError> {
        Ok(Box::new(StreamingMusic::new(notify, self.buffer_frames)))
    }
}

/// 输出回调、解码线程与游戏线程共享的播放状态
#[derive(Default)]
struct Shared {
    paused: AtomicBool,
    looping: AtomicBool,
    /// f32 位模式
    volume: AtomicU32,
    /// 自上次定位以来输出回调消费的设备帧数
    played_frames: AtomicU64,
    /// 上次定位的时间（秒），f64 位模式
    base_secs: AtomicU64,
    /// 置位后由输出回调清空环形缓冲
    flush: AtomicBool,
    eof: AtomicBool,
    ended: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        let shared = Self::default();
        shared.paused.store(true, Ordering::Relaxed);
        shared.volume.store(1.0f32.to_bits(), Ordering::Relaxed);
        shared
    }

    fn reset_position(&self, base_secs: f64) {
        self.base_secs.store(base_secs.to_bits(), Ordering::Release);
        self.played_frames.store(0, Ordering::Release);
        self.eof.store(false, Ordering::Release);
        self.ended.store(false, Ordering::Release);
    }

    fn base_secs(&self) -> f64 {
        f64::from_bits(self.base_secs.load(Ordering::Acquire))
    }

    /// 先置 flush 再重置位置：之前已在路上的回调累加的帧会在 flush 分支里清零
    fn begin_seek(&self, base_secs: f64) {
        self.flush.store(true, Ordering::Release);
        self.reset_position(base_secs);
    }

    /// 输出回调调用，返回是否需要清空环形缓冲
    fn take_flush(&self) -> bool {
        if !self.flush.load(Ordering::Acquire) {
            return false;
        }
        self.played_frames.store(0, Ordering::Release);
        self.flush.store(false, Ordering::Release);
        true
    }

    /// 等待输出回调处理 flush，`stopping` 置位或超时后放弃
    fn wait_for_flush(&self, stopping: &AtomicBool, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.flush.load(Ordering::Acquire)
            && !stopping.load(Ordering::Acquire)
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

enum Control {
    Seek(f64),
    Stop,
}

/// 一次 `play` 对应的输出流和解码线程
struct Session {
    stream: cpal::Stream,
    control: Sender<Control>,
    worker: Option<JoinHandle<()>>,
    /// 让等待 flush 的解码线程立即退出
    stopping: Arc<AtomicBool>,
    device_rate: u32,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.stream.pause();
        let _ = self.control.send(Control::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Music decoder thread panicked");
            }
        }
    }
}

pub struct StreamingMusic {
    notify: Arc<MusicNotify>,
    buffer_frames: usize,
    auto_play: bool,
    shared: Arc<Shared>,
    /// 已打开但尚未开始播放的音轨
    pending: Option<TrackReader>,
    duration: Option<f64>,
    session: Option<Session>,
}

// cpal::Stream 只在游戏线程上使用
unsafe impl Send for StreamingMusic {}

impl StreamingMusic {
    fn new(notify: Arc<MusicNotify>, buffer_frames: usize) -> Self {
        Self {
            notify,
            buffer_frames: buffer_frames.max(256),
            auto_play: false,
            shared: Arc::new(Shared::new()),
            pending: None,
            duration: None,
            session: None,
        }
    }

    fn start_session(&mut self, reader: TrackReader) -> Result<Session, MusicError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| MusicError::Device("no audio output device".into()))?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| MusicError::Device(e.to_string()))?
            .into();

        let channels = config.channels as usize;
        let device_rate = config.sample_rate;

        let rb = HeapRb::<f32>::new(self.buffer_frames * channels.max(1));
        let (producer, mut consumer) = rb.split();

        let shared = self.shared.clone();
        let notify = self.notify.clone();
        let error_notify = self.notify.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    if shared.take_flush() {
                        consumer.clear();
                    }

                    if shared.paused.load(Ordering::Acquire) {
                        data.fill(0.0);
                        return;
                    }

                    let read = consumer.pop_slice(data);
                    data[read..].fill(0.0);

                    let volume = f32::from_bits(shared.volume.load(Ordering::Relaxed));
                    for sample in data[..read].iter_mut() {
                        *sample *= volume;
                    }
                    shared
                        .played_frames
                        .fetch_add((read / channels.max(1)) as u64, Ordering::AcqRel);

                    if read == 0
                        && shared.eof.load(Ordering::Acquire)
                        && !shared.ended.swap(true, Ordering::AcqRel)
                    {
                        notify.post(MusicEvent::Ended);
                    }
                },
                move |err| {
                    // 设备失效按解码错误上报，由引擎重建音乐后端
                    error!("Music output stream failed: {err}");
                    error_notify.post(MusicEvent::Error(MusicErrorKind::Decode));
                },
                None,
            )
            .map_err(|e| MusicError::Device(e.to_string()))?;

        stream.play().map_err(|e| MusicError::Device(e.to_string()))?;

        let (control, control_rx) = mpsc::channel();
        let stopping = Arc::new(AtomicBool::new(false));
        let worker = DecodeWorker {
            resampler: LinearResampler::new(reader.sample_rate(), device_rate),
            reader,
            producer,
            control: control_rx,
            shared: self.shared.clone(),
            notify: self.notify.clone(),
            stopping: stopping.clone(),
            out_channels: channels.max(1),
        };
        let worker = thread::Builder::new()
            .name("unm-music-decoder".into())
            .spawn(move || worker.run())
            .map_err(|e| MusicError::Device(e.to_string()))?;

        info!("Music stream started: {channels} channels @ {device_rate} Hz");
        Ok(Session {
            stream,
            control,
            worker: Some(worker),
            stopping,
            device_rate,
        })
    }
}

impl MusicStream for StreamingMusic {
    fn set_auto_play(&mut self, enabled: bool) {
        self.auto_play = enabled;
    }

    fn set_looping(&mut self, enabled: bool) {
        self.shared.looping.store(enabled, Ordering::Release);
    }

    fn set_source(&mut self, path: &Path) -> Result<(), MusicError> {
        self.session = None;
        self.pending = None;
        self.shared.paused.store(true, Ordering::Release);
        self.shared.flush.store(false, Ordering::Release);
        self.shared.reset_position(0.0);

        match TrackReader::open(path) {
            Ok(reader) => {
                debug!("Music source set to {}", path.display());
                self.duration = reader.duration_secs();
                self.pending = Some(reader);
            }
            Err(err) => {
                self.notify
                    .post(MusicEvent::Error(MusicErrorKind::SrcNotSupported));
                return Err(MusicError::Source {
                    path: path.display().to_string(),
                    message: err.to_string(),
                });
            }
        }

        if self.auto_play {
            self.play()?;
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), MusicError> {
        if self.session.is_none() {
            let reader = self.pending.take().ok_or_else(|| MusicError::Source {
                path: String::new(),
                message: "no source has been set".into(),
            })?;
            self.session = Some(self.start_session(reader)?);
        }

        self.shared.paused.store(false, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    fn current_time(&self) -> f64 {
        let base = self.shared.base_secs();
        let time = match &self.session {
            Some(session) => {
                let played = self.shared.played_frames.load(Ordering::Acquire);
                base + played as f64 / session.device_rate.max(1) as f64
            }
            None => base,
        };

        match self.duration {
            Some(duration) if duration > 0.0 && self.shared.looping.load(Ordering::Acquire) => {
                time % duration
            }
            _ => time,
        }
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), MusicError> {
        if let Some(session) = &self.session {
            return session
                .control
                .send(Control::Seek(seconds))
                .map_err(|_| MusicError::Seek("music decoder thread has stopped".into()));
        }

        let reader = self
            .pending
            .as_mut()
            .ok_or_else(|| MusicError::Seek("no source has been set".into()))?;
        let actual = reader
            .seek(seconds)
            .map_err(|e| MusicError::Seek(e.to_string()))?;
        self.shared.reset_position(actual);
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.shared
            .volume
            .store((volume.clamp(0.0, 1.0) as f32).to_bits(), Ordering::Release);
    }
}

/// 解码线程：从音轨读包，重采样到设备采样率后写入环形缓冲
struct DecodeWorker {
    reader: TrackReader,
    producer: HeapProd<f32>,
    control: Receiver<Control>,
    shared: Arc<Shared>,
    notify: Arc<MusicNotify>,
    stopping: Arc<AtomicBool>,
    resampler: LinearResampler,
    out_channels: usize,
}

impl DecodeWorker {
    fn run(mut self) {
        let src_channels = self.reader.channels().max(1) as usize;

        let mut decoded = Vec::new();
        let mut pending: Vec<f32> = Vec::new();
        let mut announced = false;

        loop {
            match self.control.try_recv() {
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => break,
                Ok(Control::Seek(seconds)) => {
                    pending.clear();
                    self.seek(seconds);
                    continue;
                }
                Err(TryRecvError::Empty) => {}
            }

            // 先把已重采样的数据推入环形缓冲
            if !pending.is_empty() {
                let pushed = self.producer.push_slice(&pending);
                pending.drain(..pushed);
                if !pending.is_empty() {
                    thread::sleep(Duration::from_millis(2));
                    continue;
                }
            }

            if self.shared.eof.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
                continue;
            }

            decoded.clear();
            match self.reader.next_chunk(&mut decoded) {
                Ok(true) => {
                    self.resampler
                        .process(&decoded, src_channels, self.out_channels, &mut pending);
                    if !announced {
                        announced = true;
                        self.notify.post(MusicEvent::Playing);
                    }
                }
                Ok(false) if self.shared.looping.load(Ordering::Acquire) => {
                    if let Err(err) = self.reader.seek(0.0) {
                        warn!("Failed to rewind looping music: {err}");
                        self.shared.eof.store(true, Ordering::Release);
                    }
                }
                Ok(false) => {
                    debug!("Music decoder reached end of stream");
                    self.shared.eof.store(true, Ordering::Release);
                }
                Err(err) => {
                    error!("Music decode failed: {err}");
                    self.shared.eof.store(true, Ordering::Release);
                    self.notify.post(MusicEvent::Error(MusicErrorKind::Decode));
                    break;
                }
            }
        }
    }

    fn seek(&mut self, seconds: f64) {
        let actual = match self.reader.seek(seconds) {
            Ok(actual) => actual,
            Err(err) => {
                warn!("Music seek to {seconds:.3}s failed: {err}");
                return;
            }
        };
        self.resampler.reset();

        // 等输出回调丢弃旧数据后再继续写入
        self.shared.begin_seek(actual);
        self.shared.wait_for_flush(&self.stopping, FLUSH_TIMEOUT);
        debug!("Music seeked to {actual:.3}s");
    }
}

/// 跨块连续的线性插值重采样，同时完成声道映射
struct LinearResampler {
    step: f64,
    pos: f64,
    prev: Vec<f32>,
}

impl LinearResampler {
    fn new(src_rate: u32, dst_rate: u32) -> Self {
        Self {
            step: src_rate.max(1) as f64 / dst_rate.max(1) as f64,
            pos: 0.0,
            prev: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.pos = 0.0;
        self.prev.clear();
    }

    fn process(&mut self, input: &[f32], src_channels: usize, out_channels: usize, out: &mut Vec<f32>) {
        let frames = input.len() / src_channels;
        if frames == 0 {
            return;
        }
        if self.prev.len() != src_channels {
            self.prev.clear();
            self.prev.extend_from_slice(&input[..src_channels]);
        }

        // 第 0 帧是上一块的最后一帧，第 k 帧是本块的第 k - 1 帧
        let prev = &self.prev;
        let frame = |k: usize, c: usize| match k {
            0 => prev[c],
            k => input[(k - 1) * src_channels + c],
        };

        let mut pos = self.pos;
        while pos < frames as f64 {
            let k = pos as usize;
            let frac = (pos - k as f64) as f32;
            for c in 0..out_channels {
                let src_c = c % src_channels;
                let a = frame(k, src_c);
                let b = frame(k + 1, src_c);
                out.push(a + (b - a) * frac);
            }
            pos += self.step;
        }

        self.pos = pos - frames as f64;
        self.prev.clear();
        self.prev
            .extend_from_slice(&input[(frames - 1) * src_channels..frames * src_channels]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_passes_samples_through_with_one_frame_delay() {
        let mut resampler = LinearResampler::new(100, 100);
        let mut out = Vec::new();
        resampler.process(&[1.0, 2.0, 3.0], 1, 1, &mut out);
        assert_eq!(out, vec![1.0, 1.0, 2.0]);

        out.clear();
        resampler.process(&[4.0], 1, 1, &mut out);
        assert_eq!(out, vec![3.0]);
    }

    #[test]
    fn upsampling_doubles_frames_and_maps_channels() {
        let mut resampler = LinearResampler::new(100, 200);
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut out = Vec::new();
        resampler.process(&input, 1, 2, &mut out);

        assert_eq!(out.len(), 400);
        // 单声道复制到左右声道
        assert_eq!(out[2], out[3]);
        // 插值点落在相邻帧中间
        assert!((out[6] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn shared_position_resets_on_seek() {
        let shared = Shared::new();
        assert!(shared.paused.load(Ordering::Relaxed));
        shared.played_frames.store(480, Ordering::Relaxed);
        shared.eof.store(true, Ordering::Relaxed);

        shared.reset_position(12.5);
        assert_eq!(shared.base_secs(), 12.5);
        assert_eq!(shared.played_frames.load(Ordering::Relaxed), 0);
        assert!(!shared.eof.load(Ordering::Relaxed));
    }

    #[test]
    fn frames_counted_before_flush_are_discarded() {
        let shared = Shared::new();
        shared.played_frames.store(4800, Ordering::Relaxed);

        shared.begin_seek(30.0);
        // 定位前已经开始的回调还在累加旧帧
        shared.played_frames.fetch_add(480, Ordering::AcqRel);

        assert!(shared.take_flush());
        assert_eq!(shared.base_secs(), 30.0);
        assert_eq!(shared.played_frames.load(Ordering::Relaxed), 0);
        assert!(!shared.take_flush());
    }

    #[test]
    fn stopping_cancels_flush_wait() {
        let shared = Shared::new();
        shared.begin_seek(1.0);
        let stopping = AtomicBool::new(true);

        let started = Instant::now();
        shared.wait_for_flush(&stopping, Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(shared.flush.load(Ordering::Relaxed));
    }
}
