#[cfg(target_os = "android")]
pub mod oboe;

#[cfg(not(target_os = "android"))]
pub mod cpal;

#[cfg(all(feature = "music-streaming", not(target_os = "android")))]
pub mod stream;

use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
};

use crate::clip::{LOOP_INFINITE, SampleBuffer, WaveFormat};
use crate::error::{ErrorCode, MixingError, MusicError};

// ======================= 回调共享状态 =======================
// 以下状态由后端线程写入，游戏线程在每帧 update 时轮询。

/// 混音引擎级的致命错误
#[derive(Debug, Default)]
pub struct EngineStatus {
    error: AtomicU32,
}

impl EngineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_critical(&self, code: ErrorCode) {
        self.error.store(code.0, Ordering::Release);
    }

    /// 读取并清除
    pub fn take_critical(&self) -> Option<ErrorCode> {
        match self.error.swap(0, Ordering::AcqRel) {
            0 => None,
            code => Some(ErrorCode(code)),
        }
    }
}

/// 单个 voice 的播放状态。
///
/// `started` 和剩余循环次数由游戏线程在播放/停止时写入，
/// 流结束、循环结束与错误由混音线程写入。
#[derive(Debug, Default)]
pub struct VoiceStatus {
    started: AtomicBool,
    loops_remaining: AtomicU32,
    critical: AtomicBool,
    last_error: AtomicU32,
}

impl VoiceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn loops_remaining(&self) -> u32 {
        self.loops_remaining.load(Ordering::Acquire)
    }

    pub(crate) fn mark_started(&self, loop_count: u32) {
        self.loops_remaining.store(loop_count, Ordering::Release);
        self.started.store(true, Ordering::Release);
    }

    pub(crate) fn mark_stopped(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub fn on_stream_end(&self) {
        self.started.store(false, Ordering::Release);
    }

    /// 无限循环的计数保持不变
    pub fn on_loop_end(&self) {
        let _ = self
            .loops_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |loops| match loops {
                0 | LOOP_INFINITE => None,
                n => Some(n - 1),
            });
    }

    pub fn on_voice_error(&self, code: ErrorCode) {
        self.last_error.store(code.0, Ordering::Release);
        self.critical.store(true, Ordering::Release);
    }

    pub fn has_error(&self) -> bool {
        self.critical.load(Ordering::Acquire)
    }

    /// 读取并清除错误标志和错误码；未置位时返回 `None`
    pub(crate) fn take_error(&self) -> Option<ErrorCode> {
        if !self.critical.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(ErrorCode(self.last_error.swap(0, Ordering::AcqRel)))
    }
}

/// 流媒体错误类别
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicErrorKind {
    NoError = 0,
    Aborted = 1,
    Network = 2,
    Decode = 3,
    SrcNotSupported = 4,
}

impl MusicErrorKind {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Aborted,
            2 => Self::Network,
            3 => Self::Decode,
            4 => Self::SrcNotSupported,
            _ => Self::NoError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicEvent {
    /// 开始出声，此后可以 seek
    Playing,
    Ended,
    Error(MusicErrorKind),
}

/// 音乐流的异步通知。后端线程 `post`，游戏线程在 update 中消费。
#[derive(Debug, Default)]
pub struct MusicNotify {
    error_occurred: AtomicBool,
    error_kind: AtomicU8,
    playing: AtomicBool,
    ready_to_seek: AtomicBool,
    previous_finished: AtomicBool,
}

impl MusicNotify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, event: MusicEvent) {
        match event {
            MusicEvent::Playing => {
                self.playing.store(true, Ordering::Release);
                self.ready_to_seek.store(true, Ordering::Release);
            }
            MusicEvent::Ended => {
                self.playing.store(false, Ordering::Release);
                self.previous_finished.store(true, Ordering::Release);
            }
            MusicEvent::Error(MusicErrorKind::NoError | MusicErrorKind::Aborted) => {}
            MusicEvent::Error(kind) => {
                self.error_kind.store(kind as u8, Ordering::Release);
                self.error_occurred.store(true, Ordering::Release);
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.previous_finished.load(Ordering::Acquire)
    }

    pub fn clear_finished(&self) {
        self.previous_finished.store(false, Ordering::Release);
    }

    pub fn take_ready_to_seek(&self) -> bool {
        self.ready_to_seek.swap(false, Ordering::AcqRel)
    }

    pub fn take_error(&self) -> Option<MusicErrorKind> {
        if !self.error_occurred.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(MusicErrorKind::from_u8(
            self.error_kind.swap(0, Ordering::AcqRel),
        ))
    }
}

// ======================= 混音后端 =======================

pub trait MixingPlatform: Send {
    /// 创建引擎实例，引擎级致命错误写入 `status`
    fn create_engine(&mut self, status: Arc<EngineStatus>) -> Result<Box<dyn MixingEngine>, MixingError>;
}

/// 引擎 drop 时释放主输出
pub trait MixingEngine: Send {
    /// 没有输出设备时返回 `MixingError::NoDevice`
    fn create_master_output(&mut self) -> Result<(), MixingError>;

    fn start(&mut self) -> Result<(), MixingError>;

    fn stop(&mut self);

    /// 0.0 ~ 1.0
    fn set_master_volume(&mut self, volume: f32) -> Result<(), MixingError>;

    fn create_voice(
        &mut self,
        format: WaveFormat,
        status: Arc<VoiceStatus>,
    ) -> Result<Box<dyn SourceVoice>, MixingError>;
}

/// 源 voice。drop 即销毁，可能阻塞到混音线程确认为止。
pub trait SourceVoice: Send {
    fn submit(&mut self, clip: Arc<SampleBuffer>, loop_count: u32) -> Result<(), MixingError>;

    fn start(&mut self) -> Result<(), MixingError>;

    /// `play_tails` 为 false 时立即截断
    fn stop(&mut self, play_tails: bool) -> Result<(), MixingError>;

    fn flush(&mut self) -> Result<(), MixingError>;
}

// ======================= 流媒体后端 =======================

pub trait MediaPlatform: Send {
    /// 平台不提供流媒体能力时返回 `MusicError::Unavailable`
    fn startup(&mut self) -> Result<(), MusicError>;

    fn shutdown(&mut self);

    fn create_stream(&mut self, notify: Arc<MusicNotify>) -> Result<Box<dyn MusicStream>, MusicError>;
}

pub trait MusicStream: Send {
    fn set_auto_play(&mut self, enabled: bool);

    fn set_looping(&mut self, enabled: bool);

    fn set_source(&mut self, path: &Path) -> Result<(), MusicError>;

    fn play(&mut self) -> Result<(), MusicError>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// 秒
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64) -> Result<(), MusicError>;

    /// 0.0 ~ 1.0
    fn set_volume(&mut self, volume: f64);
}
