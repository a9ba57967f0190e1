//! 单元测试用的脚本化后端

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::backend::{
    EngineStatus, MediaPlatform, MixingEngine, MixingPlatform, MusicEvent, MusicNotify,
    MusicStream, SourceVoice, VoiceStatus,
};
use crate::clip::{SampleBuffer, WaveFormat};
use crate::decoder::StreamDecoder;
use crate::error::{DecodeError, ErrorCode, MixingError, MusicError};

// ======================= 混音 =======================

#[derive(Debug, Default)]
pub(crate) struct FakeMixingState {
    pub no_device: bool,
    pub fail_output: Option<ErrorCode>,
    pub fail_next_start: Option<ErrorCode>,

    pub engines_created: usize,
    pub engine_starts: usize,
    pub engine_stops: usize,
    pub voices_created: usize,
    pub voices_destroyed: usize,
    pub submits: usize,
    pub starts: usize,
    pub stops: usize,
    pub flushes: usize,
    pub master_volume: Option<f32>,
    pub submitted_loops: Vec<u32>,

    pub engine_status: Option<Arc<EngineStatus>>,
    pub voice_statuses: Vec<Arc<VoiceStatus>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeMixing {
    state: Arc<Mutex<FakeMixingState>>,
}

impl FakeMixing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeMixingState> {
        self.state.lock()
    }

    /// 最近一次创建的引擎所用的状态
    pub fn engine_status(&self) -> Arc<EngineStatus> {
        self.state()
            .engine_status
            .clone()
            .expect("no mixing engine was created")
    }

    /// 第 `idx` 个被创建的 voice
    pub fn voice(&self, idx: usize) -> Arc<VoiceStatus> {
        self.state().voice_statuses[idx].clone()
    }

    pub fn last_voice(&self) -> Arc<VoiceStatus> {
        self.state()
            .voice_statuses
            .last()
            .cloned()
            .expect("no voice was created")
    }
}

impl MixingPlatform for FakeMixing {
    fn create_engine(&mut self, status: Arc<EngineStatus>) -> Result<Box<dyn MixingEngine>, MixingError> {
        let mut state = self.state();
        state.engines_created += 1;
        state.engine_status = Some(status);
        Ok(Box::new(FakeEngine {
            state: self.state.clone(),
        }))
    }
}

struct FakeEngine {
    state: Arc<Mutex<FakeMixingState>>,
}

impl MixingEngine for FakeEngine {
    fn create_master_output(&mut self) -> Result<(), MixingError> {
        let state = self.state.lock();
        if state.no_device {
            return Err(MixingError::NoDevice);
        }
        if let Some(code) = state.fail_output {
            return Err(MixingError::backend(code, "scripted output failure"));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), MixingError> {
        self.state.lock().engine_starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().engine_stops += 1;
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<(), MixingError> {
        self.state.lock().master_volume = Some(volume);
        Ok(())
    }

    fn create_voice(
        &mut self,
        _format: WaveFormat,
        status: Arc<VoiceStatus>,
    ) -> Result<Box<dyn SourceVoice>, MixingError> {
        let mut state = self.state.lock();
        state.voices_created += 1;
        state.voice_statuses.push(status);
        Ok(Box::new(FakeVoice {
            state: self.state.clone(),
        }))
    }
}

struct FakeVoice {
    state: Arc<Mutex<FakeMixingState>>,
}

impl SourceVoice for FakeVoice {
    fn submit(&mut self, _clip: Arc<SampleBuffer>, loop_count: u32) -> Result<(), MixingError> {
        let mut state = self.state.lock();
        state.submits += 1;
        state.submitted_loops.push(loop_count);
        Ok(())
    }

    fn start(&mut self) -> Result<(), MixingError> {
        let mut state = self.state.lock();
        if let Some(code) = state.fail_next_start.take() {
            return Err(MixingError::backend(code, "scripted start failure"));
        }
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self, _play_tails: bool) -> Result<(), MixingError> {
        self.state.lock().stops += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MixingError> {
        self.state.lock().flushes += 1;
        Ok(())
    }
}

impl Drop for FakeVoice {
    fn drop(&mut self) {
        self.state.lock().voices_destroyed += 1;
    }
}

// ======================= 流媒体 =======================

#[derive(Debug)]
pub(crate) struct FakeMediaState {
    pub available: bool,
    pub fail_startup: bool,
    pub fail_create_stream: bool,
    pub fail_seek: bool,

    pub startups: usize,
    pub shutdowns: usize,
    pub streams_created: usize,
    pub notify: Option<Arc<MusicNotify>>,

    pub auto_play: Option<bool>,
    pub looping: Option<bool>,
    pub sources: Vec<PathBuf>,
    pub plays: usize,
    pub pauses: usize,
    pub paused: bool,
    pub time: f64,
    pub time_queries: usize,
    pub seeks: Vec<f64>,
    pub volume: Option<f64>,
}

impl Default for FakeMediaState {
    fn default() -> Self {
        Self {
            available: true,
            fail_startup: false,
            fail_create_stream: false,
            fail_seek: false,
            startups: 0,
            shutdowns: 0,
            streams_created: 0,
            notify: None,
            auto_play: None,
            looping: None,
            sources: Vec::new(),
            plays: 0,
            pauses: 0,
            paused: true,
            time: 0.0,
            time_queries: 0,
            seeks: Vec::new(),
            volume: None,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeMedia {
    state: Arc<Mutex<FakeMediaState>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        let media = Self::new();
        media.state().available = false;
        media
    }

    pub fn state(&self) -> MutexGuard<'_, FakeMediaState> {
        self.state.lock()
    }

    /// 当前流的通知对象
    pub fn notify(&self) -> Arc<MusicNotify> {
        self.state()
            .notify
            .clone()
            .expect("no music stream was created")
    }

    pub fn post(&self, event: MusicEvent) {
        self.notify().post(event);
    }

    pub fn finish_track(&self) {
        self.post(MusicEvent::Ended);
    }

    pub fn start_playing(&self) {
        self.post(MusicEvent::Playing);
    }
}

impl MediaPlatform for FakeMedia {
    fn startup(&mut self) -> Result<(), MusicError> {
        let mut state = self.state();
        if !state.available {
            return Err(MusicError::Unavailable);
        }
        if state.fail_startup {
            return Err(MusicError::Device("scripted startup failure".into()));
        }
        state.startups += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.state().shutdowns += 1;
    }

    fn create_stream(&mut self, notify: Arc<MusicNotify>) -> Result<Box<dyn MusicStream>, MusicError> {
        let mut state = self.state();
        if state.fail_create_stream {
            return Err(MusicError::Device("scripted stream failure".into()));
        }
        state.streams_created += 1;
        state.notify = Some(notify);
        Ok(Box::new(FakeStream {
            state: self.state.clone(),
        }))
    }
}

struct FakeStream {
    state: Arc<Mutex<FakeMediaState>>,
}

impl MusicStream for FakeStream {
    fn set_auto_play(&mut self, enabled: bool) {
        self.state.lock().auto_play = Some(enabled);
    }

    fn set_looping(&mut self, enabled: bool) {
        self.state.lock().looping = Some(enabled);
    }

    fn set_source(&mut self, path: &Path) -> Result<(), MusicError> {
        let mut state = self.state.lock();
        state.sources.push(path.to_path_buf());
        state.paused = true;
        state.time = 0.0;
        Ok(())
    }

    fn play(&mut self) -> Result<(), MusicError> {
        let mut state = self.state.lock();
        state.plays += 1;
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.pauses += 1;
        state.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn current_time(&self) -> f64 {
        let mut state = self.state.lock();
        state.time_queries += 1;
        state.time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), MusicError> {
        let mut state = self.state.lock();
        if state.fail_seek {
            return Err(MusicError::Seek("scripted seek failure".into()));
        }
        state.seeks.push(seconds);
        state.time = seconds;
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.lock().volume = Some(volume);
    }
}

// ======================= 解码 =======================

#[derive(Debug, Default)]
struct FakeDecoderState {
    decodes: usize,
    fail_next: bool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeDecoder {
    state: Arc<Mutex<FakeDecoderState>>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_count(&self) -> usize {
        self.state.lock().decodes
    }

    pub fn fail_next(&self) {
        self.state.lock().fail_next = true;
    }
}

impl StreamDecoder for FakeDecoder {
    fn decode(&self, _path: &Path) -> Result<SampleBuffer, DecodeError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(DecodeError::Unsupported("scripted decode failure".into()));
        }
        state.decodes += 1;
        Ok(SampleBuffer::new(vec![0.0; 480], WaveFormat::float32(48000, 1)))
    }
}

// ======================= 文件 =======================

/// 写一个 16 位 PCM WAV：偶数采样为 +0.25，奇数采样为 -0.25
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let data_len = frames * channels as u32 * 2;
    let mut out = BufWriter::new(File::create(path).expect("create wav"));

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    header.extend_from_slice(&(channels * 2).to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    out.write_all(&header).expect("write wav header");

    for i in 0..frames * channels as u32 {
        let sample: i16 = if i % 2 == 0 { 8192 } else { -8192 };
        out.write_all(&sample.to_le_bytes()).expect("write wav data");
    }
    out.flush().expect("flush wav");
}
