use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use log::warn;
use parking_lot::Mutex;

use crate::backend::{SourceVoice, VoiceStatus};
use crate::clip::{LOOP_INFINITE, SampleBuffer, WaveFormat};
use crate::error::{ErrorCode, MixingError};

/// 销毁 voice 时等待混音线程确认的上限
const DESTROY_TIMEOUT: Duration = Duration::from_millis(50);

pub(crate) type VoiceId = u32;

/// 游戏线程发往混音线程的指令
pub(crate) enum MixCommand {
    Create { id: VoiceId, status: Arc<VoiceStatus> },
    Submit { id: VoiceId, clip: Arc<SampleBuffer>, loop_count: u32 },
    Start { id: VoiceId },
    Stop { id: VoiceId, play_tails: bool },
    Flush { id: VoiceId },
    Destroy { id: VoiceId, done: Arc<AtomicBool> },
    MasterVolume(f32),
}

/// 所有存活 voice 的状态表，供设备错误回调批量置错
pub(crate) type VoiceRegistry = Arc<Mutex<Vec<(VoiceId, Arc<VoiceStatus>)>>>;

pub(crate) fn flag_started_voices(registry: &VoiceRegistry, code: ErrorCode) {
    for (_, status) in registry.lock().iter() {
        if status.is_started() {
            status.on_voice_error(code);
        }
    }
}

/// 游戏线程一侧与混音线程的连接，cpal 和 oboe 后端共用
#[derive(Clone)]
pub(crate) struct MixLink {
    queue: Arc<ArrayQueue<MixCommand>>,
    registry: VoiceRegistry,
    /// 输出流正在回调时为 true，决定销毁 voice 时是否需要等待
    alive: Arc<AtomicBool>,
    next_id: Arc<AtomicU32>,
}

impl MixLink {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            registry: Arc::new(Mutex::new(Vec::new())),
            alive: Arc::new(AtomicBool::new(false)),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub(crate) fn queue(&self) -> Arc<ArrayQueue<MixCommand>> {
        self.queue.clone()
    }

    pub(crate) fn registry(&self) -> VoiceRegistry {
        self.registry.clone()
    }

    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub(crate) fn send(&self, command: MixCommand) -> Result<(), MixingError> {
        self.queue
            .push(command)
            .map_err(|_| MixingError::backend(ErrorCode::INVALID_CALL, "mixing command queue is full"))
    }

    pub(crate) fn create_voice(
        &self,
        format: WaveFormat,
        status: Arc<VoiceStatus>,
    ) -> Result<Box<dyn SourceVoice>, MixingError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(MixingError::backend(
                ErrorCode::FAIL,
                format!("unsupported voice format {format:?}"),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(MixCommand::Create { id, status: status.clone() })?;
        self.registry.lock().push((id, status));

        Ok(Box::new(QueuedVoice { id, link: self.clone() }))
    }
}

/// 通过指令队列驱动的 voice
pub(crate) struct QueuedVoice {
    id: VoiceId,
    link: MixLink,
}

impl SourceVoice for QueuedVoice {
    fn submit(&mut self, clip: Arc<SampleBuffer>, loop_count: u32) -> Result<(), MixingError> {
        self.link.send(MixCommand::Submit { id: self.id, clip, loop_count })
    }

    fn start(&mut self) -> Result<(), MixingError> {
        self.link.send(MixCommand::Start { id: self.id })
    }

    fn stop(&mut self, play_tails: bool) -> Result<(), MixingError> {
        self.link.send(MixCommand::Stop { id: self.id, play_tails })
    }

    fn flush(&mut self) -> Result<(), MixingError> {
        self.link.send(MixCommand::Flush { id: self.id })
    }
}

impl Drop for QueuedVoice {
    fn drop(&mut self) {
        self.link.registry.lock().retain(|(id, _)| *id != self.id);

        let done = Arc::new(AtomicBool::new(false));
        if self
            .link
            .send(MixCommand::Destroy { id: self.id, done: done.clone() })
            .is_err()
        {
            warn!("Voice {} leaked: mixing command queue is full", self.id);
            return;
        }

        // 流没有在回调时无需等待
        let deadline = Instant::now() + DESTROY_TIMEOUT;
        while self.link.alive.load(Ordering::Acquire) && !done.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                warn!("Timed out waiting for the mixer to release voice {}", self.id);
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

struct VoiceState {
    id: VoiceId,
    status: Arc<VoiceStatus>,
    clip: Option<Arc<SampleBuffer>>,
    loops_left: u32,
    /// 源数据中的帧位置（小数部分用于线性插值）
    cursor: f64,
    running: bool,
    /// 带尾音停止时剩余的淡出帧数
    fade: Option<u32>,
}

impl VoiceState {
    fn new(id: VoiceId, status: Arc<VoiceStatus>) -> Self {
        Self {
            id,
            status,
            clip: None,
            loops_left: 0,
            cursor: 0.0,
            running: false,
            fade: None,
        }
    }
}

pub(crate) struct Mixer {
    voices: Vec<VoiceState>,
    master_volume: f32,
    device_rate: u32,
}

impl Mixer {
    pub(crate) fn new(device_rate: u32) -> Self {
        Self {
            voices: Vec::with_capacity(128),
            master_volume: 1.0,
            device_rate: device_rate.max(1),
        }
    }

    pub(crate) fn set_device_rate(&mut self, device_rate: u32) {
        self.device_rate = device_rate.max(1);
    }

    /// 无锁消费指令
    pub(crate) fn drain(&mut self, queue: &ArrayQueue<MixCommand>) {
        while let Some(command) = queue.pop() {
            self.apply(command);
        }
    }

    fn voice_mut(&mut self, id: VoiceId) -> Option<&mut VoiceState> {
        self.voices.iter_mut().find(|voice| voice.id == id)
    }

    pub(crate) fn apply(&mut self, command: MixCommand) {
        match command {
            MixCommand::Create { id, status } => {
                self.voices.push(VoiceState::new(id, status));
            }
            MixCommand::Submit { id, clip, loop_count } => {
                if let Some(voice) = self.voice_mut(id) {
                    voice.clip = Some(clip);
                    voice.loops_left = loop_count;
                    voice.cursor = 0.0;
                    voice.fade = None;
                }
            }
            MixCommand::Start { id } => {
                if let Some(voice) = self.voice_mut(id) {
                    voice.running = voice.clip.is_some();
                    voice.fade = None;
                }
            }
            MixCommand::Stop { id, play_tails } => {
                let fade_frames = self.device_rate / 100;
                if let Some(voice) = self.voice_mut(id) {
                    if play_tails && voice.running {
                        voice.fade = Some(fade_frames.max(1));
                    } else {
                        voice.running = false;
                    }
                }
            }
            MixCommand::Flush { id } => {
                if let Some(voice) = self.voice_mut(id) {
                    voice.clip = None;
                    voice.cursor = 0.0;
                    voice.running = false;
                }
            }
            MixCommand::Destroy { id, done } => {
                if let Some(idx) = self.voices.iter().position(|voice| voice.id == id) {
                    self.voices.swap_remove(idx);
                }
                done.store(true, Ordering::Release);
            }
            MixCommand::MasterVolume(volume) => {
                self.master_volume = volume.clamp(0.0, 1.0);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub(crate) fn mix(&mut self, channels: usize, out_data: &mut [f32]) {
        if channels == 0 {
            return;
        }

        let out_frames = out_data.len() / channels;
        let device_rate = self.device_rate as f64;
        let master = self.master_volume;
        let fade_len = (self.device_rate / 100).max(1) as f32;

        for voice in self.voices.iter_mut().filter(|voice| voice.running) {
            let Some(clip) = voice.clip.clone() else {
                voice.running = false;
                continue;
            };

            let frames = clip.frames();
            let src_channels = clip.format().channels.max(1) as usize;
            if frames == 0 {
                voice.running = false;
                voice.status.on_stream_end();
                continue;
            }

            let step = clip.format().sample_rate as f64 / device_rate;

            for j in 0..out_frames {
                let gain = match voice.fade.as_mut() {
                    Some(0) => {
                        voice.running = false;
                        voice.fade = None;
                        break;
                    }
                    Some(left) => {
                        *left -= 1;
                        master * (*left as f32 / fade_len)
                    }
                    None => master,
                };

                let idx = voice.cursor as usize;
                let frac = (voice.cursor - idx as f64) as f32;
                let next = if idx + 1 < frames {
                    idx + 1
                } else if voice.loops_left > 0 {
                    0
                } else {
                    idx
                };

                let out_base = j * channels;
                for c in 0..channels {
                    let src_c = c % src_channels;
                    let a = clip.sample(idx, src_c);
                    let b = clip.sample(next, src_c);
                    out_data[out_base + c] += (a + (b - a) * frac) * gain;
                }

                voice.cursor += step;
                if voice.cursor >= frames as f64 {
                    if voice.loops_left > 0 {
                        if voice.loops_left != LOOP_INFINITE {
                            voice.loops_left -= 1;
                        }
                        voice.cursor -= frames as f64;
                        voice.status.on_loop_end();
                    } else {
                        voice.running = false;
                        voice.cursor = 0.0;
                        voice.clip = None;
                        voice.status.on_stream_end();
                        break;
                    }
                }
            }
        }

        for sample in out_data.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_clip(frames: usize, rate: u32) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![0.25; frames], WaveFormat::float32(rate, 1)))
    }

    fn started_voice(mixer: &mut Mixer, id: VoiceId, clip: Arc<SampleBuffer>, loops: u32) -> Arc<VoiceStatus> {
        let status = Arc::new(VoiceStatus::new());
        status.mark_started(loops);
        mixer.apply(MixCommand::Create { id, status: status.clone() });
        mixer.apply(MixCommand::Submit { id, clip, loop_count: loops });
        mixer.apply(MixCommand::Start { id });
        status
    }

    #[test]
    fn one_shot_voice_reports_stream_end() {
        let mut mixer = Mixer::new(100);
        let status = started_voice(&mut mixer, 1, mono_clip(4, 100), 0);

        let mut out = vec![0.0; 16];
        mixer.mix(2, &mut out);

        assert!(!status.is_started());
        assert_eq!(out[0], 0.25);
        assert_eq!(out[1], 0.25);
        // 4 帧之后是静音
        assert_eq!(out[8], 0.0);
    }

    #[test]
    fn looping_voice_counts_down() {
        let mut mixer = Mixer::new(100);
        let status = started_voice(&mut mixer, 1, mono_clip(4, 100), 2);

        let mut out = vec![0.0; 8];
        mixer.mix(1, &mut out);
        assert_eq!(status.loops_remaining(), 0);
        assert!(status.is_started());

        mixer.mix(1, &mut out);
        assert!(!status.is_started());
    }

    #[test]
    fn resampling_consumes_source_at_its_own_rate() {
        let mut mixer = Mixer::new(200);
        let status = started_voice(&mut mixer, 1, mono_clip(4, 100), 0);

        // 100Hz 源在 200Hz 设备上需要 8 帧
        let mut out = vec![0.0; 7];
        mixer.mix(1, &mut out);
        assert!(status.is_started());

        let mut out = vec![0.0; 1];
        mixer.mix(1, &mut out);
        assert!(!status.is_started());
    }

    #[test]
    fn stop_with_tails_fades_out() {
        // 1000Hz 设备上淡出 10 帧
        let mut mixer = Mixer::new(1000);
        started_voice(&mut mixer, 1, mono_clip(2000, 1000), 0);
        mixer.apply(MixCommand::Stop { id: 1, play_tails: true });

        let mut out = vec![0.0; 16];
        mixer.mix(1, &mut out);
        assert!(out[0] > 0.0 && out[0] < 0.25);
        assert!(out[0] > out[5] && out[5] > 0.0);
        assert!(out[9..].iter().all(|&sample| sample == 0.0));

        let mut out = vec![0.0; 16];
        mixer.mix(1, &mut out);
        assert!(out.iter().all(|&sample| sample == 0.0));
    }

    #[test]
    fn stop_without_tails_cuts_immediately() {
        let mut mixer = Mixer::new(1000);
        started_voice(&mut mixer, 1, mono_clip(2000, 1000), 0);
        mixer.apply(MixCommand::Stop { id: 1, play_tails: false });

        let mut out = vec![0.0; 16];
        mixer.mix(1, &mut out);
        assert!(out.iter().all(|&sample| sample == 0.0));
    }

    #[test]
    fn destroy_acknowledges() {
        let mut mixer = Mixer::new(100);
        started_voice(&mut mixer, 7, mono_clip(4, 100), 0);

        let done = Arc::new(AtomicBool::new(false));
        mixer.apply(MixCommand::Destroy { id: 7, done: done.clone() });
        assert!(done.load(Ordering::Acquire));
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn link_reports_full_queue_as_invalid_call() {
        let link = MixLink::new(1);
        let status = Arc::new(VoiceStatus::new());
        let mut voice = link
            .create_voice(WaveFormat::float32(100, 1), status)
            .unwrap();

        // Create 指令已占满队列
        let err = voice.start().unwrap_err();
        assert_eq!(err.code(), ErrorCode::INVALID_CALL);
    }

    #[test]
    fn queued_voice_round_trips_through_mixer() {
        let link = MixLink::new(16);
        let status = Arc::new(VoiceStatus::new());
        let mut voice = link
            .create_voice(WaveFormat::float32(100, 1), status.clone())
            .unwrap();
        voice.submit(mono_clip(2, 100), 0).unwrap();
        voice.start().unwrap();
        status.mark_started(0);

        let mut mixer = Mixer::new(100);
        mixer.drain(&link.queue());
        assert_eq!(mixer.voice_count(), 1);

        let mut out = vec![0.0; 4];
        mixer.mix(1, &mut out);
        assert!(!status.is_started());

        drop(voice);
        assert!(link.registry().lock().is_empty());
        mixer.drain(&link.queue());
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn output_is_clamped() {
        let mut mixer = Mixer::new(100);
        for id in 0..8 {
            started_voice(&mut mixer, id, mono_clip(4, 100), 0);
        }
        let mut out = vec![0.0; 2];
        mixer.mix(1, &mut out);
        assert_eq!(out[0], 1.0);
    }
}
