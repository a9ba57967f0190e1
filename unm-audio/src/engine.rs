use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};

use crate::backend::{
    EngineStatus, MediaPlatform, MixingEngine, MixingPlatform, MusicErrorKind, MusicEvent,
    MusicNotify, MusicStream,
};
use crate::decoder::StreamDecoder;
use crate::error::{MixingError, MusicError, Result};
use crate::library::SoundEffectLibrary;
use crate::runtime::MediaRuntime;
use crate::sequencer::{Advance, MusicQueueEntry, MusicSequencer};
use crate::settings::{AudioSettings, EngineConfig};
use crate::voice::PlayOutcome;

/// `update` 返回的诊断位掩码，仅供统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateErrors(u32);

impl UpdateErrors {
    pub const NONE: UpdateErrors = UpdateErrors(0);
    pub const MUSIC_ENGINE: UpdateErrors = UpdateErrors(1);
    pub const SOUND_EFFECTS_ENGINE: UpdateErrors = UpdateErrors(2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: UpdateErrors) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for UpdateErrors {
    type Output = UpdateErrors;

    fn bitor(self, rhs: UpdateErrors) -> UpdateErrors {
        UpdateErrors(self.0 | rhs.0)
    }
}

impl BitOrAssign for UpdateErrors {
    fn bitor_assign(&mut self, rhs: UpdateErrors) {
        self.0 |= rhs.0;
    }
}

enum MixingState {
    Off,
    Active(Box<dyn MixingEngine>),
}

struct ActiveMusic {
    stream: Box<dyn MusicStream>,
    notify: Arc<MusicNotify>,
}

enum MusicState {
    /// 平台没有流媒体能力，本次会话内永久禁用
    Unavailable,
    Off,
    Active(ActiveMusic),
}

/// 对外 0~100 的音量映射到后端 0~1，NaN 视为 0
fn normalize_volume(volume: f64) -> f64 {
    (volume / 100.0).max(0.0).min(1.0)
}

/// 音乐与音效的统一控制面。
///
/// 所有调用都应来自同一个游戏线程；后端线程只通过原子标志与这里通信，
/// 在每帧的 [`AudioEngine::update`] 中被轮询。
pub struct AudioEngine {
    config: EngineConfig,

    mixing_platform: Box<dyn MixingPlatform>,
    mixing_status: Arc<EngineStatus>,
    mixing: MixingState,
    library: SoundEffectLibrary,
    effects_volume: f64,

    runtime: MediaRuntime,
    music: MusicState,
    sequencer: MusicSequencer,
    music_volume: f64,
}

impl AudioEngine {
    pub fn new(
        config: EngineConfig,
        mixing_platform: Box<dyn MixingPlatform>,
        media_platform: Box<dyn MediaPlatform>,
        decoder: Box<dyn StreamDecoder>,
    ) -> Self {
        Self {
            config,
            mixing_platform,
            mixing_status: Arc::new(EngineStatus::new()),
            mixing: MixingState::Off,
            library: SoundEffectLibrary::new(decoder),
            effects_volume: 100.0,
            runtime: MediaRuntime::new(media_platform),
            music: MusicState::Off,
            sequencer: MusicSequencer::new(),
            music_volume: 100.0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 启动两个后端，失败的一方降级为关闭
    pub fn initialize(&mut self) {
        self.initialize_music_engine();
        self.initialize_sound_effects_engine();
    }

    pub fn shutdown(&mut self) {
        self.shutdown_music_engine();
        self.shutdown_sound_effects_engine();
    }

    // ======================= 生命周期 =======================

    pub fn initialize_sound_effects_engine(&mut self) {
        self.shutdown_sound_effects_engine();
        // 丢弃上一个引擎遗留的错误
        let _ = self.mixing_status.take_critical();

        let created = self
            .mixing_platform
            .create_engine(self.mixing_status.clone())
            .and_then(|mut engine| {
                engine.create_master_output()?;
                engine.start()?;
                Ok(engine)
            });

        match created {
            Ok(engine) => {
                self.mixing = MixingState::Active(engine);
                self.apply_effects_volume();
                info!("Sound effects engine started");
            }
            Err(MixingError::NoDevice) => {
                info!("No audio output device, sound effects disabled");
            }
            Err(err) => {
                error!("Failed to start sound effects engine: {err}");
            }
        }
    }

    /// 清空所有 voice 池后释放引擎，不保留复用
    pub fn shutdown_sound_effects_engine(&mut self) {
        self.library.clear_all_voices();
        if let MixingState::Active(engine) = &mut self.mixing {
            engine.stop();
            info!("Sound effects engine shut down");
        }
        self.mixing = MixingState::Off;
    }

    pub fn initialize_music_engine(&mut self) {
        self.shutdown_music_engine();

        match self.runtime.startup() {
            Ok(()) => {}
            Err(MusicError::Unavailable) => {
                info!("Streaming media is not available on this platform, music disabled");
                self.music = MusicState::Unavailable;
                return;
            }
            Err(err) => {
                error!("Failed to start streaming media: {err}");
                self.music = MusicState::Off;
                return;
            }
        }

        let notify = Arc::new(MusicNotify::new());
        match self.runtime.create_stream(notify.clone()) {
            Ok(mut stream) => {
                // 循环和自动推进由队列负责
                stream.set_auto_play(false);
                stream.set_looping(false);
                stream.set_volume(normalize_volume(self.music_volume));
                self.music = MusicState::Active(ActiveMusic { stream, notify });
                info!("Music engine started");
            }
            Err(err) => {
                error!("Failed to create music stream, music disabled: {err}");
                self.runtime.shutdown();
                self.music = MusicState::Off;
            }
        }
    }

    pub fn shutdown_music_engine(&mut self) {
        if let MusicState::Active(_) = self.music {
            info!("Music engine shut down");
        }
        if !matches!(self.music, MusicState::Unavailable) {
            self.music = MusicState::Off;
        }
        self.runtime.shutdown();
    }

    /// 每帧调用一次。轮询后端错误与音乐通知，必要时重建后端。
    pub fn update(&mut self) -> UpdateErrors {
        let mut errors = UpdateErrors::NONE;

        if matches!(self.mixing, MixingState::Active(_)) {
            if let Some(code) = self.mixing_status.take_critical() {
                warn!("Sound effects engine reported critical error {code}, restarting it");
                errors |= UpdateErrors::SOUND_EFFECTS_ENGINE;
                self.rebuild_sound_effects_engine();
            }
        }

        self.restart_failed_sound_effects();
        errors |= self.update_music();

        trace!("Audio update finished with {:#x}", errors.bits());
        errors
    }

    fn rebuild_sound_effects_engine(&mut self) {
        let active = self.library.started_voices();
        self.initialize_sound_effects_engine();

        let MixingState::Active(engine) = &mut self.mixing else {
            return;
        };
        for (name, loops) in &active {
            if let Err(err) = self.library.play(engine.as_mut(), name, *loops, 0) {
                warn!("Failed to restart '{name}' after engine rebuild: {err}");
            }
        }
        debug!("Restarted {} voices after engine rebuild", active.len());
    }

    fn update_music(&mut self) -> UpdateErrors {
        let notify = match &self.music {
            MusicState::Active(music) => music.notify.clone(),
            _ => return UpdateErrors::NONE,
        };
        let mut errors = UpdateErrors::NONE;

        if notify.is_finished() && self.sequencer.is_playing() && !self.sequencer.is_paused() {
            notify.clear_finished();
            match self.sequencer.advance_on_finish() {
                Advance::PlayFront => self.play_music(),
                Advance::Halt => debug!("Music queue halted after finished track"),
            }
        }

        if self.sequencer.is_playing() && notify.take_ready_to_seek() && !self.sequencer.is_paused() {
            if let Some(position) = self.sequencer.take_seek() {
                if let MusicState::Active(music) = &mut self.music {
                    match music.stream.set_current_time(position) {
                        Ok(()) => debug!("Music seeked to {position:.3}s"),
                        Err(err) => warn!("Ignoring failed music seek: {err}"),
                    }
                }
            }
        }

        if let Some(kind) = notify.take_error() {
            errors |= UpdateErrors::MUSIC_ENGINE;
            match kind {
                MusicErrorKind::Decode => {
                    warn!("Music decode error, restarting music engine");
                    self.initialize_music_engine();
                    if self.sequencer.is_playing() && !self.sequencer.is_paused() {
                        self.play_music();
                    }
                }
                MusicErrorKind::SrcNotSupported => {
                    warn!("Music source is not supported, abandoning current track");
                    self.sequencer.mark_stopped();
                }
                other => debug!("Ignoring music error {other:?}"),
            }
        }

        errors
    }

    // ======================= 音效 =======================

    /// 返回是否真正执行了解码
    pub fn load_sound_effect(&mut self, name: &str, force_reload: bool) -> Result<bool> {
        let path = self.config.resolve(name);
        self.library.load(name, &path, force_reload)
    }

    pub fn unload_sound_effect(&mut self, name: &str) -> Result<()> {
        self.library.unload(name)
    }

    /// `loop_count` 为额外循环次数，`LOOP_INFINITE` 表示无限；`max_concurrent` 为 0 表示不限
    pub fn play_sound_effect(&mut self, name: &str, loop_count: u32, max_concurrent: usize) -> Result<PlayOutcome> {
        let MixingState::Active(engine) = &mut self.mixing else {
            return Ok(PlayOutcome::Disabled);
        };
        self.library.play(engine.as_mut(), name, loop_count, max_concurrent)
    }

    pub fn stop_sound_effect(&mut self, name: &str, play_tails: bool) -> Result<()> {
        self.library.stop(name, play_tails)
    }

    /// 可能阻塞，适合在加载界面等非关键时刻调用
    pub fn clear_unused_source_voices(&mut self, name: &str) -> Result<usize> {
        self.library.clear_unused_voices(name)
    }

    pub fn pause_sound_effects(&mut self) {
        if matches!(self.mixing, MixingState::Active(_)) {
            self.library.pause_all();
        }
    }

    pub fn resume_sound_effects(&mut self) {
        if matches!(self.mixing, MixingState::Active(_)) {
            self.library.resume_all();
        }
    }

    /// 返回重建的 voice 数量
    pub fn restart_failed_sound_effects(&mut self) -> usize {
        let MixingState::Active(engine) = &mut self.mixing else {
            return 0;
        };
        let restarted = self.library.restart_failed(engine.as_mut());
        if restarted > 0 {
            debug!("Restarted {restarted} failed voices");
        }
        restarted
    }

    pub fn play_sound_effects_volume_test_sound(&mut self) -> Result<()> {
        let name = self.config.effects_test_sound.clone();
        self.load_sound_effect(&name, false)?;
        self.play_sound_effect(&name, 0, 0)?;
        Ok(())
    }

    pub fn is_sound_effect_loaded(&self, name: &str) -> bool {
        self.library.is_loaded(name)
    }

    /// 池中 voice 总数，未加载时为 `None`
    pub fn voice_count(&self, name: &str) -> Option<usize> {
        self.library.voice_count(name)
    }

    pub fn started_voice_count(&self, name: &str) -> Option<usize> {
        self.library.started_count(name)
    }

    // ======================= 音乐 =======================

    /// 空文件名表示一段静音
    pub fn add_music_to_queue(&mut self, filename: &str, loop_count: i32, auto_play_after_previous: bool) {
        self.sequencer
            .add(MusicQueueEntry::new(filename, loop_count, auto_play_after_previous));
    }

    /// 不会停止正在播放的流
    pub fn clear_music_queue(&mut self) {
        self.sequencer.clear();
    }

    pub fn music_queue(&self) -> impl Iterator<Item = &MusicQueueEntry> {
        self.sequencer.entries()
    }

    pub fn play_music(&mut self) {
        let MusicState::Active(music) = &mut self.music else {
            return;
        };
        let Some(entry) = self.sequencer.front() else {
            debug!("Music queue is empty, nothing to play");
            return;
        };

        if entry.is_silence() {
            if !music.stream.is_paused() {
                music.stream.pause();
            }
            // 静音条目视为立即播完，下一帧推进
            music.notify.post(MusicEvent::Ended);
        } else {
            music.notify.clear_finished();
            let path = self.config.resolve(&entry.filename);
            let result = music
                .stream
                .set_source(&path)
                .and_then(|_| music.stream.play());
            match result {
                Ok(()) => debug!("Playing music '{}'", entry.filename),
                Err(err) => warn!("Failed to play music '{}': {err}", entry.filename),
            }
        }

        self.sequencer.mark_playing();
    }

    /// 手动切歌，忽略队首剩余的循环次数
    pub fn move_to_next_music_in_queue(&mut self) {
        self.sequencer.pop_front();

        let MusicState::Active(music) = &mut self.music else {
            return;
        };
        if self.sequencer.is_empty() {
            music.stream.pause();
        } else {
            self.play_music();
        }
    }

    /// 返回暂停时的位置（秒），音乐关闭时为 -1
    pub fn pause_music(&mut self) -> f64 {
        if self.sequencer.is_paused() {
            return self.sequencer.position();
        }
        self.sequencer.set_paused(true);

        let MusicState::Active(music) = &mut self.music else {
            self.sequencer.set_position(-1.0);
            return -1.0;
        };

        let position = music.stream.current_time();
        music.stream.pause();
        self.sequencer.set_position(position);
        position
    }

    pub fn resume_music(&mut self) {
        self.resume_music_at_time(self.sequencer.position());
    }

    /// 负数表示不定位。定位在后端开始出声后由 `update` 执行
    pub fn resume_music_at_time(&mut self, seconds: f64) {
        self.sequencer.set_paused(false);

        let MusicState::Active(music) = &self.music else {
            return;
        };
        music.notify.clear_finished();
        self.sequencer.set_position(seconds);
        self.play_music();
    }

    pub fn music_current_time(&self) -> f64 {
        match &self.music {
            MusicState::Active(music) => music.stream.current_time(),
            _ => 0.0,
        }
    }

    /// 正在播放时立即定位，否则（包括暂停中）记录下来等下次播放；负数清除记录
    pub fn set_music_current_time(&mut self, seconds: f64) {
        if seconds < 0.0 {
            self.sequencer.set_position(-1.0);
            return;
        }

        let playing = self.sequencer.is_playing() && !self.sequencer.is_paused();
        match &mut self.music {
            MusicState::Active(music) if playing => {
                if let Err(err) = music.stream.set_current_time(seconds) {
                    warn!("Failed to set music position: {err}");
                }
                self.sequencer.set_position(-1.0);
            }
            _ => self.sequencer.set_position(seconds),
        }
    }

    pub fn play_music_volume_test_sound(&mut self) {
        let MusicState::Active(music) = &mut self.music else {
            return;
        };

        music.stream.pause();
        let path = self.config.resolve(&self.config.music_test_sound);
        if let Err(err) = music.stream.set_source(&path).and_then(|_| music.stream.play()) {
            warn!("Failed to play music volume test sound: {err}");
        }
    }

    pub fn is_music_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn is_music_paused(&self) -> bool {
        self.sequencer.is_paused()
    }

    // ======================= 音量与开关 =======================

    pub fn music_volume(&self) -> f64 {
        self.music_volume
    }

    /// 记录原值，后端关闭时在下次初始化时应用
    pub fn set_music_volume(&mut self, volume: f64) {
        self.music_volume = volume;
        if let MusicState::Active(music) = &mut self.music {
            music.stream.set_volume(normalize_volume(volume));
        }
    }

    pub fn sound_effects_volume(&self) -> f64 {
        self.effects_volume
    }

    pub fn set_sound_effects_volume(&mut self, volume: f64) {
        self.effects_volume = volume;
        self.apply_effects_volume();
    }

    fn apply_effects_volume(&mut self) {
        if let MixingState::Active(engine) = &mut self.mixing {
            if let Err(err) = engine.set_master_volume(normalize_volume(self.effects_volume) as f32) {
                warn!("Failed to set sound effects volume: {err}");
            }
        }
    }

    /// 包括用户关闭和因故障降级两种情况
    pub fn music_off(&self) -> bool {
        !matches!(self.music, MusicState::Active(_))
    }

    /// 平台缺少流媒体能力
    pub fn music_unavailable(&self) -> bool {
        matches!(self.music, MusicState::Unavailable)
    }

    /// 返回操作后的关闭状态。重新打开时会恢复本应在播放的曲目
    pub fn set_music_on_off(&mut self, off: bool) -> bool {
        if off {
            self.shutdown_music_engine();
        } else if matches!(self.music, MusicState::Off) {
            self.initialize_music_engine();
            if !self.music_off() && self.sequencer.is_playing() {
                self.play_music();
            }
        }
        self.music_off()
    }

    pub fn sound_effects_off(&self) -> bool {
        matches!(self.mixing, MixingState::Off)
    }

    /// 返回操作后的关闭状态。重新打开不会恢复之前的音效
    pub fn set_sound_effects_on_off(&mut self, off: bool) -> bool {
        if off {
            self.shutdown_sound_effects_engine();
        } else if self.sound_effects_off() {
            self.initialize_sound_effects_engine();
        }
        self.sound_effects_off()
    }

    pub fn pause_all(&mut self) {
        self.pause_music();
        self.pause_sound_effects();
    }

    pub fn resume_all(&mut self) {
        self.resume_music();
        self.resume_sound_effects();
    }

    // ======================= 设置 =======================

    pub fn settings(&self) -> AudioSettings {
        AudioSettings {
            music_volume: self.music_volume,
            music_off: self.music_off(),
            effects_volume: self.effects_volume,
            effects_off: self.sound_effects_off(),
        }
    }

    pub fn apply_settings(&mut self, settings: &AudioSettings) {
        self.set_music_volume(settings.music_volume);
        self.set_music_on_off(settings.music_off);
        self.set_sound_effects_volume(settings.effects_volume);
        self.set_sound_effects_on_off(settings.effects_off);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
