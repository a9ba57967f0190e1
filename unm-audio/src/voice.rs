use std::sync::Arc;

use log::{debug, warn};
use unm_tools::SlotPool;

use crate::backend::{MixingEngine, SourceVoice, VoiceStatus};
use crate::clip::SampleBuffer;
use crate::error::MixingError;

pub(crate) struct Voice {
    source: Box<dyn SourceVoice>,
    status: Arc<VoiceStatus>,
}

impl Voice {
    fn create(engine: &mut dyn MixingEngine, clip: &SampleBuffer) -> Result<Self, MixingError> {
        let status = Arc::new(VoiceStatus::new());
        let source = engine.create_voice(clip.format(), status.clone())?;
        Ok(Self { source, status })
    }

    /// 提交并开始播放。失败时把错误记到 voice 上，交给下一帧的重启流程处理
    fn play(&mut self, clip: &Arc<SampleBuffer>, loop_count: u32) {
        self.status.mark_started(loop_count);

        let result = self
            .source
            .submit(clip.clone(), loop_count)
            .and_then(|_| self.source.start());
        if let Err(err) = result {
            warn!("Failed to start voice: {err}");
            self.status.on_voice_error(err.code());
        }
    }

    fn is_idle(&self) -> bool {
        !self.status.is_started() && !self.status.has_error()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// 复用了空闲 voice
    Reused(usize),
    /// 池中没有空闲 voice，新建了一个
    Created(usize),
    /// 达到并发上限，本次调用被丢弃
    Dropped,
    /// 音效已关闭
    Disabled,
}

/// 单个音效的 voice 池：优先复用空闲 voice，不够时才创建
#[derive(Default)]
pub(crate) struct VoicePool {
    voices: SlotPool<Voice>,
}

impl VoicePool {
    pub(crate) fn len(&self) -> usize {
        self.voices.len()
    }

    pub(crate) fn started_count(&self) -> usize {
        self.voices.count(|voice| voice.status.is_started())
    }

    pub(crate) fn play(
        &mut self,
        engine: &mut dyn MixingEngine,
        clip: &Arc<SampleBuffer>,
        loop_count: u32,
        max_concurrent: usize,
    ) -> Result<PlayOutcome, MixingError> {
        if max_concurrent > 0 && self.started_count() >= max_concurrent {
            return Ok(PlayOutcome::Dropped);
        }

        let idle = self.voices.find_mut(|voice| voice.is_idle()).map(|(idx, _)| idx);
        let outcome = match idle {
            Some(idx) => PlayOutcome::Reused(idx),
            None => {
                let voice = Voice::create(engine, clip)?;
                PlayOutcome::Created(self.voices.insert(voice))
            }
        };

        if let PlayOutcome::Reused(idx) | PlayOutcome::Created(idx) = outcome {
            if let Some(voice) = self.voices.get_mut(idx) {
                voice.play(clip, loop_count);
            }
        }
        Ok(outcome)
    }

    /// 停止所有已开始的 voice 并标记为空闲
    pub(crate) fn stop_all(&mut self, play_tails: bool) {
        for (idx, voice) in self.voices.iter_mut() {
            if !voice.status.is_started() {
                continue;
            }

            let mut result = voice.source.stop(play_tails);
            if !play_tails {
                result = result.and_then(|_| voice.source.flush());
            }
            if let Err(err) = result {
                warn!("Failed to stop voice {idx}: {err}");
            }
            voice.status.mark_stopped();
        }
    }

    /// 暂停已开始的 voice，保留 started 标记以便恢复
    pub(crate) fn pause(&mut self) {
        for (idx, voice) in self.voices.iter_mut() {
            if voice.status.is_started() {
                if let Err(err) = voice.source.stop(false) {
                    warn!("Failed to pause voice {idx}: {err}");
                }
            }
        }
    }

    pub(crate) fn resume(&mut self) {
        for (idx, voice) in self.voices.iter_mut() {
            if voice.status.is_started() {
                if let Err(err) = voice.source.start() {
                    warn!("Failed to resume voice {idx}: {err}");
                }
            }
        }
    }

    /// 处理被置错的 voice，返回重建的数量。
    ///
    /// 可恢复错误码按剩余循环次数重建并重新播放，其它错误码直接标记为停止。
    /// 错误标志无论结果如何都会被清除。
    pub(crate) fn restart_failed(
        &mut self,
        engine: &mut dyn MixingEngine,
        clip: &Arc<SampleBuffer>,
        name: &str,
    ) -> usize {
        let mut restarted = 0;

        for (idx, voice) in self.voices.iter_mut() {
            let Some(code) = voice.status.take_error() else {
                continue;
            };

            if !code.is_recoverable() {
                warn!("Voice {idx} of '{name}' failed with {code}, giving up on it");
                if let Err(err) = voice.source.stop(false) {
                    warn!("Failed to stop failed voice {idx} of '{name}': {err}");
                }
                voice.status.mark_stopped();
                continue;
            }

            let loops = voice.status.loops_remaining();
            match Voice::create(engine, clip) {
                Ok(mut fresh) => {
                    fresh.play(clip, loops);
                    *voice = fresh;
                    restarted += 1;
                    debug!("Voice {idx} of '{name}' restarted after {code}");
                }
                Err(err) => {
                    warn!("Failed to recreate voice {idx} of '{name}': {err}");
                    voice.status.mark_stopped();
                }
            }
        }

        restarted
    }

    /// 销毁空闲 voice，随后回收尾部空槽；其余 voice 的下标不变
    pub(crate) fn clear_idle(&mut self) -> usize {
        let removed = self.voices.retain(|voice| voice.status.is_started());
        self.voices.trim_tail();
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    /// 已开始 voice 的剩余循环次数
    pub(crate) fn started_loops(&self) -> Vec<u32> {
        self.voices
            .iter()
            .filter(|(_, voice)| voice.status.is_started())
            .map(|(_, voice)| voice.status.loops_remaining())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn status(&self, idx: usize) -> Option<Arc<VoiceStatus>> {
        self.voices.get(idx).map(|voice| voice.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MixingPlatform;
    use crate::clip::WaveFormat;
    use crate::error::ErrorCode;
    use crate::testing::FakeMixing;

    fn clip() -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![0.0; 64], WaveFormat::float32(48000, 1)))
    }

    fn engine(mixing: &FakeMixing) -> Box<dyn MixingEngine> {
        let mut platform = mixing.clone();
        platform
            .create_engine(Arc::new(crate::backend::EngineStatus::new()))
            .unwrap()
    }

    #[test]
    fn finished_voice_is_reused() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        for _ in 0..5 {
            pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
            pool.status(0).unwrap().on_stream_end();
        }
        assert_eq!(pool.len(), 1);
        assert_eq!(mixing.state().voices_created, 1);
    }

    #[test]
    fn cap_drops_extra_instances() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        for _ in 0..3 {
            assert!(matches!(
                pool.play(engine.as_mut(), &clip, 0, 3).unwrap(),
                PlayOutcome::Created(_)
            ));
        }
        assert_eq!(pool.play(engine.as_mut(), &clip, 0, 3).unwrap(), PlayOutcome::Dropped);
        assert_eq!(pool.started_count(), 3);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn restart_ignores_healthy_voices_and_clears_flags() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        pool.play(engine.as_mut(), &clip, 4, 0).unwrap();
        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();

        let recoverable = pool.status(0).unwrap();
        recoverable.on_loop_end();
        recoverable.on_voice_error(ErrorCode::DEVICE_INVALIDATED);
        let fatal = pool.status(1).unwrap();
        fatal.on_voice_error(ErrorCode::FAIL);

        assert_eq!(pool.restart_failed(engine.as_mut(), &clip, "hit.wav"), 1);
        assert_eq!(mixing.state().voices_created, 4);

        // 重建后的 voice 继续剩余的 3 次循环
        let rebuilt = pool.status(0).unwrap();
        assert!(rebuilt.is_started());
        assert_eq!(rebuilt.loops_remaining(), 3);
        assert!(!recoverable.has_error());

        assert!(!fatal.has_error());
        assert!(!fatal.is_started());

        // 健康的 voice 不受影响
        assert!(pool.status(2).unwrap().is_started());
        assert_eq!(pool.restart_failed(engine.as_mut(), &clip, "hit.wav"), 0);
        assert_eq!(mixing.state().voices_created, 4);
    }

    #[test]
    fn clear_idle_keeps_started_indices() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        for _ in 0..4 {
            pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        }
        pool.status(0).unwrap().on_stream_end();
        pool.status(3).unwrap().on_stream_end();
        let kept = pool.status(2).unwrap();

        assert_eq!(pool.clear_idle(), 2);
        assert_eq!(pool.len(), 2);
        assert!(Arc::ptr_eq(&pool.status(2).unwrap(), &kept));
        assert_eq!(mixing.state().voices_destroyed, 2);
    }

    #[test]
    fn stop_all_frees_started_voices() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        pool.play(engine.as_mut(), &clip, 2, 0).unwrap();
        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        pool.status(2).unwrap().on_stream_end();

        pool.stop_all(false);
        assert_eq!(pool.started_count(), 0);
        assert_eq!(mixing.state().stops, 2);
        assert_eq!(mixing.state().flushes, 2);

        // 停止后的 voice 可以直接复用，池不增长
        for _ in 0..3 {
            assert!(matches!(
                pool.play(engine.as_mut(), &clip, 0, 0).unwrap(),
                PlayOutcome::Reused(_)
            ));
        }
        assert_eq!(pool.len(), 3);
        assert_eq!(mixing.state().voices_created, 3);
    }

    #[test]
    fn stop_with_tails_does_not_flush() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();

        pool.stop_all(true);
        assert_eq!(pool.started_count(), 0);
        assert_eq!(mixing.state().stops, 2);
        assert_eq!(mixing.state().flushes, 0);
    }

    #[test]
    fn pause_keeps_started_flags() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        pool.status(1).unwrap().on_stream_end();

        pool.pause();
        assert_eq!(pool.started_count(), 1);

        let starts_before = mixing.state().starts;
        pool.resume();
        assert_eq!(mixing.state().starts, starts_before + 1);
    }

    #[test]
    fn failed_submit_is_flagged_for_restart() {
        let mixing = FakeMixing::new();
        let mut engine = engine(&mixing);
        let clip = clip();
        let mut pool = VoicePool::default();

        mixing.state().fail_next_start = Some(ErrorCode::INVALID_CALL);
        pool.play(engine.as_mut(), &clip, 0, 0).unwrap();
        assert!(pool.status(0).unwrap().has_error());

        assert_eq!(pool.restart_failed(engine.as_mut(), &clip, "hit.wav"), 1);
        assert!(pool.status(0).unwrap().is_started());
    }
}
