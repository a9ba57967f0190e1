use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::backend::MixingEngine;
use crate::clip::SampleBuffer;
use crate::decoder::StreamDecoder;
use crate::error::{AudioError, Result};
use crate::voice::{PlayOutcome, VoicePool};

struct SoundEffect {
    clip: Arc<SampleBuffer>,
    pool: VoicePool,
}

/// 按文件名索引的已加载音效及其 voice 池
pub struct SoundEffectLibrary {
    effects: BTreeMap<String, SoundEffect>,
    decoder: Box<dyn StreamDecoder>,
}

impl SoundEffectLibrary {
    pub fn new(decoder: Box<dyn StreamDecoder>) -> Self {
        Self {
            effects: BTreeMap::new(),
            decoder,
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    /// 返回是否真正执行了解码。
    ///
    /// 重新加载会直接丢弃旧 voice，调用方应保证此时该音效不在播放。
    pub fn load(&mut self, name: &str, path: &Path, force_reload: bool) -> Result<bool> {
        if !force_reload && self.effects.contains_key(name) {
            return Ok(false);
        }

        let clip = self.decoder.decode(path).map_err(|source| AudioError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        debug!(
            "Loaded sound effect '{name}': {} frames @ {} Hz, {} ch, {} bytes",
            clip.frames(),
            clip.format().sample_rate,
            clip.format().channels,
            clip.byte_len()
        );

        self.effects.insert(
            name.to_owned(),
            SoundEffect {
                clip: Arc::new(clip),
                pool: VoicePool::default(),
            },
        );
        Ok(true)
    }

    /// 同步停止所有 voice 后移除，可能阻塞到混音线程确认
    pub fn unload(&mut self, name: &str) -> Result<()> {
        let mut effect = self.effects.remove(name).ok_or_else(|| not_found(name))?;
        effect.pool.stop_all(false);
        drop(effect);
        info!("Unloaded sound effect '{name}'");
        Ok(())
    }

    pub fn play(
        &mut self,
        engine: &mut dyn MixingEngine,
        name: &str,
        loop_count: u32,
        max_concurrent: usize,
    ) -> Result<PlayOutcome> {
        let effect = self.effects.get_mut(name).ok_or_else(|| not_found(name))?;
        let outcome = effect.pool.play(engine, &effect.clip, loop_count, max_concurrent)?;
        if outcome == PlayOutcome::Dropped {
            debug!("'{name}' reached {max_concurrent} concurrent instances, call dropped");
        }
        Ok(outcome)
    }

    pub fn stop(&mut self, name: &str, play_tails: bool) -> Result<()> {
        let effect = self.effects.get_mut(name).ok_or_else(|| not_found(name))?;
        effect.pool.stop_all(play_tails);
        Ok(())
    }

    /// 返回销毁的 voice 数量
    pub fn clear_unused_voices(&mut self, name: &str) -> Result<usize> {
        let effect = self.effects.get_mut(name).ok_or_else(|| not_found(name))?;
        Ok(effect.pool.clear_idle())
    }

    pub fn pause_all(&mut self) {
        for effect in self.effects.values_mut() {
            effect.pool.pause();
        }
    }

    pub fn resume_all(&mut self) {
        for effect in self.effects.values_mut() {
            effect.pool.resume();
        }
    }

    pub fn restart_failed(&mut self, engine: &mut dyn MixingEngine) -> usize {
        let mut restarted = 0;
        for (name, effect) in self.effects.iter_mut() {
            restarted += effect.pool.restart_failed(engine, &effect.clip, name);
        }
        restarted
    }

    /// 清空所有池（重建混音后端前调用，放弃复用）
    pub fn clear_all_voices(&mut self) {
        for effect in self.effects.values_mut() {
            effect.pool.clear();
        }
    }

    /// 当前已开始的 voice 及其剩余循环次数
    pub fn started_voices(&self) -> Vec<(String, u32)> {
        self.effects
            .iter()
            .flat_map(|(name, effect)| {
                effect
                    .pool
                    .started_loops()
                    .into_iter()
                    .map(move |loops| (name.clone(), loops))
            })
            .collect()
    }

    pub fn voice_count(&self, name: &str) -> Option<usize> {
        self.effects.get(name).map(|effect| effect.pool.len())
    }

    pub fn started_count(&self, name: &str) -> Option<usize> {
        self.effects.get(name).map(|effect| effect.pool.started_count())
    }

    #[cfg(test)]
    pub(crate) fn voice_status(&self, name: &str, idx: usize) -> Option<Arc<crate::backend::VoiceStatus>> {
        self.effects.get(name).and_then(|effect| effect.pool.status(idx))
    }
}

fn not_found(name: &str) -> AudioError {
    warn!("Sound effect '{name}' is not loaded");
    AudioError::NotFound(name.to_owned())
}
