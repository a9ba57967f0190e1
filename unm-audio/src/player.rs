use std::sync::Arc;

use crate::backend::{MediaPlatform, MusicNotify, MusicStream};
use crate::decoder::SymphoniaDecoder;
use crate::engine::AudioEngine;
use crate::error::MusicError;
use crate::settings::EngineConfig;

/// 当前平台不提供流式音乐时使用，探测时直接报告缺失
pub struct AbsentMedia;

impl MediaPlatform for AbsentMedia {
    fn startup(&mut self) -> Result<(), MusicError> {
        Err(MusicError::Unavailable)
    }

    fn shutdown(&mut self) {}

    fn create_stream(&mut self, _notify: Arc<MusicNotify>) -> Result<Box<dyn MusicStream>, MusicError> {
        Err(MusicError::Unavailable)
    }
}

impl AudioEngine {
    /// 按目标平台装配后端，尚未初始化
    pub fn for_platform(config: EngineConfig) -> Self {
        #[cfg(target_os = "android")]
        let mixing = Box::new(crate::backend::oboe::OboeMixing::new(config.command_queue_capacity));
        #[cfg(not(target_os = "android"))]
        let mixing = Box::new(crate::backend::cpal::CpalMixing::new(config.command_queue_capacity));

        #[cfg(all(feature = "music-streaming", not(target_os = "android")))]
        let media: Box<dyn MediaPlatform> =
            Box::new(crate::backend::stream::StreamingMedia::new(config.stream_buffer_frames));
        #[cfg(not(all(feature = "music-streaming", not(target_os = "android"))))]
        let media: Box<dyn MediaPlatform> = Box::new(AbsentMedia);

        Self::new(config, mixing, media, Box::new(SymphoniaDecoder))
    }
}
