// 标准库导入
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

// 第三方 crate 导入
use crossbeam_queue::ArrayQueue;
use log::{error, info};
use oboe::{
    AudioOutputCallback, AudioOutputStreamSafe, AudioStream, AudioStreamAsync, AudioStreamBase,
    AudioStreamBuilder, DataCallbackResult, Error, Output, PerformanceMode, SharingMode, Stereo,
    Usage,
};

// 当前 crate 内部模块导入
use crate::backend::{EngineStatus, MixingEngine, MixingPlatform, SourceVoice, VoiceStatus};
use crate::clip::WaveFormat;
use crate::error::{ErrorCode, MixingError};
use crate::mixer::{MixCommand, MixLink, Mixer, VoiceRegistry, flag_started_voices};

/// Oboe 音频回调结构体
struct OboeCallback {
    mixer: Mixer,
    queue: Arc<ArrayQueue<MixCommand>>,
    status: Arc<EngineStatus>,
    registry: VoiceRegistry,
    alive: Arc<AtomicBool>,
}

impl AudioOutputCallback for OboeCallback {
    type FrameType = (f32, Stereo);

    fn on_audio_ready(
        &mut self,
        stream: &mut dyn AudioOutputStreamSafe,
        data: &mut [(f32, f32)],
    ) -> DataCallbackResult {
        let data = unsafe {
            std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut f32, data.len() * 2)
        };
        data.fill(0.0);

        self.mixer.set_device_rate(stream.get_sample_rate() as u32);
        self.mixer.drain(&self.queue);
        self.mixer.mix(2, data);

        DataCallbackResult::Continue
    }

    fn on_error_before_close(&mut self, _audio_stream: &mut dyn AudioOutputStreamSafe, err: Error) {
        error!("Oboe output stream failed: {err:?}");
        self.alive.store(false, Ordering::Release);
        self.status.report_critical(ErrorCode::DEVICE_INVALIDATED);
        flag_started_voices(&self.registry, ErrorCode::DEVICE_INVALIDATED);
    }
}

/// Android 混音后端
pub struct OboeMixing {
    command_capacity: usize,
}

impl OboeMixing {
    pub fn new(command_capacity: usize) -> Self {
        Self { command_capacity }
    }
}

impl MixingPlatform for OboeMixing {
    fn create_engine(&mut self, status: Arc<EngineStatus>) -> Result<Box<dyn MixingEngine>, MixingError> {
        Ok(Box::new(OboeEngine {
            link: MixLink::new(self.command_capacity),
            status,
            stream: None,
        }))
    }
}

pub struct OboeEngine {
    link: MixLink,
    status: Arc<EngineStatus>,
    stream: Option<AudioStreamAsync<Output, OboeCallback>>,
}

unsafe impl Send for OboeEngine {}

fn backend_error(err: Error) -> MixingError {
    MixingError::backend(ErrorCode::FAIL, format!("{err:?}"))
}

impl MixingEngine for OboeEngine {
    fn create_master_output(&mut self) -> Result<(), MixingError> {
        let callback = OboeCallback {
            // Android 默认通常为 48k，首次回调时以流的实际采样率为准
            mixer: Mixer::new(48000),
            queue: self.link.queue(),
            status: self.status.clone(),
            registry: self.link.registry(),
            alive: self.link.alive_flag(),
        };

        // 使用 Oboe 构建低延迟流
        let stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Exclusive) // 独占模式降低延迟
            .set_usage(Usage::Game)
            .set_channel_count::<Stereo>()
            .set_format::<f32>()
            .set_callback(callback)
            .open_stream()
            .map_err(|err| match err {
                Error::NoService | Error::Unavailable => MixingError::NoDevice,
                other => backend_error(other),
            })?;

        info!("Oboe output created @ {} Hz", stream.get_sample_rate());
        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<(), MixingError> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            MixingError::backend(ErrorCode::INVALID_CALL, "master output has not been created")
        })?;
        stream.start().map_err(backend_error)?;
        self.link.set_alive(true);
        Ok(())
    }

    fn stop(&mut self) {
        self.link.set_alive(false);
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.stop(); // 确保回调停止执行
        }
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<(), MixingError> {
        self.link.send(MixCommand::MasterVolume(volume))
    }

    fn create_voice(
        &mut self,
        format: WaveFormat,
        status: Arc<VoiceStatus>,
    ) -> Result<Box<dyn SourceVoice>, MixingError> {
        self.link.create_voice(format, status)
    }
}

impl Drop for OboeEngine {
    fn drop(&mut self) {
        self.stop();
        self.stream = None;
    }
}
