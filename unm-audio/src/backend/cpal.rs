// 标准库导入
use std::sync::{Arc, atomic::Ordering};

// 第三方 crate 导入
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

// 当前 crate 内部模块导入
use crate::backend::{EngineStatus, MixingEngine, MixingPlatform, SourceVoice, VoiceStatus};
use crate::clip::WaveFormat;
use crate::error::{ErrorCode, MixingError};
use crate::mixer::{MixCommand, MixLink, Mixer, flag_started_voices};

/// 桌面端混音后端
pub struct CpalMixing {
    command_capacity: usize,
}

impl CpalMixing {
    pub fn new(command_capacity: usize) -> Self {
        Self { command_capacity }
    }
}

impl MixingPlatform for CpalMixing {
    fn create_engine(&mut self, status: Arc<EngineStatus>) -> Result<Box<dyn MixingEngine>, MixingError> {
        Ok(Box::new(CpalEngine {
            link: MixLink::new(self.command_capacity),
            status,
            stream: None,
        }))
    }
}

pub struct CpalEngine {
    link: MixLink,
    status: Arc<EngineStatus>,
    stream: Option<cpal::Stream>,
}

// cpal::Stream 只在创建它的游戏线程上使用
unsafe impl Send for CpalEngine {}

fn backend_error(err: impl std::fmt::Display) -> MixingError {
    MixingError::backend(ErrorCode::FAIL, err.to_string())
}

impl MixingEngine for CpalEngine {
    fn create_master_output(&mut self) -> Result<(), MixingError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(MixingError::NoDevice)?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(backend_error)?
            .into();

        let channels = config.channels as usize;
        let mut mixer = Mixer::new(config.sample_rate);
        let queue = self.link.queue();

        let status = self.status.clone();
        let registry = self.link.registry();
        let alive = self.link.alive_flag();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    data.fill(0.0);

                    // 1. 无锁消费指令
                    mixer.drain(&queue);

                    // 2. 混音
                    mixer.mix(channels, data);
                },
                move |err| {
                    error!("Mixing output stream failed: {err}");
                    alive.store(false, Ordering::Release);
                    status.report_critical(ErrorCode::DEVICE_INVALIDATED);
                    flag_started_voices(&registry, ErrorCode::DEVICE_INVALIDATED);
                },
                None,
            )
            .map_err(backend_error)?;

        info!(
            "Mixing output created: {} channels @ {} Hz",
            config.channels, config.sample_rate
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<(), MixingError> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            MixingError::backend(ErrorCode::INVALID_CALL, "master output has not been created")
        })?;
        stream.play().map_err(backend_error)?;
        self.link.set_alive(true);
        Ok(())
    }

    fn stop(&mut self) {
        self.link.set_alive(false);
        if let Some(stream) = self.stream.as_ref() {
            let _ = stream.pause();
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

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.link.set_alive(false);
        self.stream = None;
    }
}
