/// 循环次数取此值时表示无限循环
pub const LOOP_INFINITE: u32 = u32::MAX;

/// 采样率 / 声道数 / 位深
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
        }
    }

    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// 解码完成的音效数据，交错排列的 f32 采样。
/// 创建后不再修改，通过 `Arc` 在游戏线程和混音线程之间共享。
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Box<[f32]>,
    format: WaveFormat,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, format: WaveFormat) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
            format,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn frames(&self) -> usize {
        match self.format.channels {
            0 => 0,
            channels => self.samples.len() / channels as usize,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.frames() * self.format.block_align()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }

    /// 读取某一帧某一声道的采样，越界返回 0
    #[inline(always)]
    pub(crate) fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.format.channels as usize;
        self.samples
            .get(frame * channels + channel.min(channels.saturating_sub(1)))
            .copied()
            .unwrap_or(0.0)
    }
}
