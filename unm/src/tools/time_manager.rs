use std::time::{Duration, Instant};

/// 帧时间统计，同时保存限帧器的睡眠状态
#[derive(Clone)]
pub struct TimeManager {
    start_time: Instant,
    current_time: Duration,
    delta_time: Duration,
    fps: f32,
    frame_times: [f32; 20], // 环形缓冲区
    frame_index: usize,
    last_update: Instant,

    pub(crate) sleep_end: Instant,
    pub(crate) oversleep: Duration,
}

impl TimeManager {
    pub(crate) fn new() -> Self {
        let start_time = Instant::now();
        Self {
            start_time,
            current_time: Duration::ZERO,
            delta_time: Duration::ZERO,
            fps: 0.0,
            frame_times: [0.0; 20],
            frame_index: 0,
            last_update: start_time,
            sleep_end: start_time,
            oversleep: Duration::ZERO,
        }
    }

    pub(crate) fn update(&mut self) {
        let now = Instant::now();

        self.delta_time = now.duration_since(self.last_update);
        self.last_update = now;
        self.current_time = now.duration_since(self.start_time);

        self.frame_times[self.frame_index] = self.delta_time.as_secs_f32();
        self.frame_index = (self.frame_index + 1) % self.frame_times.len();

        // 最近 N 帧的平均值
        let total_time: f32 = self.frame_times.iter().sum();
        self.fps = if total_time > 0.0 {
            self.frame_times.len() as f32 / total_time
        } else {
            0.0
        };
    }

    /// 秒
    pub fn get_time(&self) -> f32 {
        self.current_time.as_secs_f32()
    }

    /// 秒
    pub fn get_delta_time(&self) -> f32 {
        self.delta_time.as_secs_f32()
    }

    pub fn get_fps(&self) -> u32 {
        self.fps.round() as u32
    }
}
