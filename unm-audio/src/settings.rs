use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 跨挂起/恢复持久化的四个音频标量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// 0.0 ~ 100.0
    pub music_volume: f64,
    pub music_off: bool,
    /// 0.0 ~ 100.0
    pub effects_volume: f64,
    pub effects_off: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            music_volume: 100.0,
            music_off: false,
            effects_volume: 100.0,
            effects_off: false,
        }
    }
}

/// 引擎构造参数
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 相对文件名以此为根
    pub asset_root: PathBuf,
    pub music_test_sound: String,
    pub effects_test_sound: String,
    /// 游戏线程到混音线程的命令队列容量
    pub command_queue_capacity: usize,
    /// 流式音乐环形缓冲的帧数
    pub stream_buffer_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::new(),
            music_test_sound: "volume_test.wav".into(),
            effects_test_sound: "volume_test.wav".into(),
            command_queue_capacity: 256,
            stream_buffer_frames: 16384,
        }
    }
}

impl EngineConfig {
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn with_music_test_sound(mut self, name: impl Into<String>) -> Self {
        self.music_test_sound = name.into();
        self
    }

    pub fn with_effects_test_sound(mut self, name: impl Into<String>) -> Self {
        self.effects_test_sound = name.into();
        self
    }

    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_stream_buffer_frames(mut self, frames: usize) -> Self {
        self.stream_buffer_frames = frames.max(1);
        self
    }

    /// 绝对路径原样返回，空文件名保持为空
    pub fn resolve(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            return PathBuf::new();
        }

        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }
}
