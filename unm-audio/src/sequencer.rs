use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 音乐队列中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicQueueEntry {
    /// 为空表示一段静音占位
    pub filename: String,
    /// 0 表示播完即出队，负数表示无限循环
    pub loop_count: i32,
    /// 上一首结束后是否自动开始
    pub auto_play_after_previous: bool,
}

impl MusicQueueEntry {
    pub fn new(filename: impl Into<String>, loop_count: i32, auto_play_after_previous: bool) -> Self {
        Self {
            filename: filename.into(),
            loop_count,
            auto_play_after_previous,
        }
    }

    pub fn is_silence(&self) -> bool {
        self.filename.is_empty()
    }
}

/// `advance_on_finish` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// 重新播放当前队首
    PlayFront,
    /// 队列停止推进，等待调用方手动开始
    Halt,
}

/// 音乐队列与播放状态机。
///
/// 只维护队列和标志，不直接操作流；调用方根据返回值驱动后端。
#[derive(Debug, Clone)]
pub struct MusicSequencer {
    queue: VecDeque<MusicQueueEntry>,
    playing: bool,
    paused: bool,
    /// 待应用的播放位置（秒），负数表示没有
    position: f64,
}

impl Default for MusicSequencer {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            playing: false,
            paused: false,
            position: -1.0,
        }
    }
}

impl MusicSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: MusicQueueEntry) {
        self.queue.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn front(&self) -> Option<&MusicQueueEntry> {
        self.queue.front()
    }

    pub fn pop_front(&mut self) -> Option<MusicQueueEntry> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MusicQueueEntry> {
        self.queue.iter()
    }

    /// 当前曲目播完时调用。
    ///
    /// 循环次数为 0 的队首出队，只有新队首存在且允许自动播放时才继续；
    /// 否则正数循环次数减一并重播队首。停止推进时 `playing` 置为 false。
    pub fn advance_on_finish(&mut self) -> Advance {
        let Some(front) = self.queue.front_mut() else {
            self.playing = false;
            return Advance::Halt;
        };

        let next = if front.loop_count == 0 {
            self.queue.pop_front();
            match self.queue.front() {
                Some(entry) if entry.auto_play_after_previous => Advance::PlayFront,
                _ => Advance::Halt,
            }
        } else {
            if front.loop_count > 0 {
                front.loop_count -= 1;
            }
            Advance::PlayFront
        };

        if next == Advance::Halt {
            self.playing = false;
        }
        next
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// 开始播放队首：`playing` 置位并解除暂停
    pub fn mark_playing(&mut self) {
        self.playing = true;
        self.paused = false;
    }

    /// 放弃当前曲目，队列保持不变
    pub fn mark_stopped(&mut self) {
        self.playing = false;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn has_pending_seek(&self) -> bool {
        self.position >= 0.0
    }

    /// 负数清除待定位置
    pub fn set_position(&mut self, seconds: f64) {
        self.position = if seconds < 0.0 { -1.0 } else { seconds };
    }

    /// 取出待定位置并清除
    pub fn take_seek(&mut self) -> Option<f64> {
        let pending = self.has_pending_seek().then_some(self.position);
        self.position = -1.0;
        pending
    }
}
