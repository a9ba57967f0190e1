use std::path::{Path, PathBuf};

use winit::event_loop::EventLoopProxy;

use crate::app::WindowCommand;

pub struct GameSettings {
    event_loop: EventLoopProxy<WindowCommand>,
    target_fps: i32,
    settings_path: PathBuf,
    deactivation_requests: Vec<bool>,
}

impl GameSettings {
    pub fn new(event_loop: EventLoopProxy<WindowCommand>, settings_path: PathBuf) -> Self {
        Self {
            event_loop,
            target_fps: 0,
            settings_path,
            deactivation_requests: Vec::new(),
        }
    }

    // setter
    pub fn set_title(&self, title: String) {
        self.event_loop.send_event(WindowCommand::SetTitle(title)).ok();
    }

    pub fn quit(&self) {
        self.event_loop.send_event(WindowCommand::Quit).ok();
    }

    // <= 0: 跟随显示器刷新率
    pub fn set_target_fps(&mut self, new_target_fps: i32) {
        self.target_fps = new_target_fps;
    }

    /// 游戏内界面（如设置面板）遮挡时调用，必须与 `false` 成对出现
    pub fn set_window_deactivated(&mut self, deactivated: bool) {
        self.deactivation_requests.push(deactivated);
    }

    // getter
    pub fn get_target_fps(&self) -> i32 {
        self.target_fps
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub(crate) fn take_deactivation_requests(&mut self) -> Vec<bool> {
        std::mem::take(&mut self.deactivation_requests)
    }
}
