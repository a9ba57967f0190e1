use async_trait::async_trait;
use unm_audio::AudioEngine;

use crate::{game_settings::GameSettings, tools::TimeManager};

#[async_trait]
pub trait GameLoop: Send {
    async fn start(
        &mut self,
        game_settings: &mut GameSettings,
        audio: &mut AudioEngine,
    );

    /// 窗口失活且未开启后台运行时不会被调用
    async fn update(
        &mut self,
        game_settings: &mut GameSettings,
        time_manager: &TimeManager,
        audio: &mut AudioEngine,
    );
}
