use async_trait::async_trait;
use log::{info, warn};
use unm_audio::{AudioEngine, PlayOutcome};

use crate::{game_loop::GameLoop, game_settings::GameSettings, tools::TimeManager};

const HIT_SOUND: &str = "HitSong0.wav";
const MAX_HIT_VOICES: usize = 4;

pub struct MyGame {
    next_hit: f32,
}

impl Default for MyGame {
    fn default() -> Self {
        Self { next_hit: 1.0 }
    }
}

#[async_trait]
impl GameLoop for MyGame {
    async fn start(&mut self, game_settings: &mut GameSettings, audio: &mut AudioEngine) {
        game_settings.set_title("unm audio demo".to_string());
        game_settings.set_target_fps(60);

        if audio.music_off() && audio.sound_effects_off() {
            warn!("No audio output available, quitting demo");
            game_settings.quit();
            return;
        }

        if let Err(e) = audio.load_sound_effect(HIT_SOUND, false) {
            warn!("Failed to load {}: {}", HIT_SOUND, e);
        }

        audio.add_music_to_queue("music/intro.ogg", 0, true);
        // -1: 无限循环
        audio.add_music_to_queue("music/theme.ogg", -1, true);
        audio.play_music();
    }

    async fn update(
        &mut self,
        _game_settings: &mut GameSettings,
        time_manager: &TimeManager,
        audio: &mut AudioEngine,
    ) {
        if time_manager.get_time() < self.next_hit {
            return;
        }
        self.next_hit = time_manager.get_time() + 1.0;

        match audio.play_sound_effect(HIT_SOUND, 0, MAX_HIT_VOICES) {
            Ok(PlayOutcome::Dropped) => info!("All {} hit voices busy", MAX_HIT_VOICES),
            Ok(_) => {}
            Err(e) => warn!("Failed to play {}: {}", HIT_SOUND, e),
        }
    }
}
