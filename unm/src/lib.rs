#[cfg(target_os = "android")]
use std::sync::OnceLock;
use std::path::PathBuf;

use log::LevelFilter;
use unm_audio::EngineConfig;

mod activation;
mod app;
mod audio_store;
mod game_loop;
mod game_settings;
mod my_game;
mod tools;

use crate::my_game::MyGame;

// ======================= Android specific =======================
#[cfg(target_os = "android")]
pub static ANDROID_APP: OnceLock<winit::platform::android::activity::AndroidApp> = OnceLock::new();

#[cfg(target_os = "android")]
#[unsafe(no_mangle)]
fn android_main(android_app: winit::platform::android::activity::AndroidApp) {
    let _ = ANDROID_APP.set(android_app);
    main();
}

// ================================================================

/// 可写的数据目录；Android 上为应用内部存储
fn data_dir() -> PathBuf {
    #[cfg(target_os = "android")]
    if let Some(dir) = ANDROID_APP.get().and_then(|app| app.internal_data_path()) {
        return dir;
    }

    PathBuf::from(".")
}

pub fn main() {
    let data_dir = data_dir();

    app::App::new(MyGame::default())
        .set_logger_max_level(LevelFilter::Info)
        .set_audio_config(EngineConfig::default().with_asset_root(data_dir.join("assets")))
        .set_settings_path(data_dir.join("audio_settings.toml"))
        .run();
}
