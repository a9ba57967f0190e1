use std::fs;
use std::path::Path;

use anyhow::Context;
use log::{info, warn};
use unm_audio::AudioSettings;

/// 读取失败时回退到默认值
pub(crate) fn load_audio_settings(path: &Path) -> AudioSettings {
    match try_load(path) {
        Ok(settings) => {
            info!("Loaded audio settings from {}", path.display());
            settings
        }
        Err(err) => {
            warn!("Using default audio settings: {err:#}");
            AudioSettings::default()
        }
    }
}

fn try_load(path: &Path) -> anyhow::Result<AudioSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let settings = toml::from_str(&text)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    Ok(settings)
}

pub(crate) fn save_audio_settings(path: &Path, settings: &AudioSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let text = toml::to_string_pretty(settings)?;
    fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audio.toml");
        let settings = AudioSettings {
            music_volume: 35.5,
            music_off: true,
            effects_volume: 80.0,
            effects_off: false,
        };

        save_audio_settings(&path, &settings).unwrap();
        assert_eq!(load_audio_settings(&path), settings);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_audio_settings(&dir.path().join("absent.toml"));
        assert_eq!(settings, AudioSettings::default());
    }

    #[test]
    fn corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.toml");
        fs::write(&path, "music_volume = \"loud\"").unwrap();
        assert_eq!(load_audio_settings(&path), AudioSettings::default());
    }
}
