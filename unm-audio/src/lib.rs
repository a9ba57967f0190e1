pub mod backend;
pub mod clip;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod library;
mod mixer;
pub mod player;
pub mod runtime;
pub mod sequencer;
pub mod settings;
pub mod voice;

#[cfg(test)]
mod testing;

pub use clip::{LOOP_INFINITE, SampleBuffer, WaveFormat};
pub use engine::{AudioEngine, UpdateErrors};
pub use error::{AudioError, ErrorCode, Result};
pub use sequencer::MusicQueueEntry;
pub use settings::{AudioSettings, EngineConfig};
pub use voice::PlayOutcome;
