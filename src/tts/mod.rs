//! Модуль для работы с TTS
//!
//! Синтез речи рассматривается как внешняя функция
//! `synthesize(text, voice) -> (sample_rate, pcm)`. Реализации: HTTP-клиент
//! VOICEVOX-совместимого движка и кэширующая обертка.

pub mod cache;
pub mod voicevox;

use serde::{Deserialize, Serialize};

use crate::config::ProsodyConfig;
use crate::error::Result;

pub use cache::CachedSynthesizer;
pub use voicevox::VoicevoxClient;

/// Результат синтеза одного фрагмента: моно PCM 16 бит
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self { sample_rate, samples }
    }

    /// Длительность фрагмента в секундах
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Голос и параметры просодии для одного запроса
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub speaker_id: u32,
    pub speed_scale: f32,
    pub pitch_scale: f32,
    pub intonation_scale: f32,
}

impl VoiceParams {
    pub fn new(speaker_id: u32, prosody: &ProsodyConfig) -> Self {
        Self {
            speaker_id,
            speed_scale: prosody.speed_scale,
            pitch_scale: prosody.pitch_scale,
            intonation_scale: prosody.intonation_scale,
        }
    }
}

/// Трейт, который должны реализовывать все движки синтеза.
///
/// Вызов блокирующий; ошибки недоступности движка и отказа в запросе
/// возвращаются как `DuetError::BackendUnavailable` и `DuetError::BackendRejected`.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<AudioChunk>;
}

impl<F> Synthesizer for F
where
    F: Fn(&str, &VoiceParams) -> Result<AudioChunk> + Send + Sync,
{
    fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<AudioChunk> {
        self(text, voice)
    }
}
