//! Модуль конфигурации библиотеки duet-sync
//!
//! Вся конфигурация передается явно в конструкторы компонентов,
//! глобального изменяемого состояния нет.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DuetError, Result};
use crate::text::chunker::DEFAULT_MAX_CHUNK_LEN;
use crate::text::dialogue::Speaker;

/// Частота дискретизации по умолчанию, если ни один фрагмент не был синтезирован
pub const FALLBACK_SAMPLE_RATE: u32 = 24000;

/// Настройки движка синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Базовый URL движка (VOICEVOX-совместимый API)
    pub url: String,
    /// Таймаут запроса audio_query в секундах
    pub query_timeout_secs: u64,
    /// Таймаут запроса synthesis в секундах
    pub synthesis_timeout_secs: u64,
    /// Количество попыток на один запрос
    pub max_attempts: u32,
    /// Базовая задержка перед повтором в миллисекундах
    pub retry_backoff_ms: u64,
    /// Максимальное количество одновременных запросов к движку
    pub max_concurrent_requests: usize,
    /// Кэшировать результаты синтеза в памяти
    pub use_caching: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:50021".to_string(),
            query_timeout_secs: 30,
            synthesis_timeout_secs: 60,
            max_attempts: 3,
            retry_backoff_ms: 500,
            max_concurrent_requests: 1,
            use_caching: true,
        }
    }
}

/// Параметры просодии, общие для обоих персонажей
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProsodyConfig {
    pub speed_scale: f32,
    pub pitch_scale: f32,
    pub intonation_scale: f32,
    /// Пауза между репликами в миллисекундах
    pub pause_ms: u32,
    /// Максимальная длина фрагмента текста для одного запроса
    pub max_chunk_len: usize,
}

impl Default for ProsodyConfig {
    fn default() -> Self {
        Self {
            speed_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
            pause_ms: 150,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
        }
    }
}

/// Настройки одного персонажа
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Имя персонажа (для логов)
    pub name: String,
    /// Идентификатор голоса в движке синтеза
    pub voice_id: u32,
    /// Директория с изображениями персонажа
    pub assets_dir: PathBuf,
    /// Документ визем-меток персонажа
    pub viseme_path: PathBuf,
}

impl CharacterConfig {
    /// Настройки персонажа по умолчанию для говорящего
    pub fn for_speaker(speaker: Speaker) -> Self {
        match speaker {
            Speaker::A => Self {
                name: "metan".to_string(),
                voice_id: 3,
                assets_dir: PathBuf::from("assets/characters/charA"),
                viseme_path: PathBuf::from("data/lipsync/charA.json"),
            },
            Speaker::B => Self {
                name: "kenzaki_shiyu".to_string(),
                voice_id: 13,
                assets_dir: PathBuf::from("assets/characters/charB"),
                viseme_path: PathBuf::from("data/lipsync/charB.json"),
            },
        }
    }
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self::for_speaker(Speaker::A)
    }
}

/// Частичное переопределение настроек персонажа из файла
#[derive(Debug, Default, Deserialize)]
struct CharacterOverride {
    name: Option<String>,
    voice_id: Option<u32>,
    assets_dir: Option<PathBuf>,
    viseme_path: Option<PathBuf>,
}

impl CharacterOverride {
    fn apply(self, base: CharacterConfig) -> CharacterConfig {
        CharacterConfig {
            name: self.name.unwrap_or(base.name),
            voice_id: self.voice_id.unwrap_or(base.voice_id),
            assets_dir: self.assets_dir.unwrap_or(base.assets_dir),
            viseme_path: self.viseme_path.unwrap_or(base.viseme_path),
        }
    }
}

fn char_a_with_defaults<'de, D>(deserializer: D) -> std::result::Result<CharacterConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let partial = CharacterOverride::deserialize(deserializer)?;
    Ok(partial.apply(CharacterConfig::for_speaker(Speaker::A)))
}

fn char_b_with_defaults<'de, D>(deserializer: D) -> std::result::Result<CharacterConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let partial = CharacterOverride::deserialize(deserializer)?;
    Ok(partial.apply(CharacterConfig::for_speaker(Speaker::B)))
}

/// Пути выходных WAV-файлов
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mix_wav: PathBuf,
    pub char_a_wav: PathBuf,
    pub char_b_wav: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mix_wav: PathBuf::from("data/tts/narration.wav"),
            char_a_wav: PathBuf::from("data/tts/charA.wav"),
            char_b_wav: PathBuf::from("data/tts/charB.wav"),
        }
    }
}

/// Настройки построения таймлайнов губ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipsyncConfig {
    /// Минимальная длительность интервала в секундах
    pub min_duration: f64,
    /// Запасная директория для документов визем-меток
    pub fallback_dir: Option<PathBuf>,
    /// Продолжать со статичным ртом, если документ персонажа поврежден
    pub allow_static_mouth: bool,
}

impl Default for LipsyncConfig {
    fn default() -> Self {
        Self {
            min_duration: 0.05,
            fallback_dir: Some(PathBuf::from("data/visemes")),
            allow_static_mouth: true,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuetConfig {
    pub engine: EngineConfig,
    pub prosody: ProsodyConfig,
    #[serde(deserialize_with = "char_a_with_defaults")]
    pub char_a: CharacterConfig,
    #[serde(deserialize_with = "char_b_with_defaults")]
    pub char_b: CharacterConfig,
    pub output: OutputConfig,
    pub lipsync: LipsyncConfig,
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            prosody: ProsodyConfig::default(),
            char_a: CharacterConfig::for_speaker(Speaker::A),
            char_b: CharacterConfig::for_speaker(Speaker::B),
            output: OutputConfig::default(),
            lipsync: LipsyncConfig::default(),
        }
    }
}

impl DuetConfig {
    /// Загрузить конфигурацию из JSON-файла; отсутствующие поля берутся по умолчанию
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DuetError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: DuetConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Проверить согласованность значений
    pub fn validate(&self) -> Result<()> {
        if self.engine.url.trim().is_empty() {
            return Err(DuetError::Configuration("engine.url must not be empty".to_string()));
        }
        if self.engine.max_concurrent_requests == 0 {
            return Err(DuetError::Configuration(
                "engine.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.engine.max_attempts == 0 {
            return Err(DuetError::Configuration(
                "engine.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.prosody.max_chunk_len == 0 {
            return Err(DuetError::Configuration(
                "prosody.max_chunk_len must be positive".to_string(),
            ));
        }
        if !(self.lipsync.min_duration >= 0.0) {
            return Err(DuetError::Configuration(format!(
                "lipsync.min_duration must be non-negative, got {}",
                self.lipsync.min_duration
            )));
        }
        Ok(())
    }

    /// Настройки персонажа по метке говорящего
    pub fn character(&self, speaker: Speaker) -> &CharacterConfig {
        match speaker {
            Speaker::A => &self.char_a,
            Speaker::B => &self.char_b,
        }
    }
}
