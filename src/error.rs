//! Модуль обработки ошибок библиотеки duet-sync
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при сборке
//! дорожек, микшировании и построении таймлайнов губ.

use thiserror::Error;

use crate::progress::ProcessStep;

/// Ошибки библиотеки duet-sync
#[derive(Debug, Error)]
pub enum DuetError {
    /// Частота дискретизации фрагмента не совпадает с опорной частотой сессии
    #[error("Sample rate mismatch: expected {expected} Hz, got {actual} Hz")]
    RateMismatch { expected: u32, actual: u32 },

    /// Движок синтеза недоступен (сеть, таймаут, ошибка сервера)
    #[error("Synthesis backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Движок синтеза отклонил запрос
    #[error("Synthesis backend rejected request (status {status}): {message}")]
    BackendRejected { status: u16, message: String },

    /// Документ с визем-метками не удалось разобрать даже после восстановления
    #[error("Malformed viseme document: {0}")]
    MalformedViseme(String),

    /// Отсутствует обязательный входной файл
    #[error("Input not found: {0}")]
    MissingAsset(String),

    /// Дорожки несовместимы для микширования
    #[error("Track mismatch: {0}")]
    TrackMismatch(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка на конкретном этапе конвейера
    #[error("Stage '{step}' failed: {source}")]
    StageFailed {
        step: ProcessStep,
        #[source]
        source: Box<DuetError>,
    },

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка чтения или записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl DuetError {
    /// Можно ли повторить запрос, вызвавший эту ошибку
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Обернуть ошибку информацией об этапе конвейера
    pub fn at_step(self, step: ProcessStep) -> Self {
        match self {
            already @ Self::StageFailed { .. } => already,
            other => Self::StageFailed {
                step,
                source: Box::new(other),
            },
        }
    }

    /// Этап, на котором произошла ошибка, если он известен
    pub fn step(&self) -> Option<ProcessStep> {
        match self {
            Self::StageFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl From<&str> for DuetError {
    fn from(s: &str) -> Self {
        DuetError::Other(s.to_string())
    }
}

impl From<String> for DuetError {
    fn from(s: String) -> Self {
        DuetError::Other(s)
    }
}

/// Тип Result для библиотеки duet-sync
pub type Result<T> = std::result::Result<T, DuetError>;
