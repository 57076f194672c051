//! Клиент VOICEVOX-совместимого движка синтеза
//!
//! Синтез выполняется в два запроса: `POST /audio_query` строит запрос
//! синтеза по тексту, `POST /synthesis` возвращает WAV. Идентификатор
//! голоса передается в оба запроса.

use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{DuetError, Result};
use crate::media::wav::decode_wav_bytes;
use crate::tts::{AudioChunk, Synthesizer, VoiceParams};

/// HTTP-клиент движка синтеза
pub struct VoicevoxClient {
    client: Client,
    base_url: String,
    query_timeout: Duration,
    synthesis_timeout: Duration,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl VoicevoxClient {
    /// Создать клиента по настройкам движка
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| DuetError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            synthesis_timeout: Duration::from_secs(config.synthesis_timeout_secs),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn audio_query(&self, text: &str, voice: &VoiceParams) -> Result<Value> {
        let speaker = voice.speaker_id.to_string();
        let response = self
            .client
            .post(self.endpoint("audio_query"))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .timeout(self.query_timeout)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }
        let mut query: Value = response.json().map_err(|e| {
            DuetError::BackendRejected {
                status: status.as_u16(),
                message: format!("audio_query returned invalid JSON: {}", e),
            }
        })?;

        apply_prosody(&mut query, voice)?;
        Ok(query)
    }

    fn synthesis(&self, query: &Value, voice: &VoiceParams) -> Result<AudioChunk> {
        let speaker = voice.speaker_id.to_string();
        let response = self
            .client
            .post(self.endpoint("synthesis"))
            .query(&[("speaker", speaker.as_str())])
            .json(query)
            .timeout(self.synthesis_timeout)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }
        let bytes = response.bytes().map_err(transport_error)?;
        decode_wav_bytes(&bytes)
    }

    fn synthesize_once(&self, text: &str, voice: &VoiceParams) -> Result<AudioChunk> {
        let query = self.audio_query(text, voice)?;
        self.synthesis(&query, voice)
    }
}

impl Synthesizer for VoicevoxClient {
    fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<AudioChunk> {
        debug!("Synthesizing {} chars with speaker {}", text.chars().count(), voice.speaker_id);
        let chunk = with_retries(self.max_attempts, self.retry_backoff, || {
            self.synthesize_once(text, voice)
        })?;
        info!(
            "Synthesized {:.2}s of audio for speaker {}",
            chunk.duration_secs(),
            voice.speaker_id
        );
        Ok(chunk)
    }
}

/// Записывает параметры просодии в запрос синтеза
fn apply_prosody(query: &mut Value, voice: &VoiceParams) -> Result<()> {
    let object = query.as_object_mut().ok_or_else(|| DuetError::BackendRejected {
        status: 200,
        message: "audio_query response is not a JSON object".to_string(),
    })?;
    object.insert("speedScale".to_string(), Value::from(voice.speed_scale as f64));
    object.insert("pitchScale".to_string(), Value::from(voice.pitch_scale as f64));
    object.insert("intonationScale".to_string(), Value::from(voice.intonation_scale as f64));
    Ok(())
}

/// Сетевые ошибки и таймауты — движок недоступен
fn transport_error(e: reqwest::Error) -> DuetError {
    DuetError::BackendUnavailable(e.to_string())
}

/// Ошибки сервера и перегрузка — движок недоступен, остальное — отказ в запросе
fn status_error(status: u16, body: &str) -> DuetError {
    let message = body.trim().chars().take(300).collect::<String>();
    if status >= 500 || status == 429 {
        DuetError::BackendUnavailable(format!("status {}: {}", status, message))
    } else {
        DuetError::BackendRejected { status, message }
    }
}

/// Выполняет операцию с повторами и экспоненциальной задержкой.
/// Повторяются только ошибки, для которых `is_retryable()` истинно.
pub(crate) fn with_retries<T, F>(max_attempts: u32, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let base = backoff.saturating_mul(1u32 << (attempt - 1).min(16));
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
                let delay = base + Duration::from_millis(jitter_ms);
                warn!(
                    "Synthesis attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, max_attempts, e, delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
