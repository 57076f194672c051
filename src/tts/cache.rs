//! Модуль для кэширования результатов TTS
//!
//! Повторяющиеся фрагменты (короткие реплики вроде «はい。») синтезируются
//! один раз за запуск. Ключ кэша — md5 от текста и параметров голоса.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::tts::{AudioChunk, Synthesizer, VoiceParams};

/// Кэширующая обертка над любым движком синтеза
pub struct CachedSynthesizer<S> {
    inner: S,
    entries: Mutex<HashMap<String, AudioChunk>>,
    /// Максимальное количество фрагментов в кэше
    max_entries: usize,
}

impl<S: Synthesizer> CachedSynthesizer<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, 1024)
    }

    pub fn with_capacity(inner: S, max_entries: usize) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// Количество закэшированных фрагментов
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Очистить кэш
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Генерировать ключ для кэша
    fn cache_key(text: &str, voice: &VoiceParams) -> String {
        let mut hasher = md5::Context::new();
        hasher.consume(text.as_bytes());
        hasher.consume(voice.speaker_id.to_le_bytes());
        hasher.consume(voice.speed_scale.to_le_bytes());
        hasher.consume(voice.pitch_scale.to_le_bytes());
        hasher.consume(voice.intonation_scale.to_le_bytes());
        format!("{:x}", hasher.compute())
    }
}

impl<S: Synthesizer> Synthesizer for CachedSynthesizer<S> {
    fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<AudioChunk> {
        let key = Self::cache_key(text, voice);
        if let Some(hit) = self.entries.lock().ok().and_then(|e| e.get(&key).cloned()) {
            log::debug!("TTS cache hit for {:?}", text);
            return Ok(hit);
        }

        let chunk = self.inner.synthesize(text, voice)?;

        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.max_entries {
                entries.clear();
            }
            entries.insert(key, chunk.clone());
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DuetError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn voice(id: u32) -> VoiceParams {
        VoiceParams { speaker_id: id, speed_scale: 1.0, pitch_scale: 0.0, intonation_scale: 1.0 }
    }

    #[test]
    fn repeated_requests_hit_the_cache() {
        let calls = AtomicUsize::new(0);
        let synth = |text: &str, _: &VoiceParams| -> Result<AudioChunk> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(AudioChunk::new(24000, vec![1; text.len()]))
        };
        let cached = CachedSynthesizer::new(synth);

        let first = cached.synthesize("はい。", &voice(3)).unwrap();
        let second = cached.synthesize("はい。", &voice(3)).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Другой голос — другой ключ
        cached.synthesize("はい。", &voice(13)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let calls = AtomicUsize::new(0);
        let synth = |_: &str, _: &VoiceParams| -> Result<AudioChunk> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DuetError::BackendUnavailable("down".into()))
        };
        let cached = CachedSynthesizer::new(synth);

        assert!(cached.synthesize("a", &voice(1)).is_err());
        assert!(cached.synthesize("a", &voice(1)).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cached.is_empty());
    }

    #[test]
    fn capacity_bounds_the_cache() {
        let synth = |_: &str, _: &VoiceParams| -> Result<AudioChunk> {
            Ok(AudioChunk::new(24000, vec![0]))
        };
        let cached = CachedSynthesizer::with_capacity(synth, 2);
        for text in ["a", "b", "c"] {
            cached.synthesize(text, &voice(1)).unwrap();
        }
        assert!(cached.len() <= 2);
    }
}
