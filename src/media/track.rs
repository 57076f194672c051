//! Сборка двух синхронных дорожек персонажей
//!
//! Речь говорящего дописывается в его дорожку, а в дорожку второго
//! персонажа дописывается тишина той же длины. Благодаря этому обе
//! дорожки и их микс имеют общую ось времени для синхронизации с видео.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{DuetConfig, ProsodyConfig, FALLBACK_SAMPLE_RATE};
use crate::error::{DuetError, Result};
use crate::progress::ProgressTracker;
use crate::text::chunker::chunk_text;
use crate::text::dialogue::{Speaker, Utterance};
use crate::tts::{AudioChunk, Synthesizer, VoiceParams};

/// Дорожка одного персонажа: моно PCM 16 бит
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl Track {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self { sample_rate, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность дорожки в секундах
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Положение синтезированного фрагмента на общей оси времени (в семплах)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub speaker: Speaker,
    pub start_sample: usize,
    pub end_sample: usize,
}

impl Timing {
    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Количество семплов тишины заданной длительности
pub fn silence_len(sample_rate: u32, ms: u32) -> usize {
    (sample_rate as u64 * ms as u64 / 1000) as usize
}

/// Пара растущих дорожек одинаковой длины.
///
/// Каждая операция дописывания затрагивает обе дорожки, поэтому после
/// любой из них `len(A) == len(B)`.
#[derive(Debug, Default)]
pub struct TrackPair {
    a: Vec<i16>,
    b: Vec<i16>,
    sample_rate: Option<u32>,
}

impl TrackPair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущая длина дорожек в семплах
    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Длины обеих дорожек
    pub fn lens(&self) -> (usize, usize) {
        (self.a.len(), self.b.len())
    }

    /// Опорная частота сессии (частота первого синтезированного фрагмента)
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Принимает частоту очередного фрагмента: первая становится опорной,
    /// любая последующая должна с ней совпадать.
    pub fn accept_rate(&mut self, rate: u32) -> Result<u32> {
        match self.sample_rate {
            None => {
                debug!("Reference sample rate set to {} Hz", rate);
                self.sample_rate = Some(rate);
                Ok(rate)
            }
            Some(expected) if expected == rate => Ok(rate),
            Some(expected) => Err(DuetError::RateMismatch { expected, actual: rate }),
        }
    }

    fn track_mut(&mut self, speaker: Speaker) -> (&mut Vec<i16>, &mut Vec<i16>) {
        match speaker {
            Speaker::A => (&mut self.a, &mut self.b),
            Speaker::B => (&mut self.b, &mut self.a),
        }
    }

    /// Дописывает речь говорящему и тишину той же длины второму персонажу
    pub fn push_speech(&mut self, speaker: Speaker, samples: &[i16]) -> Timing {
        let start_sample = self.len();
        let (speaking, silent) = self.track_mut(speaker);
        speaking.extend_from_slice(samples);
        silent.resize(silent.len() + samples.len(), 0);
        self.debug_assert_aligned();

        Timing {
            speaker,
            start_sample,
            end_sample: self.len(),
        }
    }

    /// Дописывает одинаковую тишину в обе дорожки
    pub fn push_silence(&mut self, len: usize) {
        let target = self.a.len() + len;
        self.a.resize(target, 0);
        self.b.resize(self.b.len() + len, 0);
        self.debug_assert_aligned();
    }

    fn debug_assert_aligned(&self) {
        debug_assert_eq!(self.a.len(), self.b.len(), "tracks diverged after append");
    }

    /// Завершает сборку: выравнивает длины и фиксирует частоту
    pub fn finalize(mut self, fallback_rate: u32) -> (Track, Track) {
        let rate = self.sample_rate.unwrap_or(fallback_rate);
        let target = self.a.len().max(self.b.len());
        if self.a.len() != self.b.len() {
            warn!(
                "Track lengths differ before finalize (A={}, B={}), padding to {}",
                self.a.len(),
                self.b.len(),
                target
            );
        }
        self.a.resize(target, 0);
        self.b.resize(target, 0);
        (Track::new(rate, self.a), Track::new(rate, self.b))
    }
}

/// Результат сборки: две выровненные дорожки и разметка фрагментов
#[derive(Debug, Clone)]
pub struct DualTrack {
    pub a: Track,
    pub b: Track,
    pub timings: Vec<Timing>,
}

impl DualTrack {
    /// Опорная частота дискретизации
    pub fn sample_rate(&self) -> u32 {
        self.a.sample_rate
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    pub fn track(&self, speaker: Speaker) -> &Track {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }
}

/// Настройки сборщика дорожек
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Пауза после каждой реплики в миллисекундах
    pub pause_ms: u32,
    /// Максимальная длина текста одного запроса
    pub max_chunk_len: usize,
    /// Количество одновременных запросов к движку
    pub max_concurrent_requests: usize,
    pub prosody: ProsodyConfig,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        let prosody = ProsodyConfig::default();
        Self {
            pause_ms: prosody.pause_ms,
            max_chunk_len: prosody.max_chunk_len,
            max_concurrent_requests: 1,
            prosody,
        }
    }
}

impl AssemblerConfig {
    pub fn from_config(config: &DuetConfig) -> Self {
        Self {
            pause_ms: config.prosody.pause_ms,
            max_chunk_len: config.prosody.max_chunk_len,
            max_concurrent_requests: config.engine.max_concurrent_requests.max(1),
            prosody: config.prosody.clone(),
        }
    }
}

/// Реплика, подготовленная к синтезу
struct PlannedUtterance {
    speaker: Speaker,
    voice: VoiceParams,
    /// Пустой список означает паузу
    chunks: Vec<String>,
}

/// Сборщик двух дорожек
pub struct DualTrackAssembler {
    config: AssemblerConfig,
}

impl DualTrackAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Синтезирует все реплики и собирает две выровненные дорожки
    pub fn assemble(&self, utterances: &[Utterance], synth: &dyn Synthesizer) -> Result<DualTrack> {
        self.assemble_with_progress(utterances, synth, None)
    }

    /// То же, что `assemble`, с уведомлениями о прогрессе после каждого фрагмента
    pub fn assemble_with_progress(
        &self,
        utterances: &[Utterance],
        synth: &dyn Synthesizer,
        tracker: Option<&ProgressTracker>,
    ) -> Result<DualTrack> {
        let plan = self.plan(utterances);
        let requests: Vec<(&str, VoiceParams)> = plan
            .iter()
            .flat_map(|u| u.chunks.iter().map(move |c| (c.as_str(), u.voice)))
            .collect();
        let total = requests.len();

        info!(
            "Assembling {} utterances ({} synthesis requests, concurrency {})",
            plan.len(),
            total,
            self.config.max_concurrent_requests
        );

        // Результаты всегда потребляются в порядке подачи запросов
        let mut results: Box<dyn Iterator<Item = Result<AudioChunk>> + '_> =
            if self.config.max_concurrent_requests > 1 && total > 1 {
                Box::new(self.synthesize_parallel(&requests, synth)?.into_iter())
            } else {
                Box::new(requests.iter().map(|(text, voice)| synth.synthesize(text, voice)))
            };

        let mut pair = TrackPair::new();
        let mut timings = Vec::with_capacity(total);

        for planned in &plan {
            if planned.chunks.is_empty() {
                self.push_pause(&mut pair);
                continue;
            }

            for _ in &planned.chunks {
                let chunk = results.next().ok_or_else(|| {
                    DuetError::Other("synthesis results ended before the plan".to_string())
                })??;
                pair.accept_rate(chunk.sample_rate)?;
                let timing = pair.push_speech(planned.speaker, &chunk.samples);
                debug!(
                    "Appended chunk for {}: samples {}..{}",
                    timing.speaker, timing.start_sample, timing.end_sample
                );
                timings.push(timing);

                if let Some(t) = tracker {
                    let done = timings.len();
                    t.update_step_progress(
                        done as f32 / total.max(1) as f32 * 100.0,
                        Some(format!("synthesized {}/{} chunks", done, total)),
                    );
                }
            }

            self.push_pause(&mut pair);
        }

        let (a, b) = pair.finalize(FALLBACK_SAMPLE_RATE);
        info!(
            "Assembled tracks: {} samples at {} Hz ({:.2}s), {} chunks",
            a.len(),
            a.sample_rate,
            a.duration_secs(),
            timings.len()
        );
        Ok(DualTrack { a, b, timings })
    }

    /// Пауза возможна только после того, как опорная частота известна
    fn push_pause(&self, pair: &mut TrackPair) {
        if self.config.pause_ms == 0 {
            return;
        }
        match pair.sample_rate() {
            Some(rate) => pair.push_silence(silence_len(rate, self.config.pause_ms)),
            None => debug!("Skipping pause before the first synthesized chunk"),
        }
    }

    fn plan(&self, utterances: &[Utterance]) -> Vec<PlannedUtterance> {
        utterances
            .iter()
            .map(|u| PlannedUtterance {
                speaker: u.speaker,
                voice: VoiceParams::new(u.voice_id, &self.config.prosody),
                chunks: if u.is_pause() {
                    Vec::new()
                } else {
                    chunk_text(&u.text, self.config.max_chunk_len)
                },
            })
            .collect()
    }

    /// Запросы выполняются параллельно, результаты собираются в порядке подачи
    fn synthesize_parallel(
        &self,
        requests: &[(&str, VoiceParams)],
        synth: &dyn Synthesizer,
    ) -> Result<Vec<Result<AudioChunk>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrent_requests)
            .build()
            .map_err(|e| {
                DuetError::Configuration(format!("Failed to build synthesis pool: {}", e))
            })?;

        Ok(pool.install(|| {
            requests
                .par_iter()
                .map(|(text, voice)| synth.synthesize(text, voice))
                .collect()
        }))
    }
}
