//! Основной файл библиотеки duet-sync
//!
//! Библиотека строит озвучку диалога двух персонажей: две синхронные
//! дорожки (по одной на персонажа) и их микс без клиппинга, а также
//! таймлайны «рот открыт / закрыт» для каждого персонажа по визем-меткам.
//! Композитинг видео выполняет внешний рендер через [`render::TimelineRenderer`].

pub mod config;
pub mod error;
pub mod lipsync;
pub mod logger;
pub mod media;
pub mod progress;
pub mod render;
pub mod text;
pub mod tts;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::DuetConfig;
use crate::error::{DuetError, Result};
use crate::lipsync::{find_viseme_document, OpenCloseInterval, TimelineSummary, VisemeReducer};
use crate::media::{
    mix_dual, write_wavs_atomically, AssemblerConfig, DualTrack, DualTrackAssembler, MixedTrack,
    WavOutput,
};
use crate::progress::{ProcessStep, ProgressObserver, ProgressTracker};
use crate::render::{CharacterAssets, RenderJob, TimelineRenderer};
use crate::text::{merge_consecutive, parse_tagged_dialogue, Speaker, Utterance, VoiceMap};
use crate::tts::{CachedSynthesizer, Synthesizer, VoicevoxClient};

/// Результат озвучки диалога
#[derive(Debug, Clone)]
pub struct NarrationOutput {
    pub tracks: DualTrack,
    pub mix: MixedTrack,
    pub mix_path: PathBuf,
    pub char_a_path: PathBuf,
    pub char_b_path: PathBuf,
}

/// Таймлайны губ обоих персонажей
#[derive(Debug, Clone, Default)]
pub struct Timelines {
    pub a: Vec<OpenCloseInterval>,
    pub b: Vec<OpenCloseInterval>,
    /// Документы, из которых построены таймлайны
    pub a_source: Option<PathBuf>,
    pub b_source: Option<PathBuf>,
}

impl Timelines {
    pub fn get(&self, speaker: Speaker) -> &[OpenCloseInterval] {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }
}

/// Основная структура для работы с библиотекой
pub struct DuetSync {
    config: DuetConfig,
    progress_tracker: Option<ProgressTracker>,
}

impl DuetSync {
    /// Создать новый экземпляр с указанной конфигурацией
    pub fn new(config: DuetConfig) -> Self {
        Self {
            config,
            progress_tracker: None,
        }
    }

    /// Добавить наблюдателя прогресса
    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.progress_tracker
            .get_or_insert_with(ProgressTracker::new)
            .add_observer(observer);
        self
    }

    pub fn config(&self) -> &DuetConfig {
        &self.config
    }

    fn enter(&self, step: ProcessStep) {
        if let Some(t) = &self.progress_tracker {
            t.set_step(step);
        }
    }

    fn fail(&self, step: ProcessStep, e: DuetError) -> DuetError {
        error!("Stage '{}' failed: {}", step, e);
        e.at_step(step)
    }

    /// Движок синтеза по конфигурации: HTTP-клиент, при необходимости с кэшем
    pub fn default_synthesizer(&self) -> Result<Box<dyn Synthesizer>> {
        let client = VoicevoxClient::new(&self.config.engine)?;
        if self.config.engine.use_caching {
            Ok(Box::new(CachedSynthesizer::new(client)))
        } else {
            Ok(Box::new(client))
        }
    }

    /// Разбирает размеченный диалог (`[A] ...` / `[B] ...`).
    /// Идущие подряд реплики одного персонажа объединяются в одну.
    pub fn parse_dialogue(&self, text: &str) -> Result<Vec<Utterance>> {
        self.enter(ProcessStep::DialogueParsing);
        let parsed = parse_tagged_dialogue(text, VoiceMap::from_config(&self.config));
        let utterances = merge_consecutive(parsed);
        if utterances.is_empty() {
            return Err(self.fail(
                ProcessStep::DialogueParsing,
                DuetError::Configuration("dialogue contains no tagged lines".to_string()),
            ));
        }
        Ok(utterances)
    }

    /// Синтезирует реплики, сводит дорожки и записывает три WAV-файла.
    ///
    /// Файлы пишутся только после успешной сборки и микширования, поэтому
    /// ошибка на любом этапе не оставляет несогласованных дорожек.
    pub fn synthesize_dialogue(
        &self,
        utterances: &[Utterance],
        synth: &dyn Synthesizer,
    ) -> Result<NarrationOutput> {
        info!("Starting dialogue synthesis ({} utterances)", utterances.len());

        self.enter(ProcessStep::SpeechSynthesis);
        let assembler = DualTrackAssembler::new(AssemblerConfig::from_config(&self.config));
        let tracks = assembler
            .assemble_with_progress(utterances, synth, self.progress_tracker.as_ref())
            .map_err(|e| self.fail(ProcessStep::SpeechSynthesis, e))?;

        self.enter(ProcessStep::TrackMixing);
        let mix = mix_dual(&tracks).map_err(|e| self.fail(ProcessStep::TrackMixing, e))?;

        self.enter(ProcessStep::AudioExport);
        let output = &self.config.output;
        let rate = tracks.sample_rate();
        write_wavs_atomically(&[
            WavOutput::new(&output.char_a_wav, rate, &tracks.a.samples),
            WavOutput::new(&output.char_b_wav, rate, &tracks.b.samples),
            WavOutput::new(&output.mix_wav, mix.sample_rate(), mix.samples()),
        ])
        .map_err(|e| self.fail(ProcessStep::AudioExport, e))?;

        info!(
            "Wrote {} ({:.2}s), {} and {}",
            output.mix_wav.display(),
            mix.duration_secs(),
            output.char_a_wav.display(),
            output.char_b_wav.display()
        );

        Ok(NarrationOutput {
            tracks,
            mix,
            mix_path: output.mix_wav.clone(),
            char_a_path: output.char_a_wav.clone(),
            char_b_path: output.char_b_wav.clone(),
        })
    }

    /// Строит таймлайны губ обоих персонажей
    pub fn build_timelines(&self) -> Result<Timelines> {
        self.enter(ProcessStep::VisemeReduction);
        let reducer = VisemeReducer::new(self.config.lipsync.min_duration);

        let (a, a_source) = self
            .character_timeline(Speaker::A, &reducer)
            .map_err(|e| self.fail(ProcessStep::VisemeReduction, e))?;
        let (b, b_source) = self
            .character_timeline(Speaker::B, &reducer)
            .map_err(|e| self.fail(ProcessStep::VisemeReduction, e))?;

        Ok(Timelines {
            a,
            b,
            a_source: Some(a_source),
            b_source: Some(b_source),
        })
    }

    fn character_timeline(
        &self,
        speaker: Speaker,
        reducer: &VisemeReducer,
    ) -> Result<(Vec<OpenCloseInterval>, PathBuf)> {
        let character = self.config.character(speaker);
        let path = find_viseme_document(
            &character.viseme_path,
            self.config.lipsync.fallback_dir.as_deref(),
        )?;

        match reducer.reduce_file(&path) {
            Ok(timeline) => {
                info!(
                    "Lipsync {}: {} -> {}",
                    speaker,
                    path.display(),
                    TimelineSummary::of(&timeline)
                );
                Ok((timeline, path))
            }
            Err(DuetError::MalformedViseme(msg)) if self.config.lipsync.allow_static_mouth => {
                warn!(
                    "Viseme document for {} ({}) is malformed, using a static mouth: {}",
                    character.name, speaker, msg
                );
                Ok((Vec::new(), path))
            }
            Err(e) => Err(e),
        }
    }

    /// Передает готовые данные внешнему рендеру
    pub fn render(
        &self,
        renderer: &dyn TimelineRenderer,
        audio: &Path,
        timelines: &Timelines,
        output: &Path,
        subtitles: Option<&Path>,
    ) -> Result<PathBuf> {
        self.enter(ProcessStep::Rendering);
        let job = RenderJob {
            audio: audio.to_path_buf(),
            char_a: CharacterAssets::new(&self.config.char_a.assets_dir),
            char_b: CharacterAssets::new(&self.config.char_b.assets_dir),
            timeline_a: timelines.a.clone(),
            timeline_b: timelines.b.clone(),
            output: output.to_path_buf(),
            subtitles: subtitles.map(Path::to_path_buf),
        };

        job.validate().map_err(|e| self.fail(ProcessStep::Rendering, e))?;
        let rendered = renderer
            .render(&job)
            .map_err(|e| self.fail(ProcessStep::Rendering, e))?;

        if let Some(t) = &self.progress_tracker {
            t.complete();
        }
        info!("Rendered {}", rendered.display());
        Ok(rendered)
    }
}
