//! Размеченный диалог двух персонажей
//!
//! Формат: одна реплика на строку с меткой `[A]` или `[B]`.
//! Строки, начинающиеся с `#`, и пустые строки игнорируются.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::DuetConfig;

static TAG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[\s*([AaBb])\s*\]\s*(.*?)\s*$").expect("static regex is valid")
});

/// Говорящий персонаж
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

impl Speaker {
    /// Второй персонаж
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Одна реплика. Пустой текст означает паузу.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub speaker: Speaker,
    pub voice_id: u32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, speaker: Speaker, voice_id: u32) -> Self {
        Self {
            text: text.into(),
            speaker,
            voice_id,
        }
    }

    /// Реплика без текста (пауза)
    pub fn is_pause(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Соответствие персонажей голосам движка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceMap {
    pub a: u32,
    pub b: u32,
}

impl VoiceMap {
    pub fn from_config(config: &DuetConfig) -> Self {
        Self {
            a: config.char_a.voice_id,
            b: config.char_b.voice_id,
        }
    }

    pub fn voice_for(&self, speaker: Speaker) -> u32 {
        match speaker {
            Speaker::A => self.a,
            Speaker::B => self.b,
        }
    }
}

/// Разбирает размеченный диалог в список реплик.
///
/// Строка без метки продолжает предыдущую реплику; если предыдущей нет,
/// она пропускается с предупреждением.
pub fn parse_tagged_dialogue(text: &str, voices: VoiceMap) -> Vec<Utterance> {
    let mut utterances: Vec<Utterance> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(caps) = TAG_LINE.captures(line) {
            let speaker = if caps[1].eq_ignore_ascii_case("A") { Speaker::A } else { Speaker::B };
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            utterances.push(Utterance::new(body, speaker, voices.voice_for(speaker)));
            continue;
        }

        match utterances.last_mut() {
            Some(last) if !last.is_pause() => {
                last.text.push(' ');
                last.text.push_str(trimmed);
            }
            _ => log::warn!("Skipping untagged dialogue line {}: {:?}", line_no + 1, trimmed),
        }
    }

    log::debug!("Parsed {} utterances from tagged dialogue", utterances.len());
    utterances
}

/// Объединяет идущие подряд реплики одного персонажа.
/// Паузы не объединяются ни с чем.
pub fn merge_consecutive(utterances: Vec<Utterance>) -> Vec<Utterance> {
    let mut merged: Vec<Utterance> = Vec::with_capacity(utterances.len());
    for utterance in utterances {
        match merged.last_mut() {
            Some(last)
                if last.speaker == utterance.speaker
                    && last.voice_id == utterance.voice_id
                    && !last.is_pause()
                    && !utterance.is_pause() =>
            {
                last.text.push(' ');
                last.text.push_str(utterance.text.trim());
            }
            _ => merged.push(utterance),
        }
    }
    merged
}
