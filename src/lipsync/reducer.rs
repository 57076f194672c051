//! Сведение визем-меток к таймлайну «рот открыт / закрыт»
//!
//! Этапы:
//! 1. нормализация: `value != "X"` означает открытый рот, метки с `end <= start`
//!    отбрасываются, пересекающиеся метки обрезаются по концу предыдущей;
//! 2. слияние соседних интервалов с одинаковым состоянием (допуск 1e-4 с);
//! 3. подавление шума: интервал короче `min_duration`, примыкающий к предыдущему,
//!    продлевает его независимо от состояния. Первый интервал и интервал
//!    сразу после паузы сохраняются;
//! 4. повторное слияние, чтобы поглощенные короткие интервалы не разрывали
//!    интервалы с одинаковым состоянием.
//!
//! Объединение отрезков таймлайна совпадает с объединением входных меток:
//! паузы между метками не заполняются.

use std::fmt;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lipsync::loader::{load_cue_document, parse_cue_document, MouthCue};

/// Минимальная длительность интервала по умолчанию, секунды
pub const DEFAULT_MIN_DURATION: f64 = 0.05;

/// Допуск при проверке смежности интервалов, секунды
const ADJACENCY_TOLERANCE: f64 = 1e-4;

/// Интервал таймлайна рта
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCloseInterval {
    pub start: f64,
    pub end: f64,
    pub is_open: bool,
}

impl OpenCloseInterval {
    pub fn new(start: f64, end: f64, is_open: bool) -> Self {
        Self { start, end, is_open }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Краткая сводка по таймлайну для логов
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimelineSummary {
    pub segments: usize,
    pub open: usize,
    pub closed: usize,
}

impl TimelineSummary {
    pub fn of(timeline: &[OpenCloseInterval]) -> Self {
        let open = timeline.iter().filter(|i| i.is_open).count();
        Self {
            segments: timeline.len(),
            open,
            closed: timeline.len() - open,
        }
    }
}

impl fmt::Display for TimelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} segs (open={}, close={})", self.segments, self.open, self.closed)
    }
}

/// Редуктор визем-меток
#[derive(Debug, Clone, Copy)]
pub struct VisemeReducer {
    min_duration: f64,
}

impl Default for VisemeReducer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DURATION)
    }
}

impl VisemeReducer {
    pub fn new(min_duration: f64) -> Self {
        Self {
            min_duration: min_duration.max(0.0),
        }
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    /// Разбирает сырой JSON (с восстановлением) и строит таймлайн
    pub fn reduce(&self, raw_json: &str) -> Result<Vec<OpenCloseInterval>> {
        let doc = parse_cue_document(raw_json)?;
        Ok(self.reduce_cues(&doc.mouth_cues))
    }

    /// Загружает документ с диска и строит таймлайн
    pub fn reduce_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<OpenCloseInterval>> {
        let doc = load_cue_document(path)?;
        Ok(self.reduce_cues(&doc.mouth_cues))
    }

    /// Строит таймлайн из уже разобранных меток
    pub fn reduce_cues(&self, cues: &[MouthCue]) -> Vec<OpenCloseInterval> {
        let normalized = normalize(cues);
        if normalized.is_empty() {
            return Vec::new();
        }
        let coalesced = coalesce(normalized);
        let denoised = absorb_short(coalesced, self.min_duration);
        let timeline = coalesce(denoised);

        debug!(
            "Reduced {} cues to {} (min duration {:.3}s)",
            cues.len(),
            TimelineSummary::of(&timeline),
            self.min_duration
        );
        timeline
    }
}

fn normalize(cues: &[MouthCue]) -> Vec<OpenCloseInterval> {
    let mut intervals: Vec<OpenCloseInterval> = cues
        .iter()
        .filter(|c| c.end > c.start)
        .map(|c| OpenCloseInterval::new(c.start, c.end, c.is_open()))
        .collect();
    intervals.sort_by(|a, b| a.start.total_cmp(&b.start));
    clip_overlaps(intervals)
}

/// Обрезает начало интервала по концу уже принятых; полностью перекрытые отбрасываются
fn clip_overlaps(intervals: Vec<OpenCloseInterval>) -> Vec<OpenCloseInterval> {
    let mut clipped: Vec<OpenCloseInterval> = Vec::with_capacity(intervals.len());
    let mut covered_until = f64::NEG_INFINITY;
    for mut next in intervals {
        if next.start < covered_until {
            next.start = covered_until;
        }
        if next.end <= next.start {
            continue;
        }
        covered_until = next.end;
        clipped.push(next);
    }
    clipped
}

/// Сливает смежные интервалы с одинаковым состоянием
fn coalesce(intervals: Vec<OpenCloseInterval>) -> Vec<OpenCloseInterval> {
    let mut merged: Vec<OpenCloseInterval> = Vec::with_capacity(intervals.len());
    for next in intervals {
        match merged.last_mut() {
            Some(cur) if cur.is_open == next.is_open && touches(cur, &next) => {
                cur.end = cur.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Короткий интервал продлевает предыдущий, даже если состояния различаются.
/// Интервал после паузы остается как есть.
fn absorb_short(intervals: Vec<OpenCloseInterval>, min_duration: f64) -> Vec<OpenCloseInterval> {
    let mut cleaned: Vec<OpenCloseInterval> = Vec::with_capacity(intervals.len());
    for seg in intervals {
        match cleaned.last_mut() {
            Some(prev) if seg.duration() < min_duration && touches(prev, &seg) => {
                prev.end = prev.end.max(seg.end);
            }
            _ => cleaned.push(seg),
        }
    }
    cleaned
}

fn touches(prev: &OpenCloseInterval, next: &OpenCloseInterval) -> bool {
    next.start <= prev.end + ADJACENCY_TOLERANCE
}
