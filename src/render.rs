//! Граница с внешним рендером видео
//!
//! Сам композитинг выполняет внешний потребитель таймлайнов. Здесь
//! проверяются входные данные задания и готовится план клипов рта.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{DuetError, Result};
use crate::lipsync::OpenCloseInterval;

/// Минимальная длительность клипа рта, секунды
const MIN_CLIP_DURATION: f64 = 0.001;

/// Изображения персонажа
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAssets {
    pub dir: PathBuf,
}

impl CharacterAssets {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn base(&self) -> PathBuf {
        self.dir.join("base.png")
    }

    pub fn mouth_open(&self) -> PathBuf {
        self.dir.join("mouth_open.png")
    }

    pub fn mouth_closed(&self) -> PathBuf {
        self.dir.join("mouth_closed.png")
    }

    /// Все три изображения должны существовать
    pub fn validate(&self) -> Result<()> {
        for path in [self.base(), self.mouth_open(), self.mouth_closed()] {
            if !path.is_file() {
                return Err(DuetError::MissingAsset(format!("character image {}", path.display())));
            }
        }
        Ok(())
    }
}

/// Клип рта для композитинга: изображение открытого или закрытого рта на интервале
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthClip {
    pub start: f64,
    pub duration: f64,
    pub open: bool,
}

/// Переводит таймлайн в последовательность клипов
pub fn plan_mouth_clips(timeline: &[OpenCloseInterval]) -> Vec<MouthClip> {
    timeline
        .iter()
        .map(|i| MouthClip {
            start: i.start,
            duration: i.duration().max(MIN_CLIP_DURATION),
            open: i.is_open,
        })
        .collect()
}

/// Состояние рта в момент времени `t`. Вне таймлайна рот закрыт.
pub fn mouth_open_at(timeline: &[OpenCloseInterval], t: f64) -> bool {
    let idx = timeline.partition_point(|i| i.start <= t);
    idx > 0 && {
        let interval = &timeline[idx - 1];
        t < interval.end && interval.is_open
    }
}

/// Задание для внешнего рендера
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub audio: PathBuf,
    pub char_a: CharacterAssets,
    pub char_b: CharacterAssets,
    pub timeline_a: Vec<OpenCloseInterval>,
    pub timeline_b: Vec<OpenCloseInterval>,
    pub output: PathBuf,
    pub subtitles: Option<PathBuf>,
}

impl RenderJob {
    /// Проверяет наличие входных файлов
    pub fn validate(&self) -> Result<()> {
        if !self.audio.is_file() {
            return Err(DuetError::MissingAsset(format!("audio {}", self.audio.display())));
        }
        if let Some(subtitles) = &self.subtitles {
            if !subtitles.is_file() {
                return Err(DuetError::MissingAsset(format!("subtitles {}", subtitles.display())));
            }
        }
        self.char_a.validate()?;
        self.char_b.validate()?;
        Ok(())
    }
}

/// Внешний потребитель таймлайнов
pub trait TimelineRenderer {
    /// Выполняет рендер и возвращает путь к готовому видео
    fn render(&self, job: &RenderJob) -> Result<PathBuf>;
}

#[derive(Serialize)]
struct TimelineExport<'a> {
    #[serde(rename = "A")]
    a: &'a [OpenCloseInterval],
    #[serde(rename = "B")]
    b: &'a [OpenCloseInterval],
}

/// Сохраняет оба таймлайна в JSON для внешнего рендера
pub fn export_timelines<P: AsRef<Path>>(
    path: P,
    a: &[OpenCloseInterval],
    b: &[OpenCloseInterval],
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(&TimelineExport { a, b })?;
    std::fs::write(path, json)?;
    info!("Exported timelines to {} (A: {}, B: {})", path.display(), a.len(), b.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"png").unwrap();
    }

    #[test]
    fn assets_require_all_images() {
        let dir = tempfile::tempdir().unwrap();
        let assets = CharacterAssets::new(dir.path().join("charA"));
        assert!(matches!(assets.validate(), Err(DuetError::MissingAsset(_))));

        touch(&assets.base());
        touch(&assets.mouth_open());
        assert!(assets.validate().is_err());

        touch(&assets.mouth_closed());
        assert!(assets.validate().is_ok());
    }

    #[test]
    fn mouth_state_lookup() {
        let timeline = vec![
            OpenCloseInterval::new(0.0, 0.5, true),
            OpenCloseInterval::new(0.5, 1.0, false),
            OpenCloseInterval::new(1.2, 1.4, true),
        ];
        assert!(mouth_open_at(&timeline, 0.0));
        assert!(mouth_open_at(&timeline, 0.49));
        assert!(!mouth_open_at(&timeline, 0.5));
        assert!(!mouth_open_at(&timeline, 1.1));
        assert!(mouth_open_at(&timeline, 1.3));
        assert!(!mouth_open_at(&timeline, 2.0));
        assert!(!mouth_open_at(&[], 0.0));
    }

    #[test]
    fn clips_have_positive_duration() {
        let clips = plan_mouth_clips(&[
            OpenCloseInterval::new(1.0, 1.0, true),
            OpenCloseInterval::new(1.0, 1.5, false),
        ]);
        assert_eq!(clips[0].duration, MIN_CLIP_DURATION);
        assert!((clips[1].duration - 0.5).abs() < 1e-12);
        assert!(!clips[1].open);
    }

    #[test]
    fn export_writes_both_timelines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/timelines.json");
        export_timelines(&path, &[OpenCloseInterval::new(0.0, 0.5, true)], &[]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["A"][0]["isOpen"], true);
        assert_eq!(value["B"].as_array().unwrap().len(), 0);
    }
}
