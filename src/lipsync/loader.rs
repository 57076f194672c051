//! Загрузка документов визем-меток
//!
//! Документ имеет вид `{ "mouthCues": [ { "start", "end", "value" }, ... ] }`.
//! Классификатор, запущенный несколько раз с перенаправлением вывода,
//! может склеить несколько документов в один файл. В этом случае берется
//! последний документ.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DuetError, Result};

static CUES_OPENING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{\s*"mouthCues""#).expect("static regex is valid"));
static CUES_CLOSING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\]\s*\}").expect("static regex is valid"));

/// Сырая метка формы рта. `value == "X"` означает закрытый рот.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    pub start: f64,
    pub end: f64,
    pub value: String,
}

impl MouthCue {
    pub fn new(start: f64, end: f64, value: impl Into<String>) -> Self {
        Self {
            start,
            end,
            value: value.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.value != "X"
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Документ визем-меток одного персонажа
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CueDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(rename = "mouthCues", default)]
    pub mouth_cues: Vec<MouthCue>,
}

impl CueDocument {
    pub fn new(mouth_cues: Vec<MouthCue>) -> Self {
        Self {
            metadata: None,
            mouth_cues,
        }
    }
}

/// Разбирает документ. Если строгий разбор не удался, пробует восстановить
/// последний документ из склеенного текста.
pub fn parse_cue_document(raw: &str) -> Result<CueDocument> {
    let raw = raw.trim();
    match serde_json::from_str::<CueDocument>(raw) {
        Ok(doc) => Ok(doc),
        Err(e) => {
            debug!("Strict viseme parse failed ({}), scanning for the last document", e);
            recover_last_document(raw)
        }
    }
}

/// Выделяет последний объект `{"mouthCues" ...` до первой следующей за ним
/// закрывающей пары `]}` и разбирает только его.
pub fn recover_last_document(raw: &str) -> Result<CueDocument> {
    let opening = CUES_OPENING
        .find_iter(raw)
        .last()
        .ok_or_else(|| DuetError::MalformedViseme("no mouthCues object found".to_string()))?;

    let tail = &raw[opening.start()..];
    let closing = CUES_CLOSING.find(tail).ok_or_else(|| {
        DuetError::MalformedViseme("last mouthCues object is truncated".to_string())
    })?;

    let candidate = &tail[..closing.end()];
    let doc = serde_json::from_str::<CueDocument>(candidate).map_err(|e| {
        DuetError::MalformedViseme(format!("recovered mouthCues object is invalid: {}", e))
    })?;

    warn!(
        "Recovered viseme document from malformed input ({} cues, offset {})",
        doc.mouth_cues.len(),
        opening.start()
    );
    Ok(doc)
}

/// Загружает и разбирает документ с диска
pub fn load_cue_document<P: AsRef<Path>>(path: P) -> Result<CueDocument> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(DuetError::MissingAsset(format!("viseme document {}", path.display())));
    }
    let raw = std::fs::read_to_string(path)?;
    parse_cue_document(&raw).map_err(|e| match e {
        DuetError::MalformedViseme(msg) => {
            DuetError::MalformedViseme(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Ищет документ по основному пути, затем файл с тем же именем в запасной директории
pub fn find_viseme_document(primary: &Path, fallback_dir: Option<&Path>) -> Result<PathBuf> {
    if primary.is_file() {
        return Ok(primary.to_path_buf());
    }

    let alternative = match (fallback_dir, primary.file_name()) {
        (Some(dir), Some(name)) => Some(dir.join(name)),
        _ => None,
    };

    match alternative {
        Some(alt) if alt.is_file() => {
            debug!("Using fallback viseme document {}", alt.display());
            Ok(alt)
        }
        Some(alt) => Err(DuetError::MissingAsset(format!(
            "viseme document {} or {}",
            primary.display(),
            alt.display()
        ))),
        None => Err(DuetError::MissingAsset(format!("viseme document {}", primary.display()))),
    }
}
