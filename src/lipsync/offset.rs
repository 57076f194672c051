//! Объединение документов визем-меток, построенных по отдельным репликам
//!
//! Метки каждой реплики отсчитываются от ее начала, поэтому перед
//! объединением они сдвигаются на смещение реплики в общей дорожке.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use log::info;
use serde_json::{json, Value};

use crate::error::{DuetError, Result};
use crate::lipsync::loader::{CueDocument, MouthCue};

/// Сдвигает метки на `offset_secs` секунд
pub fn shift_cues(cues: &[MouthCue], offset_secs: f64) -> Vec<MouthCue> {
    cues.iter()
        .map(|c| MouthCue::new(c.start + offset_secs, c.end + offset_secs, c.value.clone()))
        .collect()
}

/// Документ и его смещение на общей оси времени
#[derive(Debug, Clone)]
pub struct OffsetDocument {
    pub document: CueDocument,
    pub offset_ms: u64,
}

impl OffsetDocument {
    pub fn new(document: CueDocument, offset_ms: u64) -> Self {
        Self { document, offset_ms }
    }

    pub fn offset_secs(&self) -> f64 {
        self.offset_ms as f64 / 1000.0
    }
}

/// Склеивает документы в один документ персонажа в порядке перечисления
pub fn merge_documents(parts: &[OffsetDocument], metadata: Option<Value>) -> CueDocument {
    let mouth_cues: Vec<MouthCue> = parts
        .iter()
        .flat_map(|p| shift_cues(&p.document.mouth_cues, p.offset_secs()))
        .collect();
    info!("Merged {} documents into {} cues", parts.len(), mouth_cues.len());

    CueDocument {
        metadata,
        mouth_cues,
    }
}

/// Метаданные объединенного документа
pub fn merge_metadata(sources: &[PathBuf]) -> Value {
    json!({
        "generator": concat!("duet-sync ", env!("CARGO_PKG_VERSION")),
        "generated_at": Utc::now().to_rfc3339(),
        "sources": sources.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
    })
}

/// Записывает документ в JSON, создавая родительские директории
pub fn write_cue_document<P: AsRef<Path>>(path: P, document: &CueDocument) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(document)?)?;
    info!("Wrote {} ({} cues)", path.display(), document.mouth_cues.len());
    Ok(())
}

/// Аргумент вида `path@offset_ms`; без `@` смещение равно нулю
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetSpec {
    pub path: PathBuf,
    pub offset_ms: u64,
}

impl FromStr for OffsetSpec {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once('@') {
            Some((path, offset)) if !path.is_empty() => {
                let offset_ms = offset.trim().parse::<u64>().map_err(|e| {
                    DuetError::Configuration(format!("Invalid offset in {:?}: {}", s, e))
                })?;
                Ok(Self {
                    path: PathBuf::from(path),
                    offset_ms,
                })
            }
            _ => Ok(Self {
                path: PathBuf::from(s),
                offset_ms: 0,
            }),
        }
    }
}
