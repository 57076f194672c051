//! # WAV I/O
//!
//! Декодирование ответа движка синтеза и запись итоговых дорожек.
//! Все дорожки хранятся как моно PCM 16 бит.

use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};

use crate::error::{DuetError, Result};
use crate::tts::AudioChunk;

/// Декодирует WAV-байты в моно PCM 16 бит.
///
/// Поддерживается только целочисленный 16-битный формат; многоканальный
/// сигнал сводится в моно усреднением с округлением вниз.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<AudioChunk> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(DuetError::AudioProcessing(format!(
            "Unsupported sample format: {:?}, {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let interleaved = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, hound::Error>>()?;

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                sum.div_euclid(channels as i32) as i16
            })
            .collect()
    };

    debug!(
        "Decoded WAV: {} Hz, {} channel(s), {} mono samples",
        spec.sample_rate,
        spec.channels,
        samples.len()
    );
    Ok(AudioChunk::new(spec.sample_rate, samples))
}

/// Записывает моно PCM 16 бит в WAV-файл, создавая родительские директории
pub fn write_wav<P: AsRef<Path>>(path: P, sample_rate: u32, samples: &[i16]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!("Wrote {} samples at {} Hz to {}", samples.len(), sample_rate, path.display());
    Ok(())
}

/// Одна дорожка для совместной записи
#[derive(Debug, Clone, Copy)]
pub struct WavOutput<'a> {
    pub path: &'a Path,
    pub sample_rate: u32,
    pub samples: &'a [i16],
}

impl<'a> WavOutput<'a> {
    pub fn new(path: &'a Path, sample_rate: u32, samples: &'a [i16]) -> Self {
        Self {
            path,
            sample_rate,
            samples,
        }
    }
}

/// Временный файл рядом с итоговым: `<name>.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Записывает набор дорожек так, чтобы они появились вместе.
///
/// Каждая дорожка сначала пишется во временный файл рядом с итоговым.
/// Итоговые файлы заменяются только после успешной записи всех дорожек;
/// при ошибке временные файлы удаляются, а прежние файлы остаются нетронутыми.
pub fn write_wavs_atomically(outputs: &[WavOutput<'_>]) -> Result<()> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(outputs.len());
    for output in outputs {
        let partial = partial_path(output.path);
        let result = write_wav(&partial, output.sample_rate, output.samples);
        // Файл мог быть частично создан до ошибки
        written.push(partial);
        if let Err(e) = result {
            discard_partials(&written);
            return Err(e);
        }
    }

    for (output, partial) in outputs.iter().zip(&written) {
        std::fs::rename(partial, output.path)?;
    }
    debug!("Committed {} WAV files", outputs.len());
    Ok(())
}

fn discard_partials(paths: &[PathBuf]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove partial file {}: {}", path.display(), e);
            }
        }
    }
}

/// Читает моно WAV 16 бит с диска
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioChunk> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DuetError::MissingAsset(format!("audio file {}", path.display())));
    }
    let bytes = std::fs::read(path)?;
    decode_wav_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, bits: u16, samples: &[i32]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: 24000,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                if bits == 16 {
                    writer.write_sample(s as i16).unwrap();
                } else {
                    writer.write_sample(s).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono() {
        let chunk = decode_wav_bytes(&wav_bytes(1, 16, &[1, -2, 3])).unwrap();
        assert_eq!(chunk.sample_rate, 24000);
        assert_eq!(chunk.samples, vec![1, -2, 3]);
    }

    #[test]
    fn stereo_is_averaged_with_floor_division() {
        let bytes = wav_bytes(2, 16, &[100, 200, -3, 0, 32767, 32767]);
        let chunk = decode_wav_bytes(&bytes).unwrap();
        assert_eq!(chunk.samples, vec![150, -2, 32767]);
    }

    #[test]
    fn rejects_non_16_bit() {
        let err = decode_wav_bytes(&wav_bytes(1, 24, &[1000, -1000])).unwrap_err();
        assert!(matches!(err, DuetError::AudioProcessing(_)));
    }

    #[test]
    fn garbage_is_a_wav_error() {
        assert!(matches!(decode_wav_bytes(b"not a wav"), Err(DuetError::Wav(_))));
    }

    #[test]
    fn write_then_read_from_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/tts/charA.wav");
        write_wav(&path, 24000, &[0, 1, -1, i16::MAX, i16::MIN]).unwrap();

        let chunk = read_wav(&path).unwrap();
        assert_eq!(chunk.sample_rate, 24000);
        assert_eq!(chunk.samples, vec![0, 1, -1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn tracks_are_committed_together() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("tts/charA.wav");
        let mix = dir.path().join("tts/narration.wav");
        write_wavs_atomically(&[
            WavOutput::new(&a, 24000, &[1, 2]),
            WavOutput::new(&mix, 24000, &[3, 4]),
        ])
        .unwrap();

        assert_eq!(read_wav(&a).unwrap().samples, vec![1, 2]);
        assert_eq!(read_wav(&mix).unwrap().samples, vec![3, 4]);
        assert!(!partial_path(&a).exists());
        assert!(!partial_path(&mix).exists());
    }

    #[test]
    fn failed_write_keeps_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("charA.wav");
        write_wav(&a, 24000, &[7, 7, 7]).unwrap();

        // Родитель третьей дорожки является обычным файлом
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "file").unwrap();
        let b = dir.path().join("charB.wav");
        let mix = blocker.join("narration.wav");

        let result = write_wavs_atomically(&[
            WavOutput::new(&a, 24000, &[1, 2]),
            WavOutput::new(&b, 24000, &[3, 4]),
            WavOutput::new(&mix, 24000, &[4, 6]),
        ]);

        assert!(result.is_err());
        assert_eq!(read_wav(&a).unwrap().samples, vec![7, 7, 7]);
        assert!(!b.exists());
        assert!(!partial_path(&a).exists());
        assert!(!partial_path(&b).exists());
    }

    #[test]
    fn missing_file_is_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_wav(dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, DuetError::MissingAsset(_)));
    }
}
