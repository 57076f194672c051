//! Сведение двух дорожек персонажей в одну
//!
//! Сумма считается в 32-битных целых. Если пик суммы выходит за пределы
//! 16 бит, вся дорожка масштабируется одним коэффициентом `32767 / peak`,
//! поэтому соотношение громкостей сохраняется и клиппинга не возникает.

use log::{debug, info};

use crate::error::{DuetError, Result};
use crate::media::track::{DualTrack, Track};

const FULL_SCALE: i32 = i16::MAX as i32;

/// Итоговый микс. Только для чтения.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedTrack {
    sample_rate: u32,
    samples: Vec<i16>,
    /// Пик суммы до масштабирования
    raw_peak: i32,
    gain: f64,
}

impl MixedTrack {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Пиковая амплитуда готового микса
    pub fn peak(&self) -> i32 {
        self.samples.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0)
    }

    /// Пик суммы дорожек до ограничения
    pub fn raw_peak(&self) -> i32 {
        self.raw_peak
    }

    /// Примененный коэффициент (1.0, если масштабирование не понадобилось)
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Сводит две дорожки одинаковой длины и частоты
pub fn mix(a: &Track, b: &Track) -> Result<MixedTrack> {
    if a.sample_rate != b.sample_rate {
        return Err(DuetError::TrackMismatch(format!(
            "sample rates differ: {} Hz vs {} Hz",
            a.sample_rate, b.sample_rate
        )));
    }
    if a.len() != b.len() {
        return Err(DuetError::TrackMismatch(format!(
            "lengths differ: {} vs {} samples",
            a.len(),
            b.len()
        )));
    }

    let sum: Vec<i32> = a
        .samples
        .iter()
        .zip(&b.samples)
        .map(|(&x, &y)| x as i32 + y as i32)
        .collect();
    let raw_peak = sum.iter().map(|s| s.abs()).max().unwrap_or(0);

    let gain = if raw_peak > FULL_SCALE {
        FULL_SCALE as f64 / raw_peak as f64
    } else {
        1.0
    };

    let samples = if gain < 1.0 {
        debug!("Mix peak {} exceeds full scale, applying gain {:.4}", raw_peak, gain);
        sum.iter()
            .map(|&s| narrow((s as f64 * gain).round() as i32))
            .collect()
    } else {
        sum.into_iter().map(narrow).collect()
    };

    let mixed = MixedTrack {
        sample_rate: a.sample_rate,
        samples,
        raw_peak,
        gain,
    };
    info!(
        "Mixed {} samples at {} Hz (peak {} -> {})",
        mixed.len(),
        mixed.sample_rate,
        raw_peak,
        mixed.peak()
    );
    Ok(mixed)
}

/// Сводит собранную пару дорожек
pub fn mix_dual(tracks: &DualTrack) -> Result<MixedTrack> {
    mix(&tracks.a, &tracks.b)
}

fn narrow(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, FULL_SCALE) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(samples: &[i16]) -> Track {
        Track::new(24000, samples.to_vec())
    }

    #[test]
    fn overlapping_full_scale_is_scaled_down() {
        let a = track(&[32767, -32767]);
        let b = track(&[32767, -32767]);
        let mixed = mix(&a, &b).unwrap();

        assert_eq!(mixed.samples(), &[32767, -32767]);
        assert_eq!(mixed.raw_peak(), 65534);
        assert!((mixed.gain() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_global_gain_preserves_ratios() {
        let mixed = mix(&track(&[30000, -30000, 4000]), &track(&[10000, -10000, 0])).unwrap();

        assert_eq!(mixed.raw_peak(), 40000);
        assert!((mixed.gain() - 32767.0 / 40000.0).abs() < 1e-12);
        assert_eq!(&mixed.samples()[..2], &[32767, -32767]);
        // 4000 * 0.819175 = 3276.7
        assert_eq!(mixed.samples()[2], 3277);
    }

    #[test]
    fn quiet_mix_is_a_plain_sum() {
        let a = track(&[100, -200, 0, 5]);
        let b = track(&[0, 50, 0, -5]);
        let mixed = mix(&a, &b).unwrap();

        assert_eq!(mixed.samples(), &[100, -150, 0, 0]);
        assert_eq!(mixed.gain(), 1.0);
    }

    #[test]
    fn silence_stays_silent() {
        let mixed = mix(&track(&[0; 8]), &track(&[0; 8])).unwrap();
        assert_eq!(mixed.peak(), 0);
        assert_eq!(mixed.len(), 8);
    }

    #[test]
    fn negative_extreme_is_safe() {
        let mixed = mix(&track(&[i16::MIN, 0]), &track(&[i16::MIN, 0])).unwrap();
        assert!(mixed.peak() <= 32767);
        assert_eq!(mixed.samples()[1], 0);
    }

    #[test]
    fn mismatched_tracks_are_rejected() {
        assert!(matches!(
            mix(&track(&[1, 2]), &track(&[1])),
            Err(DuetError::TrackMismatch(_))
        ));
        assert!(matches!(
            mix(&track(&[1]), &Track::new(48000, vec![1])),
            Err(DuetError::TrackMismatch(_))
        ));
    }
}
