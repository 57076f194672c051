use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{DuetError, Result};
use crate::media::{mix_dual, silence_len, AssemblerConfig, DualTrackAssembler};
use crate::progress::{ProgressInfo, ProgressObserver, ProgressTracker};
use crate::text::{Speaker, Utterance};
use crate::tts::{AudioChunk, VoiceParams};

/// Фиктивный синтез: 10 семплов на символ, значение зависит от голоса
fn fake_synth(text: &str, voice: &VoiceParams) -> Result<AudioChunk> {
    let value = 1000 + voice.speaker_id as i16;
    Ok(AudioChunk::new(24000, vec![value; text.chars().count() * 10]))
}

fn assembler(pause_ms: u32, max_chunk_len: usize, concurrency: usize) -> DualTrackAssembler {
    DualTrackAssembler::new(AssemblerConfig {
        pause_ms,
        max_chunk_len,
        max_concurrent_requests: concurrency,
        ..AssemblerConfig::default()
    })
}

#[test]
fn test_empty_utterance_adds_pause_to_both_tracks() {
    let utterances = vec![
        Utterance::new("こんにちは", Speaker::A, 3),
        Utterance::new("", Speaker::B, 13),
    ];
    let tracks = assembler(100, 120, 1).assemble(&utterances, &fake_synth).unwrap();

    let speech = 50;
    let pause = silence_len(24000, 100);
    // Речь A, общая пауза после реплики, затем пауза пустой реплики B
    assert_eq!(tracks.a.len(), speech + 2 * pause);
    assert_eq!(tracks.a.len(), tracks.b.len(), "Дорожки должны иметь одинаковую длину");

    assert!(tracks.a.samples[..speech].iter().all(|&s| s == 1003));
    assert!(tracks.a.samples[speech..].iter().all(|&s| s == 0));
    assert!(tracks.b.samples.iter().all(|&s| s == 0), "Дорожка B должна быть тишиной");

    assert_eq!(tracks.timings.len(), 1);
    assert_eq!(tracks.timings[0].speaker, Speaker::A);
    assert_eq!((tracks.timings[0].start_sample, tracks.timings[0].end_sample), (0, speech));
}

#[test]
fn test_speech_lands_on_speaker_track_only() {
    let utterances = vec![
        Utterance::new("はい", Speaker::A, 3),
        Utterance::new("そうですね", Speaker::B, 13),
        Utterance::new("ええ", Speaker::A, 3),
    ];
    let tracks = assembler(0, 120, 1).assemble(&utterances, &fake_synth).unwrap();

    assert_eq!(tracks.len(), 20 + 50 + 20);
    assert_eq!(tracks.timings.len(), 3);
    for timing in &tracks.timings {
        let own = tracks.track(timing.speaker);
        let other = tracks.track(timing.speaker.other());
        assert!(own.samples[timing.start_sample..timing.end_sample].iter().all(|&s| s != 0));
        assert!(other.samples[timing.start_sample..timing.end_sample].iter().all(|&s| s == 0));
    }
    // Фрагменты идут подряд в порядке реплик
    assert_eq!(tracks.timings[1].start_sample, tracks.timings[0].end_sample);
}

#[test]
fn test_long_text_is_chunked_and_total_length_is_conserved() {
    let text = "これは長い文です。".repeat(8);
    let utterances = vec![Utterance::new(text.clone(), Speaker::B, 13)];
    let tracks = assembler(150, 20, 1).assemble(&utterances, &fake_synth).unwrap();

    assert!(tracks.timings.len() > 1, "Длинный текст должен разбиваться на фрагменты");
    let speech: usize = tracks.timings.iter().map(|t| t.len()).sum();
    assert_eq!(speech, text.chars().count() * 10);
    assert_eq!(tracks.len(), speech + silence_len(24000, 150));
}

#[test]
fn test_pause_before_first_audio_is_skipped() {
    let utterances = vec![
        Utterance::new("  ", Speaker::B, 13),
        Utterance::new("あ", Speaker::A, 3),
    ];
    let tracks = assembler(100, 120, 1).assemble(&utterances, &fake_synth).unwrap();

    assert_eq!(tracks.timings[0].start_sample, 0);
    assert_eq!(tracks.len(), 10 + silence_len(24000, 100));
}

#[test]
fn test_no_audio_uses_fallback_rate() {
    let utterances = vec![Utterance::new("", Speaker::A, 3)];
    let tracks = assembler(100, 120, 1).assemble(&utterances, &fake_synth).unwrap();

    assert_eq!(tracks.sample_rate(), 24000);
    assert!(tracks.is_empty());
    assert!(mix_dual(&tracks).unwrap().is_empty());
}

#[test]
fn test_rate_change_is_rejected() {
    let synth = |text: &str, _: &VoiceParams| -> Result<AudioChunk> {
        let rate = if text.starts_with('a') { 24000 } else { 48000 };
        Ok(AudioChunk::new(rate, vec![1; 4]))
    };
    let utterances = vec![Utterance::new("a", Speaker::A, 1), Utterance::new("b", Speaker::B, 2)];

    match assembler(0, 120, 1).assemble(&utterances, &synth) {
        Err(DuetError::RateMismatch { expected, actual }) => {
            assert_eq!(expected, 24000);
            assert_eq!(actual, 48000);
        }
        other => panic!("Ожидалась ошибка RateMismatch, получено {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_backend_failure_halts_assembly() {
    let calls = Mutex::new(Vec::new());
    let synth = |text: &str, _: &VoiceParams| -> Result<AudioChunk> {
        calls.lock().unwrap().push(text.to_string());
        if text == "二" {
            Err(DuetError::BackendRejected { status: 422, message: "bad".into() })
        } else {
            Ok(AudioChunk::new(24000, vec![1; 4]))
        }
    };
    let utterances = vec![
        Utterance::new("一", Speaker::A, 1),
        Utterance::new("二", Speaker::B, 2),
        Utterance::new("三", Speaker::A, 1),
    ];

    let result = assembler(0, 120, 1).assemble(&utterances, &synth);
    assert!(matches!(result, Err(DuetError::BackendRejected { status: 422, .. })));
    // Последовательный режим не запрашивает фрагменты после ошибки
    assert_eq!(*calls.lock().unwrap(), vec!["一".to_string(), "二".to_string()]);
}

#[test]
fn test_concurrent_synthesis_keeps_submission_order() {
    // Ранние фрагменты отвечают дольше поздних
    let synth = |text: &str, _: &VoiceParams| -> Result<AudioChunk> {
        let index: u64 = text.trim_end_matches('。').parse().unwrap_or(0);
        std::thread::sleep(Duration::from_millis(20u64.saturating_sub(index * 2)));
        Ok(AudioChunk::new(24000, vec![index as i16 + 1; 5 + index as usize]))
    };
    let utterances: Vec<Utterance> = (0..8)
        .map(|i| {
            let speaker = if i % 2 == 0 { Speaker::A } else { Speaker::B };
            Utterance::new(format!("{}。", i), speaker, i)
        })
        .collect();

    let sequential = assembler(10, 120, 1).assemble(&utterances, &synth).unwrap();
    let concurrent = assembler(10, 120, 4).assemble(&utterances, &synth).unwrap();

    assert_eq!(sequential.a, concurrent.a);
    assert_eq!(sequential.b, concurrent.b);
    assert_eq!(sequential.timings, concurrent.timings);
}

struct Collect(Arc<Mutex<Vec<ProgressInfo>>>);

impl ProgressObserver for Collect {
    fn on_progress_update(&self, progress: ProgressInfo) {
        self.0.lock().unwrap().push(progress);
    }
}

#[test]
fn test_progress_is_reported_per_chunk() {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let mut tracker = ProgressTracker::new();
    tracker.add_observer(Box::new(Collect(updates.clone())));

    let utterances = vec![Utterance::new("あ", Speaker::A, 3), Utterance::new("い", Speaker::B, 13)];
    assembler(0, 120, 1)
        .assemble_with_progress(&utterances, &fake_synth, Some(&tracker))
        .unwrap();

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].step_progress, 100.0);
    assert_eq!(updates[1].details.as_deref(), Some("synthesized 2/2 chunks"));
}
