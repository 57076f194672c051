//! Работа с аудио: WAV, сборка дорожек персонажей и микширование

pub mod mixer;
pub mod track;
pub mod wav;

pub use mixer::{mix, mix_dual, MixedTrack};
pub use track::{
    silence_len, AssemblerConfig, DualTrack, DualTrackAssembler, Timing, Track, TrackPair,
};
pub use wav::{decode_wav_bytes, read_wav, write_wav, write_wavs_atomically, WavOutput};
