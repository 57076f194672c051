//! Подготовка текста для синтеза: размеченный диалог и разбиение на фрагменты

pub mod chunker;
pub mod dialogue;

pub use chunker::{chunk_text, normalize_whitespace, DEFAULT_MAX_CHUNK_LEN};
pub use dialogue::{merge_consecutive, parse_tagged_dialogue, Speaker, Utterance, VoiceMap};
