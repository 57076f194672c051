//! Таймлайны губ персонажей по визем-меткам

pub mod loader;
pub mod offset;
pub mod reducer;

pub use loader::{
    find_viseme_document, load_cue_document, parse_cue_document, recover_last_document,
    CueDocument, MouthCue,
};
pub use offset::{
    merge_documents, merge_metadata, shift_cues, write_cue_document, OffsetDocument, OffsetSpec,
};
pub use reducer::{OpenCloseInterval, TimelineSummary, VisemeReducer, DEFAULT_MIN_DURATION};
