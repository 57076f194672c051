//! duet-sync: озвучка диалога двух персонажей и таймлайны губ

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use duet_sync::config::DuetConfig;
use duet_sync::lipsync::{
    load_cue_document, merge_documents, merge_metadata, write_cue_document, OffsetDocument,
    OffsetSpec, TimelineSummary,
};
use duet_sync::logger::init_logger;
use duet_sync::render::export_timelines;
use duet_sync::DuetSync;

#[derive(Parser, Debug)]
#[command(name = "duet-sync", version, about = "Dual-speaker narration and mouth timelines")]
struct Args {
    /// Path to config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize a tagged dialogue into charA/charB tracks and a mix
    Synth {
        /// Dialogue text with one `[A] ...` / `[B] ...` line per utterance
        #[arg(short, long)]
        dialogue: PathBuf,
    },
    /// Reduce both characters' viseme documents to open/closed timelines
    Lipsync {
        /// Export both timelines as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Shift and concatenate per-segment cue documents (`file.json@offset_ms`)
    MergeCues {
        #[arg(short, long)]
        out: PathBuf,

        #[arg(required = true)]
        parts: Vec<OffsetSpec>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<DuetConfig> {
    match path {
        Some(path) => DuetConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(DuetConfig::default()),
    }
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Synth { dialogue } => {
            let text = std::fs::read_to_string(&dialogue)
                .with_context(|| format!("failed to read dialogue {}", dialogue.display()))?;

            let duet = DuetSync::new(config);
            let utterances = duet.parse_dialogue(&text)?;
            let synth = duet.default_synthesizer()?;
            let output = duet.synthesize_dialogue(&utterances, synth.as_ref())?;

            for timing in &output.tracks.timings {
                println!(
                    "{}\t{}\t{}",
                    timing.speaker, timing.start_sample, timing.end_sample
                );
            }
            println!(
                "[DONE] {} ({:.2}s at {} Hz)",
                output.mix_path.display(),
                output.mix.duration_secs(),
                output.mix.sample_rate()
            );
        }
        Command::Lipsync { out } => {
            let duet = DuetSync::new(config);
            let timelines = duet.build_timelines()?;

            println!("[LIPSYNC] A: {}", TimelineSummary::of(&timelines.a));
            println!("[LIPSYNC] B: {}", TimelineSummary::of(&timelines.b));

            if let Some(out) = out {
                export_timelines(&out, &timelines.a, &timelines.b)?;
            }
        }
        Command::MergeCues { out, parts } => {
            let mut documents = Vec::with_capacity(parts.len());
            for part in &parts {
                let document = load_cue_document(&part.path)
                    .with_context(|| format!("failed to load {}", part.path.display()))?;
                documents.push(OffsetDocument::new(document, part.offset_ms));
            }

            let sources: Vec<PathBuf> = parts.iter().map(|p| p.path.clone()).collect();
            let merged = merge_documents(&documents, Some(merge_metadata(&sources)));
            write_cue_document(&out, &merged)?;
            info!("Merged {} documents into {}", parts.len(), out.display());
        }
    }

    Ok(())
}
