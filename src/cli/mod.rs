// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// The entry point for all user interaction. `clap` parses the
// command line; all business logic is delegated to Layer 2
// (application), and `serve` hands the loaded captioner to
// Layer 7 (web).
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{BuildDataArgs, CaptionArgs, Commands, EvaluateArgs, ServeArgs, TrainArgs};

use crate::application::config::{CaptionConfig, ServeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "show-and-tell",
    version = "0.1.0",
    about = "Train an Inception + LSTM image captioner, then caption images."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case; never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::BuildData(args) => run_build_data(args),
            Commands::Train(args)     => run_train(args),
            Commands::Evaluate(args)  => run_evaluate(args),
            Commands::Caption(args)   => run_caption(args),
            Commands::Serve(args)     => run_serve(args),
        }
    }
}

fn run_build_data(args: BuildDataArgs) -> Result<()> {
    use crate::application::build_data_use_case::BuildDataUseCase;

    tracing::info!("Building dataset from {}", args.captions_file);
    let summary = BuildDataUseCase::new(args.into()).execute()?;

    println!(
        "Wrote {} training and {} validation examples; vocabulary has {} words.",
        summary.train_examples, summary.val_examples, summary.vocab_size
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on shards matching: {}", args.input_file_pattern);
    TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Checkpoint saved.");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    EvaluateUseCase::new(args.into()).execute()
}

fn run_caption(args: CaptionArgs) -> Result<()> {
    use crate::application::caption_use_case::CaptionUseCase;

    let cfg: CaptionConfig = args.model.into();
    let use_case = CaptionUseCase::load(&cfg)?;

    for image in use_case.caption_files(&args.input_files)? {
        let name = image
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.path.display().to_string());
        println!("Captions for image {}:", name);
        for (i, caption) in image.captions.iter().enumerate() {
            println!("  {}) {}", i, caption);
        }
    }
    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<()> {
    use crate::application::caption_use_case::CaptionUseCase;
    use crate::web::{start_server, AppState};

    let cfg: ServeConfig = args.into();
    let captioner = CaptionUseCase::load(&cfg.captioner)?;
    let state     = AppState::new(Box::new(captioner), &cfg.upload_dir);

    let runtime = tokio::runtime::Runtime::new().context("Cannot start async runtime")?;
    runtime.block_on(start_server(&cfg.addr, state))
}
