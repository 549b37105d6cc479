// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with `clap` and hands each subcommand
// to its use case in Layer 2. Results are printed here.
//
//   1. `train`            — train the reorder model
//   2. `infer`            — write predictions for a test file
//   3. `bleu-reorder`     — per-page BLEU of reordered text
//   4. `bleu-translation` — corpus BLEU of translated text

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, InferArgs, TrainArgs};

use crate::application::evaluate_use_case::{EvalReport, EvalTask, EvaluateUseCase};

#[derive(Parser, Debug)]
#[command(
    name = "doc-reorder",
    version = "0.1.0",
    about = "Train a layout-aware model that restores the reading order of OCR words, then score it with BLEU."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case; this layer only routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)           => run_train(args),
            Commands::Infer(args)           => run_infer(args),
            Commands::BleuReorder(args)     => run_eval(EvalTask::Reorder, args),
            Commands::BleuTranslation(args) => run_eval(EvalTask::Translation, args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on {} (images in {})", args.train_json, args.train_img_dir);

    let summary = TrainUseCase::new(args.into()).execute()?;
    println!(
        "Training complete. Last epoch {} | steps {} | loss {:.4}",
        summary.last_epoch, summary.global_step, summary.last_loss
    );
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<()> {
    use crate::application::infer_use_case::InferUseCase;

    let (path, written) = InferUseCase::new(args.into()).execute()?;
    println!("Wrote {} predictions to {}", written, path.display());
    Ok(())
}

fn run_eval(task: EvalTask, args: EvalArgs) -> Result<()> {
    match EvaluateUseCase::new(task, &args.predictions, &args.gold).execute()? {
        EvalReport::Reorder(report) => {
            for (img_name, score) in &report.scores {
                println!("{img_name}: BLEU = {score:.4}");
            }
            match report.mean() {
                Some(mean) => println!("Average BLEU score: {mean:.4}"),
                None => println!("No matching documents found for BLEU score calculation."),
            }
        }
        EvalReport::Translation(report) => {
            tracing::info!("Scored {} matching documents", report.matched);
            println!("Validation BLEU = {:.2}", report.percent());
        }
    }
    Ok(())
}
