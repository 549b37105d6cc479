// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a predictions file written by `infer` against gold data.
//
//   Reorder:     gold is NDJSON with `ordered_src_doc`
//   Translation: gold is a JSON array or NDJSON with `doc_translation`
//
// Reports are returned to the CLI layer, which prints them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::data::ndjson::{read_json_or_ndjson, NdjsonReader};
use crate::eval::{
    read_predictions,
    reorder::{score_reorder, ReorderGold, ReorderReport},
    translation::{score_translation, TranslationGold, TranslationReport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalTask {
    Reorder,
    Translation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalReport {
    Reorder(ReorderReport),
    Translation(TranslationReport),
}

pub struct EvaluateUseCase {
    task:        EvalTask,
    predictions: PathBuf,
    gold:        PathBuf,
}

impl EvaluateUseCase {
    pub fn new(task: EvalTask, predictions: impl Into<PathBuf>, gold: impl Into<PathBuf>) -> Self {
        Self { task, predictions: predictions.into(), gold: gold.into() }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let predictions = read_predictions(&self.predictions)?;
        tracing::info!("Loaded {} predictions", predictions.len());

        match self.task {
            EvalTask::Reorder => {
                let gold = read_reorder_gold(&self.gold)?;
                tracing::info!("Loaded {} gold documents", gold.len());
                Ok(EvalReport::Reorder(score_reorder(&predictions, &gold)))
            }
            EvalTask::Translation => {
                let gold: Vec<TranslationGold> = read_json_or_ndjson(&self.gold)?;
                tracing::info!("Loaded {} gold translations", gold.len());
                Ok(EvalReport::Translation(score_translation(&predictions, &gold)?))
            }
        }
    }
}

fn read_reorder_gold(path: &Path) -> Result<Vec<ReorderGold>> {
    NdjsonReader::new(path)
        .read_all()
        .with_context(|| format!("Cannot read gold file '{}'", path.display()))
}
