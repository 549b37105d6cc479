// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and all their flags:
//
//   train            — fit the model on an NDJSON file + image dir
//   infer            — write predictions for a test file
//   bleu-reorder     — sentence BLEU of reordered text
//   bleu-translation — corpus BLEU of translated text
//
// Defaults mirror the hyperparameters the model was tuned with.

use clap::{Args, Subcommand};

use crate::application::{infer_use_case::InferConfig, train_use_case::TrainConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the reorder model
    Train(TrainArgs),

    /// Predict reading-order text with a trained checkpoint
    Infer(InferArgs),

    /// Score reorder predictions against NDJSON gold data
    BleuReorder(EvalArgs),

    /// Score translation predictions against JSON / NDJSON gold data
    BleuTranslation(EvalArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// NDJSON file with one OCR record per line
    #[arg(long, default_value = "data/train.json")]
    pub train_json: String,

    /// Directory holding the page images named by `img_name`
    #[arg(long, default_value = "data/train_images")]
    pub train_img_dir: String,

    /// Where checkpoints, tokenizers and logs are written
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 100)]
    pub num_epochs: usize,

    /// Only the first N records of the file are used
    #[arg(long, default_value_t = 6000)]
    pub max_samples: usize,

    /// Records decoded into memory at a time
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 3e-5)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Fraction of all optimizer steps spent warming up
    #[arg(long, default_value_t = 0.1)]
    pub warmup_pct: f64,

    #[arg(long, default_value_t = 512)]
    pub max_output_length: usize,

    /// Gradient norm clip
    #[arg(long, default_value_t = 1.0)]
    pub grad_clip: f64,

    /// Save a checkpoint every N epochs
    #[arg(long, default_value_t = 5)]
    pub save_every: usize,

    /// Background data loader workers (0 = load on the training thread)
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Continue from the checkpoint of this epoch
    #[arg(long)]
    pub resume_epoch: Option<usize>,

    /// Square side every page image is resized to
    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    /// Maximum layout tokens per page, including specials
    #[arg(long, default_value_t = 512)]
    pub max_seq_len: usize,

    #[arg(long, default_value_t = 512)]
    pub max_target_len: usize,

    /// Scale word boxes to 0..1000 using the page image size
    #[arg(long, default_value_t = false)]
    pub normalize_boxes: bool,

    /// Vocabulary cap when building the layout tokenizer
    #[arg(long, default_value_t = 50265)]
    pub layout_vocab_size: usize,

    /// Vocabulary cap when building the target tokenizer
    #[arg(long, default_value_t = 32128)]
    pub target_vocab_size: usize,

    #[arg(long, default_value_t = 768)]
    pub layout_hidden: usize,

    #[arg(long, default_value_t = 12)]
    pub layout_layers: usize,

    #[arg(long, default_value_t = 12)]
    pub layout_heads: usize,

    #[arg(long, default_value_t = 3072)]
    pub layout_ff: usize,

    #[arg(long, default_value_t = 16)]
    pub patch_size: usize,

    /// Hidden size of the seq2seq model; the projection maps into it
    #[arg(long, default_value_t = 512)]
    pub d_model: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Encoder and decoder layers each
    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 2048)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_json:        a.train_json,
            train_img_dir:     a.train_img_dir,
            checkpoint_dir:    a.checkpoint_dir,
            num_epochs:        a.num_epochs,
            max_samples:       a.max_samples,
            chunk_size:        a.chunk_size,
            batch_size:        a.batch_size,
            lr:                a.lr,
            weight_decay:      a.weight_decay,
            warmup_pct:        a.warmup_pct,
            max_output_length: a.max_output_length,
            grad_clip:         a.grad_clip,
            save_every:        a.save_every,
            num_workers:       a.num_workers,
            seed:              a.seed,
            resume_epoch:      a.resume_epoch,
            image_size:        a.image_size,
            max_seq_len:       a.max_seq_len,
            max_target_len:    a.max_target_len,
            normalize_boxes:   a.normalize_boxes,
            layout_vocab_size: a.layout_vocab_size,
            target_vocab_size: a.target_vocab_size,
            layout_hidden:     a.layout_hidden,
            layout_layers:     a.layout_layers,
            layout_heads:      a.layout_heads,
            layout_ff:         a.layout_ff,
            patch_size:        a.patch_size,
            d_model:           a.d_model,
            num_heads:         a.num_heads,
            num_layers:        a.num_layers,
            d_ff:              a.d_ff,
            dropout:           a.dropout,
        }
    }
}

/// All arguments for the `infer` command
#[derive(Args, Debug)]
pub struct InferArgs {
    #[arg(long, default_value = "data/test.json")]
    pub test_json: String,

    #[arg(long, default_value = "data/test_images")]
    pub test_img_dir: String,

    /// Directory the training run wrote its checkpoints to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Checkpoint epoch to load
    #[arg(long, default_value_t = 30)]
    pub epoch: usize,

    /// Defaults to <checkpoint-dir>/predictions.json
    #[arg(long)]
    pub output_json: Option<String>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 512)]
    pub max_output_length: usize,
}

impl From<InferArgs> for InferConfig {
    fn from(a: InferArgs) -> Self {
        InferConfig {
            test_json:         a.test_json,
            test_img_dir:      a.test_img_dir,
            checkpoint_dir:    a.checkpoint_dir,
            epoch:             a.epoch,
            output_json:       a.output_json,
            batch_size:        a.batch_size,
            chunk_size:        a.chunk_size,
            max_output_length: a.max_output_length,
        }
    }
}

/// Arguments shared by both BLEU commands
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// `{img_name: text}` JSON written by `infer`
    #[arg(long)]
    pub predictions: String,

    /// Gold file
    #[arg(long)]
    pub gold: String,
}
