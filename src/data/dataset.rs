use burn::data::dataset::Dataset;
use std::path::Path;

use crate::data::processor::{DocumentProcessor, EncodedPage};
use crate::domain::record::OcrRecord;

/// One training sample: encoder inputs plus decoder labels.
#[derive(Debug, Clone)]
pub struct TrainSample {
    pub page:   EncodedPage,
    pub labels: Vec<u32>,
}

/// One inference sample: encoder inputs plus the page it came from.
#[derive(Debug, Clone)]
pub struct InferenceSample {
    pub page:     EncodedPage,
    pub img_name: String,
}

/// Training samples built from one chunk of records.
pub struct OcrReorderDataset {
    samples: Vec<TrainSample>,
}

impl OcrReorderDataset {
    /// Encode every valid record of `records`; invalid ones are
    /// skipped with a warning.
    pub fn from_records(
        records:   &[OcrRecord],
        image_dir: &Path,
        processor: &DocumentProcessor,
    ) -> Self {
        let samples = records
            .iter()
            .filter_map(|record| {
                let encoded = processor.encode_page(record, image_dir).and_then(|page| {
                    let labels = processor.encode_target(&record.target_text())?;
                    Ok(TrainSample { page, labels })
                });
                match encoded {
                    Ok(sample) => Some(sample),
                    Err(e) => {
                        tracing::warn!("Skipping record '{}': {e:#}", record.img_name);
                        None
                    }
                }
            })
            .collect();
        Self { samples }
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<TrainSample> for OcrReorderDataset {
    fn get(&self, index: usize) -> Option<TrainSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Inference samples built from one chunk of records.
pub struct OcrInferenceDataset {
    samples: Vec<InferenceSample>,
}

impl OcrInferenceDataset {
    pub fn from_records(
        records:   &[OcrRecord],
        image_dir: &Path,
        processor: &DocumentProcessor,
    ) -> Self {
        let samples = records
            .iter()
            .filter_map(|record| match processor.encode_page(record, image_dir) {
                Ok(page) => Some(InferenceSample { page, img_name: record.img_name.clone() }),
                Err(e) => {
                    tracing::warn!("Skipping record '{}': {e:#}", record.img_name);
                    None
                }
            })
            .collect();
        Self { samples }
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<InferenceSample> for OcrInferenceDataset {
    fn get(&self, index: usize) -> Option<InferenceSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
