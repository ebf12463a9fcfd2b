//! Batch inference with per-record error isolation

use super::Predictor;
use crate::error::PredictorError;
use crate::models::{BatchItemError, BatchOutcome, InputRecord};
use serde_json::Value;
use tracing::debug;

impl Predictor {
    /// Predict every record, returning one outcome per record in input order
    ///
    /// The whole batch runs against a single model snapshot. A failing record
    /// becomes an error descriptor and never affects its neighbours.
    pub fn batch_predict(&self, records: &[InputRecord]) -> Vec<BatchOutcome> {
        self.run_batch(records.iter().map(|record| Ok(record.clone())))
    }

    /// Like [`Predictor::batch_predict`] for untyped JSON records
    ///
    /// A record that is not an object is a per-record `InvalidInput`.
    pub fn batch_predict_values(&self, records: &[Value]) -> Vec<BatchOutcome> {
        self.run_batch(records.iter().map(|value| {
            serde_json::from_value::<InputRecord>(value.clone()).map_err(|e| {
                PredictorError::InvalidInput {
                    field: "record",
                    reason: e.to_string(),
                }
            })
        }))
    }

    fn run_batch<I>(&self, records: I) -> Vec<BatchOutcome>
    where
        I: ExactSizeIterator<Item = Result<InputRecord, PredictorError>>,
    {
        self.metrics().observe_batch_size(records.len());
        let snapshot = self.ready();

        let outcomes: Vec<BatchOutcome> = records
            .enumerate()
            .map(|(index, record)| {
                let result = record.and_then(|record| match &snapshot {
                    Ok(model) => self.evaluate(model, &record),
                    Err(e) => Err(e.clone()),
                });

                match result {
                    Ok(prediction) => BatchOutcome::Prediction(prediction),
                    Err(e) => {
                        self.metrics().inc_prediction_errors(e.kind());
                        BatchOutcome::Failed(BatchItemError::new(index, &e))
                    }
                }
            })
            .collect();

        debug!(
            records = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.is_ok()).count(),
            "Batch prediction completed"
        );
        outcomes
    }
}
