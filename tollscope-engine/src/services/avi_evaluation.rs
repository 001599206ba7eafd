//! AVI read-failure evaluation
//!
//! Estimates how often the AVI readers miss a transponder by splitting a
//! record window in two: the first half trains a dynamic dictionary (its flags
//! are discarded), the second half is checked against that dictionary frozen
//! into static mode. Accuracy for a trial is `1 - flagged / test_rows`.
//!
//! Windows start at random points in the table's time range, and each
//! dictionary cap is evaluated over the same number of trials, to show how
//! sensitive the estimate is to dictionary size.

use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tollscope_common::{Error, RecordTable, Result};
use tracing::{debug, info, warn};

use super::confidence_dictionary::ConfidenceDictionary;
use super::mismatch_detector::MismatchDetector;
use crate::config::AviSettings;

/// Outcome of one training/test window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    #[serde(serialize_with = "tollscope_common::time::serialize_timestamp")]
    pub window_start: NaiveDateTime,
    pub cap: Option<usize>,
    pub training_rows: usize,
    pub dictionary_size: usize,
    pub test_rows: usize,
    pub flagged: usize,
    pub accuracy: f64,
}

/// Accuracy statistics for one dictionary cap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapSummary {
    pub cap: Option<usize>,
    /// Trials that produced a result
    pub trials: usize,
    /// Trials whose test half held no records
    pub skipped: usize,
    pub mean_accuracy: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
}

impl CapSummary {
    fn from_results(cap: Option<usize>, results: &[TrialResult], skipped: usize) -> Self {
        let accuracies: Vec<f64> = results.iter().map(|r| r.accuracy).collect();
        let (mean, min, max) = if accuracies.is_empty() {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            (
                accuracies.iter().sum::<f64>() / accuracies.len() as f64,
                accuracies.iter().copied().fold(f64::INFINITY, f64::min),
                accuracies.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        Self {
            cap,
            trials: results.len(),
            skipped,
            mean_accuracy: mean,
            min_accuracy: min,
            max_accuracy: max,
        }
    }
}

/// Randomized windowed evaluation over one record table
pub struct AviEvaluator<'a> {
    table: &'a RecordTable,
    detector: MismatchDetector,
    settings: AviSettings,
    first: NaiveDateTime,
    last: NaiveDateTime,
    rng: StdRng,
}

impl<'a> AviEvaluator<'a> {
    /// # Errors
    ///
    /// `InvalidInput` when the table is empty or spans less than the
    /// configured minimum window.
    pub fn new(table: &'a RecordTable, settings: AviSettings) -> Result<Self> {
        let (first, last) = table
            .time_range()
            .ok_or_else(|| Error::InvalidInput("cannot evaluate an empty record table".to_string()))?;

        if last - first < settings.min_window {
            return Err(Error::InvalidInput(format!(
                "record range {} to {} is shorter than the {}-day evaluation window",
                first,
                last,
                settings.min_window.num_days()
            )));
        }

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            table,
            detector: MismatchDetector::from_settings(&settings),
            settings,
            first,
            last,
            rng,
        })
    }

    pub fn window_length(&self) -> Duration {
        self.settings.min_window
    }

    /// Uniform window start such that the whole window fits the table range
    pub fn random_window_start(&mut self) -> NaiveDateTime {
        let span = (self.last - self.first - self.settings.min_window).num_seconds();
        if span <= 0 {
            return self.first;
        }
        self.first + Duration::seconds(self.rng.gen_range(0..=span))
    }

    /// Train on the first half of the window, test on the second
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the test half holds no records.
    pub fn run_trial(&self, window_start: NaiveDateTime, cap: Option<usize>) -> Result<TrialResult> {
        let half = self.settings.min_window / 2;
        let midpoint = window_start + half;
        let window_end = window_start + self.settings.min_window;

        let training = self.table.window(window_start, midpoint);
        let test = self.table.window(midpoint, window_end);
        if test.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no records in test half {} to {}",
                midpoint, window_end
            )));
        }

        let mut dictionary = ConfidenceDictionary::dynamic();
        self.detector.detect(&training, &mut dictionary);
        if let Some(n) = cap {
            dictionary = dictionary.top_n(n);
        }
        let mut dictionary = dictionary.into_static();
        let dictionary_size = dictionary.len();

        let report = self.detector.detect(&test, &mut dictionary);
        let flagged = report.flagged_count();
        let accuracy = 1.0 - flagged as f64 / test.len() as f64;

        debug!(
            %window_start,
            ?cap,
            training_rows = training.len(),
            test_rows = test.len(),
            dictionary_size,
            flagged,
            accuracy,
            "Evaluation trial"
        );

        Ok(TrialResult {
            window_start,
            cap,
            training_rows: training.len(),
            dictionary_size,
            test_rows: test.len(),
            flagged,
            accuracy,
        })
    }

    /// Run the configured number of trials for every configured cap
    pub fn run(&mut self) -> Vec<CapSummary> {
        let caps = self.settings.dictionary_caps.clone();
        let mut summaries = Vec::with_capacity(caps.len());

        for cap in caps {
            let mut results = Vec::with_capacity(self.settings.trials as usize);
            let mut skipped = 0;

            for _ in 0..self.settings.trials {
                let start = self.random_window_start();
                match self.run_trial(start, cap) {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        warn!(window_start = %start, ?cap, error = %e, "Skipping evaluation trial");
                        skipped += 1;
                    }
                }
            }

            let summary = CapSummary::from_results(cap, &results, skipped);
            info!(
                ?cap,
                trials = summary.trials,
                skipped,
                mean_accuracy = summary.mean_accuracy,
                "Evaluated dictionary cap"
            );
            summaries.push(summary);
        }

        summaries
    }
}
