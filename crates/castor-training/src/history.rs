//! Cumulative training history of one model session.

use crate::config::EpochAccounting;
use castor_abstraction::IterationRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics plotted when the caller does not choose any.
pub const DEFAULT_PLOT_ITEMS: [&str; 2] = ["Loss", "FitError"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// One-based, counted across every `fit` call of the session.
    pub epoch: u32,
    pub metrics: BTreeMap<String, f64>,
}

/// Epoch records accumulated over repeated training calls.
///
/// Epoch numbers continue where the previous call left off: two calls of
/// 5 and 3 epochs produce epochs 1..=5 followed by 6..=8.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
    cumulative_epochs: u32,
}

/// Table-shaped view of the history, ready to hand to a plotting backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPlot {
    pub epochs: Vec<u32>,
    /// One series per requested metric; `None` where an epoch lacks the metric.
    pub series: Vec<(String, Vec<Option<f64>>)>,
}

impl TrainingHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the history of one training call and advance the epoch counter.
    ///
    /// `iterations` carries the service's zero-based epochs. Returns the records
    /// added by this call.
    pub fn merge(
        &mut self,
        iterations: &[IterationRecord],
        requested_epochs: u32,
        accounting: EpochAccounting,
    ) -> &[EpochRecord] {
        let offset = self.cumulative_epochs;
        let start = self.records.len();

        self.records.extend(iterations.iter().map(|it| EpochRecord {
            epoch: one_based(it.epoch).saturating_add(offset),
            metrics: it.metrics.clone(),
        }));

        let advance = match accounting {
            EpochAccounting::Requested => requested_epochs,
            EpochAccounting::Observed => {
                u32::try_from(self.records.len() - start).unwrap_or(u32::MAX)
            }
        };
        self.cumulative_epochs = self.cumulative_epochs.saturating_add(advance);

        &self.records[start..]
    }

    #[must_use]
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    #[must_use]
    pub fn epochs(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.epoch).collect()
    }

    /// Epochs accounted so far; the offset applied to the next call.
    #[must_use]
    pub fn cumulative_epochs(&self) -> u32 {
        self.cumulative_epochs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// `(epoch, value)` pairs for one metric, skipping epochs that lack it.
    #[must_use]
    pub fn metric_series(&self, metric: &str) -> Vec<(u32, f64)> {
        self.records
            .iter()
            .filter_map(|r| r.metrics.get(metric).map(|v| (r.epoch, *v)))
            .collect()
    }

    #[must_use]
    pub fn plot_series(&self, items: &[&str]) -> HistoryPlot {
        HistoryPlot {
            epochs: self.epochs(),
            series: items
                .iter()
                .map(|item| {
                    let values =
                        self.records.iter().map(|r| r.metrics.get(*item).copied()).collect();
                    ((*item).to_string(), values)
                })
                .collect(),
        }
    }
}

/// The service counts epochs from zero, sometimes as floats.
fn one_based(epoch: f64) -> u32 {
    (epoch.trunc() as u32).saturating_add(1)
}
