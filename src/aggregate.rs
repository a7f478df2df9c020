use std::collections::HashMap;

use crate::data::{Properties, PropertyValue};
use crate::selection::{ChartType, SelectionState};

/// Label used when a record has no usable value for the chosen key
pub const MISSING_LABEL: &str = "N/A";

/// Which values count as "missing" when labelling a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Absent or null
    #[default]
    Nullish,
    /// Also empty strings, zero and false
    Falsy,
}

impl MissingPolicy {
    fn label(&self, value: Option<&PropertyValue>) -> String {
        let usable = match self {
            MissingPolicy::Nullish => value,
            MissingPolicy::Falsy => value.filter(|v| !v.is_falsy()),
        };
        usable
            .and_then(PropertyValue::label)
            .unwrap_or_else(|| MISSING_LABEL.to_string())
    }
}

/// Chart-ready labels and values, always the same length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Share of the total held by entry `index`, in percent.
    pub fn percentage(&self, index: usize) -> Option<f64> {
        let value = *self.values.get(index)?;
        let total = self.total();
        if total == 0.0 {
            return None;
        }
        Some(value / total * 100.0)
    }

    /// `"{value} ({pct}%)"`, the tooltip text for entry `index`.
    pub fn describe(&self, index: usize) -> Option<String> {
        let value = *self.values.get(index)?;
        let pct = self.percentage(index).unwrap_or(0.0);
        Some(format!(
            "{} ({:.1}%)",
            crate::data::format_number(value),
            pct
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Count occurrences of each value of `key`, labels in first-seen order.
pub fn aggregate_categorical(key: &str, records: &[Properties]) -> AggregationResult {
    aggregate_categorical_with(key, records, MissingPolicy::Nullish)
}

pub fn aggregate_categorical_with(
    key: &str,
    records: &[Properties],
    policy: MissingPolicy,
) -> AggregationResult {
    let mut counts: HashMap<String, f64> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for record in records {
        let label = policy.label(record.get(key));

        // Track category order (first appearance)
        if !counts.contains_key(&label) {
            order.push(label.clone());
        }
        *counts.entry(label).or_insert(0.0) += 1.0;
    }

    let values = order
        .iter()
        .map(|label| counts.get(label).copied().unwrap_or(0.0))
        .collect();

    AggregationResult {
        labels: order,
        values,
    }
}

/// One bar per record, in input order. Non-numeric Y values become 0.
pub fn aggregate_numeric(x_key: &str, y_key: &str, records: &[Properties]) -> AggregationResult {
    let mut labels = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len());

    for record in records {
        labels.push(MissingPolicy::Nullish.label(record.get(x_key)));
        values.push(
            record
                .get(y_key)
                .and_then(PropertyValue::as_number)
                .unwrap_or(0.0),
        );
    }

    AggregationResult { labels, values }
}

/// Pick the aggregation for a selection: numeric when a bar chart has both
/// keys, categorical on the X key otherwise. `None` without an X key.
pub fn aggregate(
    selection: &SelectionState,
    records: &[Properties],
    policy: MissingPolicy,
) -> Option<AggregationResult> {
    let x_key = selection.attribute.as_deref()?;

    match (selection.chart_type, selection.y_key.as_deref()) {
        (ChartType::Bar, Some(y_key)) => Some(aggregate_numeric(x_key, y_key, records)),
        _ => Some(aggregate_categorical_with(x_key, records, policy)),
    }
}
