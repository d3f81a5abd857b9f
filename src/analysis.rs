use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::PsstError;
use crate::records::{AqSeverity, UtteranceCollection};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueProportion<V> {
    pub value: V,
    pub proportion: f64,
}

pub fn summing_cross_section<'a, T: 'a, G: Ord>(
    items: impl IntoIterator<Item = &'a T>,
    group: impl Fn(&T) -> G,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<G, ValueProportion<f64>> {
    let mut total = 0.0;
    let mut sums: BTreeMap<G, f64> = BTreeMap::new();
    for item in items {
        let amount = value(item);
        total += amount;
        *sums.entry(group(item)).or_default() += amount;
    }
    sums.into_iter()
        .map(|(key, sum)| {
            let proportion = if total > 0.0 { sum / total } else { 0.0 };
            (
                key,
                ValueProportion {
                    value: sum,
                    proportion,
                },
            )
        })
        .collect()
}

pub fn count_unique_cross_section<'a, T: 'a, G: Ord, V: Ord>(
    items: impl IntoIterator<Item = &'a T>,
    group: impl Fn(&T) -> G,
    value: impl Fn(&T) -> V,
) -> BTreeMap<G, ValueProportion<usize>> {
    let mut all = BTreeSet::new();
    let mut sets: BTreeMap<G, BTreeSet<V>> = BTreeMap::new();
    for item in items {
        all.insert(value(item));
        sets.entry(group(item)).or_default().insert(value(item));
    }
    let total = all.len();
    sets.into_iter()
        .map(|(key, set)| {
            let proportion = if total > 0 {
                set.len() as f64 / total as f64
            } else {
                0.0
            };
            (
                key,
                ValueProportion {
                    value: set.len(),
                    proportion,
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataAnalysis {
    pub n_sessions: usize,
    pub n_sessions_by_severity: BTreeMap<AqSeverity, usize>,
    pub n_utterances: usize,
    pub n_utterances_by_severity: BTreeMap<AqSeverity, usize>,
    pub total_duration_seconds: f64,
    pub total_duration_seconds_by_severity: BTreeMap<AqSeverity, f64>,
    pub session_share_by_severity: BTreeMap<AqSeverity, ValueProportion<usize>>,
    pub duration_share_by_severity: BTreeMap<AqSeverity, ValueProportion<f64>>,
}

impl DataAnalysis {
    pub fn compute(utterances: &UtteranceCollection) -> Result<Self, PsstError> {
        let labelled = utterances
            .iter()
            .map(|utterance| -> Result<_, PsstError> {
                Ok((utterance.session_metadata().severity()?, utterance))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let session_share = count_unique_cross_section(
            &labelled,
            |(severity, _)| *severity,
            |(_, utterance)| utterance.session.clone(),
        );
        let duration_share = summing_cross_section(
            &labelled,
            |(severity, _)| *severity,
            |(_, utterance)| utterance.duration_seconds(),
        );
        let mut n_utterances_by_severity: BTreeMap<AqSeverity, usize> =
            AqSeverity::ALL.into_iter().map(|severity| (severity, 0)).collect();
        for (severity, _) in &labelled {
            *n_utterances_by_severity.entry(*severity).or_default() += 1;
        }

        Ok(Self {
            n_sessions: utterances.session_names().len(),
            n_sessions_by_severity: fill_severities(&session_share),
            n_utterances: utterances.len(),
            n_utterances_by_severity,
            total_duration_seconds: utterances
                .iter()
                .map(|utterance| utterance.duration_seconds())
                .sum(),
            total_duration_seconds_by_severity: fill_severities(&duration_share),
            session_share_by_severity: session_share,
            duration_share_by_severity: duration_share,
        })
    }
}

fn fill_severities<V: Copy + Default>(
    shares: &BTreeMap<AqSeverity, ValueProportion<V>>,
) -> BTreeMap<AqSeverity, V> {
    AqSeverity::ALL
        .into_iter()
        .map(|severity| {
            let value = shares.get(&severity).map_or_else(V::default, |share| share.value);
            (severity, value)
        })
        .collect()
}
