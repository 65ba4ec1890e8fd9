//! Picks the sample and the reference dataset of a measurement by their names.
//!
//! A dataset is a sample candidate if its name contains "sample" or "measurement", and a reference
//! candidate if it contains "ref" (both case-insensitive). Exactly one candidate of each kind is
//! required; nothing else (size, order) is used to break ties.

use crate::error::ResolverError;
use std::collections::BTreeSet;

const SAMPLE_PATTERNS: [&str; 2] = ["sample", "measurement"];
const REFERENCE_PATTERNS: [&str; 1] = ["ref"];

fn matches_any(name: &str, patterns: &[&str]) -> bool {
    let name = name.to_lowercase();
    patterns.iter().any(|p| name.contains(p))
}

/// Returns `(sample_name, reference_name)`.
pub fn resolve<I, S>(dataset_names: I) -> Result<(String, String), ResolverError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: BTreeSet<String> = dataset_names
        .into_iter()
        .map(|n| n.as_ref().to_string())
        .collect();

    let samples: Vec<String> = names
        .iter()
        .filter(|n| matches_any(n, &SAMPLE_PATTERNS))
        .cloned()
        .collect();
    let references: Vec<String> = names
        .iter()
        .filter(|n| matches_any(n, &REFERENCE_PATTERNS))
        .cloned()
        .collect();

    let sample = match samples.as_slice() {
        [] => {
            return Err(ResolverError::NoSample {
                available: names.into_iter().collect(),
            })
        }
        [single] => single.clone(),
        _ => return Err(ResolverError::AmbiguousSample(samples)),
    };
    let reference = match references.as_slice() {
        [] => {
            return Err(ResolverError::NoReference {
                available: names.into_iter().collect(),
            })
        }
        [single] => single.clone(),
        _ => return Err(ResolverError::AmbiguousReference(references)),
    };
    log::debug!("resolved sample dataset '{sample}' and reference dataset '{reference}'");
    Ok((sample, reference))
}
