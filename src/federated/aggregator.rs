//! Weighted aggregation for federated learning.
//!
//! Implements FedAvg weight averaging and weighted loss averaging.

use crate::core::{Error, NDArray, Result};

/// Compute the example-weighted average of client parameter sets.
///
/// Each entry pairs one client's tensors with the number of examples it
/// trained on. The result has the same tensor layout as the inputs.
pub fn aggregate(results: &[(Vec<NDArray>, u64)]) -> Result<Vec<NDArray>> {
    let (first, _) = results
        .first()
        .ok_or_else(|| Error::Aggregation("No results to aggregate".to_string()))?;

    let total_examples: u64 = results.iter().map(|(_, n)| *n).sum();
    if total_examples == 0 {
        return Err(Error::Aggregation(
            "Total number of examples must be positive".to_string(),
        ));
    }

    for (weights, _) in results {
        if weights.len() != first.len() {
            return Err(Error::Aggregation(format!(
                "Tensor count mismatch: expected {}, got {}",
                first.len(),
                weights.len()
            )));
        }
        for (layer, (a, b)) in weights.iter().zip(first.iter()).enumerate() {
            if a.len() != b.len() {
                return Err(Error::Aggregation(format!(
                    "Tensor {} size mismatch: expected {}, got {}",
                    layer,
                    b.len(),
                    a.len()
                )));
            }
        }
    }

    // Accumulate in f64.
    let mut sums: Vec<Vec<f64>> = first.iter().map(|t| vec![0.0; t.len()]).collect();
    for (weights, num_examples) in results {
        let w = *num_examples as f64;
        for (acc, layer) in sums.iter_mut().zip(weights.iter()) {
            for (a, v) in acc.iter_mut().zip(layer.iter()) {
                *a += *v as f64 * w;
            }
        }
    }

    let total = total_examples as f64;
    Ok(sums
        .into_iter()
        .map(|layer| layer.into_iter().map(|v| (v / total) as f32).collect())
        .collect())
}

/// Compute the example-weighted average of client losses.
pub fn weighted_loss_avg(results: &[(u64, f64)]) -> Result<f64> {
    let total_examples: u64 = results.iter().map(|(n, _)| *n).sum();
    if total_examples == 0 {
        return Err(Error::Aggregation(
            "Total number of examples must be positive".to_string(),
        ));
    }

    let weighted: f64 = results.iter().map(|(n, loss)| *n as f64 * loss).sum();
    Ok(weighted / total_examples as f64)
}
