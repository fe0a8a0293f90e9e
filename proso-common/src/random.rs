//! Weighted random choice

use crate::{Error, Result};
use rand::Rng;

/// Choose `n` distinct items at random; each draw picks an item with
/// probability proportional to its weight among the items not chosen yet.
///
/// Fails when more items are requested than available or when any weight is
/// not positive.
pub fn roulette<T: Clone + PartialEq, R: Rng + ?Sized>(
    weights: &[(T, f64)],
    n: usize,
    rng: &mut R,
) -> Result<Vec<T>> {
    if n > weights.len() {
        return Err(Error::InvalidInput(format!(
            "Can't choose {} samples from {} items",
            n,
            weights.len()
        )));
    }
    if weights.iter().any(|(_, w)| *w <= 0.0 || w.is_nan()) {
        return Err(Error::InvalidInput(
            "The weight can't be a non-positive number.".to_string(),
        ));
    }

    let mut remaining: Vec<(T, f64)> = weights.to_vec();
    let mut chosen = Vec::with_capacity(n);
    for _ in 0..n {
        let total: f64 = remaining.iter().map(|(_, w)| w).sum();
        let dice = rng.gen::<f64>() * total;
        let mut running_weight = 0.0;
        // Floating point leftovers fall on the last item
        let mut index = remaining.len() - 1;
        for (i, (_, weight)) in remaining.iter().enumerate() {
            if dice < running_weight + weight {
                index = i;
                break;
            }
            running_weight += weight;
        }
        chosen.push(remaining.remove(index).0);
    }
    Ok(chosen)
}
