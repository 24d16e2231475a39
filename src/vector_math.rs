use std::cmp::Ordering;

use crate::core::errors::ApiError;

fn check_dims(query: &[f32], candidate: &[f32]) -> Result<(), ApiError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(ApiError::BadRequest(
            "Vectors must not be empty".to_string(),
        ));
    }
    if query.len() != candidate.len() {
        return Err(ApiError::BadRequest(format!(
            "Vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }
    Ok(())
}

pub fn dot_product(query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
    check_dims(query, candidate)?;
    Ok(query.iter().zip(candidate).map(|(a, b)| a * b).sum())
}

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
    let dot = dot_product(query, candidate)?;
    let denom = l2_norm(query) * l2_norm(candidate);
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// Negated euclidean distance, so that higher is still better.
pub fn negative_euclidean(query: &[f32], candidate: &[f32]) -> Result<f32, ApiError> {
    check_dims(query, candidate)?;
    let squared: f32 = query
        .iter()
        .zip(candidate)
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    Ok(-squared.sqrt())
}

/// Candidate indices with their scores, best first. Equal scores keep input order.
pub fn rank_descending<F>(
    query: &[f32],
    candidates: &[Vec<f32>],
    score: F,
) -> Result<Vec<(usize, f32)>, ApiError>
where
    F: Fn(&[f32], &[f32]) -> Result<f32, ApiError>,
{
    let mut ranked = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| Ok((idx, score(query, candidate)?)))
        .collect::<Result<Vec<_>, ApiError>>()?;
    ranked.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    Ok(ranked)
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_ignores_magnitude() {
        assert!(close(cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]).unwrap(), 1.0));
        assert!(close(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).unwrap(), 0.0));
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn dot_product_keeps_magnitude() {
        assert!(close(dot_product(&[2.0, 0.0], &[3.0, 1.0]).unwrap(), 6.0));
    }

    #[test]
    fn euclidean_prefers_closer_vectors() {
        let near = negative_euclidean(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        let far = negative_euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!(near > far);
        assert!(close(far, -5.0));
    }

    #[test]
    fn bad_shapes_are_rejected() {
        assert!(dot_product(&[1.0], &[1.0, 2.0]).is_err());
        assert!(cosine_similarity(&[], &[]).is_err());
    }

    #[test]
    fn ranking_is_best_first_and_stable() {
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![0.0, 1.0]];
        let ranked = rank_descending(&[1.0, 0.0], &candidates, cosine_similarity).unwrap();
        let order: Vec<_> = ranked.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);

        let ranked = rank_descending(&[1.0, 0.0], &candidates, dot_product).unwrap();
        assert_eq!(ranked[0].0, 2);
    }
}
