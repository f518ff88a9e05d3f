use rand::rngs::SmallRng;
use rand::Rng;

use crate::geometry::Point2f;

use super::Homography;

/// Robust estimation profile. The strict profile suits global homography
/// estimation at 2x2 motion resolution; the loose profile only rejects
/// major outliers so genuine local motion survives into the mesh fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimationProfile {
    Strict,
    Loose,
}

impl EstimationProfile {
    fn inlier_threshold(self) -> f64 {
        match self {
            EstimationProfile::Strict => 4.0,
            EstimationProfile::Loose => 20.0,
        }
    }

    fn max_iterations(self) -> usize {
        100
    }

    fn refinement_iterations(self) -> usize {
        10
    }
}

/// Estimate a robust homography between two point sets using M-estimator
/// sample consensus (MSAC) with a least-squares refinement on the final
/// consensus set.
///
/// When `partial_affine` is set, a 4-DOF rotation/scale/translation model
/// is estimated instead, which avoids projective distortion when the
/// tracking points are poorly distributed.
///
/// `inlier_status` is resized to the match count and records consensus
/// membership. Returns `None` when no valid model is found.
pub fn estimate_homography(
    from: &[Point2f],
    to: &[Point2f],
    profile: EstimationProfile,
    partial_affine: bool,
    rng: &mut SmallRng,
    inlier_status: &mut Vec<bool>,
) -> Option<Homography> {
    assert_eq!(from.len(), to.len());

    let n = from.len();
    let sample_size = if partial_affine { 2 } else { 4 };
    if n < sample_size {
        return None;
    }

    let threshold_sq = profile.inlier_threshold() * profile.inlier_threshold();
    let mut best: Option<Homography> = None;
    let mut best_score = f64::INFINITY;

    let mut sample = [0usize; 4];
    for _ in 0..profile.max_iterations() {
        if !draw_distinct(rng, n, &mut sample[..sample_size]) {
            return None;
        }

        let model = if partial_affine {
            let src = [from[sample[0]], from[sample[1]]];
            let dst = [to[sample[0]], to[sample[1]]];
            Homography::fit_partial_affine(&src, &dst)
        } else {
            let src = [from[sample[0]], from[sample[1]], from[sample[2]], from[sample[3]]];
            let dst = [to[sample[0]], to[sample[1]], to[sample[2]], to[sample[3]]];
            Homography::from_quad(&src, &dst)
        };
        let Some(model) = model else { continue };

        // MSAC score: inliers contribute their residual, outliers a
        // constant penalty.
        let mut score = 0.0;
        for i in 0..n {
            score += model.sq_error(from[i], to[i]).min(threshold_sq);
        }

        if score < best_score {
            best_score = score;
            best = Some(model);
        }
    }

    let mut model = best?;

    // Iterative local optimization: refit on the consensus set until it
    // stops changing.
    inlier_status.clear();
    inlier_status.resize(n, false);
    let mut consensus_size = 0;

    for _ in 0..profile.refinement_iterations() {
        let mut changed = false;
        let mut count = 0;
        for i in 0..n {
            let inlier = model.sq_error(from[i], to[i]) <= threshold_sq;
            if inlier_status[i] != inlier {
                changed = true;
            }
            inlier_status[i] = inlier;
            if inlier {
                count += 1;
            }
        }
        consensus_size = count;

        if consensus_size < sample_size {
            return None;
        }
        if !changed && consensus_size > 0 {
            break;
        }

        let mut src = Vec::with_capacity(consensus_size);
        let mut dst = Vec::with_capacity(consensus_size);
        for i in 0..n {
            if inlier_status[i] {
                src.push(from[i]);
                dst.push(to[i]);
            }
        }

        let refined = if partial_affine {
            Homography::fit_partial_affine(&src, &dst)
        } else {
            Homography::fit(&src, &dst)
        };
        match refined {
            Some(refined) => model = refined,
            None => break,
        }
    }

    // Make the reported mask consistent with the returned model.
    consensus_size = 0;
    for i in 0..n {
        let inlier = model.sq_error(from[i], to[i]) <= threshold_sq;
        inlier_status[i] = inlier;
        if inlier {
            consensus_size += 1;
        }
    }

    if consensus_size < sample_size {
        return None;
    }
    Some(model)
}

/// Fill `sample` with distinct indices in `0..n`.
fn draw_distinct(rng: &mut SmallRng, n: usize, sample: &mut [usize]) -> bool {
    if n < sample.len() {
        return false;
    }
    let mut filled = 0;
    while filled < sample.len() {
        let candidate = rng.random_range(0..n);
        if !sample[..filled].contains(&candidate) {
            sample[filled] = candidate;
            filled += 1;
        }
    }
    true
}
