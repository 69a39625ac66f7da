//! Depth-limited regression trees for the boosting ensemble.
//!
//! Exact greedy splits on raw feature values, minimizing squared error.
//! Missing values (NaN) are supported natively: every split learns a default
//! direction by trying the missing block on each side and keeping the better
//! gain, so sparsely observed indicator columns never need imputation before
//! training.

use faer::Mat;

#[derive(Debug, Clone)]
struct TreeNode {
    /// Split feature; unused for leaves.
    feature: usize,
    /// Split threshold; rows with value <= threshold go left.
    threshold: f64,
    /// Where rows with a missing split feature go.
    default_left: bool,
    left: usize,
    right: usize,
    /// Mean response in this node; the prediction for leaves.
    value: f64,
    leaf: bool,
}

/// A fitted regression tree.
#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct TreeBuilder<'a> {
    x: &'a Mat<f64>,
    response: &'a [f64],
    max_depth: usize,
    min_leaf: usize,
    nodes: Vec<TreeNode>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    default_left: bool,
    gain: f64,
}

impl RegressionTree {
    /// Fit a tree to `response` over the rows of `x`.
    pub(crate) fn fit(x: &Mat<f64>, response: &[f64], max_depth: usize, min_leaf: usize) -> Self {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let mut builder = TreeBuilder {
            x,
            response,
            max_depth,
            min_leaf,
            nodes: Vec::new(),
        };
        builder.grow(&rows, 0);
        RegressionTree {
            nodes: builder.nodes,
        }
    }

    /// Predict one row of `x`.
    pub(crate) fn predict_row(&self, x: &Mat<f64>, row: usize) -> f64 {
        let mut node = 0usize;
        loop {
            let n = &self.nodes[node];
            if n.leaf {
                return n.value;
            }
            let v = x[(row, n.feature)];
            let go_left = if v.is_nan() { n.default_left } else { v <= n.threshold };
            node = if go_left { n.left } else { n.right };
        }
    }

    /// Number of nodes, counting leaves.
    #[cfg(test)]
    pub(crate) fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

impl TreeBuilder<'_> {
    /// Grow a subtree over `rows`, returning its node index.
    fn grow(&mut self, rows: &[usize], depth: usize) -> usize {
        let count = rows.len();
        let sum: f64 = rows.iter().map(|&i| self.response[i]).sum();
        let mean = if count == 0 { 0.0 } else { sum / count as f64 };

        let can_split = depth < self.max_depth && count >= 2 * self.min_leaf;
        let split = if can_split { self.best_split(rows, sum) } else { None };

        match split {
            None => {
                self.nodes.push(TreeNode {
                    feature: 0,
                    threshold: 0.0,
                    default_left: false,
                    left: 0,
                    right: 0,
                    value: mean,
                    leaf: true,
                });
                self.nodes.len() - 1
            }
            Some(best) => {
                let (left_rows, right_rows) = self.partition(rows, &best);
                // Reserve this node's slot before growing children.
                let index = self.nodes.len();
                self.nodes.push(TreeNode {
                    feature: best.feature,
                    threshold: best.threshold,
                    default_left: best.default_left,
                    left: 0,
                    right: 0,
                    value: mean,
                    leaf: false,
                });
                let left = self.grow(&left_rows, depth + 1);
                let right = self.grow(&right_rows, depth + 1);
                self.nodes[index].left = left;
                self.nodes[index].right = right;
                index
            }
        }
    }

    /// Exact greedy search for the split with the largest SSE reduction.
    fn best_split(&self, rows: &[usize], total_sum: f64) -> Option<BestSplit> {
        let total_count = rows.len();
        let parent_score = total_sum * total_sum / total_count as f64;

        let mut best: Option<BestSplit> = None;

        for feature in 0..self.x.ncols() {
            let mut observed: Vec<(f64, f64)> = Vec::with_capacity(total_count);
            let mut missing_sum = 0.0;
            let mut missing_count = 0usize;
            for &i in rows {
                let v = self.x[(i, feature)];
                if v.is_nan() {
                    missing_sum += self.response[i];
                    missing_count += 1;
                } else {
                    observed.push((v, self.response[i]));
                }
            }
            if observed.len() < 2 {
                continue;
            }
            observed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let observed_sum: f64 = observed.iter().map(|&(_, r)| r).sum();
            let mut prefix_sum = 0.0;

            for k in 1..observed.len() {
                prefix_sum += observed[k - 1].1;
                // No valid threshold between equal values.
                if observed[k - 1].0 >= observed[k].0 {
                    continue;
                }
                let threshold = 0.5 * (observed[k - 1].0 + observed[k].0);

                for &default_left in &[true, false] {
                    let (left_sum, left_count, right_sum, right_count) = if default_left {
                        (
                            prefix_sum + missing_sum,
                            k + missing_count,
                            observed_sum - prefix_sum,
                            observed.len() - k,
                        )
                    } else {
                        (
                            prefix_sum,
                            k,
                            observed_sum - prefix_sum + missing_sum,
                            observed.len() - k + missing_count,
                        )
                    };
                    if left_count < self.min_leaf || right_count < self.min_leaf {
                        continue;
                    }

                    let score = left_sum * left_sum / left_count as f64
                        + right_sum * right_sum / right_count as f64;
                    let gain = score - parent_score;
                    if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                        best = Some(BestSplit {
                            feature,
                            threshold,
                            default_left,
                            gain,
                        });
                    }
                }
            }
        }

        best
    }

    /// Split `rows` according to a chosen split.
    fn partition(&self, rows: &[usize], split: &BestSplit) -> (Vec<usize>, Vec<usize>) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for &i in rows {
            let v = self.x[(i, split.feature)];
            let go_left = if v.is_nan() {
                split.default_left
            } else {
                v <= split.threshold
            };
            if go_left {
                left.push(i);
            } else {
                right.push(i);
            }
        }
        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_step_function() {
        let x = Mat::from_fn(20, 1, |i, _| i as f64);
        let response: Vec<f64> = (0..20).map(|i| if i < 10 { -1.0 } else { 1.0 }).collect();

        let tree = RegressionTree::fit(&x, &response, 3, 1);

        assert!((tree.predict_row(&x, 0) - (-1.0)).abs() < 1e-9);
        assert!((tree.predict_row(&x, 19) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_response_stays_leaf() {
        let x = Mat::from_fn(10, 2, |i, j| (i * (j + 1)) as f64);
        let response = vec![3.0; 10];

        let tree = RegressionTree::fit(&x, &response, 4, 1);
        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict_row(&x, 5) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_leaf_respected() {
        let x = Mat::from_fn(4, 1, |i, _| i as f64);
        let response = vec![0.0, 0.0, 10.0, 10.0];

        // min_leaf 3 leaves no admissible split for 4 rows.
        let tree = RegressionTree::fit(&x, &response, 3, 3);
        assert_eq!(tree.n_nodes(), 1);
    }

    #[test]
    fn test_missing_values_follow_learned_direction() {
        // Feature is informative where observed; rows 8..12 are missing and
        // carry the high response, so the learned default must route them
        // with the high side.
        let x = Mat::from_fn(12, 1, |i, _| if i >= 8 { f64::NAN } else { i as f64 });
        let response: Vec<f64> = (0..12)
            .map(|i| if i >= 4 { 5.0 } else { 0.0 })
            .collect();

        let tree = RegressionTree::fit(&x, &response, 2, 1);
        let pred_missing = tree.predict_row(&x, 9);
        assert!(
            (pred_missing - 5.0).abs() < 1.0,
            "missing rows should land on the high-response side, got {pred_missing}"
        );
    }

    #[test]
    fn test_depth_zero_is_mean() {
        let x = Mat::from_fn(6, 1, |i, _| i as f64);
        let response = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let tree = RegressionTree::fit(&x, &response, 0, 1);
        assert!((tree.predict_row(&x, 0) - 3.5).abs() < 1e-12);
    }
}
