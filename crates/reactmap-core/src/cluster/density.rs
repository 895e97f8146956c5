//! HDBSCAN density-based clustering.
//!
//! The pipeline:
//! 1. Core distance of each point: distance to its `min_samples`-th nearest
//!    neighbour, counting the point itself.
//! 2. Mutual reachability `max(core(a), core(b), d(a, b))`.
//! 3. Minimum spanning tree over mutual reachability (Prim).
//! 4. Single-linkage hierarchy from the sorted MST edges (union-find).
//! 5. Condensed tree: splits where both sides keep `min_cluster_size`
//!    points create clusters, smaller sides fall out as points.
//! 6. Excess-of-mass selection over cluster stabilities, never selecting
//!    the root, then optional `cluster_selection_epsilon` merging.
//! 7. Labels and membership probabilities.
//!
//! Node ids follow the usual convention: `0..n` are points; in the condensed
//! tree cluster ids start at `n`, which is the root.

use super::metrics::pairwise_distances;
use crate::features::FeatureMatrix;
use crate::{ReactmapError, Result};
use ndarray::{Array2, Zip};
use reactmap_types::{DensityParams, NOISE_LABEL};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Distances below this are treated as this value when converted to lambda.
const MIN_DISTANCE: f64 = 1e-12;

/// Labels and membership strengths, one per input row.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityFit {
    pub labels: Vec<i32>,
    pub probabilities: Vec<f64>,
}

impl DensityFit {
    fn all_noise(n: usize) -> Self {
        Self {
            labels: vec![NOISE_LABEL; n],
            probabilities: vec![0.0; n],
        }
    }
}

/// Reject parameter combinations the algorithm cannot run with.
pub fn validate_params(params: &DensityParams) -> Result<()> {
    if params.min_cluster_size < 2 {
        return Err(ReactmapError::invalid_config(format!(
            "min_cluster_size must be at least 2, got {}",
            params.min_cluster_size
        )));
    }
    if params.min_samples < 1 {
        return Err(ReactmapError::invalid_config("min_samples must be at least 1"));
    }
    if !params.cluster_selection_epsilon.is_finite() || params.cluster_selection_epsilon < 0.0 {
        return Err(ReactmapError::invalid_config(format!(
            "cluster_selection_epsilon must be a non-negative number, got {}",
            params.cluster_selection_epsilon
        )));
    }
    Ok(())
}

/// Cluster the rows of `data`.
///
/// Fewer rows than `min_cluster_size` gives all noise.
pub fn hdbscan(data: &FeatureMatrix, params: &DensityParams) -> Result<DensityFit> {
    validate_params(params)?;
    let n = data.nrows();
    if n < params.min_cluster_size {
        return Ok(DensityFit::all_noise(n));
    }

    let distances = pairwise_distances(data, params.metric);
    let core = core_distances(&distances, params.min_samples);
    let reachability = mutual_reachability(&distances, &core);
    let hierarchy = single_linkage(minimum_spanning_tree(&reachability), n);
    let tree = CondensedTree::build(&hierarchy, n, params.min_cluster_size);

    let selected = tree.select_clusters(params.cluster_selection_epsilon);
    let labels = tree.labels(&selected);
    let probabilities = tree.probabilities(&selected, &labels);

    debug!(
        target: "reactmap::cluster",
        "HDBSCAN: {} points, {} condensed clusters, {} selected",
        n,
        tree.cluster_ids().len(),
        selected.len()
    );
    Ok(DensityFit {
        labels,
        probabilities,
    })
}

fn core_distances(distances: &Array2<f64>, min_samples: usize) -> Vec<f64> {
    distances
        .outer_iter()
        .map(|row| {
            let mut sorted = row.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let k = min_samples.min(sorted.len()).max(1);
            sorted[k - 1]
        })
        .collect()
}

fn mutual_reachability(distances: &Array2<f64>, core: &[f64]) -> Array2<f64> {
    let mut out = distances.clone();
    Zip::indexed(&mut out).for_each(|(i, j), d| {
        *d = if i == j { 0.0 } else { d.max(core[i]).max(core[j]) };
    });
    out
}

/// Prim's algorithm on a dense matrix. Returns `n - 1` edges `(a, b, weight)`.
fn minimum_spanning_tree(weights: &Array2<f64>) -> Vec<(usize, usize, f64)> {
    let n = weights.nrows();
    if n == 0 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    in_tree[0] = true;
    for j in 1..n {
        best[j] = weights[[0, j]];
    }

    for _ in 1..n {
        let mut next = None;
        let mut next_weight = f64::INFINITY;
        for j in 0..n {
            if !in_tree[j] && (next.is_none() || best[j] < next_weight) {
                next = Some(j);
                next_weight = best[j];
            }
        }
        let Some(next) = next else {
            break;
        };

        in_tree[next] = true;
        edges.push((from[next], next, next_weight));
        for j in 0..n {
            if !in_tree[j] && weights[[next, j]] < best[j] {
                best[j] = weights[[next, j]];
                from[j] = next;
            }
        }
    }
    edges
}

/// One merge of the single-linkage dendrogram. Merge `i` creates node `n + i`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Union-find where every union creates a fresh parent node.
struct LinkageSets {
    parent: Vec<usize>,
    size: Vec<usize>,
    next: usize,
}

impl LinkageSets {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        let mut size = vec![0; total];
        size[..n].fill(1);
        Self {
            parent: (0..total).collect(),
            size,
            next: n,
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while node != root {
            let up = self.parent[node];
            self.parent[node] = root;
            node = up;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let node = self.next;
        self.parent[a] = node;
        self.parent[b] = node;
        self.size[node] = self.size[a] + self.size[b];
        self.next += 1;
        node
    }
}

fn single_linkage(mut edges: Vec<(usize, usize, f64)>, n: usize) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    let mut sets = LinkageSets::new(n);
    edges
        .into_iter()
        .map(|(a, b, distance)| {
            let left = sets.find(a);
            let right = sets.find(b);
            let merged = sets.union(left, right);
            Merge {
                left,
                right,
                distance,
                size: sets.size[merged],
            }
        })
        .collect()
}

/// Breadth-first walk of the dendrogram below `root`, including `root`.
fn dendrogram_subtree(hierarchy: &[Merge], n: usize, root: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        out.push(node);
        if node >= n {
            let merge = &hierarchy[node - n];
            queue.push_back(merge.left);
            queue.push_back(merge.right);
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    /// Point index when `< n`, otherwise a condensed cluster id.
    child: usize,
    lambda: f64,
    size: usize,
}

struct CondensedTree {
    n: usize,
    edges: Vec<CondensedEdge>,
}

impl CondensedTree {
    fn build(hierarchy: &[Merge], n: usize, min_cluster_size: usize) -> Self {
        let root = 2 * n - 2;
        let node_size = |node: usize| if node < n { 1 } else { hierarchy[node - n].size };

        let mut relabel = vec![0usize; 2 * n - 1];
        relabel[root] = n;
        let mut next_label = n + 1;
        let mut ignore = vec![false; 2 * n - 1];
        let mut edges = Vec::new();

        for node in dendrogram_subtree(hierarchy, n, root) {
            if node < n || ignore[node] {
                continue;
            }
            let merge = hierarchy[node - n];
            let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
            let parent = relabel[node];
            let left_size = node_size(merge.left);
            let right_size = node_size(merge.right);

            let mut fall_out = |child: usize, edges: &mut Vec<CondensedEdge>| {
                for sub in dendrogram_subtree(hierarchy, n, child) {
                    if sub < n {
                        edges.push(CondensedEdge {
                            parent,
                            child: sub,
                            lambda,
                            size: 1,
                        });
                    }
                    ignore[sub] = true;
                }
            };

            match (left_size >= min_cluster_size, right_size >= min_cluster_size) {
                (true, true) => {
                    for (child, size) in [(merge.left, left_size), (merge.right, right_size)] {
                        relabel[child] = next_label;
                        edges.push(CondensedEdge {
                            parent,
                            child: next_label,
                            lambda,
                            size,
                        });
                        next_label += 1;
                    }
                }
                (false, false) => {
                    fall_out(merge.left, &mut edges);
                    fall_out(merge.right, &mut edges);
                }
                (false, true) => {
                    fall_out(merge.left, &mut edges);
                    relabel[merge.right] = parent;
                }
                (true, false) => {
                    fall_out(merge.right, &mut edges);
                    relabel[merge.left] = parent;
                }
            }
        }

        Self { n, edges }
    }

    fn root(&self) -> usize {
        self.n
    }

    fn cluster_ids(&self) -> BTreeSet<usize> {
        let mut ids: BTreeSet<usize> = self.edges.iter().map(|e| e.parent).collect();
        ids.extend(self.edges.iter().filter(|e| e.child >= self.n).map(|e| e.child));
        ids
    }

    /// Lambda at which each non-root cluster split off its parent.
    fn births(&self) -> HashMap<usize, f64> {
        self.edges
            .iter()
            .filter(|e| e.child >= self.n)
            .map(|e| (e.child, e.lambda))
            .collect()
    }

    fn parents(&self) -> HashMap<usize, usize> {
        self.edges
            .iter()
            .filter(|e| e.child >= self.n)
            .map(|e| (e.child, e.parent))
            .collect()
    }

    fn cluster_children(&self) -> HashMap<usize, Vec<usize>> {
        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        for e in self.edges.iter().filter(|e| e.child >= self.n) {
            children.entry(e.parent).or_default().push(e.child);
        }
        children
    }

    /// Clusters strictly below `cluster`.
    fn descendants(&self, children: &HashMap<usize, Vec<usize>>, cluster: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = children.get(&cluster).cloned().unwrap_or_default();
        while let Some(c) = stack.pop() {
            out.push(c);
            if let Some(grandchildren) = children.get(&c) {
                stack.extend(grandchildren.iter().copied());
            }
        }
        out
    }

    fn stabilities(&self) -> BTreeMap<usize, f64> {
        let births = self.births();
        let mut stability: BTreeMap<usize, f64> =
            self.cluster_ids().into_iter().map(|c| (c, 0.0)).collect();
        for e in &self.edges {
            let birth = births.get(&e.parent).copied().unwrap_or(0.0);
            *stability.entry(e.parent).or_default() += (e.lambda - birth) * e.size as f64;
        }
        stability
    }

    /// Excess-of-mass selection, root excluded, followed by epsilon merging.
    fn select_clusters(&self, epsilon: f64) -> BTreeSet<usize> {
        let mut stability = self.stabilities();
        let children = self.cluster_children();
        let root = self.root();

        // children carry larger ids than their parents
        let candidates: Vec<usize> = stability.keys().rev().copied().filter(|&c| c != root).collect();
        let mut is_cluster: BTreeMap<usize, bool> = candidates.iter().map(|&c| (c, true)).collect();

        for &node in &candidates {
            let own = stability.get(&node).copied().unwrap_or(0.0);
            let subtree: f64 = children
                .get(&node)
                .map(|cs| cs.iter().map(|c| stability.get(c).copied().unwrap_or(0.0)).sum())
                .unwrap_or(0.0);

            if subtree > own {
                is_cluster.insert(node, false);
                stability.insert(node, subtree);
            } else {
                for d in self.descendants(&children, node) {
                    is_cluster.insert(d, false);
                }
            }
        }

        let selected: BTreeSet<usize> = is_cluster
            .into_iter()
            .filter_map(|(c, keep)| keep.then_some(c))
            .collect();

        if epsilon > 0.0 {
            self.merge_within_epsilon(selected, epsilon, &children)
        } else {
            selected
        }
    }

    /// Replace selected clusters born below `epsilon` by their closest
    /// ancestor born above it (never the root).
    fn merge_within_epsilon(
        &self,
        selected: BTreeSet<usize>,
        epsilon: f64,
        children: &HashMap<usize, Vec<usize>>,
    ) -> BTreeSet<usize> {
        let births = self.births();
        let parents = self.parents();
        let root = self.root();
        let birth_distance = |c: usize| 1.0 / births.get(&c).copied().unwrap_or(f64::INFINITY);

        let mut merged = BTreeSet::new();
        let mut absorbed: HashSet<usize> = HashSet::new();
        for &leaf in &selected {
            if birth_distance(leaf) >= epsilon {
                merged.insert(leaf);
                continue;
            }
            if absorbed.contains(&leaf) {
                continue;
            }

            let mut target = leaf;
            while let Some(&parent) = parents.get(&target) {
                if parent == root {
                    break;
                }
                if birth_distance(parent) > epsilon {
                    target = parent;
                    break;
                }
                target = parent;
            }

            merged.insert(target);
            absorbed.extend(self.descendants(children, target));
        }

        // a cluster nested inside another selected one is part of it
        let nested: HashSet<usize> = merged
            .iter()
            .flat_map(|&c| self.descendants(children, c))
            .collect();
        merged.into_iter().filter(|c| !nested.contains(c)).collect()
    }

    /// Label each point by its nearest selected ancestor; others are noise.
    fn labels(&self, selected: &BTreeSet<usize>) -> Vec<i32> {
        let label_of: HashMap<usize, i32> = selected
            .iter()
            .enumerate()
            .map(|(label, &c)| (c, label as i32))
            .collect();
        let parents = self.parents();

        let mut labels = vec![NOISE_LABEL; self.n];
        for e in self.edges.iter().filter(|e| e.child < self.n) {
            let mut cluster = Some(e.parent);
            while let Some(c) = cluster {
                if let Some(&label) = label_of.get(&c) {
                    labels[e.child] = label;
                    break;
                }
                cluster = parents.get(&c).copied();
            }
        }
        labels
    }

    /// Membership strength: the lambda at which a point left its cluster
    /// relative to the largest lambda seen directly under that cluster.
    fn probabilities(&self, selected: &BTreeSet<usize>, labels: &[i32]) -> Vec<f64> {
        let clusters: Vec<usize> = selected.iter().copied().collect();
        let mut deaths: HashMap<usize, f64> = HashMap::new();
        for e in &self.edges {
            let max = deaths.entry(e.parent).or_insert(0.0);
            *max = max.max(e.lambda);
        }

        let mut probabilities = vec![0.0; self.n];
        for e in self.edges.iter().filter(|e| e.child < self.n) {
            let label = labels[e.child];
            if label == NOISE_LABEL {
                continue;
            }
            let Some(&cluster) = clusters.get(label as usize) else {
                continue;
            };
            let max_lambda = deaths.get(&cluster).copied().unwrap_or(0.0);
            probabilities[e.child] = if max_lambda == 0.0 {
                1.0
            } else {
                e.lambda.min(max_lambda) / max_lambda
            };
        }
        probabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use reactmap_types::DistanceMetric;

    fn points(rows: &[[f64; 2]]) -> FeatureMatrix {
        FeatureMatrix::from_shape_fn((rows.len(), 2), |(i, j)| rows[i][j])
    }

    fn same_label(labels: &[i32], idx: &[usize]) -> bool {
        idx.iter().all(|&i| labels[i] == labels[idx[0]] && labels[i] != NOISE_LABEL)
    }

    const TWO_BLOBS: [[f64; 2]; 6] = [
        [0.0, 0.0],
        [0.0, 0.1],
        [0.1, 0.0],
        [10.0, 10.0],
        [10.0, 10.1],
        [10.1, 10.0],
    ];

    #[test]
    fn test_validate_params() {
        let ok = DensityParams::default();
        assert!(validate_params(&ok).is_ok());

        let small = DensityParams { min_cluster_size: 1, ..ok.clone() };
        assert!(validate_params(&small).unwrap_err().is_config_error());

        let no_samples = DensityParams { min_samples: 0, ..ok.clone() };
        assert!(validate_params(&no_samples).unwrap_err().is_config_error());

        let negative = DensityParams { cluster_selection_epsilon: -0.5, ..ok.clone() };
        assert!(validate_params(&negative).unwrap_err().is_config_error());

        let nan = DensityParams { cluster_selection_epsilon: f64::NAN, ..ok };
        assert!(validate_params(&nan).unwrap_err().is_config_error());
    }

    #[test]
    fn test_two_blobs() {
        let fit = hdbscan(&points(&TWO_BLOBS), &DensityParams::default()).unwrap();
        assert!(same_label(&fit.labels, &[0, 1, 2]));
        assert!(same_label(&fit.labels, &[3, 4, 5]));
        assert_ne!(fit.labels[0], fit.labels[3]);
        let mut distinct = fit.labels.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct, vec![0, 1]);
        assert!(fit.probabilities.iter().all(|p| *p > 0.0 && *p <= 1.0));
    }

    #[test]
    fn test_outlier_is_noise() {
        let mut rows = TWO_BLOBS.to_vec();
        rows.push([50.0, -50.0]);
        let fit = hdbscan(&points(&rows), &DensityParams::default()).unwrap();
        assert_eq!(fit.labels[6], NOISE_LABEL);
        assert_eq!(fit.probabilities[6], 0.0);
        assert!(same_label(&fit.labels, &[0, 1, 2]));
        assert!(same_label(&fit.labels, &[3, 4, 5]));
    }

    #[test]
    fn test_fewer_points_than_min_cluster_size() {
        let params = DensityParams { min_cluster_size: 3, ..Default::default() };
        let fit = hdbscan(&points(&[[0.0, 0.0], [0.0, 1.0]]), &params).unwrap();
        assert_eq!(fit.labels, vec![NOISE_LABEL, NOISE_LABEL]);

        let fit = hdbscan(&points(&[[1.0, 1.0]]), &DensityParams::default()).unwrap();
        assert_eq!(fit.labels, vec![NOISE_LABEL]);

        let fit = hdbscan(&points(&[]), &DensityParams::default()).unwrap();
        assert!(fit.labels.is_empty());
    }

    #[test]
    fn test_root_is_never_selected() {
        // one tight group and nothing else: the only candidate cluster is the root
        let fit = hdbscan(
            &points(&[[0.0, 0.0], [0.0, 0.1], [0.1, 0.0]]),
            &DensityParams::default(),
        )
        .unwrap();
        assert!(fit.labels.iter().all(|&l| l == NOISE_LABEL));
    }

    #[test]
    fn test_identical_points() {
        let fit = hdbscan(
            &points(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]),
            &DensityParams::default(),
        )
        .unwrap();
        assert_eq!(fit.labels.len(), 4);
        assert!(fit.probabilities.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_epsilon_merges_close_clusters() {
        let rows = [
            [0.0, 0.0],
            [0.0, 0.1],
            [0.1, 0.0],
            [3.0, 0.0],
            [3.0, 0.1],
            [3.1, 0.0],
            [30.0, 0.0],
            [30.0, 0.1],
            [30.1, 0.0],
        ];
        let data = points(&rows);

        let fit = hdbscan(&data, &DensityParams::default()).unwrap();
        assert!(same_label(&fit.labels, &[0, 1, 2]));
        assert!(same_label(&fit.labels, &[3, 4, 5]));
        assert_ne!(fit.labels[0], fit.labels[3]);

        let params = DensityParams { cluster_selection_epsilon: 5.0, ..Default::default() };
        let fit = hdbscan(&data, &params).unwrap();
        assert!(same_label(&fit.labels, &[0, 1, 2, 3, 4, 5]));
        assert!(same_label(&fit.labels, &[6, 7, 8]));
        assert_ne!(fit.labels[0], fit.labels[6]);
    }

    #[test]
    fn test_min_samples_smooths_core_distance() {
        let d = array![[0.0, 1.0, 4.0], [1.0, 0.0, 2.0], [4.0, 2.0, 0.0]];
        assert_eq!(core_distances(&d, 1), vec![0.0, 0.0, 0.0]);
        assert_eq!(core_distances(&d, 2), vec![1.0, 1.0, 2.0]);
        // larger than the point count clamps to the farthest neighbour
        assert_eq!(core_distances(&d, 10), vec![4.0, 2.0, 4.0]);

        let mr = mutual_reachability(&d, &[1.0, 1.0, 2.0]);
        assert_eq!(mr[[0, 1]], 1.0);
        assert_eq!(mr[[1, 2]], 2.0);
        assert_eq!(mr[[0, 2]], 4.0);
        assert_eq!(mr, mr.t());
    }

    #[test]
    fn test_cosine_metric_groups_by_direction() {
        let rows = [
            [1.0, 0.0],
            [5.0, 0.1],
            [9.0, 0.0],
            [0.0, 1.0],
            [0.1, 6.0],
            [0.0, 9.0],
        ];
        let params = DensityParams { metric: DistanceMetric::Cosine, ..Default::default() };
        let fit = hdbscan(&points(&rows), &params).unwrap();
        assert!(same_label(&fit.labels, &[0, 1, 2]));
        assert!(same_label(&fit.labels, &[3, 4, 5]));
        assert_ne!(fit.labels[0], fit.labels[3]);
    }
}
