//! Mesh metrics derived from a raw mask.
//!
//! When the service only returns the segmentation mask, the numbers shown
//! next to it are computed locally:
//!
//! - **density**: share of mesh pixels after smoothing and binarization, in percent
//! - **branch points**: junctions of the thinned mesh, merged within a small radius
//! - **uniformity**: how evenly mesh is spread over a grid of tiles (0.0-1.0)

use std::collections::HashMap;

use crate::config::MetricsConfig;
use crate::mask::MaskMatrix;

/// Metrics for one mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskMetrics {
    /// Mesh pixels over all pixels, percent, two decimals.
    pub density_percent: f64,
    /// Number of distinct branch points on the mesh skeleton.
    pub branch_points: u32,
    /// 1 minus the coefficient of variation of per-tile density, clamped to 0..=1.
    pub uniformity: f64,
}

/// Compute all metrics for a mask.
pub fn measure(mask: &MaskMatrix, config: &MetricsConfig) -> MaskMetrics {
    let binary = binarize(mask, config);
    let skeleton = thin(binary.clone());

    let metrics = MaskMetrics {
        density_percent: round_to(binary.density() * 100.0, 2),
        branch_points: count_branch_points(&skeleton, config.branch_cluster_radius),
        uniformity: uniformity(&binary, config.uniformity_tiles),
    };

    log::debug!(
        "Mask metrics for {}x{}: density {:.2}%, {} branch points, uniformity {:.3}",
        mask.width(),
        mask.height(),
        metrics.density_percent,
        metrics.branch_points,
        metrics.uniformity
    );

    metrics
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BinaryGrid {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl BinaryGrid {
    fn is_set(&self, x: isize, y: isize) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.cells[y as usize * self.width + x as usize]
    }

    fn density(&self) -> f64 {
        let on = self.cells.iter().filter(|&&c| c).count();
        on as f64 / self.cells.len() as f64
    }

    /// Clockwise 8-neighbourhood starting north: P2..P9 in Zhang-Suen notation.
    fn neighbours(&self, x: usize, y: usize) -> [bool; 8] {
        let (x, y) = (x as isize, y as isize);
        [
            self.is_set(x, y - 1),
            self.is_set(x + 1, y - 1),
            self.is_set(x + 1, y),
            self.is_set(x + 1, y + 1),
            self.is_set(x, y + 1),
            self.is_set(x - 1, y + 1),
            self.is_set(x - 1, y),
            self.is_set(x - 1, y - 1),
        ]
    }
}

fn binarize(mask: &MaskMatrix, config: &MetricsConfig) -> BinaryGrid {
    let smoothed = box_blur(mask, config.blur_radius);
    BinaryGrid {
        width: mask.width(),
        height: mask.height(),
        cells: smoothed
            .iter()
            .map(|&v| v > config.binarize_threshold)
            .collect(),
    }
}

/// Mean filter over a (2r+1)² window; edge windows average only in-bounds pixels.
fn box_blur(mask: &MaskMatrix, radius: usize) -> Vec<u8> {
    if radius == 0 {
        return mask.values().to_vec();
    }

    let (w, h) = (mask.width(), mask.height());
    let stride = w + 1;
    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += u64::from(mask.values()[y * w + x]);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as u64;
            out.push((sum / count) as u8);
        }
    }
    out
}

/// Zhang-Suen thinning down to a one pixel wide skeleton.
fn thin(mut grid: BinaryGrid) -> BinaryGrid {
    loop {
        let mut changed = false;

        for pass in 0..2 {
            let mut to_clear = Vec::new();

            for y in 0..grid.height {
                for x in 0..grid.width {
                    if !grid.cells[y * grid.width + x] {
                        continue;
                    }

                    let n = grid.neighbours(x, y);
                    let set = n.iter().filter(|&&p| p).count();
                    if !(2..=6).contains(&set) {
                        continue;
                    }

                    let transitions = (0..8).filter(|&i| !n[i] && n[(i + 1) % 8]).count();
                    if transitions != 1 {
                        continue;
                    }

                    let [p2, _, p4, _, p6, _, p8, _] = n;
                    let removable = if pass == 0 {
                        !(p4 && p6 && (p2 || p8))
                    } else {
                        !(p2 && p8 && (p4 || p6))
                    };
                    if removable {
                        to_clear.push(y * grid.width + x);
                    }
                }
            }

            changed |= !to_clear.is_empty();
            for idx in to_clear {
                grid.cells[idx] = false;
            }
        }

        if !changed {
            return grid;
        }
    }
}

/// Skeleton pixels with three or more skeleton neighbours, merged when within `radius`.
fn count_branch_points(skeleton: &BinaryGrid, radius: f64) -> u32 {
    let mut junctions = Vec::new();
    for y in 0..skeleton.height {
        for x in 0..skeleton.width {
            if !skeleton.cells[y * skeleton.width + x] {
                continue;
            }
            let degree = skeleton.neighbours(x, y).iter().filter(|&&p| p).count();
            if degree >= 3 {
                junctions.push((x, y));
            }
        }
    }

    cluster_count(&junctions, radius) as u32
}

/// Number of groups left after joining every pair of points at most `radius` apart.
///
/// Points are bucketed into square cells at least `radius` wide, so only the
/// 3x3 block of cells around a point can hold a neighbour.
fn cluster_count(points: &[(usize, usize)], radius: f64) -> usize {
    if points.is_empty() {
        return 0;
    }

    let radius_sq = radius * radius;
    let cell = radius.abs().ceil().max(1.0);
    let bucket = |(x, y): (usize, usize)| ((x as f64 / cell) as i64, (y as f64 / cell) as i64);

    let mut clusters = DisjointSet::new(points.len());
    let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

    for (i, &point) in points.iter().enumerate() {
        let (bx, by) = bucket(point);
        for ny in by.saturating_sub(1)..=by.saturating_add(1) {
            for nx in bx.saturating_sub(1)..=bx.saturating_add(1) {
                let Some(members) = buckets.get(&(nx, ny)) else {
                    continue;
                };
                for &j in members {
                    let dx = point.0 as f64 - points[j].0 as f64;
                    let dy = point.1 as f64 - points[j].1 as f64;
                    if dx * dx + dy * dy <= radius_sq {
                        clusters.union(i, j);
                    }
                }
            }
        }
        buckets.entry((bx, by)).or_default().push(i);
    }

    clusters.count()
}

fn uniformity(grid: &BinaryGrid, tiles: usize) -> f64 {
    let tiles = tiles.max(1);
    let mut densities = Vec::with_capacity(tiles * tiles);

    for ty in 0..tiles {
        let (y0, y1) = (ty * grid.height / tiles, (ty + 1) * grid.height / tiles);
        for tx in 0..tiles {
            let (x0, x1) = (tx * grid.width / tiles, (tx + 1) * grid.width / tiles);
            if y1 == y0 || x1 == x0 {
                continue;
            }

            let mut on = 0usize;
            for y in y0..y1 {
                on += grid.cells[y * grid.width + x0..y * grid.width + x1]
                    .iter()
                    .filter(|&&c| c)
                    .count();
            }
            densities.push(on as f64 / ((y1 - y0) * (x1 - x0)) as f64);
        }
    }

    if densities.is_empty() {
        return 0.0;
    }

    let mean = densities.iter().sum::<f64>() / densities.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let variance =
        densities.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / densities.len() as f64;
    round_to((1.0 - variance.sqrt() / mean).clamp(0.0, 1.0), 3)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }

    fn count(&mut self) -> usize {
        (0..self.parent.len()).filter(|&i| self.find(i) == i).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Pairwise reference for `cluster_count`.
    fn cluster_count_pairwise(points: &[(usize, usize)], radius: f64) -> usize {
        let mut clusters = DisjointSet::new(points.len());
        for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate().skip(i + 1) {
                let dx = a.0 as f64 - b.0 as f64;
                let dy = a.1 as f64 - b.1 as f64;
                if dx * dx + dy * dy <= radius * radius {
                    clusters.union(i, j);
                }
            }
        }
        clusters.count()
    }

    fn blank(width: usize, height: usize) -> Vec<Vec<u8>> {
        vec![vec![0; width]; height]
    }

    fn draw_cross(rows: &mut [Vec<u8>], cx: usize, cy: usize, arm: usize) {
        rows[cy][cx - arm..=cx + arm].fill(255);
        for row in rows.iter_mut().take(cy + arm + 1).skip(cy - arm) {
            row[cx] = 255;
        }
    }

    #[test]
    fn test_empty_mask() {
        let mask = MaskMatrix::from_rows(&blank(8, 8)).unwrap();
        let metrics = measure(&mask, &MetricsConfig::default());
        assert_eq!(metrics.density_percent, 0.0);
        assert_eq!(metrics.branch_points, 0);
        assert_eq!(metrics.uniformity, 0.0);
    }

    #[test]
    fn test_full_mask_is_dense_and_uniform() {
        let mask = MaskMatrix::from_rows(&vec![vec![255u8; 12]; 12]).unwrap();
        let metrics = measure(&mask, &MetricsConfig::unblurred());
        assert_eq!(metrics.density_percent, 100.0);
        assert_eq!(metrics.uniformity, 1.0);
    }

    #[test]
    fn test_half_mask_density() {
        let rows: Vec<Vec<u8>> = (0..8)
            .map(|_| (0..8).map(|x| if x < 4 { 255 } else { 0 }).collect())
            .collect();
        let mask = MaskMatrix::from_rows(&rows).unwrap();
        let metrics = measure(&mask, &MetricsConfig::unblurred());
        assert_eq!(metrics.density_percent, 50.0);
        assert!(metrics.uniformity < 1.0);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mask = MaskMatrix::from_rows(&[[100u8, 101]]).unwrap();
        let metrics = measure(&mask, &MetricsConfig::unblurred());
        assert_eq!(metrics.density_percent, 50.0);
    }

    #[test]
    fn test_single_cross_is_one_branch_point() {
        let mut rows = blank(11, 11);
        draw_cross(&mut rows, 5, 5, 4);
        let mask = MaskMatrix::from_rows(&rows).unwrap();
        let metrics = measure(&mask, &MetricsConfig::unblurred());
        assert_eq!(metrics.branch_points, 1);
    }

    #[test]
    fn test_separate_crosses_are_counted_separately() {
        let mut rows = blank(26, 11);
        draw_cross(&mut rows, 5, 5, 4);
        draw_cross(&mut rows, 20, 5, 4);
        let mask = MaskMatrix::from_rows(&rows).unwrap();
        let metrics = measure(&mask, &MetricsConfig::unblurred());
        assert_eq!(metrics.branch_points, 2);
    }

    #[test]
    fn test_straight_line_has_no_branches() {
        let mut rows = blank(10, 3);
        rows[1] = vec![255; 10];
        let mask = MaskMatrix::from_rows(&rows).unwrap();
        let metrics = measure(&mask, &MetricsConfig::unblurred());
        assert_eq!(metrics.branch_points, 0);
    }

    #[test]
    fn test_box_blur_averages_window() {
        let mask = MaskMatrix::from_rows(&[[0u8, 90, 0]]).unwrap();
        assert_eq!(box_blur(&mask, 1), vec![45, 30, 45]);
        assert_eq!(box_blur(&mask, 0), vec![0, 90, 0]);
    }

    #[test]
    fn test_cluster_count_merges_chains() {
        // 0-1-2 chain within reach of each other, 3 on its own
        let points = [(0, 0), (3, 0), (6, 1), (40, 40)];
        assert_eq!(cluster_count(&points, 3.2), 2);
        assert_eq!(cluster_count(&points, 2.0), 4);
        assert_eq!(cluster_count(&[], 3.0), 0);
    }

    #[test]
    fn test_cluster_count_on_dense_junction_field() {
        // a 200x200 lattice of junctions 2 px apart collapses into one cluster
        let points: Vec<(usize, usize)> = (0..200)
            .flat_map(|y| (0..200).map(move |x| (x * 2, y * 2)))
            .collect();
        assert_eq!(cluster_count(&points, 2.0), 1);
        assert_eq!(cluster_count(&points, 1.5), points.len());
    }

    proptest! {
        #[test]
        fn prop_cluster_count_matches_pairwise(
            points in proptest::collection::vec((0usize..60, 0usize..60), 0..80),
            radius in 0.0f64..12.0,
        ) {
            prop_assert_eq!(
                cluster_count(&points, radius),
                cluster_count_pairwise(&points, radius)
            );
        }
    }
}
