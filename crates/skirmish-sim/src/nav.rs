//! Navigation grid and A* pathfinding.
//!
//! A [`NavGrid`] is a square, uniform grid laid over the terrain around an
//! encounter area. Each cell stores whether it is walkable and its ground
//! height. The grid is built once from a [`GroundSampler`] and is read-only
//! afterwards, so any number of NPCs can query it concurrently.
//!
//! Paths are computed with A* over 8-connected cells and simplified by
//! dropping waypoints that lie on an (almost) straight line.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::world::GroundSampler;

/// Default cell edge length in world units.
pub const DEFAULT_CELL_SIZE: f32 = 2.0;

/// Default maximum height difference between adjacent walkable cells.
pub const DEFAULT_MAX_STEP_HEIGHT: f32 = 1.5;

/// Height stored for cells without a ground sample.
pub const NO_DATA_HEIGHT: f32 = f32::MIN;

const ORTHOGONAL_COST: f32 = 1.0;
const DIAGONAL_COST: f32 = 1.414;

/// Waypoints whose turn has a direction dot product at or above this are dropped.
const COLINEAR_DOT: f32 = 0.95;

static NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A single grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavCell {
    /// Whether an NPC can stand here
    pub walkable: bool,
    /// Ground height ([`NO_DATA_HEIGHT`] when unsampled)
    pub height: f32,
}

impl NavCell {
    const BLOCKED: Self = Self {
        walkable: false,
        height: NO_DATA_HEIGHT,
    };
}

/// Grid coordinates of a cell.
pub type CellCoord = (usize, usize);

/// Walkability and height grid over an area.
#[derive(Debug, Clone)]
pub struct NavGrid {
    origin: Vec3,
    width: usize,
    depth: usize,
    cell_size: f32,
    max_step_height: f32,
    cells: Vec<NavCell>,
    built: bool,
}

impl Default for NavGrid {
    fn default() -> Self {
        Self::empty()
    }
}

impl NavGrid {
    /// Creates an unbuilt grid. Pathfinding on it returns nothing and every
    /// position counts as walkable.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            origin: Vec3::ZERO,
            width: 0,
            depth: 0,
            cell_size: DEFAULT_CELL_SIZE,
            max_step_height: DEFAULT_MAX_STEP_HEIGHT,
            cells: Vec::new(),
            built: false,
        }
    }

    /// Builds a grid covering `radius` around `center`.
    ///
    /// Each cell centre is sampled at `center.z`; cells without ground are
    /// blocked. A post-pass blocks walkable cells that have no walkable
    /// neighbour within `max_step_height`.
    pub fn build<S>(sampler: &S, center: Vec3, radius: f32, cell_size: f32, max_step_height: f32) -> Self
    where
        S: GroundSampler + ?Sized,
    {
        if cell_size <= 0.0 || !cell_size.is_finite() {
            warn!("NavGrid build skipped: invalid cell size {}", cell_size);
            return Self::empty();
        }

        let half_cells = (radius.max(0.0) / cell_size) as usize;
        let size = half_cells * 2 + 1;
        let origin = Vec3::new(
            center.x - half_cells as f32 * cell_size,
            center.y - half_cells as f32 * cell_size,
            0.0,
        );

        let mut cells = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                let sample_at = Vec3::new(
                    origin.x + x as f32 * cell_size,
                    origin.y + y as f32 * cell_size,
                    center.z,
                );
                let cell = match sampler.sample_ground_height(sample_at) {
                    Some(height) => NavCell {
                        walkable: true,
                        height,
                    },
                    None => NavCell::BLOCKED,
                };
                cells.push(cell);
            }
        }

        let mut grid = Self {
            origin,
            width: size,
            depth: size,
            cell_size,
            max_step_height,
            cells,
            built: false,
        };
        grid.remove_isolated_cells();
        grid.built = true;

        info!(
            "NavGrid built: {}x{} cells, {} walkable, center=({:.1}, {:.1}, {:.1})",
            grid.width,
            grid.depth,
            grid.walkable_count(),
            center.x,
            center.y,
            center.z
        );
        grid
    }

    /// Blocks walkable cells that cannot step onto any neighbour.
    fn remove_isolated_cells(&mut self) {
        let isolated: Vec<usize> = (0..self.depth)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let cell = self.cells[self.index(x, y)];
                cell.walkable
                    && !self
                        .neighbors(x, y)
                        .any(|n| self.step_allowed(cell.height, self.cells[self.index(n.0, n.1)]))
            })
            .map(|(x, y)| self.index(x, y))
            .collect();

        for idx in isolated {
            self.cells[idx].walkable = false;
        }
    }

    /// Whether the grid has finished building.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Cell edge length.
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Grid dimensions in cells (width, depth).
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.depth)
    }

    /// Number of walkable cells.
    #[must_use]
    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|c| c.walkable).count()
    }

    /// Cell at grid coordinates, if in bounds.
    #[must_use]
    pub fn cell(&self, x: usize, y: usize) -> Option<NavCell> {
        (x < self.width && y < self.depth).then(|| self.cells[self.index(x, y)])
    }

    /// Whether a world position stands on a walkable cell.
    ///
    /// Always true while the grid is not built.
    #[must_use]
    pub fn is_walkable(&self, position: Vec3) -> bool {
        if !self.built {
            return true;
        }
        self.in_bounds(self.world_to_cell(position))
            .is_some_and(|(x, y)| self.cells[self.index(x, y)].walkable)
    }

    /// World position of the walkable cell nearest to `position`.
    #[must_use]
    pub fn nearest_walkable(&self, position: Vec3) -> Option<Vec3> {
        if !self.built {
            return None;
        }
        self.resolve_endpoint(self.world_to_cell(position))
            .map(|(x, y)| self.cell_to_world(x, y))
    }

    /// World-space path from `start` to `goal`, simplified.
    ///
    /// Empty when the grid is not built, an endpoint has no walkable cell
    /// nearby, or no route exists.
    #[must_use]
    pub fn find_path(&self, start: Vec3, goal: Vec3) -> Vec<Vec3> {
        let cells = self.find_cell_path(start, goal);
        if cells.is_empty() {
            return Vec::new();
        }
        let points: Vec<Vec3> = cells.iter().map(|&(x, y)| self.cell_to_world(x, y)).collect();
        simplify_path(&points)
    }

    /// Raw 8-connected cell path from `start` to `goal`, unsimplified.
    #[must_use]
    pub fn find_cell_path(&self, start: Vec3, goal: Vec3) -> Vec<CellCoord> {
        if !self.built {
            return Vec::new();
        }

        let Some(start_cell) = self.resolve_endpoint(self.world_to_cell(start)) else {
            return Vec::new();
        };
        let Some(goal_cell) = self.resolve_endpoint(self.world_to_cell(goal)) else {
            return Vec::new();
        };

        if start_cell == goal_cell {
            return vec![goal_cell];
        }

        self.a_star(start_cell, goal_cell)
    }

    fn a_star(&self, start: CellCoord, goal: CellCoord) -> Vec<CellCoord> {
        let max_iterations = self.width * self.depth;
        let start_idx = self.index(start.0, start.1);
        let goal_idx = self.index(goal.0, goal.1);

        let mut open = BinaryHeap::new();
        let mut came_from: AHashMap<usize, usize> = AHashMap::new();
        let mut g_score: AHashMap<usize, f32> = AHashMap::new();
        let mut closed: AHashSet<usize> = AHashSet::new();

        g_score.insert(start_idx, 0.0);
        open.push(OpenNode {
            f_score: octile(start, goal),
            index: start_idx,
        });

        let mut iterations = 0;
        while let Some(OpenNode { index: current, .. }) = open.pop() {
            iterations += 1;
            if iterations > max_iterations {
                debug!("A* gave up after {} iterations", max_iterations);
                return Vec::new();
            }

            if current == goal_idx {
                return self.reconstruct(&came_from, current);
            }
            if !closed.insert(current) {
                continue;
            }

            let (cx, cy) = self.coord(current);
            let current_height = self.cells[current].height;
            let current_g = g_score.get(&current).copied().unwrap_or(f32::INFINITY);

            for (nx, ny) in self.neighbors(cx, cy) {
                let n_idx = self.index(nx, ny);
                if closed.contains(&n_idx) || !self.step_allowed(current_height, self.cells[n_idx]) {
                    continue;
                }

                let step = if nx != cx && ny != cy {
                    DIAGONAL_COST
                } else {
                    ORTHOGONAL_COST
                };
                let tentative = current_g + step;
                if tentative < g_score.get(&n_idx).copied().unwrap_or(f32::INFINITY) {
                    came_from.insert(n_idx, current);
                    g_score.insert(n_idx, tentative);
                    open.push(OpenNode {
                        f_score: tentative + octile((nx, ny), goal),
                        index: n_idx,
                    });
                }
            }
        }

        Vec::new()
    }

    fn reconstruct(&self, came_from: &AHashMap<usize, usize>, mut current: usize) -> Vec<CellCoord> {
        let mut path = vec![self.coord(current)];
        while let Some(&prev) = came_from.get(&current) {
            current = prev;
            path.push(self.coord(current));
        }
        path.reverse();
        path
    }

    /// Maps a start/goal cell to a walkable in-bounds cell.
    fn resolve_endpoint(&self, cell: (i64, i64)) -> Option<CellCoord> {
        match self.in_bounds(cell) {
            Some((x, y)) if self.cells[self.index(x, y)].walkable => Some((x, y)),
            _ => self.nearest_walkable_cell(cell),
        }
    }

    /// Ring search around `center`, perimeter cells only.
    fn nearest_walkable_cell(&self, center: (i64, i64)) -> Option<CellCoord> {
        let max_radius = (self.width.max(self.depth) / 2) as i64;
        for r in 1..=max_radius {
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx.abs() != r && dy.abs() != r {
                        continue;
                    }
                    if let Some((x, y)) = self.in_bounds((center.0 + dx, center.1 + dy)) {
                        if self.cells[self.index(x, y)].walkable {
                            return Some((x, y));
                        }
                    }
                }
            }
        }
        None
    }

    /// World position of a cell; unwalkable cells report height 0.
    #[must_use]
    pub fn cell_to_world(&self, x: usize, y: usize) -> Vec3 {
        let cell = self.cells[self.index(x, y)];
        Vec3::new(
            self.origin.x + x as f32 * self.cell_size,
            self.origin.y + y as f32 * self.cell_size,
            if cell.walkable { cell.height } else { 0.0 },
        )
    }

    fn world_to_cell(&self, position: Vec3) -> (i64, i64) {
        let fx = ((position.x - self.origin.x) / self.cell_size + 0.5).floor();
        let fy = ((position.y - self.origin.y) / self.cell_size + 0.5).floor();
        (fx as i64, fy as i64)
    }

    fn in_bounds(&self, (x, y): (i64, i64)) -> Option<CellCoord> {
        (x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.depth)
            .then_some((x as usize, y as usize))
    }

    fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = CellCoord> + '_ {
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(move |&(dx, dy)| self.in_bounds((x as i64 + i64::from(dx), y as i64 + i64::from(dy))))
    }

    fn step_allowed(&self, from_height: f32, to: NavCell) -> bool {
        to.walkable && (to.height - from_height).abs() <= self.max_step_height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    fn coord(&self, index: usize) -> CellCoord {
        (index % self.width, index / self.width)
    }
}

/// Min-heap entry for the A* open set.
#[derive(Debug, Clone, Copy)]
struct OpenNode {
    f_score: f32,
    index: usize,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn octile(a: CellCoord, b: CellCoord) -> f32 {
    let dx = a.0.abs_diff(b.0) as f32;
    let dy = a.1.abs_diff(b.1) as f32;
    dx.max(dy) + (DIAGONAL_COST - 1.0) * dx.min(dy)
}

/// Drops intermediate waypoints that do not change direction.
fn simplify_path(points: &[Vec3]) -> Vec<Vec3> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut simplified = vec![points[0]];
    for i in 1..points.len() - 1 {
        let last = simplified[simplified.len() - 1];
        let incoming = (points[i] - last).normalize_or_zero();
        let outgoing = (points[i + 1] - points[i]).normalize_or_zero();
        if incoming.dot(outgoing) < COLINEAR_DOT {
            simplified.push(points[i]);
        }
    }
    simplified.push(points[points.len() - 1]);
    simplified
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flat(_: Vec3) -> Option<f32> {
        Some(0.0)
    }

    /// 5x5 grid with cell (0,0) at world (0,0).
    fn five_by_five<S: GroundSampler>(sampler: &S) -> NavGrid {
        NavGrid::build(sampler, Vec3::new(4.0, 4.0, 0.0), 4.0, 2.0, 1.5)
    }

    #[test]
    fn test_build_dimensions() {
        let grid = five_by_five(&flat);
        assert!(grid.is_built());
        assert_eq!(grid.dimensions(), (5, 5));
        assert_eq!(grid.walkable_count(), 25);
        assert_eq!(grid.cell_to_world(0, 0), Vec3::ZERO);
        assert_eq!(grid.cell_to_world(4, 4), Vec3::new(8.0, 8.0, 0.0));
    }

    #[test]
    fn test_unbuilt_grid() {
        let grid = NavGrid::empty();
        assert!(!grid.is_built());
        assert!(grid.is_walkable(Vec3::new(1000.0, 0.0, 0.0)));
        assert!(grid.find_path(Vec3::ZERO, Vec3::ONE).is_empty());
        assert!(grid.nearest_walkable(Vec3::ZERO).is_none());
    }

    #[test]
    fn test_diagonal_path_is_eight_connected() {
        let grid = five_by_five(&flat);
        let cells = grid.find_cell_path(Vec3::ZERO, Vec3::new(8.0, 8.0, 0.0));
        assert_eq!(cells.first(), Some(&(0, 0)));
        assert_eq!(cells.last(), Some(&(4, 4)));
        for pair in cells.windows(2) {
            assert!(pair[0].0.abs_diff(pair[1].0) <= 1);
            assert!(pair[0].1.abs_diff(pair[1].1) <= 1);
        }
    }

    #[test]
    fn test_straight_diagonal_collapses_to_endpoints() {
        let grid = five_by_five(&flat);
        let path = grid.find_path(Vec3::ZERO, Vec3::new(8.0, 8.0, 0.0));
        assert_eq!(path, vec![Vec3::ZERO, Vec3::new(8.0, 8.0, 0.0)]);
    }

    #[test]
    fn test_same_cell_returns_single_waypoint() {
        let grid = five_by_five(&flat);
        let path = grid.find_path(Vec3::new(4.2, 3.9, 0.0), Vec3::new(3.8, 4.4, 0.0));
        assert_eq!(path, vec![Vec3::new(4.0, 4.0, 0.0)]);
    }

    #[test]
    fn test_wall_blocks_path() {
        // A full-height cliff across x = 4 splits the grid.
        let cliff = |p: Vec3| Some(if (p.x - 4.0).abs() < 0.5 { 10.0 } else { 0.0 });
        let grid = five_by_five(&cliff);
        let path = grid.find_path(Vec3::ZERO, Vec3::new(8.0, 8.0, 0.0));
        assert!(path.is_empty());
    }

    #[test]
    fn test_path_turns_around_gap() {
        // Column x = 4 has no ground except at the top row.
        let gap = |p: Vec3| (p.x != 4.0 || p.y == 8.0).then_some(0.0);
        let grid = five_by_five(&gap);
        let path = grid.find_path(Vec3::ZERO, Vec3::new(8.0, 0.0, 0.0));
        assert!(path.len() > 2);
        assert!(path.iter().any(|p| p.x == 4.0 && p.y == 8.0));
        assert_eq!(path.last(), Some(&Vec3::new(8.0, 0.0, 0.0)));
    }

    #[test]
    fn test_isolated_pillar_removed() {
        let pillar = |p: Vec3| Some(if p.x == 4.0 && p.y == 4.0 { 5.0 } else { 0.0 });
        let grid = five_by_five(&pillar);
        assert!(!grid.is_walkable(Vec3::new(4.0, 4.0, 0.0)));
        assert_eq!(grid.walkable_count(), 24);
    }

    #[test]
    fn test_unsampled_cells_are_blocked() {
        let grid = five_by_five(&|p: Vec3| (p.x < 5.0).then_some(0.0));
        assert!(grid.is_walkable(Vec3::new(2.0, 2.0, 0.0)));
        assert!(!grid.is_walkable(Vec3::new(6.0, 2.0, 0.0)));
        assert_eq!(grid.cell(3, 0).map(|c| c.height), Some(NO_DATA_HEIGHT));
    }

    #[test]
    fn test_out_of_bounds_endpoint_snaps() {
        let grid = five_by_five(&flat);
        assert!(!grid.is_walkable(Vec3::new(-2.0, 0.0, 0.0)));
        assert_eq!(grid.nearest_walkable(Vec3::new(-2.0, 0.0, 0.0)), Some(Vec3::ZERO));

        let path = grid.find_path(Vec3::new(-2.0, 0.0, 0.0), Vec3::new(8.0, 0.0, 0.0));
        assert_eq!(path.first(), Some(&Vec3::ZERO));
        assert_eq!(path.last(), Some(&Vec3::new(8.0, 0.0, 0.0)));
    }

    #[test]
    fn test_far_endpoint_without_walkable_ring() {
        let grid = five_by_five(&flat);
        assert!(grid.find_path(Vec3::ZERO, Vec3::new(500.0, 500.0, 0.0)).is_empty());
    }

    #[test]
    fn test_step_height_limits_neighbors() {
        // Terrace rising 1 unit per column: every step is within 1.5.
        let terrace = |p: Vec3| Some(p.x / 2.0);
        let grid = five_by_five(&terrace);
        let path = grid.find_path(Vec3::ZERO, Vec3::new(8.0, 0.0, 0.0));
        assert_eq!(path.last().map(|p| p.z), Some(4.0));

        // Rising 2 units per column: no neighbour is reachable sideways.
        let steep = |p: Vec3| Some(p.x);
        let grid = five_by_five(&steep);
        assert!(grid.find_path(Vec3::ZERO, Vec3::new(8.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_invalid_cell_size() {
        let grid = NavGrid::build(&flat, Vec3::ZERO, 10.0, 0.0, 1.5);
        assert!(!grid.is_built());
    }

    #[test]
    fn test_simplify_keeps_turns() {
        let points = [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
        ];
        assert_eq!(
            simplify_path(&points),
            vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 0.0)]
        );
    }

    proptest! {
        #[test]
        fn prop_raw_paths_are_eight_connected(
            blocked in proptest::collection::vec(any::<bool>(), 81),
            sx in 0usize..9, sy in 0usize..9, gx in 0usize..9, gy in 0usize..9,
        ) {
            let sampler = move |p: Vec3| {
                let (x, y) = ((p.x / 2.0) as usize, (p.y / 2.0) as usize);
                (!blocked[y * 9 + x]).then_some(0.0)
            };
            let grid = NavGrid::build(&sampler, Vec3::new(8.0, 8.0, 0.0), 8.0, 2.0, 1.5);
            let start = Vec3::new(sx as f32 * 2.0, sy as f32 * 2.0, 0.0);
            let goal = Vec3::new(gx as f32 * 2.0, gy as f32 * 2.0, 0.0);
            let cells = grid.find_cell_path(start, goal);
            for pair in cells.windows(2) {
                prop_assert!(pair[0].0.abs_diff(pair[1].0) <= 1);
                prop_assert!(pair[0].1.abs_diff(pair[1].1) <= 1);
                prop_assert!(grid.cell(pair[1].0, pair[1].1).is_some_and(|c| c.walkable));
            }
        }
    }
}
