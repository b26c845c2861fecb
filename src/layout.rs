//! Force-directed placement.
//!
//! Fruchterman-Reingold spring embedding: every pair of nodes repels with
//! `k² / d`, every edge pulls its endpoints together with `w · d² / k`, and
//! the step size cools linearly from a tenth of the initial spread to zero.
//! Iteration stops at the cap or once the mean displacement drops under the
//! threshold. The result is centered on the origin and scaled so that the
//! largest coordinate magnitude equals [`LayoutConfig::scale`].
//!
//! Initial positions are drawn from a seeded RNG, so a given graph and seed
//! always produce the same layout. Disconnected components share the same
//! coordinate space, repulsion keeps them apart.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::graph::VisGraph;

/// Distances are clamped to this to keep coincident nodes from exploding.
const MIN_DISTANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub iterations: usize,
    pub threshold: f64,
    pub scale: f64,
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            threshold: 1e-4,
            scale: 1.0,
            seed: crate::DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Node positions, indexed like the graph they were computed for.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    positions: Vec<Point>,
}

impl Layout {
    pub fn get(&self, index: NodeIndex) -> Option<Point> {
        self.positions.get(index.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        self.positions.iter().copied()
    }
}

pub fn spring_layout(graph: &VisGraph, config: &LayoutConfig) -> Layout {
    let n = graph.node_count();

    match n {
        0 => return Layout::default(),
        1 => {
            return Layout {
                positions: vec![Point::ORIGIN],
            };
        }
        _ => {}
    }

    let adjacency = weighted_adjacency(graph);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut positions: Vec<Point> = (0..n)
        .map(|_| Point {
            x: rng.gen_range(0.0..1.0),
            y: rng.gen_range(0.0..1.0),
        })
        .collect();

    let k = (1.0 / n as f64).sqrt();
    let mut temperature = spread(&positions) * 0.1;
    let cooling = temperature / (config.iterations as f64 + 1.0);

    let span = tracing::span!(Level::INFO, "layout", nodes = n);
    span.pb_set_length(config.iterations as u64);
    if let Ok(style) = crate::utils::get_style_bar() {
        span.pb_set_style(&style);
    }
    span.pb_set_message("Computing layout...");
    let _enter = span.enter();

    let mut performed = 0;
    for _ in 0..config.iterations {
        let forces: Vec<Point> = (0..n)
            .into_par_iter()
            .map(|i| displacement(i, &positions, &adjacency[i], k))
            .collect();

        let mut error = 0.0_f64;
        for (position, disp) in positions.iter_mut().zip(forces) {
            if !(disp.x.is_finite() && disp.y.is_finite()) {
                continue;
            }
            let length = disp.norm().max(MIN_DISTANCE);
            let step = Point {
                x: disp.x * temperature / length,
                y: disp.y * temperature / length,
            };
            position.x += step.x;
            position.y += step.y;
            error += step.x * step.x + step.y * step.y;
        }

        temperature -= cooling;
        performed += 1;
        span.pb_inc(1);

        if error.sqrt() / (n as f64) < config.threshold {
            break;
        }
    }

    tracing::debug!(iterations = performed, "layout converged");

    rescale(&mut positions, config.scale);
    Layout { positions }
}

/// Net force on node `i`: repulsion from every other node plus attraction
/// along each of its edges.
fn displacement(i: usize, positions: &[Point], neighbors: &[(usize, f64)], k: f64) -> Point {
    let p = positions[i];
    let k2 = k * k;
    let mut force = Point::ORIGIN;

    for (j, q) in positions.iter().enumerate() {
        if i == j {
            continue;
        }
        let (dx, dy) = (p.x - q.x, p.y - q.y);
        let d = dx.hypot(dy).max(MIN_DISTANCE);
        let repulsion = k2 / (d * d);
        force.x += dx * repulsion;
        force.y += dy * repulsion;
    }

    for &(j, weight) in neighbors {
        let q = positions[j];
        let (dx, dy) = (p.x - q.x, p.y - q.y);
        let d = dx.hypot(dy).max(MIN_DISTANCE);
        let attraction = weight * d / k;
        force.x -= dx * attraction;
        force.y -= dy * attraction;
    }

    force
}

/// Symmetric weight lists. Parallel edges add up, self loops are dropped
/// since they exert no force.
fn weighted_adjacency(graph: &VisGraph) -> Vec<Vec<(usize, f64)>> {
    let n = graph.node_count();
    let mut weights: Vec<HashMap<usize, f64>> = vec![HashMap::new(); n];

    for edge in graph.graph.edge_references() {
        let (a, b) = (edge.source().index(), edge.target().index());
        if a == b {
            continue;
        }
        *weights[a].entry(b).or_default() += edge.weight().weight;
        *weights[b].entry(a).or_default() += edge.weight().weight;
    }

    // Relative attraction is what matters, scaling by the heaviest pair keeps
    // huge weights from overflowing the force sums.
    let heaviest = weights
        .iter()
        .flat_map(|w| w.values())
        .map(|w| w.abs())
        .filter(|w| w.is_finite())
        .fold(0.0_f64, f64::max);

    weights
        .into_iter()
        .map(|w| {
            let mut list: Vec<_> = w
                .into_iter()
                .map(|(j, weight)| (j, normalize(weight, heaviest)))
                .collect();
            list.sort_by_key(|&(j, _)| j);
            list
        })
        .collect()
}

/// Maps a summed weight into `[-1, 1]`. Sums that overflowed count as the
/// heaviest possible pull in their direction.
fn normalize(weight: f64, heaviest: f64) -> f64 {
    if !weight.is_finite() {
        return weight.signum();
    }
    if heaviest > 0.0 { weight / heaviest } else { 0.0 }
}

fn spread(positions: &[Point]) -> f64 {
    let (mut min, mut max) = (
        Point {
            x: f64::INFINITY,
            y: f64::INFINITY,
        },
        Point {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        },
    );

    for p in positions {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }

    (max.x - min.x).max(max.y - min.y)
}

fn rescale(positions: &mut [Point], scale: f64) {
    let n = positions.len() as f64;
    let center = Point {
        x: positions.iter().map(|p| p.x).sum::<f64>() / n,
        y: positions.iter().map(|p| p.y).sum::<f64>() / n,
    };

    let mut limit: f64 = 0.0;
    for p in positions.iter_mut() {
        p.x -= center.x;
        p.y -= center.y;
        limit = limit.max(p.x.abs()).max(p.y.abs());
    }

    if limit > 0.0 {
        for p in positions.iter_mut() {
            p.x *= scale / limit;
            p.y *= scale / limit;
        }
    }
}
