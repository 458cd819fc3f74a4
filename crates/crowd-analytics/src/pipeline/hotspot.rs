//! Density hotspots from the final detection list.

use super::geometry::distance;
use crate::options::PipelineTuning;
use common::crowd::{Detection, Hotspot};

const BASE_RADIUS: f32 = 0.08;
const RADIUS_GAIN: f32 = 0.15;
const BASE_INTENSITY: f32 = 0.4;
const INTENSITY_GAIN: f32 = 0.6;
/// Share of the crowd at which a cluster's radius and intensity saturate
const SATURATION_SHARE: f32 = 0.3;

/// Running weighted centroid of the centers assigned so far
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClusterAccumulator {
    x: f32,
    y: f32,
    count: usize,
}

impl ClusterAccumulator {
    fn seed((x, y): (f32, f32)) -> Self {
        Self { x, y, count: 1 }
    }

    fn center(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    fn absorb(&mut self, other: ClusterAccumulator) {
        let total = (self.count + other.count) as f32;
        self.x = (self.x * self.count as f32 + other.x * other.count as f32) / total;
        self.y = (self.y * self.count as f32 + other.y * other.count as f32) / total;
        self.count += other.count;
    }

    fn into_hotspot(self, total_people: usize) -> Hotspot {
        let weight = (self.count as f32 / (total_people as f32 * SATURATION_SHARE)).min(1.0);
        Hotspot {
            x: self.x,
            y: self.y,
            radius: BASE_RADIUS + weight * RADIUS_GAIN,
            intensity: BASE_INTENSITY + weight * INTENSITY_GAIN,
        }
    }
}

/// Cluster box centers into hotspots.
///
/// Each center joins the nearest cluster closer than the cluster radius or
/// starts a new one. Clusters whose centroids end up within the merge
/// distance are then combined until none remain that close.
pub fn cluster_hotspots(people: &[Detection], tuning: &PipelineTuning) -> Vec<Hotspot> {
    if people.is_empty() {
        return Vec::new();
    }

    let mut clusters: Vec<ClusterAccumulator> = Vec::new();
    for person in people {
        let center = person.bounding_box.center();
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(idx, c)| (idx, distance(c.center(), center)))
            .filter(|(_, d)| *d < tuning.cluster_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((idx, _)) => clusters[idx].absorb(ClusterAccumulator::seed(center)),
            None => clusters.push(ClusterAccumulator::seed(center)),
        }
    }

    let merge_distance = tuning.cluster_radius * tuning.cluster_merge_factor;
    while let Some((i, j)) = find_close_pair(&clusters, merge_distance) {
        let absorbed = clusters.remove(j);
        clusters[i].absorb(absorbed);
    }

    clusters
        .into_iter()
        .map(|c| c.into_hotspot(people.len()))
        .collect()
}

fn find_close_pair(clusters: &[ClusterAccumulator], max_distance: f32) -> Option<(usize, usize)> {
    for i in 0..clusters.len() {
        for j in (i + 1)..clusters.len() {
            if distance(clusters[i].center(), clusters[j].center()) < max_distance {
                return Some((i, j));
            }
        }
    }
    None
}
