// Merged height lookup over terrain grids, vmap collision boxes and
// navmesh polygons

use serde::Serialize;

use crate::geometry::ray_box_intersect;
use crate::math::{AaBox, Vec3};
use crate::nav::NavMesh;
use crate::terrain::TerrainMap;
use crate::vmap::VmapMap;

/// Ray origin height for the vmap probe; far above any real geometry
pub const VMAP_RAY_ORIGIN_Z: f32 = 10_000.0;

/// Half extent of the thin xy query box around the probe column
const PROBE_HALF_EXTENT: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightSource {
    Terrain,
    Vmap,
    Nav,
}

/// One vmap spawn box crossed by the probe ray over the query column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VmapCandidate {
    /// Index into `VmapMap::spawns`
    pub spawn_index: usize,
    /// The spawn's own model instance id
    pub spawn_id: u32,
    /// Box-midplane height, the answer this candidate proposes
    pub z: f32,
    /// Distance from the ray origin to the box entry point
    pub ray_distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeightQueryResult {
    pub z: Option<f32>,
    pub source: Option<HeightSource>,
    /// Every vmap spawn considered, whether or not vmap won
    pub vmap_candidates: Vec<VmapCandidate>,
}

impl HeightQueryResult {
    fn none() -> Self {
        HeightQueryResult {
            z: None,
            source: None,
            vmap_candidates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeightOptions {
    /// Consult vmap before navmesh when terrain has no answer
    pub prefer_vmap: bool,
    /// Navmesh nearest-polygon search radius, 2D centroid distance
    pub search_radius: f32,
}

impl Default for HeightOptions {
    fn default() -> Self {
        HeightOptions {
            prefer_vmap: true,
            search_radius: 5.0,
        }
    }
}

/// Resolve the surface height under a world point.
///
/// The terrain tile covering the point always wins. Without one, vmap
/// and navmesh answer in the order `prefer_vmap` selects. A point no
/// source covers is a `None` result, not an error.
pub fn resolve(
    x: f32,
    y: f32,
    terrain: Option<&TerrainMap>,
    vmap: Option<&VmapMap>,
    navmesh: Option<&NavMesh>,
    options: &HeightOptions,
) -> HeightQueryResult {
    let mut result = HeightQueryResult::none();

    if let Some(candidates) = vmap.map(|v| vmap_candidates(v, x, y)) {
        result.vmap_candidates = candidates;
    }

    if let Some(tile) = terrain.and_then(|t| t.tile_covering(x, y)) {
        result.z = Some(tile.height_at(x, y));
        result.source = Some(HeightSource::Terrain);
        return result;
    }

    let vmap_z = best_candidate(&result.vmap_candidates).map(|c| c.z);
    let nav_z = navmesh.and_then(|n| nav_height(n, x, y, options.search_radius));

    let (first, second) = if options.prefer_vmap {
        ((vmap_z, HeightSource::Vmap), (nav_z, HeightSource::Nav))
    } else {
        ((nav_z, HeightSource::Nav), (vmap_z, HeightSource::Vmap))
    };
    for (z, source) in [first, second] {
        if let Some(z) = z {
            result.z = Some(z);
            result.source = Some(source);
            return result;
        }
    }
    result
}

/// Cast the sentinel ray straight down through a thin box at (x, y) and
/// collect every spawn box it crosses whose xy bounds contain the point.
fn vmap_candidates(vmap: &VmapMap, x: f32, y: f32) -> Vec<VmapCandidate> {
    let probe = AaBox::new(
        Vec3::new(x - PROBE_HALF_EXTENT, y - PROBE_HALF_EXTENT, -VMAP_RAY_ORIGIN_Z),
        Vec3::new(x + PROBE_HALF_EXTENT, y + PROBE_HALF_EXTENT, VMAP_RAY_ORIGIN_Z),
    );
    let origin = Vec3::new(x, y, VMAP_RAY_ORIGIN_Z);
    let down = Vec3::new(0.0, 0.0, -1.0);

    let mut candidates = Vec::new();
    for index in vmap.spawns_in_box(&probe) {
        let spawn = &vmap.spawns()[index];
        if !spawn.bound.contains_xy(x, y) {
            continue;
        }
        if let Some(hit) = ray_box_intersect(origin, down, &spawn.bound) {
            candidates.push(VmapCandidate {
                spawn_index: index,
                spawn_id: spawn.id,
                z: spawn.bound.midplane_z(),
                ray_distance: hit.distance,
            });
        }
    }
    candidates
}

/// Highest midplane wins; equal heights fall to the nearer ray entry
fn best_candidate(candidates: &[VmapCandidate]) -> Option<&VmapCandidate> {
    candidates.iter().reduce(|best, c| {
        if c.z > best.z || (c.z == best.z && c.ray_distance < best.ray_distance) {
            c
        } else {
            best
        }
    })
}

fn nav_height(navmesh: &NavMesh, x: f32, y: f32, search_radius: f32) -> Option<f32> {
    let tile = navmesh.tile_at(x, y)?;
    let poly = tile.nearest_poly(Vec3::new(x, y, 0.0), search_radius)?;
    Some(tile.poly_centroid(poly).z)
}
