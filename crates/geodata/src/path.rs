// A* pathfinding over navmesh polygon adjacency, single tile

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::Serialize;
use thiserror::Error;

use crate::math::Vec3;
use crate::nav::{
    NavMesh, NavTile, NAV_AREA_GROUND_STEEP, NAV_AREA_MAGMA_SLIME, NAV_AREA_WATER, NAV_EXT_LINK,
};

/// Typed pathfinding failures. None of these are panics; a query over
/// missing or unconnected data reports which precondition failed.
#[derive(Debug, Error, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PathError {
    #[error("no navmesh tile at start position")]
    NoTileAtStart,
    #[error("no navmesh tile at goal position")]
    NoTileAtGoal,
    #[error("no polygon within search extent of start position")]
    NoPolyAtStart,
    #[error("no polygon within search extent of goal position")]
    NoPolyAtGoal,
    #[error("cross-tile pathfinding not supported")]
    CrossTile,
    #[error("no path found within iteration budget")]
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct PathOptions {
    /// Start/goal polygon search radius, 2D centroid distance
    pub search_extent: f32,
    /// Expansion cap before the search gives up
    pub max_iterations: usize,
}

impl Default for PathOptions {
    fn default() -> Self {
        PathOptions {
            search_extent: 10.0,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    /// Start position, intermediate polygon centroids, exact goal position
    pub waypoints: Vec<Vec3>,
    /// Unweighted length of the waypoint polyline
    pub length: f32,
    /// Accumulated area-weighted edge length
    pub cost: f32,
    /// Polygon indices visited in order, start through goal
    pub polygons: Vec<usize>,
    /// Polygons expanded before the goal was reached
    pub nodes_explored: usize,
}

/// Movement cost multiplier for entering a polygon of the given area
pub fn area_cost(area: u8) -> f32 {
    match area {
        NAV_AREA_GROUND_STEEP => 1.5,
        NAV_AREA_WATER => 2.0,
        NAV_AREA_MAGMA_SLIME => 5.0,
        _ => 1.0,
    }
}

// Heap entry ordered by f; f32 keys wrapped for total ordering
#[derive(Debug, PartialEq)]
struct OpenEntry {
    f: f32,
    poly: usize,
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f.total_cmp(&other.f).then(self.poly.cmp(&other.poly))
    }
}

/// Find a walkable path between two world points on one navmesh tile.
///
/// A* runs over polygon centroids: `g` accumulates centroid-to-centroid
/// edge lengths weighted by the entered polygon's area cost, `h` is the
/// unweighted Euclidean distance to the goal centroid. Multipliers are
/// all >= 1, so `h` never overestimates and the first pop of the goal
/// polygon is optimal.
pub fn find_path(
    navmesh: &NavMesh,
    start: Vec3,
    goal: Vec3,
    options: &PathOptions,
) -> Result<PathResult, PathError> {
    let start_tile = navmesh.tile_at(start.x, start.y).ok_or(PathError::NoTileAtStart)?;
    let goal_tile = navmesh.tile_at(goal.x, goal.y).ok_or(PathError::NoTileAtGoal)?;
    if (start_tile.header.x, start_tile.header.y) != (goal_tile.header.x, goal_tile.header.y) {
        return Err(PathError::CrossTile);
    }
    let tile = start_tile;

    let start_poly = tile
        .nearest_poly(start, options.search_extent)
        .ok_or(PathError::NoPolyAtStart)?;
    let goal_poly = tile
        .nearest_poly(goal, options.search_extent)
        .ok_or(PathError::NoPolyAtGoal)?;

    let (order, cost, nodes_explored) = astar(tile, start_poly, goal_poly, options.max_iterations)?;

    let mut waypoints = Vec::with_capacity(order.len() + 1);
    waypoints.push(start);
    for &poly in order.iter().take(order.len().saturating_sub(1)).skip(1) {
        waypoints.push(tile.poly_centroid(poly));
    }
    waypoints.push(goal);

    let length = waypoints
        .windows(2)
        .map(|pair| pair[0].distance(pair[1]))
        .sum();

    Ok(PathResult {
        waypoints,
        length,
        cost,
        polygons: order,
        nodes_explored,
    })
}

fn astar(
    tile: &NavTile,
    start_poly: usize,
    goal_poly: usize,
    max_iterations: usize,
) -> Result<(Vec<usize>, f32, usize), PathError> {
    let goal_centroid = tile.poly_centroid(goal_poly);
    let poly_count = tile.polys.len();

    let mut g = vec![f32::INFINITY; poly_count];
    let mut parent = vec![usize::MAX; poly_count];
    let mut closed = vec![false; poly_count];
    let mut open = BinaryHeap::new();

    g[start_poly] = 0.0;
    open.push(Reverse(OpenEntry {
        f: tile.poly_centroid(start_poly).distance(goal_centroid),
        poly: start_poly,
    }));

    let mut iterations = 0;
    while let Some(Reverse(entry)) = open.pop() {
        let current = entry.poly;
        if closed[current] {
            continue;
        }
        closed[current] = true;

        if current == goal_poly {
            return Ok((
                walk_parents(&parent, start_poly, goal_poly),
                g[goal_poly],
                iterations,
            ));
        }

        iterations += 1;
        if iterations >= max_iterations {
            return Err(PathError::Exhausted);
        }

        let here = tile.poly_centroid(current);
        let poly = &tile.polys[current];
        let edge_count = (poly.vert_count as usize).min(poly.neis.len());
        for &nei in &poly.neis[..edge_count] {
            // 0 = border edge; the external bit marks a cross-tile edge
            if nei == 0 || nei & NAV_EXT_LINK != 0 {
                continue;
            }
            let next = (nei - 1) as usize;
            if next >= poly_count || closed[next] {
                continue;
            }
            let next_centroid = tile.poly_centroid(next);
            let step = here.distance(next_centroid) * area_cost(tile.polys[next].area());
            let tentative = g[current] + step;
            if tentative < g[next] {
                g[next] = tentative;
                parent[next] = current;
                open.push(Reverse(OpenEntry {
                    f: tentative + next_centroid.distance(goal_centroid),
                    poly: next,
                }));
            }
        }
    }

    Err(PathError::Exhausted)
}

fn walk_parents(parent: &[usize], start_poly: usize, goal_poly: usize) -> Vec<usize> {
    let mut order = vec![goal_poly];
    let mut current = goal_poly;
    while current != start_poly {
        current = parent[current];
        order.push(current);
    }
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::AaBox;
    use crate::nav::tests::{default_params, quad_poly, sample_tile};
    use crate::nav::{NavTileHeader, NAV_AREA_GROUND};

    // 1x4 strip of 10x5 quads stacked in y, polygon i spans
    // y in [5i, 5(i+1)); neighbors chain 0-1-2-3
    fn strip_tile(areas: [u8; 4]) -> NavTile {
        let mut verts = Vec::new();
        for row in 0..5 {
            verts.push(Vec3::new(0.0, row as f32 * 5.0, 0.0));
            verts.push(Vec3::new(10.0, row as f32 * 5.0, 0.0));
        }
        let mut polys = Vec::new();
        for i in 0u16..4 {
            let b = i * 2;
            let mut neis = [0u16; 6];
            if i > 0 {
                neis[0] = i; // poly index i-1, stored +1
            }
            if i < 3 {
                neis[1] = i + 2;
            }
            polys.push(quad_poly([b, b + 1, b + 3, b + 2], neis, areas[i as usize]));
        }
        let mut header = NavTileHeader {
            poly_count: polys.len() as i32,
            vert_count: verts.len() as i32,
            bv_quant_factor: 1.0,
            ..Default::default()
        };
        header.bounds = AaBox::new(Vec3::ZERO, Vec3::new(10.0, 20.0, 0.0));
        NavTile {
            uses_liquids: false,
            header,
            verts,
            polys,
            detail_meshes: Vec::new(),
            detail_verts: Vec::new(),
            detail_tris: Vec::new(),
            bv_nodes: Vec::new(),
            off_mesh_cons: Vec::new(),
        }
    }

    fn mesh_with(tile: NavTile) -> NavMesh {
        let mut params = default_params();
        params.origin = Vec3::ZERO;
        params.tile_width = 100.0;
        params.tile_height = 100.0;
        let mut mesh = NavMesh::new(params);
        mesh.insert(tile);
        mesh
    }

    /// Dijkstra-free exhaustive minimum over the same graph, for the
    /// optimality check
    fn brute_force_cost(tile: &NavTile, start: usize, goal: usize) -> f32 {
        fn rec(tile: &NavTile, current: usize, goal: usize, visited: &mut Vec<bool>) -> f32 {
            if current == goal {
                return 0.0;
            }
            visited[current] = true;
            let mut best = f32::INFINITY;
            let poly = &tile.polys[current];
            for &nei in &poly.neis[..poly.vert_count as usize] {
                if nei == 0 || nei & NAV_EXT_LINK != 0 {
                    continue;
                }
                let next = (nei - 1) as usize;
                if visited[next] {
                    continue;
                }
                let step = tile.poly_centroid(current).distance(tile.poly_centroid(next))
                    * area_cost(tile.polys[next].area());
                let rest = rec(tile, next, goal, visited);
                if step + rest < best {
                    best = step + rest;
                }
            }
            visited[current] = false;
            best
        }
        rec(tile, start, goal, &mut vec![false; tile.polys.len()])
    }

    #[test]
    fn test_straight_path_along_strip() {
        let mesh = mesh_with(strip_tile([NAV_AREA_GROUND; 4]));
        let start = Vec3::new(5.0, 2.0, 0.0);
        let goal = Vec3::new(5.0, 18.0, 0.0);
        let path = find_path(&mesh, start, goal, &PathOptions::default()).unwrap();

        assert_eq!(path.polygons, vec![0, 1, 2, 3]);
        assert_eq!(path.waypoints.first(), Some(&start));
        assert_eq!(path.waypoints.last(), Some(&goal));
        // intermediate waypoints are the inner polygons' centroids
        assert_eq!(path.waypoints.len(), 4);
        assert_eq!(path.waypoints[1], Vec3::new(5.0, 7.5, 0.0));
        assert_eq!(path.waypoints[2], Vec3::new(5.0, 12.5, 0.0));
        // three 5-unit centroid steps at ground cost
        assert!((path.cost - 15.0).abs() < 1e-4);
        // polyline: 5.5 + 5 + 5.5 through the snapped endpoints
        assert!((path.length - 16.0).abs() < 1e-4);
        assert!(path.nodes_explored >= path.polygons.len() - 1);
    }

    #[test]
    fn test_start_equals_goal_polygon() {
        let mesh = mesh_with(strip_tile([NAV_AREA_GROUND; 4]));
        let start = Vec3::new(4.0, 2.0, 0.0);
        let goal = Vec3::new(6.0, 2.0, 0.0);
        let path = find_path(&mesh, start, goal, &PathOptions::default()).unwrap();
        assert_eq!(path.polygons, vec![0]);
        assert_eq!(path.waypoints, vec![start, goal]);
        assert_eq!(path.cost, 0.0);
    }

    #[test]
    fn test_area_costs_weigh_path() {
        let mesh = mesh_with(strip_tile([
            NAV_AREA_GROUND,
            NAV_AREA_WATER,
            NAV_AREA_MAGMA_SLIME,
            NAV_AREA_GROUND,
        ]));
        let path = find_path(
            &mesh,
            Vec3::new(5.0, 2.0, 0.0),
            Vec3::new(5.0, 18.0, 0.0),
            &PathOptions::default(),
        )
        .unwrap();
        // 5 * 2.0 + 5 * 5.0 + 5 * 1.0
        assert!((path.cost - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_astar_matches_exhaustive_minimum() {
        let tile = strip_tile([
            NAV_AREA_GROUND,
            NAV_AREA_GROUND_STEEP,
            NAV_AREA_WATER,
            NAV_AREA_GROUND,
        ]);
        let expected = brute_force_cost(&tile, 0, 3);
        let mesh = mesh_with(tile);
        let path = find_path(
            &mesh,
            Vec3::new(5.0, 2.0, 0.0),
            Vec3::new(5.0, 18.0, 0.0),
            &PathOptions::default(),
        )
        .unwrap();
        assert!((path.cost - expected).abs() < 1e-4);
    }

    #[test]
    fn test_disconnected_polygons_exhaust() {
        let mut tile = strip_tile([NAV_AREA_GROUND; 4]);
        // sever the 1-2 edge in both directions
        tile.polys[1].neis[1] = 0;
        tile.polys[2].neis[0] = 0;
        let mesh = mesh_with(tile);
        let err = find_path(
            &mesh,
            Vec3::new(5.0, 2.0, 0.0),
            Vec3::new(5.0, 18.0, 0.0),
            &PathOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, PathError::Exhausted);
    }

    #[test]
    fn test_external_edges_ignored() {
        let mut tile = strip_tile([NAV_AREA_GROUND; 4]);
        tile.polys[1].neis[1] = NAV_EXT_LINK | 3;
        tile.polys[2].neis[0] = NAV_EXT_LINK | 2;
        let mesh = mesh_with(tile);
        let err = find_path(
            &mesh,
            Vec3::new(5.0, 2.0, 0.0),
            Vec3::new(5.0, 18.0, 0.0),
            &PathOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, PathError::Exhausted);
    }

    #[test]
    fn test_iteration_budget() {
        let mesh = mesh_with(strip_tile([NAV_AREA_GROUND; 4]));
        let options = PathOptions {
            max_iterations: 2,
            ..PathOptions::default()
        };
        let err = find_path(
            &mesh,
            Vec3::new(5.0, 2.0, 0.0),
            Vec3::new(5.0, 18.0, 0.0),
            &options,
        )
        .unwrap_err();
        assert_eq!(err, PathError::Exhausted);
    }

    #[test]
    fn test_cross_tile_is_explicit_error() {
        let params = default_params();
        let mut mesh = NavMesh::new(params.clone());
        mesh.insert(sample_tile(0, 0, params.origin));
        mesh.insert(sample_tile(1, 0, params.origin));

        let start = Vec3::new(params.origin.x + 5.0, params.origin.y + 5.0, 0.0);
        let goal = Vec3::new(params.origin.x + 15.0, params.origin.y + 5.0, 0.0);
        let err = find_path(&mesh, start, goal, &PathOptions::default()).unwrap_err();
        assert_eq!(err, PathError::CrossTile);
        assert_eq!(err.to_string(), "cross-tile pathfinding not supported");
    }

    #[test]
    fn test_missing_tile_errors() {
        let mesh = mesh_with(strip_tile([NAV_AREA_GROUND; 4]));
        let inside = Vec3::new(5.0, 5.0, 0.0);
        let outside = Vec3::new(500.0, 500.0, 0.0);
        assert_eq!(
            find_path(&mesh, outside, inside, &PathOptions::default()).unwrap_err(),
            PathError::NoTileAtStart
        );
        assert_eq!(
            find_path(&mesh, inside, outside, &PathOptions::default()).unwrap_err(),
            PathError::NoTileAtGoal
        );
    }

    #[test]
    fn test_no_poly_within_extent() {
        let mesh = mesh_with(strip_tile([NAV_AREA_GROUND; 4]));
        let options = PathOptions {
            search_extent: 0.1,
            ..PathOptions::default()
        };
        // inside the tile but nowhere near a centroid
        let err = find_path(
            &mesh,
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(5.0, 7.5, 0.0),
            &options,
        )
        .unwrap_err();
        assert_eq!(err, PathError::NoPolyAtStart);
    }
}
