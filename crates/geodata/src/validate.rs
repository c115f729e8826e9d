// Spawn placement validation against loaded geometry

use serde::{Deserialize, Serialize};

use crate::height::{self, HeightOptions};
use crate::math::Vec3;
use crate::nav::NavMesh;
use crate::terrain::TerrainMap;
use crate::vmap::VmapMap;

/// Nearest-polygon extent for the pass/fail on-mesh test
pub const ON_MESH_EXTENT: f32 = 3.0;
/// Wider extent used to propose a corrected position after a failure
pub const CORRECTION_EXTENT: f32 = 50.0;

/// Height slack above the resolved surface before a spawn is flagged
const HEIGHT_SLACK: f32 = 10.0;
/// Above this the spawn is unreachable, not merely misplaced
const HEIGHT_EXTREME: f32 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnKind {
    Creature,
    GameObject,
}

/// One placed entity read from the spawn list under validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spawn {
    pub id: u32,
    pub kind: SpawnKind,
    pub position: Vec3,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// No geometry source covers the position at all
    NoData,
    /// No walkable polygon within the on-mesh extent
    NotOnMesh,
    /// Position floats more than the slack above the resolved surface
    TooHigh,
    /// Position sits inside a collision model's bounding box
    EmbeddedInCollision,
}

/// Proposed relocation onto the nearest walkable polygon
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correction {
    pub position: Vec3,
    /// Euclidean distance from the original position
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// 2 = informational, 6-7 = should fix, >= 8 = broken placement
    pub severity: u8,
    pub detail: String,
    pub correction: Option<Correction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpawnValidationResult {
    pub spawn_id: u32,
    pub valid: bool,
    pub findings: Vec<Finding>,
}

/// Validate one spawn's placement against whatever geometry is loaded.
///
/// Creatures must come through clean; game objects tolerate everything
/// below severity 8, since decorative objects legitimately sit off the
/// walkable mesh.
pub fn validate_spawn(
    spawn: &Spawn,
    terrain: Option<&TerrainMap>,
    vmap: Option<&VmapMap>,
    navmesh: Option<&NavMesh>,
) -> SpawnValidationResult {
    let mut findings = Vec::new();
    let pos = spawn.position;

    if let Some(navmesh) = navmesh {
        check_on_mesh(navmesh, pos, &mut findings);
    }
    if let Some(vmap) = vmap {
        check_embedded(vmap, pos, &mut findings);
    }
    check_height(pos, terrain, vmap, navmesh, &mut findings);

    let valid = match spawn.kind {
        SpawnKind::Creature => findings.is_empty(),
        SpawnKind::GameObject => findings.iter().all(|f| f.severity < 8),
    };
    SpawnValidationResult {
        spawn_id: spawn.id,
        valid,
        findings,
    }
}

/// Validate a whole spawn list, preserving input order
pub fn validate_spawns(
    spawns: &[Spawn],
    terrain: Option<&TerrainMap>,
    vmap: Option<&VmapMap>,
    navmesh: Option<&NavMesh>,
) -> Vec<SpawnValidationResult> {
    spawns
        .iter()
        .map(|s| validate_spawn(s, terrain, vmap, navmesh))
        .collect()
}

fn check_on_mesh(navmesh: &NavMesh, pos: Vec3, findings: &mut Vec<Finding>) {
    let Some(tile) = navmesh.tile_at(pos.x, pos.y) else {
        findings.push(Finding {
            kind: FindingKind::NotOnMesh,
            severity: 6,
            detail: "no navmesh tile covers the position".into(),
            correction: None,
        });
        return;
    };
    if tile.nearest_poly(pos, ON_MESH_EXTENT).is_some() {
        return;
    }
    let correction = tile.nearest_poly(pos, CORRECTION_EXTENT).map(|poly| {
        let position = tile.poly_centroid(poly);
        Correction {
            position,
            distance: pos.distance(position),
        }
    });
    findings.push(Finding {
        kind: FindingKind::NotOnMesh,
        severity: 6,
        detail: format!("no walkable polygon within {ON_MESH_EXTENT} units"),
        correction,
    });
}

fn check_embedded(vmap: &VmapMap, pos: Vec3, findings: &mut Vec<Finding>) {
    for spawn in vmap.spawns() {
        if spawn.bound.contains(pos) {
            findings.push(Finding {
                kind: FindingKind::EmbeddedInCollision,
                severity: 8,
                detail: format!("inside bounding box of model '{}'", spawn.name),
                correction: None,
            });
        }
    }
}

fn check_height(
    pos: Vec3,
    terrain: Option<&TerrainMap>,
    vmap: Option<&VmapMap>,
    navmesh: Option<&NavMesh>,
    findings: &mut Vec<Finding>,
) {
    let resolved = height::resolve(
        pos.x,
        pos.y,
        terrain,
        vmap,
        navmesh,
        &HeightOptions::default(),
    );
    let Some(surface) = resolved.z else {
        findings.push(Finding {
            kind: FindingKind::NoData,
            severity: 2,
            detail: "no height source covers the position".into(),
            correction: None,
        });
        return;
    };
    let above = pos.z - surface;
    if above > HEIGHT_SLACK {
        let severity = if above > HEIGHT_EXTREME { 9 } else { 7 };
        findings.push(Finding {
            kind: FindingKind::TooHigh,
            severity,
            detail: format!("{above:.1} units above resolved surface z={surface:.1}"),
            correction: Some(Correction {
                position: Vec3::new(pos.x, pos.y, surface),
                distance: above,
            }),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::AaBox;
    use crate::nav::tests::{default_params, sample_tile};
    use crate::terrain::{HeightGrid, TerrainTile};
    use crate::vmap::{BihTree, ModelSpawn, VmapMap, VmapTile, VmapTree, MOD_HAS_BOUND};

    fn creature(x: f32, y: f32, z: f32) -> Spawn {
        Spawn {
            id: 1,
            kind: SpawnKind::Creature,
            position: Vec3::new(x, y, z),
            name: None,
        }
    }

    fn nav_at_origin() -> NavMesh {
        let params = default_params();
        let mut mesh = NavMesh::new(params.clone());
        // tile (10, 10) spans world (0,0)..(10,10) at z=0
        mesh.insert(sample_tile(10, 10, params.origin));
        mesh
    }

    fn flat_terrain(height: f32) -> TerrainMap {
        let mut map = TerrainMap::new();
        // grid (31, 31) covers world (0, 0)..(533.33, 533.33)
        map.insert(TerrainTile {
            map_id: 0,
            grid_x: 31,
            grid_y: 31,
            height: HeightGrid::flat(height),
            area: None,
            liquid: None,
            warnings: Vec::new(),
        });
        map
    }

    fn vmap_with_box(min: Vec3, max: Vec3) -> VmapMap {
        let tree = VmapTree {
            tiled: true,
            bounds: AaBox::new(
                Vec3::new(-1000.0, -1000.0, -1000.0),
                Vec3::new(1000.0, 1000.0, 1000.0),
            ),
            tree: BihTree::Unavailable,
        };
        let mut map = VmapMap::new(tree);
        map.add_tile(VmapTile {
            tile_x: 0,
            tile_y: 0,
            spawns: vec![ModelSpawn {
                flags: MOD_HAS_BOUND,
                adt_id: 0,
                id: 7,
                position: min,
                rotation: Vec3::ZERO,
                scale: 1.0,
                bound: AaBox::new(min, max),
                name: "building.wmo".into(),
                tree_slot: 7,
            }],
        });
        map
    }

    #[test]
    fn test_clean_creature_on_mesh() {
        let nav = nav_at_origin();
        // right on the lower polygon centroid
        let result = validate_spawn(&creature(5.0, 2.5, 0.0), None, None, Some(&nav));
        assert!(result.valid);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_no_data_is_informational() {
        let result = validate_spawn(&creature(0.0, 0.0, 0.0), None, None, None);
        assert_eq!(result.findings.len(), 1);
        let f = &result.findings[0];
        assert_eq!(f.kind, FindingKind::NoData);
        assert_eq!(f.severity, 2);
        // a creature with any finding is invalid
        assert!(!result.valid);
    }

    #[test]
    fn test_not_on_mesh_with_correction() {
        let nav = nav_at_origin();
        let terrain = flat_terrain(0.0);
        // covered by the tile but > 3 units from either centroid
        let spawn = creature(0.2, 0.2, 0.0);
        let result = validate_spawn(&spawn, Some(&terrain), None, Some(&nav));

        assert_eq!(result.findings.len(), 1);
        let f = &result.findings[0];
        assert_eq!(f.kind, FindingKind::NotOnMesh);
        assert_eq!(f.severity, 6);
        let correction = f.correction.unwrap();
        assert_eq!(correction.position, Vec3::new(5.0, 2.5, 0.0));
        assert!((correction.distance - spawn.position.distance(correction.position)).abs() < 1e-5);
        assert!(!result.valid);
    }

    #[test]
    fn test_too_high_severities() {
        let terrain = flat_terrain(0.0);
        let moderate = validate_spawn(&creature(1.0, 1.0, 100.0), Some(&terrain), None, None);
        assert_eq!(moderate.findings[0].kind, FindingKind::TooHigh);
        assert_eq!(moderate.findings[0].severity, 7);

        let extreme = validate_spawn(&creature(1.0, 1.0, 2000.0), Some(&terrain), None, None);
        assert_eq!(extreme.findings[0].severity, 9);
        let correction = extreme.findings[0].correction.unwrap();
        assert_eq!(correction.position.z, 0.0);

        // within slack, no finding
        let fine = validate_spawn(&creature(1.0, 1.0, 9.0), Some(&terrain), None, None);
        assert!(fine.valid);
    }

    #[test]
    fn test_embedded_in_collision() {
        let vmap = vmap_with_box(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(5.0, 5.0, 5.0));
        let terrain = flat_terrain(0.0);
        let result = validate_spawn(&creature(0.0, 0.0, 0.0), Some(&terrain), Some(&vmap), None);

        let embedded: Vec<_> = result
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::EmbeddedInCollision)
            .collect();
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].severity, 8);
        assert!(embedded[0].detail.contains("building.wmo"));
        assert!(!result.valid);
    }

    #[test]
    fn test_game_object_tolerates_low_severity() {
        let nav = nav_at_origin();
        let terrain = flat_terrain(0.0);
        let object = Spawn {
            id: 2,
            kind: SpawnKind::GameObject,
            position: Vec3::new(0.2, 0.2, 0.0),
            name: Some("Wanted Poster".into()),
        };
        // off-mesh (severity 6) but not embedded: valid for an object
        let result = validate_spawn(&object, Some(&terrain), None, Some(&nav));
        assert!(!result.findings.is_empty());
        assert!(result.valid);

        // embedded (severity 8) breaks an object too
        let vmap = vmap_with_box(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(5.0, 5.0, 5.0));
        let result = validate_spawn(&object, Some(&terrain), Some(&vmap), Some(&nav));
        assert!(!result.valid);
    }

    #[test]
    fn test_spawn_list_preserves_order() {
        let terrain = flat_terrain(0.0);
        let spawns = vec![creature(1.0, 1.0, 0.0), creature(2.0, 2.0, 500.0)];
        let results = validate_spawns(&spawns, Some(&terrain), None, None);
        assert_eq!(results.len(), 2);
        assert!(results[0].valid);
        assert!(!results[1].valid);
    }
}
