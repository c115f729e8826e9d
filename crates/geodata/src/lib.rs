// CMaNGOS TBC - Geodata Library
// Parsers and spatial queries for extracted world-geometry data
// (terrain .map grids, vmap collision trees, mmap navigation meshes)

pub mod error;
pub mod geometry;
pub mod height;
pub mod math;
pub mod nav;
pub mod path;
pub mod reader;
pub mod terrain;
pub mod validate;
pub mod vmap;

pub use error::{GeodataError, Result};
pub use math::{AaBox, Vec3};
pub use reader::ByteReader;

/// World units covered by one grid cell of the 64x64 map grid
pub const GRID_SIZE: f32 = 533.333_3;

/// Grids per map side
pub const MAX_GRIDS: u32 = 64;

/// Map grid center index; world (0,0) sits on the corner of grid (32,32)
pub const GRID_CENTER: f32 = 32.0;

/// Terrain corner-height grid side (V9)
pub const V9_SIZE: usize = 129;

/// Terrain center-height grid side (V8)
pub const V8_SIZE: usize = 128;

/// Options shared by all three format parsers.
///
/// Defaults are permissive: load every section, tolerate mismatched
/// magics where the structure is still readable, no tile cap.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Treat any magic/version mismatch as a hard failure
    pub strict: bool,
    /// Upper bound on tiles accepted by a multi-tile load (0 = unlimited)
    pub max_tiles: usize,
    /// Materialize navmesh detail meshes/verts/tris
    pub load_detail_meshes: bool,
    /// Materialize navmesh bounding-volume nodes
    pub load_bv_tree: bool,
    /// Materialize navmesh off-mesh connections
    pub load_off_mesh_connections: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            strict: false,
            max_tiles: 0,
            load_detail_meshes: true,
            load_bv_tree: true,
            load_off_mesh_connections: true,
        }
    }
}

impl ParseOptions {
    /// Permissive defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict validation: every magic/version mismatch is fatal
    pub fn strict() -> Self {
        ParseOptions {
            strict: true,
            ..Self::default()
        }
    }
}

/// Aggregate outcome of a multi-tile load. A single bad tile never aborts
/// the load; it is skipped and counted here.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LoadStats {
    /// Tiles parsed and kept
    pub tiles_loaded: usize,
    /// Tiles skipped after a parse failure
    pub tiles_skipped: usize,
    /// Permissive-mode downgrades and other non-fatal findings
    pub warnings: Vec<String>,
}

impl LoadStats {
    pub fn record_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_permissive() {
        let opts = ParseOptions::default();
        assert!(!opts.strict);
        assert!(opts.load_detail_meshes);
        assert!(opts.load_bv_tree);
        assert!(opts.load_off_mesh_connections);
        assert_eq!(opts.max_tiles, 0);
    }

    #[test]
    fn test_strict_options() {
        let opts = ParseOptions::strict();
        assert!(opts.strict);
        assert!(opts.load_detail_meshes);
    }
}
