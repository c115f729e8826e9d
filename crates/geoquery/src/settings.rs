// Optional JSON settings file; every field has a default so a partial
// (or absent) file works

use std::path::Path;

use anyhow::Context;
use mangos_geodata::height::HeightOptions;
use mangos_geodata::path::PathOptions;
use mangos_geodata::ParseOptions;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Fail on any magic/version mismatch instead of downgrading
    #[serde(default)]
    pub strict: bool,
    /// Cap on tiles accepted per multi-tile load (0 = unlimited)
    #[serde(default)]
    pub max_tiles: usize,
    #[serde(default = "default_true")]
    pub load_detail_meshes: bool,
    #[serde(default = "default_true")]
    pub load_bv_tree: bool,
    #[serde(default = "default_true")]
    pub load_off_mesh_connections: bool,

    /// Consult vmap before navmesh in height queries
    #[serde(default = "default_true")]
    pub prefer_vmap: bool,
    #[serde(default = "default_search_radius")]
    pub search_radius: f32,

    #[serde(default = "default_search_extent")]
    pub search_extent: f32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_true() -> bool {
    true
}
fn default_search_radius() -> f32 {
    5.0
}
fn default_search_extent() -> f32 {
    10.0
}
fn default_max_iterations() -> usize {
    10_000
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            strict: false,
            max_tiles: 0,
            load_detail_meshes: true,
            load_bv_tree: true,
            load_off_mesh_connections: true,
            prefer_vmap: true,
            search_radius: default_search_radius(),
            search_extent: default_search_extent(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Settings> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict: self.strict,
            max_tiles: self.max_tiles,
            load_detail_meshes: self.load_detail_meshes,
            load_bv_tree: self.load_bv_tree,
            load_off_mesh_connections: self.load_off_mesh_connections,
        }
    }

    pub fn height_options(&self) -> HeightOptions {
        HeightOptions {
            prefer_vmap: self.prefer_vmap,
            search_radius: self.search_radius,
        }
    }

    pub fn path_options(&self) -> PathOptions {
        PathOptions {
            search_extent: self.search_extent,
            max_iterations: self.max_iterations,
        }
    }
}
