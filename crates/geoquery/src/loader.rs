// Filesystem side of the tool: find a map's geodata files under
// maps/, vmaps/ and mmaps/, parse tile buffers in parallel and
// assemble the owned aggregates. The library itself never touches
// the filesystem.

use std::fs;
use std::path::Path;

use anyhow::Context;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use mangos_geodata::nav::{NavMesh, NavMeshParams, NavTile};
use mangos_geodata::terrain::{TerrainMap, TerrainTile};
use mangos_geodata::vmap::{VmapMap, VmapTile, VmapTree};
use mangos_geodata::{LoadStats, ParseOptions};

/// Tile file names and contents read up front, parse-ready
struct TileBuffer {
    name: String,
    data: Vec<u8>,
}

/// Collect `<mapId:4>_XX_YY.<ext>` files under one directory. A missing
/// directory is an empty list, not an error.
fn collect_tiles(dir: &Path, map_id: u32, ext: &str) -> anyhow::Result<Vec<TileBuffer>> {
    let prefix = format!("{map_id:04}_");
    let mut buffers = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!("no {} directory at {}", ext, dir.display());
            return Ok(buffers);
        }
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(ext) {
            continue;
        }
        let data = fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        buffers.push(TileBuffer { name, data });
    }
    buffers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(buffers)
}

/// Parse tile buffers on the rayon pool and fold the per-tile results
/// into an aggregate, skipping and counting failures.
fn parse_all<T, F>(buffers: &[TileBuffer], options: &ParseOptions, parse: F) -> (Vec<T>, LoadStats)
where
    T: Send,
    F: Fn(&str, &[u8], &ParseOptions) -> mangos_geodata::Result<T> + Sync,
{
    let results: Vec<(String, mangos_geodata::Result<T>)> = buffers
        .par_iter()
        .map(|b| (b.name.clone(), parse(&b.name, &b.data, options)))
        .collect();

    let mut stats = LoadStats::default();
    let mut tiles = Vec::with_capacity(results.len());
    for (name, result) in results {
        if options.max_tiles != 0 && stats.tiles_loaded >= options.max_tiles {
            stats.record_warning(format!(
                "tile limit {} reached, remaining tiles ignored",
                options.max_tiles
            ));
            break;
        }
        match result {
            Ok(tile) => {
                tiles.push(tile);
                stats.tiles_loaded += 1;
            }
            Err(e) => {
                warn!("skipping tile {name}: {e}");
                stats.tiles_skipped += 1;
            }
        }
    }
    (tiles, stats)
}

pub fn load_terrain(
    geodata: &Path,
    map_id: u32,
    options: &ParseOptions,
) -> anyhow::Result<(TerrainMap, LoadStats)> {
    let buffers = collect_tiles(&geodata.join("maps"), map_id, ".map")?;
    let (tiles, stats) = parse_all(&buffers, options, TerrainTile::parse);

    let mut map = TerrainMap::new();
    for tile in tiles {
        map.insert(tile);
    }
    info!(
        "map {map_id:04}: {} terrain tiles loaded, {} skipped",
        stats.tiles_loaded, stats.tiles_skipped
    );
    Ok((map, stats))
}

/// Load a map's vmap data. `None` when the map has no `.vmtree` file;
/// an unreadable tree file is fatal.
pub fn load_vmap(
    geodata: &Path,
    map_id: u32,
    options: &ParseOptions,
) -> anyhow::Result<Option<(VmapMap, LoadStats)>> {
    let dir = geodata.join("vmaps");
    let tree_name = format!("{map_id:04}.vmtree");
    let tree_path = dir.join(&tree_name);
    if !tree_path.exists() {
        debug!("no vmap tree at {}", tree_path.display());
        return Ok(None);
    }
    let tree_data =
        fs::read(&tree_path).with_context(|| format!("reading {}", tree_path.display()))?;
    let tree = VmapTree::parse(&tree_name, &tree_data)
        .with_context(|| format!("parsing {}", tree_path.display()))?;

    let buffers = collect_tiles(&dir, map_id, ".vmtile")?;
    let (tiles, stats) = parse_all(&buffers, options, VmapTile::parse);

    let mut map = VmapMap::new(tree);
    for tile in tiles {
        map.add_tile(tile);
    }
    info!(
        "map {map_id:04}: {} model spawns from {} vmap tiles, {} skipped",
        map.len(),
        stats.tiles_loaded,
        stats.tiles_skipped
    );
    Ok(Some((map, stats)))
}

/// Load a map's navmesh. `None` when the map has no `.mmap` params
/// file; an unreadable params file is fatal.
pub fn load_navmesh(
    geodata: &Path,
    map_id: u32,
    options: &ParseOptions,
) -> anyhow::Result<Option<(NavMesh, LoadStats)>> {
    let dir = geodata.join("mmaps");
    let params_name = format!("{map_id:04}.mmap");
    let params_path = dir.join(&params_name);
    if !params_path.exists() {
        debug!("no navmesh params at {}", params_path.display());
        return Ok(None);
    }
    let params_data =
        fs::read(&params_path).with_context(|| format!("reading {}", params_path.display()))?;
    let params = NavMeshParams::parse(&params_name, &params_data)
        .with_context(|| format!("parsing {}", params_path.display()))?;

    let buffers = collect_tiles(&dir, map_id, ".mmtile")?;
    let (tiles, stats) = parse_all(&buffers, options, NavTile::parse);

    let mut mesh = NavMesh::new(params);
    for tile in tiles {
        mesh.insert(tile);
    }
    info!(
        "map {map_id:04}: {} navmesh tiles loaded, {} skipped",
        stats.tiles_loaded, stats.tiles_skipped
    );
    Ok(Some((mesh, stats)))
}

/// The whole geodata set for one map, whichever parts exist on disk
pub struct MapData {
    pub terrain: TerrainMap,
    pub terrain_stats: LoadStats,
    pub vmap: Option<(VmapMap, LoadStats)>,
    pub navmesh: Option<(NavMesh, LoadStats)>,
}

impl MapData {
    pub fn load(geodata: &Path, map_id: u32, options: &ParseOptions) -> anyhow::Result<MapData> {
        let (terrain, terrain_stats) = load_terrain(geodata, map_id, options)?;
        let vmap = load_vmap(geodata, map_id, options)?;
        let navmesh = load_navmesh(geodata, map_id, options)?;
        Ok(MapData {
            terrain,
            terrain_stats,
            vmap,
            navmesh,
        })
    }

    pub fn vmap_map(&self) -> Option<&VmapMap> {
        self.vmap.as_ref().map(|(m, _)| m)
    }

    pub fn nav_mesh(&self) -> Option<&NavMesh> {
        self.navmesh.as_ref().map(|(m, _)| m)
    }
}
