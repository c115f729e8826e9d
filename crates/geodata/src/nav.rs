// MMap .mmap/.mmtile parser - navigation mesh tiles for pathfinding
// Tile payloads are world-space z-up; the generator writes world axes
// back, so no swizzle happens here

use std::collections::HashMap;

use tracing::warn;

use crate::error::{GeodataError, ReadError, Result};
use crate::math::{AaBox, Vec3};
use crate::reader::ByteReader;
use crate::{LoadStats, ParseOptions};

pub const MMAP_MAGIC: u32 = 0x4d4d_4150; // 'MMAP'
/// Map-format version written by the generator
pub const MMAP_VERSION: u32 = 8;
/// Mesh-library (Detour) version
pub const DT_NAVMESH_VERSION: u32 = 7;
pub const DT_NAVMESH_MAGIC: u32 = 0x444e_4156; // 'DNAV'

/// Vertices / neighbor slots per polygon
pub const NAV_VERTS_PER_POLY: usize = 6;
/// High bit of a neighbor ref marks an external (cross-tile) edge
pub const NAV_EXT_LINK: u16 = 0x8000;

// Per-polygon terrain classification, ground down to magma/slime
pub const NAV_AREA_EMPTY: u8 = 0;
pub const NAV_AREA_GROUND: u8 = 11;
pub const NAV_AREA_GROUND_STEEP: u8 = 10;
pub const NAV_AREA_WATER: u8 = 9;
pub const NAV_AREA_MAGMA_SLIME: u8 = 8;

/// Guard against misaligned reads cascading into huge allocations
const MAX_SECTION_COUNT: i32 = 1_000_000;

const LINK_RECORD_SIZE: usize = 12;

/// Map-level navmesh parameters from the `.mmap` file.
#[derive(Debug, Clone, PartialEq)]
pub struct NavMeshParams {
    pub origin: Vec3,
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: i32,
    pub max_polys: i32,
    /// Absent in 28-byte files from older producers
    pub off_mesh_count: u32,
}

impl NavMeshParams {
    pub fn parse(file_name: &str, data: &[u8]) -> Result<NavMeshParams> {
        let ferr = |e: ReadError| e.in_file(file_name);
        let mut r = ByteReader::new(data);
        let origin = r.read_vec3().map_err(ferr)?;
        let tile_width = r.read_f32().map_err(ferr)?;
        let tile_height = r.read_f32().map_err(ferr)?;
        let max_tiles = r.read_i32().map_err(ferr)?;
        let max_polys = r.read_i32().map_err(ferr)?;
        let off_mesh_count = if r.remaining() >= 4 {
            r.read_u32().map_err(ferr)?
        } else {
            0
        };
        Ok(NavMeshParams {
            origin,
            tile_width,
            tile_height,
            max_tiles,
            max_polys,
            off_mesh_count,
        })
    }

    /// Tile grid coordinates covering a world point
    pub fn tile_coords(&self, x: f32, y: f32) -> (i32, i32) {
        let tx = ((x - self.origin.x) / self.tile_width).floor() as i32;
        let ty = ((y - self.origin.y) / self.tile_height).floor() as i32;
        (tx, ty)
    }
}

/// One walkable polygon: vertex indices, neighbor refs, and the packed
/// area/type byte that drives movement cost.
#[derive(Debug, Clone, PartialEq)]
pub struct NavPoly {
    pub first_link: u32,
    pub verts: [u16; NAV_VERTS_PER_POLY],
    pub neis: [u16; NAV_VERTS_PER_POLY],
    pub flags: u16,
    pub vert_count: u8,
    pub area_and_type: u8,
}

impl NavPoly {
    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    pub fn poly_type(&self) -> u8 {
        self.area_and_type >> 6
    }
}

/// Optional high-resolution height refinement over a polygon
#[derive(Debug, Clone, PartialEq)]
pub struct NavDetailMesh {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
}

/// Optional bounding-volume node (quantized box + poly index)
#[derive(Debug, Clone, PartialEq)]
pub struct NavBvNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub index: i32,
}

/// Jump/teleport link between two navmesh points
#[derive(Debug, Clone, PartialEq)]
pub struct OffMeshConnection {
    pub endpoints: [Vec3; 2],
    pub radius: f32,
    pub poly: u16,
    pub flags: u8,
    pub side: u8,
    pub user_id: u32,
}

/// The DNAV header of a tile's mesh blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavTileHeader {
    pub x: i32,
    pub y: i32,
    pub layer: u32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    pub off_mesh_base: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bounds: AaBox,
    pub bv_quant_factor: f32,
}

/// One parsed navmesh tile. Links are never materialized; pathfinding
/// adjacency derives from each polygon's `neis` on demand, keeping the
/// tile immutable after parse.
#[derive(Debug, Clone)]
pub struct NavTile {
    pub uses_liquids: bool,
    pub header: NavTileHeader,
    pub verts: Vec<Vec3>,
    pub polys: Vec<NavPoly>,
    pub detail_meshes: Vec<NavDetailMesh>,
    pub detail_verts: Vec<Vec3>,
    pub detail_tris: Vec<[u8; 4]>,
    pub bv_nodes: Vec<NavBvNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

fn check_count(file_name: &str, what: &str, count: i32) -> Result<usize> {
    if !(0..=MAX_SECTION_COUNT).contains(&count) {
        return Err(GeodataError::corrupt(
            file_name,
            format!("{what} count {count} outside 0..={MAX_SECTION_COUNT}"),
        ));
    }
    Ok(count as usize)
}

impl NavTile {
    /// Parse one `.mmtile` buffer: the MMAP outer header, then the DNAV
    /// mesh blob. Optional sections disabled by the parser options are
    /// skipped by advancing the cursor their computed byte length, which
    /// yields a structurally valid, partially empty tile.
    pub fn parse(file_name: &str, data: &[u8], options: &ParseOptions) -> Result<NavTile> {
        let ferr = |e: ReadError| e.in_file(file_name);
        let mut r = ByteReader::new(data);

        let mmap_magic = r.read_u32().map_err(ferr)?;
        let dt_version = r.read_u32().map_err(ferr)?;
        let mmap_version = r.read_u32().map_err(ferr)?;
        let size = r.read_u32().map_err(ferr)?;
        let uses_liquids = r.read_u32().map_err(ferr)? != 0;

        if mmap_magic != MMAP_MAGIC || dt_version != DT_NAVMESH_VERSION {
            if options.strict {
                return Err(GeodataError::invalid_magic(
                    file_name,
                    format!("{mmap_magic:#010x}/v{dt_version}"),
                    format!("{MMAP_MAGIC:#010x}/v{DT_NAVMESH_VERSION}"),
                ));
            }
            // counts are guarded below, so a mismatched producer is still
            // worth attempting
            warn!("{file_name}: unexpected mmap header magic, attempting parse anyway");
        }
        if mmap_version != MMAP_VERSION {
            if options.strict {
                return Err(GeodataError::invalid_magic(
                    file_name,
                    format!("map-format v{mmap_version}"),
                    format!("map-format v{MMAP_VERSION}"),
                ));
            }
            warn!("{file_name}: map-format version {mmap_version}, expected {MMAP_VERSION}");
        }

        if size as usize > r.remaining() {
            return Err(GeodataError::corrupt(
                file_name,
                format!(
                    "mesh blob size {size} exceeds remaining {} bytes",
                    r.remaining()
                ),
            ));
        }

        let inner_magic = r.read_u32().map_err(ferr)?;
        let inner_version = r.read_u32().map_err(ferr)?;
        if inner_magic != DT_NAVMESH_MAGIC || inner_version != DT_NAVMESH_VERSION {
            if options.strict {
                return Err(GeodataError::invalid_magic(
                    file_name,
                    format!("{inner_magic:#010x}/v{inner_version}"),
                    format!("{DT_NAVMESH_MAGIC:#010x}/v{DT_NAVMESH_VERSION}"),
                ));
            }
            warn!("{file_name}: unexpected mesh header magic, attempting parse anyway");
        }

        let mut header = NavTileHeader {
            x: r.read_i32().map_err(ferr)?,
            y: r.read_i32().map_err(ferr)?,
            layer: r.read_u32().map_err(ferr)?,
            user_id: r.read_u32().map_err(ferr)?,
            poly_count: r.read_i32().map_err(ferr)?,
            vert_count: r.read_i32().map_err(ferr)?,
            max_link_count: r.read_i32().map_err(ferr)?,
            detail_mesh_count: r.read_i32().map_err(ferr)?,
            detail_vert_count: r.read_i32().map_err(ferr)?,
            detail_tri_count: r.read_i32().map_err(ferr)?,
            bv_node_count: r.read_i32().map_err(ferr)?,
            off_mesh_con_count: r.read_i32().map_err(ferr)?,
            off_mesh_base: r.read_i32().map_err(ferr)?,
            walkable_height: r.read_f32().map_err(ferr)?,
            walkable_radius: r.read_f32().map_err(ferr)?,
            walkable_climb: r.read_f32().map_err(ferr)?,
            ..Default::default()
        };
        header.bounds = r.read_aabox().map_err(ferr)?;
        header.bv_quant_factor = r.read_f32().map_err(ferr)?;

        let vert_count = check_count(file_name, "vertex", header.vert_count)?;
        let poly_count = check_count(file_name, "polygon", header.poly_count)?;
        let link_count = check_count(file_name, "link", header.max_link_count)?;
        let dmesh_count = check_count(file_name, "detail mesh", header.detail_mesh_count)?;
        let dvert_count = check_count(file_name, "detail vertex", header.detail_vert_count)?;
        let dtri_count = check_count(file_name, "detail triangle", header.detail_tri_count)?;
        let bv_count = check_count(file_name, "bv node", header.bv_node_count)?;
        let con_count = check_count(file_name, "off-mesh connection", header.off_mesh_con_count)?;

        let mut verts = Vec::with_capacity(vert_count);
        for _ in 0..vert_count {
            verts.push(r.read_vec3().map_err(ferr)?);
        }

        let mut polys = Vec::with_capacity(poly_count);
        for _ in 0..poly_count {
            let first_link = r.read_u32().map_err(ferr)?;
            let mut poly_verts = [0u16; NAV_VERTS_PER_POLY];
            for v in poly_verts.iter_mut() {
                *v = r.read_u16().map_err(ferr)?;
            }
            let mut neis = [0u16; NAV_VERTS_PER_POLY];
            for n in neis.iter_mut() {
                *n = r.read_u16().map_err(ferr)?;
            }
            polys.push(NavPoly {
                first_link,
                verts: poly_verts,
                neis,
                flags: r.read_u16().map_err(ferr)?,
                vert_count: r.read_u8().map_err(ferr)?,
                area_and_type: r.read_u8().map_err(ferr)?,
            });
        }

        // links are populated at runtime by the original library; the
        // file region is dead weight either way
        r.skip(link_count * LINK_RECORD_SIZE).map_err(ferr)?;

        let mut detail_meshes = Vec::new();
        if options.load_detail_meshes {
            detail_meshes.reserve(dmesh_count);
            for _ in 0..dmesh_count {
                let vert_base = r.read_u32().map_err(ferr)?;
                let tri_base = r.read_u32().map_err(ferr)?;
                let vert_count = r.read_u8().map_err(ferr)?;
                let tri_count = r.read_u8().map_err(ferr)?;
                r.skip(2).map_err(ferr)?;
                detail_meshes.push(NavDetailMesh {
                    vert_base,
                    tri_base,
                    vert_count,
                    tri_count,
                });
            }
        } else {
            r.skip(dmesh_count * 12).map_err(ferr)?;
        }

        let mut detail_verts = Vec::new();
        let mut detail_tris = Vec::new();
        if options.load_detail_meshes {
            detail_verts.reserve(dvert_count);
            for _ in 0..dvert_count {
                detail_verts.push(r.read_vec3().map_err(ferr)?);
            }
            detail_tris.reserve(dtri_count);
            for _ in 0..dtri_count {
                let bytes = r.read_bytes(4).map_err(ferr)?;
                detail_tris.push([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        } else {
            r.skip(dvert_count * 12 + dtri_count * 4).map_err(ferr)?;
        }

        let mut bv_nodes = Vec::new();
        if options.load_bv_tree {
            bv_nodes.reserve(bv_count);
            for _ in 0..bv_count {
                let mut bmin = [0u16; 3];
                let mut bmax = [0u16; 3];
                for v in bmin.iter_mut() {
                    *v = r.read_u16().map_err(ferr)?;
                }
                for v in bmax.iter_mut() {
                    *v = r.read_u16().map_err(ferr)?;
                }
                bv_nodes.push(NavBvNode {
                    bmin,
                    bmax,
                    index: r.read_i32().map_err(ferr)?,
                });
            }
        } else {
            r.skip(bv_count * 16).map_err(ferr)?;
        }

        let mut off_mesh_cons = Vec::new();
        if options.load_off_mesh_connections {
            off_mesh_cons.reserve(con_count);
            for _ in 0..con_count {
                let a = r.read_vec3().map_err(ferr)?;
                let b = r.read_vec3().map_err(ferr)?;
                off_mesh_cons.push(OffMeshConnection {
                    endpoints: [a, b],
                    radius: r.read_f32().map_err(ferr)?,
                    poly: r.read_u16().map_err(ferr)?,
                    flags: r.read_u8().map_err(ferr)?,
                    side: r.read_u8().map_err(ferr)?,
                    user_id: r.read_u32().map_err(ferr)?,
                });
            }
        } else {
            r.skip(con_count * 36).map_err(ferr)?;
        }

        Ok(NavTile {
            uses_liquids,
            header,
            verts,
            polys,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_nodes,
            off_mesh_cons,
        })
    }

    /// Mean of a polygon's vertices. Degenerate vert_count answers the
    /// zero vector rather than dividing by zero.
    pub fn poly_centroid(&self, poly_index: usize) -> Vec3 {
        let poly = &self.polys[poly_index];
        let count = (poly.vert_count as usize).min(NAV_VERTS_PER_POLY);
        if count == 0 {
            return Vec3::ZERO;
        }
        let mut sum = Vec3::ZERO;
        for &vi in &poly.verts[..count] {
            if let Some(v) = self.verts.get(vi as usize) {
                sum = sum.add(*v);
            }
        }
        sum.scale(1.0 / count as f32)
    }

    /// Nearest polygon to the point by 2D centroid distance, within
    /// `radius`. Ties keep the first polygon found in iteration order.
    pub fn nearest_poly(&self, point: Vec3, radius: f32) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for i in 0..self.polys.len() {
            let d = self.poly_centroid(i).distance_2d(point);
            if d <= radius && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }
}

/// All navmesh data loaded for one map: params plus tiles keyed by the
/// tile grid coordinates in their headers.
#[derive(Debug)]
pub struct NavMesh {
    pub params: NavMeshParams,
    tiles: HashMap<(i32, i32), NavTile>,
}

impl NavMesh {
    pub fn new(params: NavMeshParams) -> Self {
        NavMesh {
            params,
            tiles: HashMap::new(),
        }
    }

    /// Load a map's navmesh from its params buffer and tile buffers. The
    /// params file is load-fatal; tiles parse in isolation.
    pub fn load<'a, I>(
        params_name: &str,
        params_data: &[u8],
        tiles: I,
        options: &ParseOptions,
    ) -> Result<(Self, LoadStats)>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let params = NavMeshParams::parse(params_name, params_data)?;
        let mut mesh = NavMesh::new(params);
        let mut stats = LoadStats::default();

        for (name, data) in tiles {
            if options.max_tiles != 0 && stats.tiles_loaded >= options.max_tiles {
                stats.record_warning(format!(
                    "tile limit {} reached, remaining mmap tiles ignored",
                    options.max_tiles
                ));
                break;
            }
            match NavTile::parse(name, data, options) {
                Ok(tile) => {
                    mesh.insert(tile);
                    stats.tiles_loaded += 1;
                }
                Err(e) => {
                    warn!("skipping mmap tile {name}: {e}");
                    stats.tiles_skipped += 1;
                }
            }
        }
        Ok((mesh, stats))
    }

    pub fn insert(&mut self, tile: NavTile) {
        self.tiles.insert((tile.header.x, tile.header.y), tile);
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&NavTile> {
        self.tiles.get(&(x, y))
    }

    /// The tile covering a world point, by coordinate division against
    /// the params origin
    pub fn tile_at(&self, x: f32, y: f32) -> Option<&NavTile> {
        let (tx, ty) = self.params.tile_coords(x, y);
        self.tiles.get(&(tx, ty))
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    pub fn tiles(&self) -> impl Iterator<Item = &NavTile> {
        self.tiles.values()
    }
}
