// VMap .vmtree/.vmtile parser and the BIH spatial index over spawns
// The tree is built offline by the assembler; this side only decodes it,
// falling back to a linear scan when the packed body cannot be decoded

use std::collections::HashMap;

use tracing::warn;

use crate::error::{GeodataError, ReadError, Result};
use crate::math::{AaBox, Vec3};
use crate::reader::ByteReader;
use crate::{LoadStats, ParseOptions};

/// Version magics this parser accepts. Membership check, no era branching.
pub const VMAP_MAGICS: [&[u8; 8]; 3] = [b"VMAP_4.0", b"VMAP_6.0", b"VMAP_7.0"];

const NODE_MARKER: &[u8; 4] = b"NODE";

pub const MOD_M2: u32 = 1;
pub const MOD_WORLDSPAWN: u32 = 1 << 1;
pub const MOD_HAS_BOUND: u32 = 1 << 2;

/// Guard against misaligned reads cascading into huge allocations
const MAX_SPAWN_COUNT: u32 = 100_000;
const MAX_TREE_LEN: u32 = 1_000_000;
const MAX_NAME_LEN: u32 = 500;

fn is_supported_magic(magic: &[u8]) -> bool {
    VMAP_MAGICS.iter().any(|m| &magic[..] == &m[..])
}

/// One placed instance of collision geometry. Immutable once parsed;
/// identity is `id`. `tree_slot` is the spawn's slot in the map tree's
/// objects array, linking tile files back to the offline index.
#[derive(Debug, Clone)]
pub struct ModelSpawn {
    pub flags: u32,
    pub adt_id: u16,
    pub id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
    /// Zero box when the file carries no MOD_HAS_BOUND flag
    pub bound: AaBox,
    pub name: String,
    pub tree_slot: u32,
}

impl ModelSpawn {
    pub fn has_bound(&self) -> bool {
        self.flags & MOD_HAS_BOUND != 0
    }

    fn read(file_name: &str, r: &mut ByteReader<'_>) -> Result<ModelSpawn> {
        let ferr = |e: ReadError| e.in_file(file_name);
        let flags = r.read_u32().map_err(ferr)?;
        let adt_id = r.read_u16().map_err(ferr)?;
        let id = r.read_u32().map_err(ferr)?;
        let position = r.read_vec3().map_err(ferr)?;
        let rotation = r.read_vec3().map_err(ferr)?;
        let scale = r.read_f32().map_err(ferr)?;

        let bound = if flags & MOD_HAS_BOUND != 0 {
            r.read_aabox().map_err(ferr)?
        } else {
            AaBox::ZERO
        };

        let name_len = r.read_u32().map_err(ferr)?;
        if name_len > MAX_NAME_LEN {
            return Err(GeodataError::corrupt(
                file_name,
                format!("spawn name length {name_len} exceeds {MAX_NAME_LEN}"),
            ));
        }
        let name = r.read_fixed_string(name_len as usize).map_err(ferr)?;
        let tree_slot = r.read_u32().map_err(ferr)?;

        Ok(ModelSpawn {
            flags,
            adt_id,
            id,
            position,
            rotation,
            scale,
            bound,
            name,
            tree_slot,
        })
    }
}

/// Decoded BIH node. The on-disk form is a flat u32 array in triplets;
/// decoding turns it into something the query can walk without bit math.
#[derive(Debug, Clone, PartialEq)]
pub enum BihNode {
    /// Interval split: visit left when the query reaches below `clip_lo`,
    /// right when it reaches above `clip_hi` (both children possible)
    Split {
        axis: usize,
        clip_lo: f32,
        clip_hi: f32,
        left: usize,
        right: usize,
    },
    /// Contiguous run of slots in the objects array
    Leaf { first: usize, count: usize },
}

/// The spatial index, or the explicit statement that it could not be
/// decoded. Unavailable trees answer every query by linear scan; both
/// paths must yield the same set.
#[derive(Debug, Clone)]
pub enum BihTree {
    Available {
        nodes: Vec<BihNode>,
        objects: Vec<u32>,
    },
    Unavailable,
}

impl BihTree {
    pub fn is_available(&self) -> bool {
        matches!(self, BihTree::Available { .. })
    }

    /// Decode the packed triplet array. Any shape this decoder does not
    /// understand (bad child index, out-of-range slot, the bit-29
    /// single-child clip variant some producers emit) yields Unavailable
    /// rather than an error: the load must survive, only query cost grows.
    fn decode(tree: &[u32], objects: Vec<u32>) -> BihTree {
        if tree.is_empty() || tree.len() % 3 != 0 {
            return BihTree::Unavailable;
        }

        let mut nodes = Vec::with_capacity(tree.len() / 3);
        for n in (0..tree.len()).step_by(3) {
            let w = tree[n];
            let kind = w >> 30;
            if kind == 3 {
                let first = (w & 0x3FFF_FFFF) as usize;
                let count = tree[n + 1] as usize;
                // an empty leaf with a dangling start index is just as
                // unusable: slicing objects[first..] would panic
                if first + count > objects.len() {
                    return BihTree::Unavailable;
                }
                nodes.push(BihNode::Leaf { first, count });
            } else {
                if w & (1 << 29) != 0 {
                    // single-child clip node, layout undocumented
                    return BihTree::Unavailable;
                }
                let left = (w & 0x3FFF_FFFF) as usize;
                // the right child's triplet must fit inside the array
                if left % 3 != 0 || left + 6 > tree.len() {
                    return BihTree::Unavailable;
                }
                nodes.push(BihNode::Split {
                    axis: kind as usize,
                    clip_lo: f32::from_bits(tree[n + 1]),
                    clip_hi: f32::from_bits(tree[n + 2]),
                    left: left / 3,
                    right: left / 3 + 1,
                });
            }
        }

        BihTree::Available { nodes, objects }
    }
}

/// Parsed `.vmtree` file: global bounds plus the offline index.
#[derive(Debug, Clone)]
pub struct VmapTree {
    pub tiled: bool,
    pub bounds: AaBox,
    pub tree: BihTree,
}

impl VmapTree {
    /// Parse the per-map tree file. A bad magic or marker is always fatal
    /// (nothing downstream is interpretable); an undecodable packed body
    /// is not — it degrades to `BihTree::Unavailable`.
    pub fn parse(file_name: &str, data: &[u8]) -> Result<VmapTree> {
        let ferr = |e: ReadError| e.in_file(file_name);
        let mut r = ByteReader::new(data);

        let magic = r.read_bytes(8).map_err(ferr)?;
        if !is_supported_magic(magic) {
            return Err(GeodataError::invalid_magic(
                file_name,
                String::from_utf8_lossy(magic),
                "VMAP_4.0/VMAP_6.0/VMAP_7.0",
            ));
        }
        let tiled = r.read_u8().map_err(ferr)? != 0;
        let marker = r.read_bytes(4).map_err(ferr)?;
        if marker != NODE_MARKER {
            return Err(GeodataError::invalid_magic(
                file_name,
                String::from_utf8_lossy(marker),
                "NODE",
            ));
        }

        let bounds = r.read_aabox().map_err(ferr)?;

        let tree_len = r.read_u32().map_err(ferr)?;
        if tree_len > MAX_TREE_LEN {
            return Err(GeodataError::corrupt(
                file_name,
                format!("tree array length {tree_len} exceeds {MAX_TREE_LEN}"),
            ));
        }
        let mut packed = Vec::with_capacity(tree_len as usize);
        for _ in 0..tree_len {
            packed.push(r.read_u32().map_err(ferr)?);
        }

        let obj_len = r.read_u32().map_err(ferr)?;
        if obj_len > MAX_TREE_LEN {
            return Err(GeodataError::corrupt(
                file_name,
                format!("objects array length {obj_len} exceeds {MAX_TREE_LEN}"),
            ));
        }
        let mut objects = Vec::with_capacity(obj_len as usize);
        for _ in 0..obj_len {
            objects.push(r.read_u32().map_err(ferr)?);
        }

        let tree = BihTree::decode(&packed, objects);
        if !tree.is_available() {
            warn!("{file_name}: packed tree body not decodable, queries fall back to linear scan");
        }

        Ok(VmapTree {
            tiled,
            bounds,
            tree,
        })
    }
}

/// Parsed `.vmtile` file: the spawns of one grid cell.
#[derive(Debug, Clone)]
pub struct VmapTile {
    pub tile_x: u32,
    pub tile_y: u32,
    pub spawns: Vec<ModelSpawn>,
}

impl VmapTile {
    pub fn parse(file_name: &str, data: &[u8], options: &ParseOptions) -> Result<VmapTile> {
        let (_, tile_x, tile_y) = crate::terrain::parse_grid_filename(file_name)?;
        let ferr = |e: ReadError| e.in_file(file_name);
        let mut r = ByteReader::new(data);

        let magic = r.read_bytes(8).map_err(ferr)?;
        if !is_supported_magic(magic) {
            if options.strict {
                return Err(GeodataError::invalid_magic(
                    file_name,
                    String::from_utf8_lossy(magic),
                    "VMAP_4.0/VMAP_6.0/VMAP_7.0",
                ));
            }
            // spawn records are self-describing, so an unknown producer
            // version is still worth attempting; the count and name-length
            // guards catch actual layout drift
            warn!("{file_name}: unknown vmtile magic, attempting parse anyway");
        }

        let count = r.read_u32().map_err(ferr)?;
        if count > MAX_SPAWN_COUNT {
            return Err(GeodataError::corrupt(
                file_name,
                format!("spawn count {count} exceeds {MAX_SPAWN_COUNT}"),
            ));
        }

        let mut spawns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            spawns.push(ModelSpawn::read(file_name, &mut r)?);
        }

        Ok(VmapTile {
            tile_x,
            tile_y,
            spawns,
        })
    }
}

/// All collision data loaded for one map: the tree file plus every tile's
/// spawns, with the slot indirection the tree leaves resolve through.
#[derive(Debug)]
pub struct VmapMap {
    pub tree: VmapTree,
    spawns: Vec<ModelSpawn>,
    slot_to_index: HashMap<u32, usize>,
}

impl VmapMap {
    pub fn new(tree: VmapTree) -> Self {
        VmapMap {
            tree,
            spawns: Vec::new(),
            slot_to_index: HashMap::new(),
        }
    }

    /// Load a map from its tree buffer and tile buffers. The tree file is
    /// load-fatal; each tile parses in isolation and a bad one is skipped,
    /// logged, and counted in the stats.
    pub fn load<'a, I>(
        tree_name: &str,
        tree_data: &[u8],
        tiles: I,
        options: &ParseOptions,
    ) -> Result<(Self, LoadStats)>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let tree = VmapTree::parse(tree_name, tree_data)?;
        let mut map = VmapMap::new(tree);
        let mut stats = LoadStats::default();
        if !map.tree.tree.is_available() {
            stats.record_warning(format!("{tree_name}: tree unavailable, linear scan in use"));
        }

        for (name, data) in tiles {
            if options.max_tiles != 0 && stats.tiles_loaded >= options.max_tiles {
                stats.record_warning(format!(
                    "tile limit {} reached, remaining vmap tiles ignored",
                    options.max_tiles
                ));
                break;
            }
            match VmapTile::parse(name, data, options) {
                Ok(tile) => {
                    map.add_tile(tile);
                    stats.tiles_loaded += 1;
                }
                Err(e) => {
                    warn!("skipping vmap tile {name}: {e}");
                    stats.tiles_skipped += 1;
                }
            }
        }
        Ok((map, stats))
    }

    /// Merge a parsed tile's spawns. Spawns shared between tiles (the same
    /// id can sit on a grid border) are kept once, keyed by tree slot.
    pub fn add_tile(&mut self, tile: VmapTile) {
        for spawn in tile.spawns {
            if self.slot_to_index.contains_key(&spawn.tree_slot) {
                continue;
            }
            self.slot_to_index.insert(spawn.tree_slot, self.spawns.len());
            self.spawns.push(spawn);
        }
    }

    pub fn spawns(&self) -> &[ModelSpawn] {
        &self.spawns
    }

    pub fn len(&self) -> usize {
        self.spawns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty()
    }

    pub fn clear(&mut self) {
        self.spawns.clear();
        self.slot_to_index.clear();
    }

    /// Indices of every loaded spawn whose box intersects the query box,
    /// sorted. Walks the tree when one decoded; otherwise scans linearly.
    /// Both paths return the same set.
    pub fn spawns_in_box(&self, query: &AaBox) -> Vec<usize> {
        let mut out = match &self.tree.tree {
            BihTree::Available { nodes, objects } => {
                let mut out = Vec::new();
                self.query_node(nodes, objects, 0, query, &mut out);
                out
            }
            BihTree::Unavailable => self.linear_query(query),
        };
        out.sort_unstable();
        out
    }

    /// The fallback path, public so the equivalence property is testable.
    pub fn linear_query(&self, query: &AaBox) -> Vec<usize> {
        self.spawns
            .iter()
            .enumerate()
            .filter(|(_, s)| s.bound.intersects(query))
            .map(|(i, _)| i)
            .collect()
    }

    fn query_node(
        &self,
        nodes: &[BihNode],
        objects: &[u32],
        index: usize,
        query: &AaBox,
        out: &mut Vec<usize>,
    ) {
        let Some(node) = nodes.get(index) else {
            return;
        };
        match node {
            BihNode::Leaf { first, count } => {
                for slot in &objects[*first..*first + *count] {
                    if let Some(&i) = self.slot_to_index.get(slot)
                        && self.spawns[i].bound.intersects(query)
                    {
                        out.push(i);
                    }
                }
            }
            BihNode::Split {
                axis,
                clip_lo,
                clip_hi,
                left,
                right,
            } => {
                if query.min.axis(*axis) <= *clip_lo {
                    self.query_node(nodes, objects, *left, query, out);
                }
                if query.max.axis(*axis) >= *clip_hi {
                    self.query_node(nodes, objects, *right, query, out);
                }
            }
        }
    }
}
