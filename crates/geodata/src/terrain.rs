// Terrain .map tile parser - GridMap height/area/liquid sections
// One file covers one 533.33-unit grid cell; heights come as a flat
// plane, quantized u8/u16 grids, or raw f32 V9+V8 grids

use std::collections::HashMap;

use tracing::warn;

use crate::error::{GeodataError, ReadError, Result};
use crate::reader::ByteReader;
use crate::{GRID_CENTER, GRID_SIZE, LoadStats, MAX_GRIDS, ParseOptions, V8_SIZE, V9_SIZE};

const MAP_MAGIC: u32 = u32::from_le_bytes(*b"MAPS");
const MAP_VERSION_MAGIC: u32 = u32::from_le_bytes(*b"s1.4");
const MAP_AREA_MAGIC: u32 = u32::from_le_bytes(*b"AREA");
const MAP_HEIGHT_MAGIC: u32 = u32::from_le_bytes(*b"MHGT");
const MAP_LIQUID_MAGIC: u32 = u32::from_le_bytes(*b"MLIQ");

const MAP_AREA_NO_AREA: u16 = 0x0001;

pub const MAP_HEIGHT_NO_HEIGHT: u32 = 0x0001;
pub const MAP_HEIGHT_AS_INT16: u32 = 0x0002;
pub const MAP_HEIGHT_AS_INT8: u32 = 0x0004;

const MAP_LIQUID_NO_TYPE: u8 = 0x01;
const MAP_LIQUID_NO_HEIGHT: u8 = 0x02;

pub const MAP_LIQUID_TYPE_MAGMA: u8 = 0x01;
pub const MAP_LIQUID_TYPE_OCEAN: u8 = 0x02;
pub const MAP_LIQUID_TYPE_SLIME: u8 = 0x04;
pub const MAP_LIQUID_TYPE_WATER: u8 = 0x08;
pub const MAP_LIQUID_TYPE_DEEP_WATER: u8 = 0x10;

const ADT_CELLS_PER_GRID: usize = 16;
const V9_SIZE_SQ: usize = V9_SIZE * V9_SIZE;
const V8_SIZE_SQ: usize = V8_SIZE * V8_SIZE;

const HEIGHT_HEADER_SIZE: u32 = 16;

/// Derive `(map_id, grid_x, grid_y)` from the 4-2-2 digit file name
/// convention shared by all three tile formats, e.g. `0530_31_18.map`.
pub fn parse_grid_filename(name: &str) -> Result<(u32, u32, u32)> {
    let stem = name.split('.').next().unwrap_or(name);
    let bad = || GeodataError::InvalidFilename(name.to_string());

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 3 || parts[0].len() != 4 || parts[1].len() != 2 || parts[2].len() != 2 {
        return Err(bad());
    }
    for part in &parts {
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
    }
    let map_id = parts[0].parse::<u32>().map_err(|_| bad())?;
    let grid_x = parts[1].parse::<u32>().map_err(|_| bad())?;
    let grid_y = parts[2].parse::<u32>().map_err(|_| bad())?;
    Ok((map_id, grid_x, grid_y))
}

/// Grid index covering a world coordinate, None outside the 64x64 grid
pub fn grid_index(coord: f32) -> Option<u32> {
    let g = (GRID_CENTER - coord / GRID_SIZE).floor();
    if g >= 0.0 && g < MAX_GRIDS as f32 {
        Some(g as u32)
    } else {
        None
    }
}

/// Height payload of one tile. Both grids are always materialized, so
/// lookups never branch on which sub-grid the file actually stored:
/// flat tiles fill both with `grid_height`, V9-only files replicate V9
/// corner values into V8.
#[derive(Debug, Clone)]
pub struct HeightGrid {
    pub flags: u32,
    pub grid_height: f32,
    pub grid_max_height: f32,
    v9: Vec<f32>,
    v8: Vec<f32>,
}

impl HeightGrid {
    pub(crate) fn flat(grid_height: f32) -> Self {
        HeightGrid {
            flags: MAP_HEIGHT_NO_HEIGHT,
            grid_height,
            grid_max_height: grid_height,
            v9: vec![grid_height; V9_SIZE_SQ],
            v8: vec![grid_height; V8_SIZE_SQ],
        }
    }

    fn v9(&self, xi: usize, yi: usize) -> f32 {
        self.v9[xi * V9_SIZE + yi]
    }

    fn v8(&self, xi: usize, yi: usize) -> f32 {
        self.v8[xi * V8_SIZE + yi]
    }
}

/// Area section: either a flat id for the whole grid or a 16x16 id grid
#[derive(Debug, Clone)]
pub struct AreaData {
    pub flags: u16,
    pub grid_area: u16,
    pub ids: Option<Vec<u16>>,
}

/// Liquid section: 16x16 per-cell types plus an optional height rectangle
#[derive(Debug, Clone)]
pub struct LiquidData {
    pub entries: Vec<u16>,
    pub type_flags: Vec<u8>,
    pub level: f32,
    pub offset_x: u8,
    pub offset_y: u8,
    pub width: u8,
    pub height: u8,
    pub heights: Option<Vec<f32>>,
}

/// What the liquid lookup answers for one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidSample {
    pub type_flags: u8,
    pub entry: u16,
    pub level: f32,
}

/// One parsed terrain tile, keyed by its grid coordinates.
#[derive(Debug, Clone)]
pub struct TerrainTile {
    pub map_id: u32,
    pub grid_x: u32,
    pub grid_y: u32,
    pub height: HeightGrid,
    pub area: Option<AreaData>,
    pub liquid: Option<LiquidData>,
    /// Permissive-mode downgrades recorded during the parse
    pub warnings: Vec<String>,
}

impl TerrainTile {
    /// Parse one tile buffer. The file name supplies the tile key and is
    /// validated first; a bad name fails even in permissive mode.
    pub fn parse(file_name: &str, data: &[u8], options: &ParseOptions) -> Result<TerrainTile> {
        let (map_id, grid_x, grid_y) = parse_grid_filename(file_name)?;
        let ferr = |e: ReadError| e.in_file(file_name);
        let mut warnings = Vec::new();

        let mut r = ByteReader::new(data);
        let map_magic = r.read_u32().map_err(ferr)?;
        let version_magic = r.read_u32().map_err(ferr)?;
        let area_offset = r.read_u32().map_err(ferr)?;
        let area_size = r.read_u32().map_err(ferr)?;
        let height_offset = r.read_u32().map_err(ferr)?;
        let height_size = r.read_u32().map_err(ferr)?;
        let liquid_offset = r.read_u32().map_err(ferr)?;
        let liquid_size = r.read_u32().map_err(ferr)?;
        let _holes_offset = r.read_u32().map_err(ferr)?;
        let _holes_size = r.read_u32().map_err(ferr)?;

        if map_magic != MAP_MAGIC || version_magic != MAP_VERSION_MAGIC {
            if options.strict {
                return Err(GeodataError::invalid_magic(
                    file_name,
                    format!("{map_magic:#010x}/{version_magic:#010x}"),
                    format!("{MAP_MAGIC:#010x}/{MAP_VERSION_MAGIC:#010x}"),
                ));
            }
            // Downgrade: keep whatever grid_height the height header still
            // yields and answer that everywhere.
            let grid_height = best_effort_grid_height(data, height_offset).unwrap_or(0.0);
            let msg = format!("{file_name}: unsupported map magic, downgraded to flat tile");
            warn!("{msg}");
            warnings.push(msg);
            return Ok(TerrainTile {
                map_id,
                grid_x,
                grid_y,
                height: HeightGrid::flat(grid_height),
                area: None,
                liquid: None,
                warnings,
            });
        }

        let height = if height_offset == 0 || height_size == 0 {
            let msg = format!("{file_name}: no height section, assuming flat tile at 0");
            warn!("{msg}");
            warnings.push(msg);
            HeightGrid::flat(0.0)
        } else {
            parse_height_section(file_name, data, height_offset, height_size, options)?
        };

        let area = if area_offset == 0 || area_size == 0 {
            None
        } else {
            match parse_area_section(file_name, data, area_offset) {
                Ok(area) => Some(area),
                Err(e) if !options.strict => {
                    let msg = format!("{file_name}: area section dropped: {e}");
                    warn!("{msg}");
                    warnings.push(msg);
                    None
                }
                Err(e) => return Err(e),
            }
        };

        let liquid = if liquid_offset == 0 || liquid_size == 0 {
            None
        } else {
            match parse_liquid_section(file_name, data, liquid_offset) {
                Ok(liquid) => Some(liquid),
                Err(e) if !options.strict => {
                    let msg = format!("{file_name}: liquid section dropped: {e}");
                    warn!("{msg}");
                    warnings.push(msg);
                    None
                }
                Err(e) => return Err(e),
            }
        };

        Ok(TerrainTile {
            map_id,
            grid_x,
            grid_y,
            height,
            area,
            liquid,
            warnings,
        })
    }

    /// Whether this tile's grid cell contains the world point
    pub fn covers(&self, x: f32, y: f32) -> bool {
        grid_index(x) == Some(self.grid_x) && grid_index(y) == Some(self.grid_y)
    }

    /// Interpolated terrain height at a world point this tile covers.
    ///
    /// Cell-local coordinates select one of the four triangles around the
    /// cell center; the height interpolates two V9 corners and the doubled
    /// V8 center. Out-of-tile input wraps into the grid rather than
    /// reading out of bounds; callers gate on `covers`.
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        let (xi, yi, fx, fy) = cell_local(x, y);

        let h = &self.height;
        let h5 = 2.0 * h.v8(xi, yi);
        let (a, b, c) = if fx + fy < 1.0 {
            if fx > fy {
                let h1 = h.v9(xi, yi);
                let h2 = h.v9(xi + 1, yi);
                (h2 - h1, h5 - h1 - h2, h1)
            } else {
                let h1 = h.v9(xi, yi);
                let h3 = h.v9(xi, yi + 1);
                (h5 - h1 - h3, h3 - h1, h1)
            }
        } else if fx > fy {
            let h2 = h.v9(xi + 1, yi);
            let h4 = h.v9(xi + 1, yi + 1);
            (h2 + h4 - h5, h4 - h2, h5 - h4)
        } else {
            let h3 = h.v9(xi, yi + 1);
            let h4 = h.v9(xi + 1, yi + 1);
            (h4 - h3, h3 + h4 - h5, h5 - h4)
        };
        a * fx + b * fy + c
    }

    /// Area id at a world point, from the 16x16 cell grid or the flat id
    pub fn area_id_at(&self, x: f32, y: f32) -> Option<u16> {
        let area = self.area.as_ref()?;
        match &area.ids {
            Some(ids) => {
                let (cx, cy) = cell_16(x, y);
                Some(ids[cx * ADT_CELLS_PER_GRID + cy])
            }
            None => Some(area.grid_area),
        }
    }

    /// Liquid type and surface level at a world point, None where dry
    pub fn liquid_at(&self, x: f32, y: f32) -> Option<LiquidSample> {
        let liquid = self.liquid.as_ref()?;
        let (cx, cy) = cell_16(x, y);
        let idx = cx * ADT_CELLS_PER_GRID + cy;
        let type_flags = liquid.type_flags[idx];
        if type_flags == 0 {
            return None;
        }

        let mut level = liquid.level;
        if let Some(heights) = &liquid.heights {
            let (xi, yi, _, _) = cell_local(x, y);
            let row = xi.wrapping_sub(liquid.offset_x as usize);
            let col = yi.wrapping_sub(liquid.offset_y as usize);
            if row < liquid.height as usize && col < liquid.width as usize {
                level = heights[row * liquid.width as usize + col];
            }
        }
        Some(LiquidSample {
            type_flags,
            entry: liquid.entries[idx],
            level,
        })
    }
}

/// Cell index and in-cell fraction of a world point, wrapped into the grid
fn cell_local(x: f32, y: f32) -> (usize, usize, f32, f32) {
    let lx = V8_SIZE as f32 * (GRID_CENTER - x / GRID_SIZE);
    let ly = V8_SIZE as f32 * (GRID_CENTER - y / GRID_SIZE);
    let xi = (lx.floor() as i64 & (V8_SIZE as i64 - 1)) as usize;
    let yi = (ly.floor() as i64 & (V8_SIZE as i64 - 1)) as usize;
    (xi, yi, lx - lx.floor(), ly - ly.floor())
}

/// 16x16 cell index pair for a world point (8 V8 cells per section cell)
fn cell_16(x: f32, y: f32) -> (usize, usize) {
    let (xi, yi, _, _) = cell_local(x, y);
    (xi / 8, yi / 8)
}

/// Pull grid_height out of a height header that may not be trustworthy
fn best_effort_grid_height(data: &[u8], height_offset: u32) -> Option<f32> {
    let off = height_offset as usize;
    if off == 0 || off + HEIGHT_HEADER_SIZE as usize > data.len() {
        return None;
    }
    let mut r = ByteReader::new(&data[off..]);
    let _fourcc = r.read_u32().ok()?;
    let _flags = r.read_u32().ok()?;
    r.read_f32().ok()
}

fn section_reader<'a>(file_name: &str, data: &'a [u8], offset: u32) -> Result<ByteReader<'a>> {
    let off = offset as usize;
    if off > data.len() {
        return Err(GeodataError::OutOfBounds {
            file: file_name.to_string(),
            offset: off,
            wanted: 1,
            available: 0,
        });
    }
    Ok(ByteReader::new(&data[off..]))
}

fn parse_height_section(
    file_name: &str,
    data: &[u8],
    offset: u32,
    size: u32,
    options: &ParseOptions,
) -> Result<HeightGrid> {
    let ferr = |e: ReadError| e.in_file(file_name);
    let mut r = section_reader(file_name, data, offset)?;
    let fourcc = r.read_u32().map_err(ferr)?;
    let flags = r.read_u32().map_err(ferr)?;
    let grid_height = r.read_f32().map_err(ferr)?;
    let grid_max_height = r.read_f32().map_err(ferr)?;

    if fourcc != MAP_HEIGHT_MAGIC {
        if options.strict {
            return Err(GeodataError::invalid_magic(
                file_name,
                format!("{fourcc:#010x}"),
                format!("{MAP_HEIGHT_MAGIC:#010x}"),
            ));
        }
        warn!("{file_name}: unknown height fourcc, downgraded to flat tile");
        return Ok(HeightGrid::flat(0.0));
    }

    if flags & MAP_HEIGHT_NO_HEIGHT != 0 {
        let mut grid = HeightGrid::flat(grid_height);
        grid.flags = flags;
        grid.grid_max_height = grid_max_height;
        return Ok(grid);
    }

    // The stored size tells whether the file carries both grids or only
    // V9; V9-only payloads replicate each cell's low corner into V8.
    let value_size: usize = if flags & MAP_HEIGHT_AS_INT8 != 0 {
        1
    } else if flags & MAP_HEIGHT_AS_INT16 != 0 {
        2
    } else {
        4
    };
    let full_size = HEIGHT_HEADER_SIZE as usize + (V9_SIZE_SQ + V8_SIZE_SQ) * value_size;
    let has_v8 = size as usize >= full_size;

    let mut v9 = vec![0.0f32; V9_SIZE_SQ];
    let mut v8 = vec![0.0f32; V8_SIZE_SQ];

    if flags & MAP_HEIGHT_AS_INT8 != 0 {
        let multiplier = (grid_max_height - grid_height) / 255.0;
        let raw9 = r.read_bytes(V9_SIZE_SQ).map_err(ferr)?;
        for (v, raw) in v9.iter_mut().zip(raw9) {
            *v = *raw as f32 * multiplier + grid_height;
        }
        if has_v8 {
            let raw8 = r.read_bytes(V8_SIZE_SQ).map_err(ferr)?;
            for (v, raw) in v8.iter_mut().zip(raw8) {
                *v = *raw as f32 * multiplier + grid_height;
            }
        }
    } else if flags & MAP_HEIGHT_AS_INT16 != 0 {
        let multiplier = (grid_max_height - grid_height) / 65535.0;
        for v in v9.iter_mut() {
            *v = r.read_u16().map_err(ferr)? as f32 * multiplier + grid_height;
        }
        if has_v8 {
            for v in v8.iter_mut() {
                *v = r.read_u16().map_err(ferr)? as f32 * multiplier + grid_height;
            }
        }
    } else {
        for v in v9.iter_mut() {
            *v = r.read_f32().map_err(ferr)?;
        }
        if has_v8 {
            for v in v8.iter_mut() {
                *v = r.read_f32().map_err(ferr)?;
            }
        }
    }

    if !has_v8 {
        for xi in 0..V8_SIZE {
            for yi in 0..V8_SIZE {
                v8[xi * V8_SIZE + yi] = v9[xi * V9_SIZE + yi];
            }
        }
    }

    Ok(HeightGrid {
        flags,
        grid_height,
        grid_max_height,
        v9,
        v8,
    })
}

fn parse_area_section(file_name: &str, data: &[u8], offset: u32) -> Result<AreaData> {
    let ferr = |e: ReadError| e.in_file(file_name);
    let mut r = section_reader(file_name, data, offset)?;
    let fourcc = r.read_u32().map_err(ferr)?;
    if fourcc != MAP_AREA_MAGIC {
        return Err(GeodataError::invalid_magic(
            file_name,
            format!("{fourcc:#010x}"),
            format!("{MAP_AREA_MAGIC:#010x}"),
        ));
    }
    let flags = r.read_u16().map_err(ferr)?;
    let grid_area = r.read_u16().map_err(ferr)?;

    let ids = if flags & MAP_AREA_NO_AREA != 0 {
        None
    } else {
        let mut ids = vec![0u16; ADT_CELLS_PER_GRID * ADT_CELLS_PER_GRID];
        for id in ids.iter_mut() {
            *id = r.read_u16().map_err(ferr)?;
        }
        Some(ids)
    };

    Ok(AreaData {
        flags,
        grid_area,
        ids,
    })
}

fn parse_liquid_section(file_name: &str, data: &[u8], offset: u32) -> Result<LiquidData> {
    let ferr = |e: ReadError| e.in_file(file_name);
    let mut r = section_reader(file_name, data, offset)?;
    let fourcc = r.read_u32().map_err(ferr)?;
    if fourcc != MAP_LIQUID_MAGIC {
        return Err(GeodataError::invalid_magic(
            file_name,
            format!("{fourcc:#010x}"),
            format!("{MAP_LIQUID_MAGIC:#010x}"),
        ));
    }
    let flags = r.read_u8().map_err(ferr)?;
    let global_flags = r.read_u8().map_err(ferr)?;
    let global_entry = r.read_u16().map_err(ferr)?;
    let offset_x = r.read_u8().map_err(ferr)?;
    let offset_y = r.read_u8().map_err(ferr)?;
    let width = r.read_u8().map_err(ferr)?;
    let height = r.read_u8().map_err(ferr)?;
    let level = r.read_f32().map_err(ferr)?;

    let cells = ADT_CELLS_PER_GRID * ADT_CELLS_PER_GRID;
    let mut entries = vec![global_entry; cells];
    let mut type_flags = vec![global_flags; cells];
    if flags & MAP_LIQUID_NO_TYPE == 0 {
        for e in entries.iter_mut() {
            *e = r.read_u16().map_err(ferr)?;
        }
        for f in type_flags.iter_mut() {
            *f = r.read_u8().map_err(ferr)?;
        }
    }

    let heights = if flags & MAP_LIQUID_NO_HEIGHT == 0 {
        let count = width as usize * height as usize;
        let mut values = vec![0.0f32; count];
        for v in values.iter_mut() {
            *v = r.read_f32().map_err(ferr)?;
        }
        Some(values)
    } else {
        None
    };

    Ok(LiquidData {
        entries,
        type_flags,
        level,
        offset_x,
        offset_y,
        width,
        height,
        heights,
    })
}

/// Owned cache of parsed tiles for one map, keyed by grid coordinates.
/// Replacing a tile means parsing a fresh one and inserting over the old.
#[derive(Debug, Default)]
pub struct TerrainMap {
    tiles: HashMap<(u32, u32), TerrainTile>,
}

impl TerrainMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and collect a set of tile buffers. A failing tile is skipped,
    /// logged, and counted; it never aborts the load.
    pub fn load<'a, I>(files: I, options: &ParseOptions) -> (Self, LoadStats)
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut map = TerrainMap::new();
        let mut stats = LoadStats::default();
        for (name, data) in files {
            if options.max_tiles != 0 && map.tiles.len() >= options.max_tiles {
                stats.record_warning(format!(
                    "tile limit {} reached, remaining terrain files ignored",
                    options.max_tiles
                ));
                break;
            }
            match TerrainTile::parse(name, data, options) {
                Ok(tile) => {
                    stats.warnings.extend(tile.warnings.iter().cloned());
                    map.insert(tile);
                    stats.tiles_loaded += 1;
                }
                Err(e) => {
                    warn!("skipping terrain tile {name}: {e}");
                    stats.tiles_skipped += 1;
                }
            }
        }
        (map, stats)
    }

    pub fn insert(&mut self, tile: TerrainTile) {
        self.tiles.insert((tile.grid_x, tile.grid_y), tile);
    }

    pub fn get(&self, grid_x: u32, grid_y: u32) -> Option<&TerrainTile> {
        self.tiles.get(&(grid_x, grid_y))
    }

    /// The tile whose grid cell contains the world point, if loaded
    pub fn tile_covering(&self, x: f32, y: f32) -> Option<&TerrainTile> {
        let gx = grid_index(x)?;
        let gy = grid_index(y)?;
        self.tiles.get(&(gx, gy))
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

    pub fn tiles(&self) -> impl Iterator<Item = &TerrainTile> {
        self.tiles.values()
    }
}
