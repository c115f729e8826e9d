// geoquery - command-line queries over extracted world geometry
// (terrain .map grids, vmap collision trees, mmap navigation meshes)

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use mangos_geodata::height;
use mangos_geodata::math::Vec3;
use mangos_geodata::path::find_path;
use mangos_geodata::validate::{validate_spawns, Spawn};
use mangos_geodata::LoadStats;

mod loader;
mod log;
mod settings;

use loader::MapData;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "geoquery")]
#[command(about = "Query tool for extracted map/vmap/mmap geodata")]
#[command(version)]
struct Cli {
    /// Geodata root containing maps/, vmaps/ and mmaps/
    #[arg(short, long, default_value = "./")]
    geodata: PathBuf,

    /// Map id to load
    #[arg(short, long)]
    map: u32,

    /// Optional JSON settings file (missing fields use defaults)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also log to a daily-rolling file in this directory
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit results as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Number of parser threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize what loaded from each of the three datasets
    Inspect,
    /// Resolve the surface height under a point
    Height(HeightArgs),
    /// Find a walkable path between two points
    Path(PathArgs),
    /// Validate spawn placements from a JSON spawn list
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct HeightArgs {
    #[arg(short, long)]
    x: f32,

    #[arg(short, long)]
    y: f32,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Start position (format: X,Y,Z)
    #[arg(long, value_parser = parse_point)]
    start: Vec3,

    /// Goal position (format: X,Y,Z)
    #[arg(long, value_parser = parse_point)]
    goal: Vec3,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// JSON file holding the spawn list
    #[arg(long)]
    spawns: PathBuf,
}

fn parse_point(input: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = input.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected X,Y,Z, got '{input}'"));
    }
    let coord = |i: usize| -> Result<f32, String> {
        parts[i]
            .trim()
            .parse::<f32>()
            .map_err(|_| format!("invalid coordinate '{}'", parts[i]))
    };
    Ok(Vec3::new(coord(0)?, coord(1)?, coord(2)?))
}

#[derive(Serialize)]
struct InspectReport<'a> {
    map_id: u32,
    terrain_tiles: usize,
    terrain_stats: &'a LoadStats,
    vmap_spawns: Option<usize>,
    vmap_stats: Option<&'a LoadStats>,
    navmesh_tiles: Option<usize>,
    navmesh_stats: Option<&'a LoadStats>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_inspect(cli: &Cli, data: &MapData) -> anyhow::Result<()> {
    let report = InspectReport {
        map_id: cli.map,
        terrain_tiles: data.terrain.len(),
        terrain_stats: &data.terrain_stats,
        vmap_spawns: data.vmap_map().map(|m| m.len()),
        vmap_stats: data.vmap.as_ref().map(|(_, s)| s),
        navmesh_tiles: data.nav_mesh().map(|m| m.len()),
        navmesh_stats: data.navmesh.as_ref().map(|(_, s)| s),
    };
    if cli.json {
        return print_json(&report);
    }
    println!("map {:04}", report.map_id);
    println!(
        "  terrain: {} tiles ({} skipped)",
        report.terrain_tiles, report.terrain_stats.tiles_skipped
    );
    match (report.vmap_spawns, report.vmap_stats) {
        (Some(spawns), Some(stats)) => println!(
            "  vmap:    {} model spawns from {} tiles ({} skipped)",
            spawns, stats.tiles_loaded, stats.tiles_skipped
        ),
        _ => println!("  vmap:    not present"),
    }
    match (report.navmesh_tiles, report.navmesh_stats) {
        (Some(tiles), Some(stats)) => {
            println!("  navmesh: {} tiles ({} skipped)", tiles, stats.tiles_skipped)
        }
        _ => println!("  navmesh: not present"),
    }
    for stats in [Some(&data.terrain_stats), report.vmap_stats, report.navmesh_stats]
        .into_iter()
        .flatten()
    {
        for warning in &stats.warnings {
            println!("  warning: {warning}");
        }
    }
    Ok(())
}

fn run_height(cli: &Cli, data: &MapData, settings: &Settings, args: &HeightArgs) -> anyhow::Result<()> {
    let result = height::resolve(
        args.x,
        args.y,
        Some(&data.terrain),
        data.vmap_map(),
        data.nav_mesh(),
        &settings.height_options(),
    );
    if cli.json {
        return print_json(&result);
    }
    match (result.z, result.source) {
        (Some(z), Some(source)) => {
            println!("height at ({}, {}): {z:.3} ({source:?})", args.x, args.y)
        }
        _ => println!("height at ({}, {}): no data", args.x, args.y),
    }
    for c in &result.vmap_candidates {
        println!(
            "  vmap candidate: spawn {} z={:.3} ray_distance={:.3}",
            c.spawn_index, c.z, c.ray_distance
        );
    }
    Ok(())
}

fn run_path(cli: &Cli, data: &MapData, settings: &Settings, args: &PathArgs) -> anyhow::Result<()> {
    let navmesh = data
        .nav_mesh()
        .with_context(|| format!("map {:04} has no navmesh data", cli.map))?;
    match find_path(navmesh, args.start, args.goal, &settings.path_options()) {
        Ok(path) => {
            if cli.json {
                return print_json(&path);
            }
            println!(
                "path found: {} waypoints, cost {:.3}",
                path.waypoints.len(),
                path.cost
            );
            for (i, w) in path.waypoints.iter().enumerate() {
                println!("  {i:3}: ({:.3}, {:.3}, {:.3})", w.x, w.y, w.z);
            }
        }
        Err(e) => {
            if cli.json {
                return print_json(&e);
            }
            println!("no path: {e}");
        }
    }
    Ok(())
}

fn run_validate(cli: &Cli, data: &MapData, args: &ValidateArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.spawns)
        .with_context(|| format!("reading spawn list {}", args.spawns.display()))?;
    let spawns: Vec<Spawn> = serde_json::from_str(&text)
        .with_context(|| format!("parsing spawn list {}", args.spawns.display()))?;

    let results = validate_spawns(&spawns, Some(&data.terrain), data.vmap_map(), data.nav_mesh());
    if cli.json {
        return print_json(&results);
    }
    let mut invalid = 0;
    for result in &results {
        if result.valid {
            continue;
        }
        invalid += 1;
        println!("spawn {}: invalid", result.spawn_id);
        for f in &result.findings {
            print!("  [{}] {:?}: {}", f.severity, f.kind, f.detail);
            match f.correction {
                Some(c) => println!(
                    " (move {:.1} units to ({:.1}, {:.1}, {:.1}))",
                    c.distance, c.position.x, c.position.y, c.position.z
                ),
                None => println!(),
            }
        }
    }
    println!("{} of {} spawns invalid", invalid, results.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    log::initialize_logging(cli.log_dir.as_deref(), &cli.log_level);

    if let Some(threads) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            tracing::warn!("failed to size thread pool: {e}, using default");
        }
    }

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    info!("loading geodata for map {:04} from {}", cli.map, cli.geodata.display());
    let data = MapData::load(&cli.geodata, cli.map, &settings.parse_options())?;

    match &cli.command {
        Command::Inspect => run_inspect(&cli, &data),
        Command::Height(args) => run_height(&cli, &data, &settings, args),
        Command::Path(args) => run_path(&cli, &data, &settings, args),
        Command::Validate(args) => run_validate(&cli, &data, args),
    }
}
