use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub mod block;
pub mod buildings;
mod builds;
pub mod corpus;
pub mod driver;
mod farms;
mod gates;
mod houses;
mod markets;
pub mod merge;
pub mod record;
pub mod roads;
pub mod select;
pub mod store;
mod touchups;
mod walls;

pub use driver::{drive, Context, Rewrite, RunReport, Targets};
pub use store::{DocumentStore, FsStore};

#[derive(Debug, Error)]
pub enum WorldDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing field: {path}")]
    MissingField { path: String },
    #[error("{what} index {index} is out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("bad file pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("bad file name expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WorldDataError>;

/// How long a usage history lives before it is thrown away.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum UsageScope {
    PerRun,
    PerDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteSettings {
    pub dir: PathBuf,
    pub seed: Option<u64>,
    pub usage_scope: Option<UsageScope>,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            seed: None,
            usage_scope: None,
        }
    }
}

impl RewriteSettings {
    pub(crate) fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

/// One batch job over the working directory. Every parameter defaults to the
/// value the world data tooling has always used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    WallGates { road_data: PathBuf },
    DiagonalGates { road_data: PathBuf },
    RandomWalls { walls_dir: PathBuf, buildings_dir: PathBuf },
    SortWalls { output_dir: PathBuf },
    FixWallOrder,
    RandomHouses { dieps_dir: PathBuf, buildings_dir: PathBuf },
    AddFarms { climate_aware: bool, preferred_chance: f64 },
    VaryFarms,
    DesertSuburbs,
    MarketCombos,
    CollapseMarkets { even_only: bool },
    FixBuilds { vanilla_dir: PathBuf },
    ExportBuildings,
    RestorePawnShop { vanilla_dir: PathBuf },
    ReassignFaction { faction_id: i64, building_type: String },
    AddTravel,
    FlagLights,
    RaiseNpcs,
    FixNames,
    FixAutomap { whole_edge: bool },
    CountFarms,
    CountMarkets,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::WallGates { .. } => "wall-gates",
            Job::DiagonalGates { .. } => "diagonal-gates",
            Job::RandomWalls { .. } => "random-walls",
            Job::SortWalls { .. } => "sort-walls",
            Job::FixWallOrder => "fix-wall-order",
            Job::RandomHouses { .. } => "random-houses",
            Job::AddFarms { .. } => "add-farms",
            Job::VaryFarms => "vary-farms",
            Job::DesertSuburbs => "desert-suburbs",
            Job::MarketCombos => "market-combos",
            Job::CollapseMarkets { .. } => "collapse-markets",
            Job::FixBuilds { .. } => "fix-builds",
            Job::ExportBuildings => "export-buildings",
            Job::RestorePawnShop { .. } => "restore-pawn-shop",
            Job::ReassignFaction { .. } => "reassign-faction",
            Job::AddTravel => "add-travel",
            Job::FlagLights => "flag-lights",
            Job::RaiseNpcs => "raise-npcs",
            Job::FixNames => "fix-names",
            Job::FixAutomap { .. } => "fix-automap",
            Job::CountFarms => "count-farms",
            Job::CountMarkets => "count-markets",
        }
    }

    // Keeps the random streams of different jobs apart for the same seed.
    fn salt(&self) -> u64 {
        self.name()
            .bytes()
            .fold(0xCBF2_9CE4_8422_2325_u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01B3)
            })
    }
}

fn build_rewrite(settings: &RewriteSettings, job: &Job) -> Result<Box<dyn Rewrite>> {
    let scope = settings.usage_scope;
    let rewrite: Box<dyn Rewrite> = match job {
        Job::WallGates { road_data } => Box::new(gates::WallGates::new(
            roads::RoadMap::load(&settings.resolve(road_data))?,
        )),
        Job::DiagonalGates { road_data } => Box::new(gates::DiagonalGates::new(
            roads::RoadMap::load(&settings.resolve(road_data))?,
        )),
        Job::RandomWalls {
            walls_dir,
            buildings_dir,
        } => Box::new(walls::RandomWalls::new(
            &settings.resolve(walls_dir),
            settings.resolve(buildings_dir),
        )?),
        Job::SortWalls { output_dir } => {
            Box::new(walls::SortWalls::new(settings.resolve(output_dir)))
        }
        Job::FixWallOrder => Box::new(walls::FixWallOrder),
        Job::RandomHouses {
            dieps_dir,
            buildings_dir,
        } => Box::new(houses::RandomHouses::new(
            &settings.resolve(dieps_dir),
            settings.resolve(buildings_dir),
        )?),
        Job::AddFarms {
            climate_aware,
            preferred_chance,
        } => {
            if !(0.0..=1.0).contains(preferred_chance) {
                return Err(WorldDataError::Config(format!(
                    "preferred chance must be within 0..=1, got {preferred_chance}"
                )));
            }
            Box::new(farms::AddFarms::new(
                *climate_aware,
                *preferred_chance,
                scope.unwrap_or(UsageScope::PerDocument),
            ))
        }
        Job::VaryFarms => Box::new(farms::VaryFarms),
        Job::DesertSuburbs => Box::new(farms::DesertSuburbs),
        Job::MarketCombos => Box::new(markets::MarketCombos::new(
            scope.unwrap_or(UsageScope::PerRun),
        )),
        Job::CollapseMarkets { even_only } => {
            Box::new(markets::CollapseMarkets { even_only: *even_only })
        }
        Job::FixBuilds { vanilla_dir } => {
            Box::new(builds::FixBuilds::new(settings.resolve(vanilla_dir)))
        }
        Job::ExportBuildings => Box::new(builds::ExportBuildings),
        Job::RestorePawnShop { vanilla_dir } => {
            Box::new(builds::RestorePawnShop::new(settings.resolve(vanilla_dir)))
        }
        Job::ReassignFaction {
            faction_id,
            building_type,
        } => {
            let building_type = buildings::BuildingType::from_name(building_type).ok_or_else(
                || WorldDataError::Config(format!("unknown building type: {building_type}")),
            )?;
            Box::new(builds::ReassignFaction::new(*faction_id, building_type))
        }
        Job::AddTravel => Box::new(touchups::AddTravel::default()),
        Job::FlagLights => Box::new(touchups::FlagLights),
        Job::RaiseNpcs => Box::new(touchups::RaiseNpcs),
        Job::FixNames => Box::new(touchups::FixNames),
        Job::FixAutomap { whole_edge } => Box::new(touchups::FixAutomap::new(*whole_edge)),
        Job::CountFarms => Box::new(markets::CountFarms::default()),
        Job::CountMarkets => Box::new(markets::CountMarkets::default()),
    };
    Ok(rewrite)
}

pub fn run(settings: &RewriteSettings, job: &Job) -> Result<RunReport> {
    if !settings.dir.is_dir() {
        return Err(WorldDataError::Config(format!(
            "Working directory does not exist: {}",
            settings.dir.display()
        )));
    }

    let seed = settings.seed.unwrap_or_else(rand::random);
    info!(job = job.name(), seed, "starting run");

    let mut rewrite = build_rewrite(settings, job)?;
    let mut rng = StdRng::seed_from_u64(seed ^ job.salt());
    let mut store = FsStore;

    drive(rewrite.as_mut(), &mut store, &settings.dir, &mut rng)
}
