use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use worlddata_core::{run, Job, RewriteSettings, UsageScope};

#[derive(Debug, Parser)]
#[command(name = "WorldData-CLI", version, about = "Batch rewrites for Daggerfall location and RMB block JSON")]
struct Args {
    /// Directory holding the documents to rewrite.
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Seed for every random choice; a fresh one is drawn and logged when omitted.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Overrides how long a job remembers the variants it already used.
    #[arg(long, global = true, value_enum)]
    scope: Option<Scope>,

    /// Log every selection; overrides RUST_LOG.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scope {
    Run,
    Document,
}

impl From<Scope> for UsageScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Run => UsageScope::PerRun,
            Scope::Document => UsageScope::PerDocument,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve WALLAA##.ROAD.RMB gates from the road map.
    WallGates {
        #[arg(long, default_value = "roadData.bytes")]
        road_data: PathBuf,
    },
    /// Open tavern gates for cells reached only by diagonal roads.
    DiagonalGates {
        #[arg(long, default_value = "roadData.bytes")]
        road_data: PathBuf,
    },
    /// Give wall sub-records a random wall from the wall corpus.
    RandomWalls {
        #[arg(long, default_value = "wall")]
        walls_dir: PathBuf,
        #[arg(long, default_value = "dcw")]
        buildings_dir: PathBuf,
    },
    /// File exported wall buildings into the wall corpus.
    SortWalls {
        #[arg(long, default_value = "wall")]
        output_dir: PathBuf,
    },
    /// Restore the wall order of combined wall blocks.
    FixWallOrder,
    /// Give house sub-records a random house from the house corpus.
    RandomHouses {
        #[arg(long, default_value = "diep")]
        dieps_dir: PathBuf,
        #[arg(long, default_value = "buildings")]
        buildings_dir: PathBuf,
    },
    /// Fill empty and wall cells with farms and roads.
    AddFarms {
        /// Pick desert farms (FARMBA) in desert climates.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        climate_aware: bool,
        #[arg(long, default_value_t = 0.67)]
        preferred_chance: f64,
    },
    /// Spread FARMAA10/FARMBA10 over variants 10 to 13.
    VaryFarms,
    /// Switch desert locations to desert farms and taverns.
    DesertSuburbs,
    /// Replace plain markets with combos sized to the town.
    MarketCombos,
    /// Fold numbered markets back to MARKAA00/MARKAA01.
    CollapseMarkets {
        #[arg(long)]
        even_only: bool,
    },
    /// Rebuild location building lists from their blocks.
    FixBuilds {
        #[arg(long, default_value = "vanillaloc")]
        vanilla_dir: PathBuf,
    },
    /// Export every building of every block as a donor file.
    ExportBuildings,
    /// Put PAWNAL03.RMB back where the vanilla location had it.
    RestorePawnShop {
        #[arg(long, default_value = "vanillaloc")]
        vanilla_dir: PathBuf,
    },
    /// Turn a faction's buildings into town houses.
    ReassignFaction {
        #[arg(long, default_value_t = 414)]
        faction_id: i64,
        #[arg(long, default_value = "House2")]
        building_type: String,
    },
    /// Append travel markers from <prefix>-travel.json files.
    AddTravel,
    /// Flag light flats by texture.
    FlagLights,
    /// Move NPC flats from YPos -2 to -4.
    RaiseNpcs,
    /// Set each block's Name to its file name.
    FixNames,
    /// Copy the road edge of the plain wall automaps.
    FixAutomap {
        /// Copy 12 whole rows for north and south walls instead of 12 columns.
        #[arg(long)]
        whole_edge: bool,
    },
    /// Log how often each farm variant is used.
    CountFarms,
    /// Log size statistics of market towns.
    CountMarkets,
}

impl From<Command> for Job {
    fn from(command: Command) -> Self {
        match command {
            Command::WallGates { road_data } => Job::WallGates { road_data },
            Command::DiagonalGates { road_data } => Job::DiagonalGates { road_data },
            Command::RandomWalls {
                walls_dir,
                buildings_dir,
            } => Job::RandomWalls {
                walls_dir,
                buildings_dir,
            },
            Command::SortWalls { output_dir } => Job::SortWalls { output_dir },
            Command::FixWallOrder => Job::FixWallOrder,
            Command::RandomHouses {
                dieps_dir,
                buildings_dir,
            } => Job::RandomHouses {
                dieps_dir,
                buildings_dir,
            },
            Command::AddFarms {
                climate_aware,
                preferred_chance,
            } => Job::AddFarms {
                climate_aware,
                preferred_chance,
            },
            Command::VaryFarms => Job::VaryFarms,
            Command::DesertSuburbs => Job::DesertSuburbs,
            Command::MarketCombos => Job::MarketCombos,
            Command::CollapseMarkets { even_only } => Job::CollapseMarkets { even_only },
            Command::FixBuilds { vanilla_dir } => Job::FixBuilds { vanilla_dir },
            Command::ExportBuildings => Job::ExportBuildings,
            Command::RestorePawnShop { vanilla_dir } => Job::RestorePawnShop { vanilla_dir },
            Command::ReassignFaction {
                faction_id,
                building_type,
            } => Job::ReassignFaction {
                faction_id,
                building_type,
            },
            Command::AddTravel => Job::AddTravel,
            Command::FlagLights => Job::FlagLights,
            Command::RaiseNpcs => Job::RaiseNpcs,
            Command::FixNames => Job::FixNames,
            Command::FixAutomap { whole_edge } => Job::FixAutomap { whole_edge },
            Command::CountFarms => Job::CountFarms,
            Command::CountMarkets => Job::CountMarkets,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    let settings = RewriteSettings {
        dir: args.dir,
        seed: args.seed,
        usage_scope: args.scope.map(UsageScope::from),
    };
    let job = Job::from(args.command);

    match run(&settings, &job) {
        Ok(report) if report.failed > 0 => {
            warn!(job = job.name(), failed = report.failed, "some documents could not be processed");
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(err) => {
            error!(job = job.name(), "{err}");
            std::process::exit(1);
        }
    }
}
