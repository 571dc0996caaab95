use std::path::PathBuf;

use clap::{Args, Command, FromArgMatches as _};
use log::{info, LevelFilter};

use crate::context::Context;
use crate::error::FacsError;
use crate::events::ContextEventsExt;
use crate::needs::ContextNeedsExt;
use crate::parameters::ContextParametersExt;
use crate::random::ContextRandomExt;
use crate::registry::{load_buildings, ContextLocationsExt};
use crate::simulation::{init_simulation, seed_infections, setup_population};

/// Command line arguments for a simulation run
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Optional path for a JSON parameters file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the buildings CSV (type, lon, lat, size per row)
    #[arg(short, long)]
    pub buildings: PathBuf,

    /// Optional path to a needs CSV; a built-in table is used otherwise
    #[arg(short, long)]
    pub needs: Option<PathBuf>,

    /// Directory for the event reports
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Enable logging at the given level (error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,

    /// Number of people, overriding the parameters file
    #[arg(long)]
    pub num_agents: Option<usize>,

    /// Number of people infected on day zero, overriding the parameters file
    #[arg(long)]
    pub initial_infections: Option<usize>,

    /// Number of days to simulate, overriding the parameters file
    #[arg(long)]
    pub days: Option<u32>,
}

impl BaseArgs {
    /// Arguments for a run over `buildings` with every other option at its default.
    #[must_use]
    pub fn new(buildings: PathBuf) -> Self {
        BaseArgs {
            random_seed: 0,
            config: None,
            buildings,
            needs: None,
            output_dir: PathBuf::from("."),
            log_level: None,
            num_agents: None,
            initial_infections: None,
            days: None,
        }
    }
}

fn create_facs_cli() -> Command {
    let cli = Command::new("facs").about("Flu and coronavirus simulator");
    BaseArgs::augment_args(cli)
}

/// Parses the command line and runs a simulation.
///
/// # Errors
/// Returns an error if argument parsing, setup, or the run itself fails
pub fn run_with_args() -> Result<Context, Box<dyn std::error::Error>> {
    let matches = create_facs_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run(args)?)
}

/// Builds the town described by `args`, seeds the epidemic and runs it to the last day.
///
/// # Errors
/// Returns the first error hit while loading inputs or during the run
pub fn run(args: BaseArgs) -> Result<Context, FacsError> {
    if let Some(level) = args.log_level {
        crate::log::set_log_level(level);
    }

    let mut context = Context::new();
    context.init_random(args.random_seed);

    if let Some(config) = &args.config {
        context.init_parameters(config)?;
    }
    let parameters = context.parameters_mut();
    if let Some(num_agents) = args.num_agents {
        parameters.num_agents = num_agents;
    }
    if let Some(initial_infections) = args.initial_infections {
        parameters.initial_infections = initial_infections;
    }
    if let Some(days) = args.days {
        parameters.num_days = days;
    }
    let parameters = context.parameters().clone();
    parameters.validate()?;

    info!("Loading buildings from: {}", args.buildings.display());
    let registry = load_buildings(&args.buildings)?;
    context.init_locations(registry, &parameters.neighbour_limits())?;
    if let Some(needs) = &args.needs {
        context.load_needs(needs)?;
    }
    context.add_event_reports(&args.output_dir)?;

    setup_population(&mut context, parameters.num_agents)?;
    seed_infections(&mut context, parameters.initial_infections)?;
    init_simulation(&mut context);

    context.execute()?;
    info!("Run finished at t={}", context.get_current_time());
    Ok(context)
}
