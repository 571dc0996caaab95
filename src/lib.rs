//! An agent-based simulator for the spread of flu and coronavirus through a town.
//!
//! The town is a set of houses and amenities (offices, schools, hospitals, leisure venues,
//! shops, supermarkets and parks) read from a buildings file. Every person lives in a house and
//! each day plans visits to nearby amenities according to their needs, while a per-person
//! health state machine moves them through
//! susceptible, exposed, infectious, recovered, immune and dead.
//!
//! The central object is the `Context`, which keeps simulated time, runs scheduled plans in
//! order and holds each module's data. The simulation-specific modules build on it:
//! * `registry` and `neighbourhood` hold the locations and each house's nearest amenities
//! * `population` creates people and assigns them to houses and groups
//! * `needs` and `planner` turn a person's daily needs into visits
//! * `disease` advances each person's health
//! * `measures` applies closures, distancing, masks, variants and vaccination over time
//! * `events` writes infections, hospitalisations, recoveries, deaths and daily summaries
//! * `simulation` and `runner` tie a whole run together
pub mod context;
pub use context::Context;

pub mod disease;
pub mod error;
pub mod events;
pub mod geometry;
pub mod global_properties;
pub mod hashing;
pub mod location;
pub mod log;
pub mod measures;
pub mod needs;
pub mod neighbourhood;
pub mod parameters;
pub mod person;
pub mod plan;
pub mod planner;
pub mod population;
pub mod random;
pub mod registry;
pub mod report;
pub mod runner;
pub mod simulation;

pub use error::FacsError;

// Re-exports used by the exported macros.
pub use paste;
pub use rand;

/// The context extension traits, for use with `use facs::prelude::*;`.
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::disease::ContextDiseaseExt;
    pub use crate::error::FacsError;
    pub use crate::events::ContextEventsExt;
    pub use crate::global_properties::ContextGlobalPropertiesExt;
    pub use crate::measures::ContextMeasuresExt;
    pub use crate::needs::ContextNeedsExt;
    pub use crate::parameters::ContextParametersExt;
    pub use crate::planner::ContextPlannerExt;
    pub use crate::population::ContextPopulationExt;
    pub use crate::random::ContextRandomExt;
    pub use crate::registry::ContextLocationsExt;
    pub use crate::report::ContextReportExt;
}
