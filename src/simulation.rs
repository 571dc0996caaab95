//! The daily driver. Every simulated day runs in three phases: measures first, then each
//! person's visit plan and health update, and finally the day's summary.
use log::{info, warn};
use rand::seq::IndexedRandom;

use crate::context::Context;
use crate::define_rng;
use crate::disease::ContextDiseaseExt;
use crate::error::FacsError;
use crate::events::ContextEventsExt;
use crate::location::{LocationId, LocationType};
use crate::measures::ContextMeasuresExt;
use crate::parameters::ContextParametersExt;
use crate::person::{HealthStatus, PersonId};
use crate::plan::ExecutionPhase;
use crate::planner::ContextPlannerExt;
use crate::population::ContextPopulationExt;
use crate::random::ContextRandomExt;
use crate::registry::ContextLocationsExt;

define_rng!(SimulationRng);

/// Creates `num_agents` people, each living in a uniformly chosen house.
///
/// # Errors
///
/// Returns `FacsError::InvalidLocation` if there are no houses.
pub fn setup_population(context: &mut Context, num_agents: usize) -> Result<(), FacsError> {
    let houses: Vec<LocationId> = context
        .locations()
        .houses()
        .iter()
        .map(|house| house.id())
        .collect();
    if houses.is_empty() && num_agents > 0 {
        return Err(FacsError::InvalidLocation(
            "Cannot place people without any houses".to_string(),
        ));
    }
    for _ in 0..num_agents {
        let house = houses[context.sample_range(SimulationRng, 0..houses.len())];
        context.add_person(house)?;
    }
    info!("Created {num_agents} people in {} houses", houses.len());
    Ok(())
}

/// Infects `n` susceptible people chosen uniformly at random. Returns who was infected; fewer
/// than `n` if there are not enough susceptible people.
///
/// # Errors
///
/// Returns an error if an infection cannot be logged.
pub fn seed_infections(context: &mut Context, n: usize) -> Result<Vec<PersonId>, FacsError> {
    let susceptible =
        context.query_people(|person| person.status() == HealthStatus::Susceptible);
    if susceptible.len() < n {
        warn!(
            "asked to seed {n} infections but only {} people are susceptible",
            susceptible.len()
        );
    }
    let chosen: Vec<PersonId> = context.sample(SimulationRng, |rng| {
        susceptible.choose_multiple(rng, n).copied().collect()
    });
    for person_id in &chosen {
        context.infect(*person_id, HealthStatus::Exposed, LocationType::House)?;
    }
    Ok(chosen)
}

/// Plans visits and advances the health of every person, in id order.
///
/// # Errors
///
/// Returns the first error hit by any person's update.
pub fn update_people(context: &mut Context, t: f64) -> Result<(), FacsError> {
    let disease = context.parameters().disease.clone();
    for person_id in context.person_ids() {
        context.plan_visits(person_id)?;
        context.progress_condition(person_id, t, &disease)?;
    }
    Ok(())
}

fn abort_on_error(context: &mut Context, result: Result<(), FacsError>) {
    if let Err(error) = result {
        context.abort(error);
    }
}

/// Schedules every day of the run. Any error during a day aborts the run, and `execute` returns
/// it.
pub fn init_simulation(context: &mut Context) {
    context.init_measures();
    let num_days = context.parameters().num_days;

    for day in 0..num_days {
        let t = f64::from(day);
        context.add_plan_with_phase(
            t,
            move |context| {
                let result = context.enact_measures(day);
                abort_on_error(context, result);
            },
            ExecutionPhase::First,
        );
        context.add_plan(t, move |context| {
            let result = update_people(context, t);
            abort_on_error(context, result);
        });
        context.add_plan_with_phase(
            t,
            |context| {
                let result = context.report_daily_summary().map(|_| ());
                abort_on_error(context, result);
            },
            ExecutionPhase::Last,
        );
    }
    info!("Scheduled {num_days} days");
}
