//! Daily visit planning. Each mobile person turns their needs for the day into concrete visits,
//! one per amenity category they need at least a minute of.
use log::trace;

use crate::context::Context;
use crate::define_rng;
use crate::error::FacsError;
use crate::events::ContextEventsExt;
use crate::location::{LocationId, LocationType};
use crate::measures::ContextMeasuresExt;
use crate::needs::ContextNeedsExt;
use crate::neighbourhood::{Candidate, NearestLocations};
use crate::parameters::ContextParametersExt;
use crate::person::{Person, PersonId};
use crate::population::ContextPopulationExt;
use crate::random::ContextRandomExt;
use crate::registry::ContextLocationsExt;

define_rng!(PlannerRng);

/// One planned visit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visit {
    /// The needs category the visit serves.
    pub kind: LocationType,
    pub location: LocationId,
    pub minutes: f64,
}

pub trait ContextPlannerExt {
    /// Plans the person's visits for today. People who are recovered, immune or dead stay put
    /// and get no visits. Categories with no reachable location are skipped.
    ///
    /// Every planned minute is added to the simulation-wide `visit_minutes` counter.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::UnknownPerson` if there is no such person.
    fn plan_visits(&mut self, person_id: PersonId) -> Result<Vec<Visit>, FacsError>;
}

impl ContextPlannerExt for Context {
    fn plan_visits(&mut self, person_id: PersonId) -> Result<Vec<Visit>, FacsError> {
        let person = self
            .get_person(person_id)
            .cloned()
            .ok_or(FacsError::UnknownPerson(person_id))?;
        if !person.is_mobile() {
            return Ok(Vec::new());
        }

        let needs = self.needs_for(&person);
        let mut visits = Vec::new();
        for (kind, minutes) in LocationType::AMENITIES.into_iter().zip(needs) {
            if minutes < 1.0 {
                continue;
            }
            let Some(target) = route(self, &person, kind) else {
                continue;
            };
            let closure = self.measures().closure_fraction(kind);
            if closure > 0.0
                && !person.is_hospitalised()
                && self.sample_probability(PlannerRng, closure)
            {
                trace!("person {person_id} skips closed {kind}");
                continue;
            }

            self.counters_mut().visit_minutes += minutes;
            let location = match target {
                NearestLocations::Single(candidate) => candidate.location,
                NearestLocations::Candidates(candidates) => choose(self, &candidates),
            };
            visits.push(Visit {
                kind,
                location,
                minutes,
            });
        }
        Ok(visits)
    }
}

/// Where a person goes to satisfy their need for `kind`:
/// hospitalised people go to their own hospital, workers go to the kind of place their job
/// implies instead of an office, grouped people go to their group's location, and everyone else
/// goes to what their home neighbourhood offers.
fn route(context: &mut Context, person: &Person, kind: LocationType) -> Option<NearestLocations> {
    if kind == LocationType::Hospital && person.is_hospitalised() {
        if let Some(hospital) = person.hospital() {
            let size = context.locations().location(hospital)?.size();
            return Some(NearestLocations::Single(Candidate {
                location: hospital,
                size,
            }));
        }
    }
    if kind == LocationType::Office {
        if let Some(workplace) = person.job().workplace() {
            return nearest(context, person, workplace);
        }
    }
    if let Some(group) = person.group(kind) {
        let location = context.locations().location_by_group(kind, group)?;
        let size = context.locations().location(location)?.size();
        return Some(NearestLocations::Single(Candidate { location, size }));
    }
    nearest(context, person, kind)
}

fn nearest(context: &mut Context, person: &Person, kind: LocationType) -> Option<NearestLocations> {
    let weighted = context.parameters().location_type_settings(kind).weighted;
    context
        .locations()
        .nearest_locations(person.home(), kind, weighted)
}

/// Picks one of several candidates in proportion to their size. Falls back to a uniform choice
/// when no candidate has a positive size.
fn choose(context: &Context, candidates: &[Candidate]) -> LocationId {
    let sizes: Vec<f64> = candidates.iter().map(|candidate| candidate.size).collect();
    let index = context
        .sample_weighted(PlannerRng, &sizes)
        .unwrap_or_else(|| context.sample_range(PlannerRng, 0..candidates.len()));
    candidates[index].location
}
