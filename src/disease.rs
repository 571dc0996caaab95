//! The per-person health state machine.
//!
//! A person moves `susceptible -> exposed -> infectious -> recovered | dead`. Severe infectious
//! cases pass through hospital before they resolve. Recovered and vaccine-immune people become
//! susceptible again once their protection wanes, if immunity is configured to wane at all.
//!
//! Timed transitions are checked once a day by `progress_condition`. The countdown for the next
//! transition is stored in `phase_duration` and measured from `status_change_time`.
use log::{debug, trace};
use rand_distr::{Gamma, Poisson};

use crate::context::Context;
use crate::define_rng;
use crate::error::FacsError;
use crate::events::ContextEventsExt;
use crate::location::LocationType;
use crate::parameters::{ContextParametersExt, DiseaseParameters};
use crate::person::{HealthStatus, Person, PersonId};
use crate::population::ContextPopulationExt;
use crate::random::ContextRandomExt;
use crate::registry::ContextLocationsExt;

define_rng!(DiseaseRng);

/// Scale of every gamma-distributed protection period; the shape is `mean / GAMMA_SCALE`.
const GAMMA_SCALE: f64 = 20.0;

/// Vaccine protection periods longer than this many days are gamma distributed, shorter ones
/// are Poisson distributed.
const VACCINE_GAMMA_THRESHOLD: f64 = 100.0;

fn poisson(context: &Context, mean: f64) -> Result<f64, FacsError> {
    if mean <= 0.0 {
        return Ok(0.0);
    }
    let distribution = Poisson::new(mean).map_err(|e| {
        FacsError::InvalidParameter(format!("Poisson mean {mean} is invalid: {e}"))
    })?;
    Ok(context.sample_distr(DiseaseRng, distribution))
}

fn gamma(context: &Context, mean: f64) -> Result<f64, FacsError> {
    let distribution = Gamma::new(mean / GAMMA_SCALE, GAMMA_SCALE).map_err(|e| {
        FacsError::InvalidParameter(format!("Gamma mean {mean} is invalid: {e}"))
    })?;
    Ok(context.sample_distr(DiseaseRng, distribution))
}

/// Countdown drawn from a Poisson distribution, never shorter than one day.
fn countdown(context: &Context, mean: f64) -> Result<f64, FacsError> {
    Ok(poisson(context, mean)?.max(1.0))
}

fn vaccine_protection(context: &Context, duration: f64) -> Result<f64, FacsError> {
    if duration <= 0.0 {
        Ok(f64::INFINITY)
    } else if duration > VACCINE_GAMMA_THRESHOLD {
        Ok(gamma(context, duration)?.max(1.0))
    } else {
        countdown(context, duration)
    }
}

pub trait ContextDiseaseExt {
    /// Infects a susceptible person at the current time. `severity` is normally
    /// `HealthStatus::Exposed`; seeding may insert cases directly as `Infectious`.
    /// `location_type` labels where the infection happened in the event log.
    ///
    /// Returns whether the person was infected. People who are not susceptible are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the person is unknown, `severity` is neither exposed nor infectious,
    /// or the event cannot be logged.
    fn infect(
        &mut self,
        person_id: PersonId,
        severity: HealthStatus,
        location_type: LocationType,
    ) -> Result<bool, FacsError>;

    /// Vaccinates a susceptible person at `time`. With probability `no_transmission` they
    /// become immune, otherwise with probability `no_symptoms` any future case stays mild.
    /// The protection lasts a period drawn from `duration`; 0 means it never wanes.
    ///
    /// Returns whether the person was vaccinated. Anyone not susceptible is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the person is unknown or `duration` is not a valid mean.
    fn vaccinate(
        &mut self,
        person_id: PersonId,
        time: f64,
        no_symptoms: f64,
        no_transmission: f64,
        duration: f64,
    ) -> Result<bool, FacsError>;

    /// Performs whichever timed transition is due for the person at time `t`. Does nothing if
    /// the person's last status change lies after `t`.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::NoHospital` if a severe case needs a hospital and there is none.
    /// This is fatal for the run.
    fn progress_condition(
        &mut self,
        person_id: PersonId,
        t: f64,
        disease: &DiseaseParameters,
    ) -> Result<(), FacsError>;

    /// Moves the person to `recovered` at the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the person is unknown or the event cannot be logged.
    fn recover(&mut self, person_id: PersonId, location_type: LocationType)
        -> Result<(), FacsError>;
}

impl ContextDiseaseExt for Context {
    fn infect(
        &mut self,
        person_id: PersonId,
        severity: HealthStatus,
        location_type: LocationType,
    ) -> Result<bool, FacsError> {
        if !matches!(severity, HealthStatus::Exposed | HealthStatus::Infectious) {
            return Err(FacsError::InvalidParameter(format!(
                "Cannot infect a person as {severity}"
            )));
        }
        let incubation_period = self.parameters().disease.incubation_period;
        let t = self.get_current_time();

        self.with_person(person_id, |person, context| -> Result<bool, FacsError> {
            if person.status != HealthStatus::Susceptible {
                return Ok(false);
            }
            person.set_status(severity, t);
            person.mild_version = true;
            person.hospitalised = false;
            person.phase_duration = countdown(context, incubation_period)?;
            trace!(
                "person {person_id} infected at t={t}, incubation {}",
                person.phase_duration
            );
            let coords = context.coordinates(person.location)?;
            context.log_infection(coords, location_type, person.phase_duration)?;
            Ok(true)
        })?
    }

    fn vaccinate(
        &mut self,
        person_id: PersonId,
        time: f64,
        no_symptoms: f64,
        no_transmission: f64,
        duration: f64,
    ) -> Result<bool, FacsError> {
        self.with_person(person_id, |person, context| -> Result<bool, FacsError> {
            if person.status != HealthStatus::Susceptible {
                return Ok(false);
            }
            person.phase_duration = vaccine_protection(context, duration)?;
            person.vaccinated = true;
            if context.sample_probability(DiseaseRng, no_transmission) {
                person.set_status(HealthStatus::Immune, time);
            } else {
                person.status_change_time = time;
                if context.sample_probability(DiseaseRng, no_symptoms) {
                    person.symptoms_suppressed = true;
                }
            }
            Ok(true)
        })?
    }

    fn progress_condition(
        &mut self,
        person_id: PersonId,
        t: f64,
        disease: &DiseaseParameters,
    ) -> Result<(), FacsError> {
        self.with_person(person_id, |person, context| {
            advance(person, context, t, disease)
        })?
    }

    fn recover(
        &mut self,
        person_id: PersonId,
        location_type: LocationType,
    ) -> Result<(), FacsError> {
        let immunity_duration = self.parameters().disease.immunity_duration;
        let t = self.get_current_time();
        self.with_person(person_id, |person, context| {
            recover_person(person, context, t, immunity_duration, location_type)
        })?
    }
}

fn recover_person(
    person: &mut Person,
    context: &mut Context,
    t: f64,
    immunity_duration: f64,
    location_type: LocationType,
) -> Result<(), FacsError> {
    if immunity_duration > 0.0 {
        person.phase_duration = gamma(context, immunity_duration)?.max(1.0);
    }
    person.set_status(HealthStatus::Recovered, t);
    trace!("person {} recovered at t={t}", person.id);
    let coords = context.coordinates(person.location)?;
    context.log_recovery(coords, location_type)?;
    Ok(())
}

fn advance(
    person: &mut Person,
    context: &mut Context,
    t: f64,
    disease: &DiseaseParameters,
) -> Result<(), FacsError> {
    if person.status_change_time > t {
        return Ok(());
    }
    let due = person.elapsed(t) >= person.phase_duration;

    match person.status {
        HealthStatus::Exposed => {
            // Incubation is counted in whole days.
            if person.elapsed(t) >= person.phase_duration.trunc() {
                become_infectious(person, context, t, disease)?;
            }
        }
        HealthStatus::Infectious if person.mild_version => {
            if due {
                recover_person(person, context, t, disease.immunity_duration, LocationType::House)?;
            }
        }
        HealthStatus::Infectious if !person.hospitalised => {
            if due {
                hospitalise(person, context, t, disease)?;
            }
        }
        HealthStatus::Infectious => {
            if due {
                discharge(person, context, t, disease)?;
            }
        }
        HealthStatus::Recovered | HealthStatus::Immune if disease.immunity_duration > 0.0 => {
            if due {
                person.set_status(HealthStatus::Susceptible, t);
                person.symptoms_suppressed = false;
                trace!("person {} susceptible again at t={t}", person.id);
            }
        }
        HealthStatus::Susceptible
        | HealthStatus::Recovered
        | HealthStatus::Immune
        | HealthStatus::Dead => {}
    }
    Ok(())
}

fn become_infectious(
    person: &mut Person,
    context: &mut Context,
    t: f64,
    disease: &DiseaseParameters,
) -> Result<(), FacsError> {
    let incubation = person.phase_duration;
    person.set_status(HealthStatus::Infectious, t);

    let severe = context.sample_probability(
        DiseaseRng,
        disease.hospitalisation_probability(person.age),
    ) && !person.symptoms_suppressed;
    person.mild_version = !severe;

    let period = if severe {
        disease.period_to_hospitalisation
    } else {
        disease.mild_recovery_period
    };
    person.phase_duration = (poisson(context, period)? - incubation).max(1.0);
    trace!(
        "person {} infectious at t={t} ({}), next change in {} days",
        person.id,
        if severe { "severe" } else { "mild" },
        person.phase_duration
    );
    Ok(())
}

fn hospitalise(
    person: &mut Person,
    context: &mut Context,
    t: f64,
    disease: &DiseaseParameters,
) -> Result<(), FacsError> {
    let hospital = context.find_hospital()?;
    person.hospitalised = true;
    person.hospital = Some(hospital);
    context.counters_mut().num_hospitalised += 1;
    let coords = context.coordinates(person.location)?;
    context.log_hospitalisation(coords, person.age)?;

    // The recovery and mortality periods count from admission.
    person.set_status(HealthStatus::Infectious, t);

    let hospitalisation = disease.hospitalisation_probability(person.age);
    let fatality = if hospitalisation > 0.0 {
        disease.mortality_probability(person.age) / hospitalisation
    } else {
        0.0
    };
    person.dying = context.sample_probability(DiseaseRng, fatality);
    let period = if person.dying {
        disease.mortality_period
    } else {
        disease.recovery_period
    };
    person.phase_duration = countdown(context, period)?;
    debug!(
        "person {} admitted to hospital {hospital} at t={t}, dying: {}",
        person.id, person.dying
    );
    Ok(())
}

fn discharge(
    person: &mut Person,
    context: &mut Context,
    t: f64,
    disease: &DiseaseParameters,
) -> Result<(), FacsError> {
    person.hospitalised = false;
    let counters = context.counters_mut();
    counters.num_hospitalised = counters.num_hospitalised.saturating_sub(1);
    let hospital = person.hospital.take();

    if person.dying {
        person.set_status(HealthStatus::Dead, t);
        debug!("person {} died at t={t}", person.id);
        let coords = context.coordinates(hospital.unwrap_or(person.location))?;
        context.log_death(coords, LocationType::Hospital)?;
        Ok(())
    } else {
        recover_person(
            person,
            context,
            t,
            disease.immunity_duration,
            LocationType::Hospital,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LatLon;
    use crate::location::{Amenity, House, LocationId};
    use crate::parameters::ParametersValues;
    use crate::registry::LocationRegistry;
    use std::collections::BTreeMap;

    fn setup(with_hospital: bool) -> (Context, PersonId) {
        let mut context = Context::new();
        context.init_random(11);
        let mut registry = LocationRegistry::new();
        registry
            .add_house(House::new(LocationId(0), LatLon::new(10.0, 10.0).unwrap()))
            .unwrap();
        if with_hospital {
            registry
                .add_amenity(
                    Amenity::new(
                        LocationId(1),
                        LatLon::new(10.01, 10.0).unwrap(),
                        100.0,
                        LocationType::Hospital,
                    )
                    .unwrap(),
                )
                .unwrap();
        }
        context.init_locations(registry, &BTreeMap::new()).unwrap();
        let person_id = context.add_person(LocationId(0)).unwrap();
        (context, person_id)
    }

    fn certain_severe(mortality: f64) -> DiseaseParameters {
        DiseaseParameters {
            hospital: vec![1.0; 91],
            mortality: vec![mortality; 91],
            ..DiseaseParameters::default()
        }
    }

    fn person(context: &Context, person_id: PersonId) -> Person {
        context.get_person(person_id).unwrap().clone()
    }

    /// Advances `person_id` day by day until `done` holds or `days` have passed.
    fn run_until(
        context: &mut Context,
        person_id: PersonId,
        disease: &DiseaseParameters,
        days: u32,
        done: impl Fn(&Person) -> bool,
    ) -> Result<f64, FacsError> {
        for day in 0..=days {
            let t = f64::from(day);
            context.progress_condition(person_id, t, disease)?;
            if done(context.get_person(person_id).unwrap()) {
                return Ok(t);
            }
        }
        panic!("condition not reached within {days} days");
    }

    #[test]
    fn infect_sets_exposed() {
        let (mut context, person_id) = setup(true);
        assert!(context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap());
        let infected = person(&context, person_id);
        assert_eq!(infected.status(), HealthStatus::Exposed);
        assert_eq!(infected.status_change_time(), 0.0);
        assert!(infected.phase_duration() >= 1.0);
        assert_eq!(context.counters().infections_today, 1);

        // A second infection of the same person changes nothing.
        assert!(!context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap());
        assert_eq!(context.counters().infections_today, 1);
    }

    #[test]
    fn infect_rejects_other_severities() {
        let (mut context, person_id) = setup(true);
        assert!(matches!(
            context.infect(person_id, HealthStatus::Dead, LocationType::House),
            Err(FacsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn mild_case_recovers() {
        let (mut context, person_id) = setup(true);
        let disease = DiseaseParameters {
            hospital: vec![0.0; 91],
            mortality: vec![0.0; 91],
            ..DiseaseParameters::default()
        };
        context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap();
        run_until(&mut context, person_id, &disease, 100, |p| {
            p.status() == HealthStatus::Infectious
        })
        .unwrap();
        assert!(person(&context, person_id).is_mild());
        run_until(&mut context, person_id, &disease, 200, |p| {
            p.status() == HealthStatus::Recovered
        })
        .unwrap();
        assert_eq!(context.counters().total_recoveries, 1);
        assert_eq!(context.counters().total_hospitalisations, 0);
    }

    #[test]
    fn severe_case_dies_in_hospital() {
        let (mut context, person_id) = setup(true);
        let disease = certain_severe(1.0);
        context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap();
        run_until(&mut context, person_id, &disease, 200, Person::is_hospitalised).unwrap();
        let admitted = person(&context, person_id);
        assert!(!admitted.is_mild());
        assert!(admitted.is_dying());
        assert_eq!(admitted.hospital(), Some(LocationId(1)));
        assert_eq!(context.counters().num_hospitalised, 1);

        let died = run_until(&mut context, person_id, &disease, 400, |p| {
            p.status() == HealthStatus::Dead
        })
        .unwrap();
        let dead = person(&context, person_id);
        assert!(!dead.is_hospitalised());
        assert_eq!(dead.status_change_time(), died);
        assert_eq!(context.counters().num_hospitalised, 0);
        assert_eq!(context.counters().total_deaths, 1);
    }

    #[test]
    fn severe_case_survives_hospital() {
        let (mut context, person_id) = setup(true);
        let disease = certain_severe(0.0);
        context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap();
        run_until(&mut context, person_id, &disease, 400, |p| {
            p.status() == HealthStatus::Recovered
        })
        .unwrap();
        assert_eq!(context.counters().total_hospitalisations, 1);
        assert_eq!(context.counters().total_deaths, 0);
        assert_eq!(context.counters().num_hospitalised, 0);
    }

    #[test]
    fn missing_hospital_is_fatal() {
        let (mut context, person_id) = setup(false);
        let disease = certain_severe(0.0);
        context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap();
        let result = run_until(&mut context, person_id, &disease, 400, |_| false);
        assert!(matches!(result, Err(FacsError::NoHospital)));
        assert!(!person(&context, person_id).is_hospitalised());
    }

    #[test]
    fn suppressed_symptoms_force_mild_course() {
        let (mut context, person_id) = setup(true);
        let disease = certain_severe(1.0);
        assert!(context.vaccinate(person_id, 0.0, 1.0, 0.0, 50.0).unwrap());
        assert!(person(&context, person_id).symptoms_suppressed());
        context
            .infect(person_id, HealthStatus::Exposed, LocationType::House)
            .unwrap();
        run_until(&mut context, person_id, &disease, 100, |p| {
            p.status() == HealthStatus::Infectious
        })
        .unwrap();
        assert!(person(&context, person_id).is_mild());
    }

    #[test]
    fn vaccination_can_grant_immunity() {
        let (mut context, person_id) = setup(true);
        assert!(context.vaccinate(person_id, 2.0, 0.0, 1.0, 273.0).unwrap());
        let vaccinated = person(&context, person_id);
        assert_eq!(vaccinated.status(), HealthStatus::Immune);
        assert_eq!(vaccinated.status_change_time(), 2.0);
        assert!(vaccinated.is_vaccinated());
        assert!(vaccinated.phase_duration() > 0.0);
    }

    #[test]
    fn vaccine_immunity_wanes() {
        let (mut context, person_id) = setup(true);
        let disease = DiseaseParameters {
            immunity_duration: 100.0,
            ..DiseaseParameters::default()
        };
        context.vaccinate(person_id, 0.0, 0.0, 1.0, 5.0).unwrap();
        let back = run_until(&mut context, person_id, &disease, 400, |p| {
            p.status() == HealthStatus::Susceptible
        })
        .unwrap();
        let person = person(&context, person_id);
        assert_eq!(person.status_change_time(), back);
        assert!(!person.symptoms_suppressed());
    }

    #[test]
    fn vaccine_immunity_lasts_at_least_a_day() {
        let (mut context, _) = setup(true);
        let disease = DiseaseParameters {
            immunity_duration: 273.0,
            ..DiseaseParameters::default()
        };
        for _ in 0..199 {
            context.add_person(LocationId(0)).unwrap();
        }
        for (i, person_id) in context.person_ids().into_iter().enumerate() {
            // Short durations use the Poisson draw, long ones the Gamma draw.
            let duration = if i % 2 == 0 { 1.0 } else { 150.0 };
            assert!(context.vaccinate(person_id, 0.0, 0.0, 1.0, duration).unwrap());
            context.progress_condition(person_id, 0.0, &disease).unwrap();
            let vaccinated = person(&context, person_id);
            assert_eq!(vaccinated.status(), HealthStatus::Immune);
            assert!(vaccinated.phase_duration() >= 1.0);
        }
    }

    #[test]
    fn waning_immunity_lasts_at_least_a_day() {
        let (mut context, _) = setup(true);
        let disease = DiseaseParameters {
            immunity_duration: 1.0,
            ..DiseaseParameters::default()
        };
        context
            .set_parameters(ParametersValues {
                disease: disease.clone(),
                ..ParametersValues::default()
            })
            .unwrap();
        for _ in 0..99 {
            context.add_person(LocationId(0)).unwrap();
        }
        for person_id in context.person_ids() {
            context
                .infect(person_id, HealthStatus::Infectious, LocationType::House)
                .unwrap();
            context.recover(person_id, LocationType::House).unwrap();
            context.progress_condition(person_id, 0.0, &disease).unwrap();
            let recovered = person(&context, person_id);
            assert_eq!(recovered.status(), HealthStatus::Recovered);
            assert!(recovered.phase_duration() >= 1.0);
        }
    }

    #[test]
    fn recover_uses_current_parameters() {
        let (mut context, person_id) = setup(true);
        context
            .set_parameters(ParametersValues {
                disease: DiseaseParameters {
                    immunity_duration: 60.0,
                    ..DiseaseParameters::default()
                },
                ..ParametersValues::default()
            })
            .unwrap();
        context
            .infect(person_id, HealthStatus::Infectious, LocationType::House)
            .unwrap();
        context.recover(person_id, LocationType::House).unwrap();
        let recovered = person(&context, person_id);
        assert_eq!(recovered.status(), HealthStatus::Recovered);
        assert!(recovered.phase_duration() > 0.0);
        assert_eq!(context.counters().recoveries_today, 1);
    }

    #[test]
    fn future_status_change_is_left_alone() {
        let (mut context, person_id) = setup(true);
        context.vaccinate(person_id, 10.0, 0.0, 1.0, 5.0).unwrap();
        let disease = DiseaseParameters {
            immunity_duration: 100.0,
            ..DiseaseParameters::default()
        };
        context.progress_condition(person_id, 5.0, &disease).unwrap();
        assert_eq!(person(&context, person_id).status(), HealthStatus::Immune);
    }
}
