//! Public-health interventions and pathogen evolution. This module only applies the *effects* of
//! measures: the timeline of `MeasureUpdate`s comes with the run parameters, and each update is
//! merged into the `MeasuresState` held by the context on the day it takes effect.
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::disease::ContextDiseaseExt;
use crate::error::FacsError;
use crate::location::LocationType;
use crate::parameters::{ContextParametersExt, VaccinationParameters};
use crate::person::{HealthStatus, Job, PersonId};
use crate::population::ContextPopulationExt;
use crate::random::ContextRandomExt;

define_rng!(MeasuresRng);

/// Distance in metres people try to keep while social distancing.
pub const SOCIAL_DISTANCE_METRES: f64 = 2.0;

/// Blends the infection rate of an old and a new variant given the new variant's share of cases.
///
/// # Errors
///
/// Returns `FacsError::InvalidFraction` if `fraction` is outside `[0, 1]`.
pub fn calculate_mutating_infection_rate(
    fraction: f64,
    source: f64,
    dest: f64,
) -> Result<f64, FacsError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(FacsError::InvalidFraction(fraction));
    }
    Ok((1.0 - fraction) * source + fraction * dest)
}

/// A variant whose share of cases grows linearly by `daily_increase` per day after
/// `emergence_day`, until it is the only one left.
struct VariantRamp {
    emergence_day: u32,
    daily_increase: f64,
    source_rate: f64,
    dest_rate: f64,
}

const VARIANTS: [VariantRamp; 2] = [
    VariantRamp {
        emergence_day: 235,
        daily_increase: 0.01,
        source_rate: 0.07,
        dest_rate: 0.11,
    },
    VariantRamp {
        emergence_day: 416,
        daily_increase: 0.02,
        source_rate: 0.11,
        dest_rate: 0.165,
    },
];

/// The infection rate on `day` while a new variant is taking over, `None` on every other day.
///
/// # Errors
///
/// Returns `FacsError::InvalidFraction` if a variant share leaves `[0, 1]`.
pub fn variant_infection_rate(day: u32) -> Result<Option<f64>, FacsError> {
    for variant in &VARIANTS {
        let days_since = day.saturating_sub(variant.emergence_day);
        let fraction = f64::from(days_since) * variant.daily_increase;
        if day > variant.emergence_day && fraction <= 1.0 + f64::EPSILON {
            let rate = calculate_mutating_infection_rate(
                fraction.min(1.0),
                variant.source_rate,
                variant.dest_rate,
            )?;
            return Ok(Some(rate));
        }
    }
    Ok(None)
}

/// Factor by which transmission inside hospitals is reduced from `day` on, as testing and
/// protective equipment ramp up.
#[must_use]
pub fn hospital_protection_factor(day: u32) -> f64 {
    const SCHEDULE: [(u32, f64); 7] = [
        (100, 0.10),
        (85, 0.15),
        (70, 0.2),
        (60, 0.3),
        (50, 0.45),
        (40, 0.6),
        (30, 0.8),
    ];
    SCHEDULE
        .iter()
        .find(|(start, _)| day >= *start)
        .map_or(1.0, |(_, factor)| *factor)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SocialDistance {
    pub distance: f64,
    pub compliance: f64,
    pub mask_uptake: f64,
    pub mask_uptake_shopping: f64,
}

/// The measures in force. Mask uptake and distancing compliance persist between updates;
/// everything else is replaced wholesale whenever an update arrives.
///
/// Closures shape visit planning here. The work from home fraction, isolation flags, travel
/// and track-and-trace multipliers, social distancing and hospital protection are not applied
/// by this crate; they are exported through `measures()` for a transmission model to read.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasuresState {
    pub closures: BTreeSet<LocationType>,
    /// Fraction of visits to each category that no longer happen.
    pub partial_closures: BTreeMap<LocationType, f64>,
    pub work_from_home: Option<f64>,
    pub case_isolation: bool,
    pub household_isolation: bool,
    pub mask_uptake: f64,
    pub mask_uptake_shopping: f64,
    pub social_distance_compliance: f64,
    pub social_distance: Option<SocialDistance>,
    pub external_travel_multiplier: f64,
    pub traffic_multiplier: f64,
    pub track_trace_multiplier: f64,
    pub hospital_protection_factor: f64,
    pub vaccination: VaccinationParameters,
}

impl Default for MeasuresState {
    fn default() -> Self {
        MeasuresState {
            closures: BTreeSet::new(),
            partial_closures: BTreeMap::new(),
            work_from_home: None,
            case_isolation: false,
            household_isolation: false,
            mask_uptake: 0.0,
            mask_uptake_shopping: 0.0,
            social_distance_compliance: 0.0,
            social_distance: None,
            external_travel_multiplier: 1.0,
            traffic_multiplier: 1.0,
            track_trace_multiplier: 1.0,
            hospital_protection_factor: 1.0,
            vaccination: VaccinationParameters::default(),
        }
    }
}

impl MeasuresState {
    #[must_use]
    pub fn is_closed(&self, kind: LocationType) -> bool {
        self.closures.contains(&kind)
    }

    /// Fraction of visits to `kind` that are cancelled; 1 for closed categories.
    #[must_use]
    pub fn closure_fraction(&self, kind: LocationType) -> f64 {
        if self.is_closed(kind) {
            1.0
        } else {
            self.partial_closures.get(&kind).copied().unwrap_or(0.0)
        }
    }

    fn remove_all_measures(&mut self) {
        self.closures.clear();
        self.partial_closures.clear();
        self.work_from_home = None;
        self.case_isolation = false;
        self.household_isolation = false;
        self.social_distance = None;
    }
}

/// The measures taking effect on one day. Every field is optional; absent fields leave the
/// corresponding persistent value unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MeasureUpdate {
    pub case_isolation: Option<bool>,
    pub household_isolation: Option<bool>,
    pub external_multiplier: Option<f64>,
    pub partial_closure: BTreeMap<LocationType, f64>,
    pub closure: Vec<LocationType>,
    pub work_from_home: Option<f64>,
    pub mask_uptake: Option<f64>,
    pub mask_uptake_shopping: Option<f64>,
    pub social_distance: Option<f64>,
    pub traffic_multiplier: Option<f64>,
    pub track_trace_efficiency: Option<f64>,
    pub vaccines_per_day: Option<usize>,
    pub vaccine_age_limit: Option<u8>,
    pub no_symptoms: Option<f64>,
    pub no_transmission: Option<f64>,
}

impl MeasureUpdate {
    /// # Errors
    ///
    /// Returns `FacsError::InvalidFraction` for fractions outside `[0, 1]` and
    /// `FacsError::InvalidParameter` for negative multipliers.
    pub fn validate(&self) -> Result<(), FacsError> {
        let fractions = self
            .partial_closure
            .values()
            .copied()
            .chain(self.work_from_home)
            .chain(self.mask_uptake)
            .chain(self.mask_uptake_shopping)
            .chain(self.social_distance)
            .chain(self.track_trace_efficiency)
            .chain(self.no_symptoms)
            .chain(self.no_transmission);
        for fraction in fractions {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(FacsError::InvalidFraction(fraction));
            }
        }
        for multiplier in [self.external_multiplier, self.traffic_multiplier]
            .into_iter()
            .flatten()
        {
            if !multiplier.is_finite() || multiplier < 0.0 {
                return Err(FacsError::InvalidParameter(format!(
                    "multipliers must be non-negative, got {multiplier}"
                )));
            }
        }
        Ok(())
    }
}

define_data_plugin!(MeasuresPlugin, MeasuresState, MeasuresState::default());

pub trait ContextMeasuresExt {
    /// Resets the measures and copies the vaccination campaign settings from the parameters.
    fn init_measures(&mut self);

    fn measures(&mut self) -> &MeasuresState;

    /// Replaces the measures in force with `update`. Mask uptake and distancing compliance
    /// carry over from earlier updates; social distancing is recomputed when any of them is
    /// part of this update.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::InvalidFraction` if a fraction in the update is outside `[0, 1]`.
    fn apply_measure_update(&mut self, update: &MeasureUpdate) -> Result<(), FacsError>;

    /// Sends each office worker who is not a key worker home with probability `fraction`.
    /// Returns the number of people now working from home.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::InvalidFraction` if `fraction` is outside `[0, 1]`.
    fn apply_work_from_home(&mut self, fraction: f64) -> Result<usize, FacsError>;

    /// Vaccinates up to the day's quota of eligible people, chosen at random. Returns how many
    /// were vaccinated.
    ///
    /// # Errors
    ///
    /// Returns an error if a vaccination fails.
    fn run_vaccination_campaign(&mut self) -> Result<usize, FacsError>;

    /// Applies everything scheduled for `day`: variant evolution, hospital protection, the
    /// measures timeline and the vaccination campaign.
    ///
    /// # Errors
    ///
    /// Returns an error if any of those steps fails.
    fn enact_measures(&mut self, day: u32) -> Result<(), FacsError>;
}

impl ContextMeasuresExt for Context {
    fn init_measures(&mut self) {
        let vaccination = self.parameters().vaccination.clone();
        *self.get_data_container_mut(MeasuresPlugin) = MeasuresState {
            vaccination,
            ..MeasuresState::default()
        };
    }

    fn measures(&mut self) -> &MeasuresState {
        self.get_data_container_mut(MeasuresPlugin)
    }

    fn apply_measure_update(&mut self, update: &MeasureUpdate) -> Result<(), FacsError> {
        update.validate()?;

        let was_schooling_from_home = self.measures().is_closed(LocationType::School);
        let state = self.get_data_container_mut(MeasuresPlugin);
        state.remove_all_measures();

        if let Some(case_isolation) = update.case_isolation {
            state.case_isolation = case_isolation;
        }
        if let Some(household_isolation) = update.household_isolation {
            state.household_isolation = household_isolation;
        }
        if let Some(multiplier) = update.external_multiplier {
            state.external_travel_multiplier = multiplier;
        }
        state.partial_closures.extend(update.partial_closure.clone());
        state.closures.extend(update.closure.iter().copied());

        let mut recompute_distancing = false;
        if let Some(mask_uptake) = update.mask_uptake {
            state.mask_uptake = mask_uptake;
            recompute_distancing = true;
        }
        if let Some(mask_uptake_shopping) = update.mask_uptake_shopping {
            state.mask_uptake_shopping = mask_uptake_shopping;
            recompute_distancing = true;
        }
        if let Some(compliance) = update.social_distance {
            state.social_distance_compliance = compliance;
            recompute_distancing = true;
        }
        if recompute_distancing {
            state.social_distance = Some(SocialDistance {
                distance: SOCIAL_DISTANCE_METRES,
                compliance: state.social_distance_compliance,
                mask_uptake: state.mask_uptake,
                mask_uptake_shopping: state.mask_uptake_shopping,
            });
        }

        if let Some(multiplier) = update.traffic_multiplier {
            state.traffic_multiplier = multiplier;
        }
        if let Some(efficiency) = update.track_trace_efficiency {
            state.track_trace_multiplier = 1.0 - efficiency;
        }
        if let Some(vaccines_per_day) = update.vaccines_per_day {
            state.vaccination.vaccines_per_day = vaccines_per_day;
        }
        if let Some(age_limit) = update.vaccine_age_limit {
            state.vaccination.age_limit = age_limit;
        }
        if let Some(no_symptoms) = update.no_symptoms {
            state.vaccination.no_symptoms = no_symptoms;
        }
        if let Some(no_transmission) = update.no_transmission {
            state.vaccination.no_transmission = no_transmission;
        }
        let schooling_from_home = state.is_closed(LocationType::School);

        if schooling_from_home != was_schooling_from_home {
            for person_id in self.person_ids() {
                if let Some(person) = self.get_person_mut(person_id) {
                    person.school_from_home = schooling_from_home;
                }
            }
        }

        for person_id in self.query_people(|person| person.works_from_home()) {
            if let Some(person) = self.get_person_mut(person_id) {
                person.work_from_home = false;
            }
        }
        if let Some(fraction) = update.work_from_home {
            self.get_data_container_mut(MeasuresPlugin).work_from_home = Some(fraction);
            self.apply_work_from_home(fraction)?;
        }

        debug!("measures now in force: {:?}", self.measures());
        Ok(())
    }

    fn apply_work_from_home(&mut self, fraction: f64) -> Result<usize, FacsError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(FacsError::InvalidFraction(fraction));
        }
        let office_workers =
            self.query_people(|person| person.job() == Job::None && !person.is_keyworker());
        for person_id in office_workers {
            if self.sample_probability(MeasuresRng, fraction) {
                if let Some(person) = self.get_person_mut(person_id) {
                    person.work_from_home = true;
                }
            }
        }
        Ok(self.query_people(|person| person.works_from_home()).len())
    }

    fn run_vaccination_campaign(&mut self) -> Result<usize, FacsError> {
        let campaign = self.measures().vaccination.clone();
        if campaign.vaccines_per_day == 0 {
            return Ok(0);
        }
        let eligible = self.query_people(|person| {
            person.status() == HealthStatus::Susceptible
                && !person.is_antivax()
                && !person.is_vaccinated()
                && person.age() >= campaign.age_limit
        });
        let chosen: Vec<PersonId> = self.sample(MeasuresRng, |rng| {
            eligible
                .choose_multiple(rng, campaign.vaccines_per_day)
                .copied()
                .collect()
        });

        let t = self.get_current_time();
        let mut vaccinated = 0;
        for person_id in chosen {
            if self.vaccinate(
                person_id,
                t,
                campaign.no_symptoms,
                campaign.no_transmission,
                campaign.vac_duration,
            )? {
                vaccinated += 1;
            }
        }
        debug!("vaccinated {vaccinated} people at t={t}");
        Ok(vaccinated)
    }

    fn enact_measures(&mut self, day: u32) -> Result<(), FacsError> {
        if let Some(rate) = variant_infection_rate(day)? {
            let disease = &mut self.parameters_mut().disease;
            info!(
                "day {day}: infection rate adjusted from {} to {rate}",
                disease.infection_rate
            );
            disease.infection_rate = rate;
        }

        self.get_data_container_mut(MeasuresPlugin)
            .hospital_protection_factor = hospital_protection_factor(day);

        if let Some(update) = self.parameters().measures.get(&day).cloned() {
            info!("day {day}: applying measures {update:?}");
            self.apply_measure_update(&update)?;
        }

        self.run_vaccination_campaign()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LatLon;
    use crate::location::{House, LocationId};
    use crate::parameters::ParametersValues;
    use crate::registry::{ContextLocationsExt, LocationRegistry};
    use assert_approx_eq::assert_approx_eq;

    fn populated_context(num_people: usize, parameters: ParametersValues) -> Context {
        let mut context = Context::new();
        context.init_random(3);
        context.set_parameters(parameters).unwrap();
        let mut registry = LocationRegistry::new();
        registry
            .add_house(House::new(LocationId(0), LatLon::new(0.0, 0.0).unwrap()))
            .unwrap();
        context.init_locations(registry, &BTreeMap::new()).unwrap();
        for _ in 0..num_people {
            context.add_person(LocationId(0)).unwrap();
        }
        context.init_measures();
        context
    }

    fn office_workers() -> ParametersValues {
        ParametersValues {
            job_distribution: [1.0, 0.0, 0.0, 0.0],
            keyworker_fraction: 0.0,
            antivax_fraction: 0.0,
            ..ParametersValues::default()
        }
    }

    #[test]
    fn mutating_rate_endpoints() {
        assert_approx_eq!(calculate_mutating_infection_rate(0.0, 0.07, 0.11).unwrap(), 0.07);
        assert_approx_eq!(calculate_mutating_infection_rate(1.0, 0.07, 0.11).unwrap(), 0.11);
        assert_approx_eq!(calculate_mutating_infection_rate(0.5, 0.1, 0.2).unwrap(), 0.15);
        assert!(matches!(
            calculate_mutating_infection_rate(1.01, 0.07, 0.11),
            Err(FacsError::InvalidFraction(_))
        ));
        assert!(calculate_mutating_infection_rate(-0.1, 0.07, 0.11).is_err());
    }

    #[test]
    fn variant_schedule() {
        assert_eq!(variant_infection_rate(100).unwrap(), None);
        assert_eq!(variant_infection_rate(235).unwrap(), None);
        assert_approx_eq!(variant_infection_rate(236).unwrap().unwrap(), 0.07 + 0.01 * 0.04);
        assert_approx_eq!(variant_infection_rate(335).unwrap().unwrap(), 0.11);
        assert_eq!(variant_infection_rate(336).unwrap(), None);
        assert_approx_eq!(variant_infection_rate(417).unwrap().unwrap(), 0.11 + 0.02 * 0.055);
        assert_approx_eq!(variant_infection_rate(466).unwrap().unwrap(), 0.165);
        assert_eq!(variant_infection_rate(467).unwrap(), None);
    }

    #[test]
    fn hospital_protection_steps_down() {
        assert_approx_eq!(hospital_protection_factor(0), 1.0);
        assert_approx_eq!(hospital_protection_factor(29), 1.0);
        assert_approx_eq!(hospital_protection_factor(30), 0.8);
        assert_approx_eq!(hospital_protection_factor(55), 0.45);
        assert_approx_eq!(hospital_protection_factor(99), 0.15);
        assert_approx_eq!(hospital_protection_factor(400), 0.10);
    }

    #[test]
    fn mask_uptake_persists_between_updates() {
        let mut context = populated_context(0, ParametersValues::default());
        context
            .apply_measure_update(&MeasureUpdate {
                mask_uptake: Some(0.6),
                closure: vec![LocationType::Leisure],
                ..MeasureUpdate::default()
            })
            .unwrap();
        assert!(context.measures().is_closed(LocationType::Leisure));

        context
            .apply_measure_update(&MeasureUpdate {
                social_distance: Some(0.5),
                ..MeasureUpdate::default()
            })
            .unwrap();
        let state = context.measures();
        assert!(!state.is_closed(LocationType::Leisure));
        let distancing = state.social_distance.unwrap();
        assert_approx_eq!(distancing.mask_uptake, 0.6);
        assert_approx_eq!(distancing.compliance, 0.5);
        assert_approx_eq!(distancing.distance, SOCIAL_DISTANCE_METRES);

        context
            .apply_measure_update(&MeasureUpdate::default())
            .unwrap();
        let state = context.measures();
        assert!(state.social_distance.is_none());
        assert_approx_eq!(state.mask_uptake, 0.6);
    }

    #[test]
    fn invalid_update_is_rejected() {
        let mut context = populated_context(0, ParametersValues::default());
        let update = MeasureUpdate {
            partial_closure: BTreeMap::from([(LocationType::Shopping, 1.5)]),
            ..MeasureUpdate::default()
        };
        assert!(matches!(
            context.apply_measure_update(&update),
            Err(FacsError::InvalidFraction(_))
        ));
    }

    #[test]
    fn closing_schools_keeps_pupils_home() {
        let mut context = populated_context(5, ParametersValues::default());
        context
            .apply_measure_update(&MeasureUpdate {
                closure: vec![LocationType::School],
                ..MeasureUpdate::default()
            })
            .unwrap();
        assert_eq!(
            context.query_people(|p| p.schools_from_home()).len(),
            5
        );
        context
            .apply_measure_update(&MeasureUpdate::default())
            .unwrap();
        assert!(context.query_people(|p| p.schools_from_home()).is_empty());
    }

    #[test]
    fn work_from_home_spares_key_workers() {
        let mut context = populated_context(20, office_workers());
        context.get_person_mut(PersonId(0)).unwrap().keyworker = true;
        context.get_person_mut(PersonId(1)).unwrap().job = Job::Teacher;

        let at_home = context.apply_work_from_home(1.0).unwrap();
        assert_eq!(at_home, 18);
        assert!(!context.get_person(PersonId(0)).unwrap().works_from_home());
        assert!(!context.get_person(PersonId(1)).unwrap().works_from_home());
        assert!(context.apply_work_from_home(2.0).is_err());

        // A new update without work from home sends everyone back.
        context
            .apply_measure_update(&MeasureUpdate::default())
            .unwrap();
        assert!(context.query_people(|p| p.works_from_home()).is_empty());
    }

    #[test]
    fn campaign_respects_quota_and_eligibility() {
        let mut parameters = office_workers();
        parameters.vaccination = VaccinationParameters {
            vaccines_per_day: 3,
            age_limit: 0,
            no_symptoms: 0.0,
            no_transmission: 1.0,
            vac_duration: 0.0,
        };
        let mut context = populated_context(5, parameters);
        context.get_person_mut(PersonId(0)).unwrap().antivax = true;

        assert_eq!(context.run_vaccination_campaign().unwrap(), 3);
        assert_eq!(context.count_status(HealthStatus::Immune), 3);
        assert_eq!(context.run_vaccination_campaign().unwrap(), 1);
        assert_eq!(context.run_vaccination_campaign().unwrap(), 0);
        assert_eq!(
            context.get_person(PersonId(0)).unwrap().status(),
            HealthStatus::Susceptible
        );
    }

    #[test]
    fn enact_measures_follows_timeline() {
        let mut parameters = ParametersValues::default();
        parameters.measures.insert(
            30,
            MeasureUpdate {
                closure: vec![LocationType::Office],
                vaccines_per_day: Some(2),
                ..MeasureUpdate::default()
            },
        );
        let mut context = populated_context(0, parameters);

        context.enact_measures(29).unwrap();
        assert!(!context.measures().is_closed(LocationType::Office));
        context.enact_measures(30).unwrap();
        let state = context.measures();
        assert!(state.is_closed(LocationType::Office));
        assert_eq!(state.vaccination.vaccines_per_day, 2);
        assert_approx_eq!(state.hospital_protection_factor, 0.8);

        context.enact_measures(300).unwrap();
        assert_approx_eq!(
            context.parameters().disease.infection_rate,
            calculate_mutating_infection_rate(0.65, 0.07, 0.11).unwrap()
        );
    }
}
