//! Run parameters. Everything is loaded from a single JSON document into `ParametersValues` and
//! installed as the `Parameters` global property. Every field has a default, so `{}` is a valid
//! parameters file.
use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_global_property;
use crate::error::FacsError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::location::LocationType;
use crate::measures::MeasureUpdate;

/// Highest age (in years) in the age distribution.
pub const MAX_AGE: usize = 90;

// Per-decade hospitalisation and fatality rates; the last entry covers 80+.
const HOSPITALISATION_BY_DECADE: [f64; 9] =
    [0.001, 0.003, 0.012, 0.032, 0.049, 0.102, 0.166, 0.243, 0.273];
const MORTALITY_BY_DECADE: [f64; 9] = [
    0.000_02, 0.000_06, 0.000_3, 0.000_8, 0.001_5, 0.006, 0.022, 0.051, 0.093,
];

fn expand_by_decade(decades: &[f64]) -> Vec<f64> {
    (0..=MAX_AGE)
        .map(|age| decades[(age / 10).min(decades.len() - 1)])
        .collect()
}

/// Rates and durations consumed by the health state machine. Durations are in days.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DiseaseParameters {
    pub infection_rate: f64,
    pub incubation_period: f64,
    pub mild_recovery_period: f64,
    pub period_to_hospitalisation: f64,
    pub recovery_period: f64,
    pub mortality_period: f64,
    /// Mean duration of immunity after recovery. 0 means immunity never wanes.
    pub immunity_duration: f64,
    /// Probability of hospitalisation, indexed by age in years.
    pub hospital: Vec<f64>,
    /// Probability of death, indexed by age in years.
    pub mortality: Vec<f64>,
}

impl Default for DiseaseParameters {
    fn default() -> Self {
        DiseaseParameters {
            infection_rate: 0.07,
            incubation_period: 5.0,
            mild_recovery_period: 8.5,
            period_to_hospitalisation: 12.0,
            recovery_period: 8.0,
            mortality_period: 8.7,
            immunity_duration: 0.0,
            hospital: expand_by_decade(&HOSPITALISATION_BY_DECADE),
            mortality: expand_by_decade(&MORTALITY_BY_DECADE),
        }
    }
}

impl DiseaseParameters {
    fn age_index(&self, age: u8) -> usize {
        usize::from(age).min(self.hospital.len().saturating_sub(1))
    }

    /// Probability that a case at this age is severe. Ages past the end of the table use the
    /// last entry.
    #[must_use]
    pub fn hospitalisation_probability(&self, age: u8) -> f64 {
        self.hospital[self.age_index(age)]
    }

    /// Probability that a case at this age is fatal. Uses the same age clamping as
    /// `hospitalisation_probability`.
    #[must_use]
    pub fn mortality_probability(&self, age: u8) -> f64 {
        self.mortality[self.age_index(age).min(self.mortality.len() - 1)]
    }

    /// # Errors
    ///
    /// Returns `FacsError::InvalidParameter` for negative durations, empty or mismatched age
    /// tables, probabilities outside `[0, 1]`, or a mortality above the hospitalisation
    /// probability at the same age (deaths only happen in hospital).
    pub fn validate(&self) -> Result<(), FacsError> {
        let durations = [
            ("infection_rate", self.infection_rate),
            ("incubation_period", self.incubation_period),
            ("mild_recovery_period", self.mild_recovery_period),
            ("period_to_hospitalisation", self.period_to_hospitalisation),
            ("recovery_period", self.recovery_period),
            ("mortality_period", self.mortality_period),
            ("immunity_duration", self.immunity_duration),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(FacsError::InvalidParameter(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.hospital.is_empty() || self.hospital.len() != self.mortality.len() {
            return Err(FacsError::InvalidParameter(
                "hospital and mortality tables must be non-empty and of equal length".to_string(),
            ));
        }
        for (age, (&hospital, &mortality)) in self.hospital.iter().zip(&self.mortality).enumerate() {
            if !(0.0..=1.0).contains(&hospital) || !(0.0..=1.0).contains(&mortality) {
                return Err(FacsError::InvalidParameter(format!(
                    "probabilities for age {age} must lie in [0, 1]"
                )));
            }
            if mortality > hospital {
                return Err(FacsError::InvalidParameter(format!(
                    "mortality exceeds hospitalisation probability at age {age}"
                )));
            }
        }
        Ok(())
    }
}

/// The daily vaccination campaign.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VaccinationParameters {
    pub vaccines_per_day: usize,
    /// Only people at least this old are vaccinated.
    pub age_limit: u8,
    /// Probability that a vaccinated person's symptoms are suppressed.
    pub no_symptoms: f64,
    /// Probability that a vaccinated person becomes immune.
    pub no_transmission: f64,
    /// Mean duration of vaccine protection in days. 0 means it never wanes.
    pub vac_duration: f64,
}

impl Default for VaccinationParameters {
    fn default() -> Self {
        VaccinationParameters {
            vaccines_per_day: 0,
            age_limit: 0,
            no_symptoms: 0.0,
            no_transmission: 0.0,
            vac_duration: 273.0,
        }
    }
}

/// How people choose among the amenities of one category.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LocationTypeSettings {
    /// Number of ranked neighbours kept per house. Negative keeps all.
    pub neighbours: isize,
    /// Choose among the kept neighbours in proportion to their size instead of always
    /// going to the best one.
    pub weighted: bool,
}

impl LocationTypeSettings {
    #[must_use]
    pub fn default_for(kind: LocationType) -> Self {
        let (neighbours, weighted) = match kind {
            LocationType::Office | LocationType::Leisure | LocationType::Shopping => (5, true),
            LocationType::Supermarket => (4, true),
            LocationType::School
            | LocationType::Hospital
            | LocationType::Park
            | LocationType::House => (1, false),
        };
        LocationTypeSettings {
            neighbours,
            weighted,
        }
    }
}

fn default_location_types() -> BTreeMap<LocationType, LocationTypeSettings> {
    LocationType::AMENITIES
        .into_iter()
        .map(|kind| (kind, LocationTypeSettings::default_for(kind)))
        .collect()
}

fn default_age_distribution() -> Vec<f64> {
    vec![1.0; MAX_AGE + 1]
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ParametersValues {
    pub disease: DiseaseParameters,
    pub vaccination: VaccinationParameters,
    #[serde(default = "default_location_types")]
    pub location_types: BTreeMap<LocationType, LocationTypeSettings>,
    /// Probability that a person refuses vaccination.
    pub antivax_fraction: f64,
    /// Relative weight of each age in years, 0 through `MAX_AGE`.
    #[serde(default = "default_age_distribution")]
    pub age_distribution: Vec<f64>,
    /// Weights of none, teacher, shop worker and health worker.
    pub job_distribution: [f64; 4],
    /// Fraction of office workers who keep going in when work from home is ordered.
    pub keyworker_fraction: f64,
    pub num_days: u32,
    pub num_agents: usize,
    pub initial_infections: usize,
    /// Measures taking effect on each day, keyed by day number.
    pub measures: BTreeMap<u32, MeasureUpdate>,
}

impl Default for ParametersValues {
    fn default() -> Self {
        ParametersValues {
            disease: DiseaseParameters::default(),
            vaccination: VaccinationParameters::default(),
            location_types: default_location_types(),
            antivax_fraction: 0.05,
            age_distribution: default_age_distribution(),
            job_distribution: [0.865, 0.015, 0.08, 0.04],
            keyworker_fraction: 0.2,
            num_days: 60,
            num_agents: 1000,
            initial_infections: 5,
            measures: BTreeMap::new(),
        }
    }
}

impl ParametersValues {
    /// Settings for one category, falling back to the built-in defaults for categories the
    /// parameters file leaves out.
    #[must_use]
    pub fn location_type_settings(&self, kind: LocationType) -> LocationTypeSettings {
        self.location_types
            .get(&kind)
            .copied()
            .unwrap_or_else(|| LocationTypeSettings::default_for(kind))
    }

    /// Neighbour counts for every amenity category.
    #[must_use]
    pub fn neighbour_limits(&self) -> BTreeMap<LocationType, isize> {
        LocationType::AMENITIES
            .into_iter()
            .map(|kind| (kind, self.location_type_settings(kind).neighbours))
            .collect()
    }

    /// # Errors
    ///
    /// Returns `FacsError::InvalidParameter` if any value is out of range.
    pub fn validate(&self) -> Result<(), FacsError> {
        self.disease.validate()?;
        for (name, p) in [
            ("antivax_fraction", self.antivax_fraction),
            ("keyworker_fraction", self.keyworker_fraction),
            ("vaccination.no_symptoms", self.vaccination.no_symptoms),
            ("vaccination.no_transmission", self.vaccination.no_transmission),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(FacsError::InvalidParameter(format!(
                    "{name} must lie in [0, 1], got {p}"
                )));
            }
        }
        if self.age_distribution.len() != MAX_AGE + 1 {
            return Err(FacsError::InvalidParameter(format!(
                "age_distribution must have {} entries",
                MAX_AGE + 1
            )));
        }
        let valid_weights = |weights: &[f64]| {
            weights.iter().all(|w| w.is_finite() && *w >= 0.0) && weights.iter().sum::<f64>() > 0.0
        };
        if !valid_weights(&self.age_distribution) || !valid_weights(&self.job_distribution) {
            return Err(FacsError::InvalidParameter(
                "distributions need non-negative weights with a positive sum".to_string(),
            ));
        }
        for update in self.measures.values() {
            update.validate()?;
        }
        Ok(())
    }
}

define_global_property!(Parameters, ParametersValues);

pub trait ContextParametersExt {
    /// Loads, validates and installs the parameters in `file_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the values are invalid.
    fn init_parameters(&mut self, file_path: &Path) -> Result<(), FacsError>;

    /// Validates and installs `parameters`.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::InvalidParameter` if the values are invalid.
    fn set_parameters(&mut self, parameters: ParametersValues) -> Result<(), FacsError>;

    /// The installed parameters, or the defaults if none were installed.
    fn parameters(&mut self) -> &ParametersValues;

    fn parameters_mut(&mut self) -> &mut ParametersValues;
}

impl ContextParametersExt for Context {
    fn init_parameters(&mut self, file_path: &Path) -> Result<(), FacsError> {
        info!("Loading parameters from: {}", file_path.display());
        let parameters = self.load_parameters_from_json::<ParametersValues>(file_path)?;
        self.set_parameters(parameters)
    }

    fn set_parameters(&mut self, parameters: ParametersValues) -> Result<(), FacsError> {
        parameters.validate()?;
        self.set_global_property_value(Parameters, parameters);
        Ok(())
    }

    fn parameters(&mut self) -> &ParametersValues {
        self.parameters_mut()
    }

    fn parameters_mut(&mut self) -> &mut ParametersValues {
        if self.get_global_property_value(Parameters).is_none() {
            self.set_global_property_value(Parameters, ParametersValues::default());
        }
        self.get_global_property_value_mut(Parameters)
            .expect("parameters were just installed")
    }
}
