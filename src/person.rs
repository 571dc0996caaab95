use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::location::{LocationId, LocationType};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub usize);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The legal health states. `Dead` is terminal; `Recovered` and `Immune` may wane back to
/// `Susceptible`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Susceptible,
    Exposed,
    Infectious,
    Recovered,
    Dead,
    Immune,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 6] = [
        HealthStatus::Susceptible,
        HealthStatus::Exposed,
        HealthStatus::Infectious,
        HealthStatus::Recovered,
        HealthStatus::Dead,
        HealthStatus::Immune,
    ];
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Susceptible => "susceptible",
            HealthStatus::Exposed => "exposed",
            HealthStatus::Infectious => "infectious",
            HealthStatus::Recovered => "recovered",
            HealthStatus::Dead => "dead",
            HealthStatus::Immune => "immune",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Job {
    #[default]
    None,
    Teacher,
    ShopWorker,
    HealthWorker,
}

impl Job {
    /// In the order of `ParametersValues::job_distribution`.
    pub const ALL: [Job; 4] = [Job::None, Job::Teacher, Job::ShopWorker, Job::HealthWorker];

    /// The kind of location this job sends its holder to instead of an office.
    #[must_use]
    pub fn workplace(self) -> Option<LocationType> {
        match self {
            Job::None => None,
            Job::Teacher => Some(LocationType::School),
            Job::ShopWorker => Some(LocationType::Shopping),
            Job::HealthWorker => Some(LocationType::Hospital),
        }
    }
}

/// One simulated individual. The disease module owns the transitions; everything else only
/// reads the health fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Person {
    pub(crate) id: PersonId,
    pub(crate) location: LocationId,
    pub(crate) home: LocationId,
    pub(crate) age: u8,
    pub(crate) job: Job,
    pub(crate) status: HealthStatus,
    pub(crate) status_change_time: f64,
    pub(crate) phase_duration: f64,
    pub(crate) mild_version: bool,
    pub(crate) hospitalised: bool,
    pub(crate) dying: bool,
    pub(crate) symptoms_suppressed: bool,
    pub(crate) work_from_home: bool,
    pub(crate) school_from_home: bool,
    pub(crate) keyworker: bool,
    pub(crate) antivax: bool,
    pub(crate) vaccinated: bool,
    pub(crate) groups: BTreeMap<LocationType, usize>,
    pub(crate) hospital: Option<LocationId>,
}

impl Person {
    #[must_use]
    pub fn new(id: PersonId, home: LocationId, age: u8, job: Job) -> Self {
        Person {
            id,
            location: home,
            home,
            age,
            job,
            status: HealthStatus::Susceptible,
            status_change_time: -1.0,
            phase_duration: 0.0,
            mild_version: true,
            hospitalised: false,
            dying: false,
            symptoms_suppressed: false,
            work_from_home: false,
            school_from_home: false,
            keyworker: false,
            antivax: false,
            vaccinated: false,
            groups: BTreeMap::new(),
            hospital: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[must_use]
    pub fn location(&self) -> LocationId {
        self.location
    }

    #[must_use]
    pub fn home(&self) -> LocationId {
        self.home
    }

    #[must_use]
    pub fn age(&self) -> u8 {
        self.age
    }

    #[must_use]
    pub fn job(&self) -> Job {
        self.job
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    #[must_use]
    pub fn status_change_time(&self) -> f64 {
        self.status_change_time
    }

    /// Days from the last status change until the next scheduled transition.
    #[must_use]
    pub fn phase_duration(&self) -> f64 {
        self.phase_duration
    }

    #[must_use]
    pub fn is_mild(&self) -> bool {
        self.mild_version
    }

    #[must_use]
    pub fn is_hospitalised(&self) -> bool {
        self.hospitalised
    }

    #[must_use]
    pub fn is_dying(&self) -> bool {
        self.dying
    }

    #[must_use]
    pub fn symptoms_suppressed(&self) -> bool {
        self.symptoms_suppressed
    }

    #[must_use]
    pub fn works_from_home(&self) -> bool {
        self.work_from_home
    }

    #[must_use]
    pub fn schools_from_home(&self) -> bool {
        self.school_from_home
    }

    #[must_use]
    pub fn is_keyworker(&self) -> bool {
        self.keyworker
    }

    #[must_use]
    pub fn is_antivax(&self) -> bool {
        self.antivax
    }

    #[must_use]
    pub fn is_vaccinated(&self) -> bool {
        self.vaccinated
    }

    /// The hospital this person was admitted to, while hospitalised.
    #[must_use]
    pub fn hospital(&self) -> Option<LocationId> {
        self.hospital
    }

    #[must_use]
    pub fn group(&self, kind: LocationType) -> Option<usize> {
        self.groups.get(&kind).copied()
    }

    /// Whether the person still goes out and plans visits.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        matches!(
            self.status,
            HealthStatus::Susceptible | HealthStatus::Exposed | HealthStatus::Infectious
        )
    }

    /// Days since the last status change.
    #[must_use]
    pub fn elapsed(&self, t: f64) -> f64 {
        t - self.status_change_time
    }

    /// Changes the status and its timestamp together.
    pub(crate) fn set_status(&mut self, status: HealthStatus, t: f64) {
        self.status = status;
        self.status_change_time = t;
    }

    pub(crate) fn set_group(&mut self, kind: LocationType, group: usize) {
        self.groups.insert(kind, group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_person_is_susceptible_at_home() {
        let person = Person::new(PersonId(0), LocationId(3), 40, Job::Teacher);
        assert_eq!(person.status(), HealthStatus::Susceptible);
        assert_eq!(person.location(), LocationId(3));
        assert_eq!(person.home(), LocationId(3));
        assert!(person.is_mobile());
        assert!(person.group(LocationType::School).is_none());
    }

    #[test]
    fn status_change_sets_timestamp() {
        let mut person = Person::new(PersonId(0), LocationId(0), 40, Job::None);
        person.set_status(HealthStatus::Recovered, 12.0);
        assert_eq!(person.status_change_time(), 12.0);
        assert_eq!(person.elapsed(15.0), 3.0);
        assert!(!person.is_mobile());
    }

    #[test]
    fn job_workplaces() {
        assert_eq!(Job::None.workplace(), None);
        assert_eq!(Job::Teacher.workplace(), Some(LocationType::School));
        assert_eq!(Job::ShopWorker.workplace(), Some(LocationType::Shopping));
        assert_eq!(Job::HealthWorker.workplace(), Some(LocationType::Hospital));
    }

    #[test]
    fn status_names() {
        assert_eq!(HealthStatus::Infectious.to_string(), "infectious");
        assert_eq!(
            serde_json::to_string(&HealthStatus::Immune).unwrap(),
            "\"immune\""
        );
    }
}
