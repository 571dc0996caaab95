use log::trace;

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::error::FacsError;
use crate::location::{LocationId, LocationType};
use crate::parameters::ContextParametersExt;
use crate::person::{HealthStatus, Job, Person, PersonId};
use crate::random::ContextRandomExt;
use crate::registry::ContextLocationsExt;

define_rng!(PopulationRng);

#[derive(Default)]
struct PopulationData {
    people: Vec<Person>,
}

define_data_plugin!(PopulationPlugin, PopulationData, PopulationData::default());

pub trait ContextPopulationExt {
    /// Creates a person living in `home`. Age, job, key-worker role and vaccine refusal are
    /// drawn from the installed parameters. The person starts out at home.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::UnknownLocation` if `home` is not a house, or
    /// `FacsError::InvalidParameter` if the age or job distribution has no positive weight.
    fn add_person(&mut self, home: LocationId) -> Result<PersonId, FacsError>;

    fn get_population_size(&self) -> usize;

    fn get_person(&self, person_id: PersonId) -> Option<&Person>;

    fn get_person_mut(&mut self, person_id: PersonId) -> Option<&mut Person>;

    fn person_ids(&self) -> Vec<PersonId>;

    /// Ids of everyone for whom `predicate` holds, in id order.
    fn query_people(&self, predicate: impl Fn(&Person) -> bool) -> Vec<PersonId>;

    /// Number of people currently in `status`.
    fn count_status(&self, status: HealthStatus) -> usize;

    /// Puts the person in a uniformly drawn group in `0..num_groups` for `kind`, so that the
    /// planner always sends them to the same instance of that amenity.
    ///
    /// # Errors
    ///
    /// Returns an error if the person is unknown, `kind` is not an amenity, or `num_groups`
    /// is 0.
    fn assign_group(
        &mut self,
        person_id: PersonId,
        kind: LocationType,
        num_groups: usize,
    ) -> Result<usize, FacsError>;

    /// Runs `f` on a working copy of the person with full access to the context, then stores
    /// the copy back. Use this for updates that also draw random numbers or touch counters.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::UnknownPerson` if there is no such person.
    fn with_person<T>(
        &mut self,
        person_id: PersonId,
        f: impl FnOnce(&mut Person, &mut Context) -> T,
    ) -> Result<T, FacsError>;
}

impl ContextPopulationExt for Context {
    fn add_person(&mut self, home: LocationId) -> Result<PersonId, FacsError> {
        if self.locations().house(home).is_none() {
            return Err(FacsError::UnknownLocation(home));
        }

        let parameters = self.parameters();
        let age_distribution = parameters.age_distribution.clone();
        let job_distribution = parameters.job_distribution;
        let antivax_fraction = parameters.antivax_fraction;
        let keyworker_fraction = parameters.keyworker_fraction;

        let age = self
            .sample_weighted(PopulationRng, &age_distribution)
            .and_then(|age| u8::try_from(age).ok())
            .ok_or_else(|| {
                FacsError::InvalidParameter("age_distribution has no positive weight".to_string())
            })?;
        let job = self
            .sample_weighted(PopulationRng, &job_distribution[..])
            .map(|index| Job::ALL[index])
            .ok_or_else(|| {
                FacsError::InvalidParameter("job_distribution has no positive weight".to_string())
            })?;

        let person_id = PersonId(self.get_population_size());
        let mut person = Person::new(person_id, home, age, job);
        person.antivax = self.sample_probability(PopulationRng, antivax_fraction);
        person.keyworker =
            job == Job::None && self.sample_probability(PopulationRng, keyworker_fraction);

        if let Some(house) = self.locations_mut().house_mut(home) {
            house.add_agent(person_id);
            house.increment_num_agents();
        }
        trace!("adding person {person_id} (age {age}, {job:?}) to house {home}");
        self.get_data_container_mut(PopulationPlugin)
            .people
            .push(person);
        Ok(person_id)
    }

    fn get_population_size(&self) -> usize {
        self.get_data_container(PopulationPlugin)
            .map_or(0, |data| data.people.len())
    }

    fn get_person(&self, person_id: PersonId) -> Option<&Person> {
        self.get_data_container(PopulationPlugin)?
            .people
            .get(person_id.0)
    }

    fn get_person_mut(&mut self, person_id: PersonId) -> Option<&mut Person> {
        self.get_data_container_mut(PopulationPlugin)
            .people
            .get_mut(person_id.0)
    }

    fn person_ids(&self) -> Vec<PersonId> {
        (0..self.get_population_size()).map(PersonId).collect()
    }

    fn query_people(&self, predicate: impl Fn(&Person) -> bool) -> Vec<PersonId> {
        let Some(data) = self.get_data_container(PopulationPlugin) else {
            return Vec::new();
        };
        data.people
            .iter()
            .filter(|person| predicate(person))
            .map(Person::id)
            .collect()
    }

    fn count_status(&self, status: HealthStatus) -> usize {
        self.get_data_container(PopulationPlugin)
            .map_or(0, |data| {
                data.people
                    .iter()
                    .filter(|person| person.status() == status)
                    .count()
            })
    }

    fn assign_group(
        &mut self,
        person_id: PersonId,
        kind: LocationType,
        num_groups: usize,
    ) -> Result<usize, FacsError> {
        if !kind.is_amenity() {
            return Err(FacsError::InvalidLocation(
                "Groups can only be assigned for amenities".to_string(),
            ));
        }
        if num_groups == 0 {
            return Err(FacsError::InvalidParameter(
                "num_groups must be at least 1".to_string(),
            ));
        }
        if self.get_person(person_id).is_none() {
            return Err(FacsError::UnknownPerson(person_id));
        }
        let group = self.sample_range(PopulationRng, 0..num_groups);
        if let Some(person) = self.get_person_mut(person_id) {
            person.set_group(kind, group);
        }
        Ok(group)
    }

    fn with_person<T>(
        &mut self,
        person_id: PersonId,
        f: impl FnOnce(&mut Person, &mut Context) -> T,
    ) -> Result<T, FacsError> {
        let mut person = self
            .get_person(person_id)
            .cloned()
            .ok_or(FacsError::UnknownPerson(person_id))?;
        let result = f(&mut person, self);
        if let Some(slot) = self.get_person_mut(person_id) {
            *slot = person;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LatLon;
    use crate::location::House;
    use crate::parameters::ParametersValues;
    use crate::registry::LocationRegistry;
    use std::collections::BTreeMap;

    fn context_with_house() -> Context {
        let mut context = Context::new();
        context.init_random(7);
        let mut registry = LocationRegistry::new();
        registry
            .add_house(House::new(LocationId(0), LatLon::new(51.5, -0.1).unwrap()))
            .unwrap();
        context.init_locations(registry, &BTreeMap::new()).unwrap();
        context
    }

    #[test]
    fn add_person_registers_in_house() {
        let mut context = context_with_house();
        let first = context.add_person(LocationId(0)).unwrap();
        let second = context.add_person(LocationId(0)).unwrap();
        assert_eq!(first, PersonId(0));
        assert_eq!(second, PersonId(1));
        assert_eq!(context.get_population_size(), 2);

        let house = context.locations().house(LocationId(0)).unwrap();
        assert_eq!(house.num_agents(), 2);
        assert_eq!(house.agents().collect::<Vec<_>>(), vec![first, second]);

        let person = context.get_person(first).unwrap();
        assert_eq!(person.home(), LocationId(0));
        assert_eq!(person.status(), HealthStatus::Susceptible);
    }

    #[test]
    fn add_person_needs_a_house() {
        let mut context = context_with_house();
        assert!(matches!(
            context.add_person(LocationId(5)),
            Err(FacsError::UnknownLocation(LocationId(5)))
        ));
        assert_eq!(context.get_population_size(), 0);
    }

    #[test]
    fn age_and_job_follow_distributions() {
        let mut context = context_with_house();
        let mut age_distribution = vec![0.0; 91];
        age_distribution[33] = 1.0;
        context
            .set_parameters(ParametersValues {
                age_distribution,
                job_distribution: [0.0, 0.0, 1.0, 0.0],
                antivax_fraction: 1.0,
                ..ParametersValues::default()
            })
            .unwrap();

        let person_id = context.add_person(LocationId(0)).unwrap();
        let person = context.get_person(person_id).unwrap();
        assert_eq!(person.age(), 33);
        assert_eq!(person.job(), Job::ShopWorker);
        assert!(person.is_antivax());
        assert!(!person.is_keyworker());
    }

    #[test]
    fn groups_are_within_range() {
        let mut context = context_with_house();
        let person_id = context.add_person(LocationId(0)).unwrap();
        for _ in 0..20 {
            let group = context
                .assign_group(person_id, LocationType::School, 3)
                .unwrap();
            assert!(group < 3);
            assert_eq!(
                context.get_person(person_id).unwrap().group(LocationType::School),
                Some(group)
            );
        }
        assert!(context
            .assign_group(person_id, LocationType::School, 0)
            .is_err());
        assert!(context
            .assign_group(person_id, LocationType::House, 2)
            .is_err());
        assert!(matches!(
            context.assign_group(PersonId(9), LocationType::Park, 2),
            Err(FacsError::UnknownPerson(PersonId(9)))
        ));
    }

    #[test]
    fn with_person_writes_back() {
        let mut context = context_with_house();
        let person_id = context.add_person(LocationId(0)).unwrap();
        let population = context
            .with_person(person_id, |person, context| {
                person.set_status(HealthStatus::Immune, 3.0);
                context.get_population_size()
            })
            .unwrap();
        assert_eq!(population, 1);
        assert_eq!(context.count_status(HealthStatus::Immune), 1);
        assert_eq!(context.query_people(Person::is_mobile), Vec::new());
        assert!(context.with_person(PersonId(4), |_, _| ()).is_err());
    }
}
