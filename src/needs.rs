//! Daily needs: how many minutes a person wants to spend at each amenity category.
use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::FacsError;
use crate::location::{LocationType, AMENITY_COUNT};
use crate::person::Person;

/// Minutes per day for each category, in `LocationType::AMENITIES` order.
pub type Needs = [f64; AMENITY_COUNT];

/// Supplies the planner with the minutes a person wants to spend at each category today.
pub trait NeedsProvider {
    fn needs(&self, person: &Person) -> Needs;
}

#[derive(Debug, Deserialize)]
struct NeedsRecord {
    age: u8,
    #[serde(default)]
    office: f64,
    #[serde(default)]
    school: f64,
    #[serde(default)]
    hospital: f64,
    #[serde(default)]
    leisure: f64,
    #[serde(default)]
    shopping: f64,
    #[serde(default)]
    supermarket: f64,
    #[serde(default)]
    park: f64,
}

impl NeedsRecord {
    fn minutes(&self) -> Needs {
        [
            self.office,
            self.school,
            self.hospital,
            self.leisure,
            self.shopping,
            self.supermarket,
            self.park,
        ]
    }
}

/// Needs by age. A row applies from its age up to the next row's age; ages below the first row
/// use the first row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeedsTable {
    rows: BTreeMap<u8, Needs>,
}

impl NeedsTable {
    #[must_use]
    pub fn new() -> Self {
        NeedsTable::default()
    }

    /// A coarse built-in profile for children, school pupils, working-age adults and the
    /// elderly.
    #[must_use]
    pub fn standard() -> Self {
        let rows = BTreeMap::from([
            // office, school, hospital, leisure, shopping, supermarket, park
            (0, [0.0, 0.0, 5.0, 30.0, 10.0, 15.0, 45.0]),
            (5, [0.0, 360.0, 5.0, 60.0, 15.0, 15.0, 30.0]),
            (18, [300.0, 0.0, 5.0, 60.0, 30.0, 40.0, 30.0]),
            (65, [0.0, 0.0, 10.0, 60.0, 30.0, 45.0, 45.0]),
        ]);
        NeedsTable { rows }
    }

    /// Reads a needs file with an `age` column and one column per amenity category. Columns
    /// that are absent count as zero minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid minutes.
    pub fn load(path: &Path) -> Result<Self, FacsError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut table = NeedsTable::new();
        for record in reader.deserialize::<NeedsRecord>() {
            let record = record?;
            table.insert(record.age, record.minutes())?;
        }
        info!("Loaded needs for {} age groups from {}", table.rows.len(), path.display());
        Ok(table)
    }

    /// # Errors
    ///
    /// Returns `FacsError::InvalidParameter` if any minutes are negative or not finite.
    pub fn insert(&mut self, age: u8, minutes: Needs) -> Result<(), FacsError> {
        if minutes.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(FacsError::InvalidParameter(format!(
                "needs for age {age} must be non-negative minutes"
            )));
        }
        self.rows.insert(age, minutes);
        Ok(())
    }

    #[must_use]
    pub fn minutes_for_age(&self, age: u8) -> Needs {
        self.rows
            .range(..=age)
            .next_back()
            .or_else(|| self.rows.iter().next())
            .map_or([0.0; AMENITY_COUNT], |(_, minutes)| *minutes)
    }
}

fn clear(needs: &mut Needs, kind: LocationType) {
    if let Some(index) = kind.amenity_index() {
        needs[index] = 0.0;
    }
}

impl NeedsProvider for NeedsTable {
    fn needs(&self, person: &Person) -> Needs {
        let mut needs = self.minutes_for_age(person.age());
        if person.works_from_home() {
            clear(&mut needs, LocationType::Office);
        }
        if person.schools_from_home() {
            clear(&mut needs, LocationType::School);
        }
        needs
    }
}

define_data_plugin!(
    NeedsPlugin,
    Box<dyn NeedsProvider>,
    Box::new(NeedsTable::standard())
);

pub trait ContextNeedsExt {
    fn set_needs_provider(&mut self, provider: impl NeedsProvider + 'static);

    /// Loads a needs table from a CSV file and uses it for all planning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded.
    fn load_needs(&mut self, path: &Path) -> Result<(), FacsError>;

    fn needs_for(&mut self, person: &Person) -> Needs;
}

impl ContextNeedsExt for Context {
    fn set_needs_provider(&mut self, provider: impl NeedsProvider + 'static) {
        *self.get_data_container_mut(NeedsPlugin) = Box::new(provider);
    }

    fn load_needs(&mut self, path: &Path) -> Result<(), FacsError> {
        let table = NeedsTable::load(path)?;
        self.set_needs_provider(table);
        Ok(())
    }

    fn needs_for(&mut self, person: &Person) -> Needs {
        self.get_data_container_mut(NeedsPlugin).needs(person)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationId;
    use crate::person::{Job, PersonId};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn person(age: u8) -> Person {
        Person::new(PersonId(0), LocationId(0), age, Job::None)
    }

    #[test]
    fn rows_cover_age_ranges() {
        let table = NeedsTable::standard();
        assert_eq!(table.minutes_for_age(3)[1], 0.0);
        assert_eq!(table.minutes_for_age(10)[1], 360.0);
        assert_eq!(table.minutes_for_age(17)[1], 360.0);
        assert_eq!(table.minutes_for_age(40)[0], 300.0);
        assert_eq!(table.minutes_for_age(90)[0], 0.0);
        assert_eq!(NeedsTable::new().minutes_for_age(30), [0.0; AMENITY_COUNT]);
    }

    #[test]
    fn working_from_home_drops_office() {
        let table = NeedsTable::standard();
        let mut adult = person(30);
        assert_eq!(table.needs(&adult)[0], 300.0);
        adult.work_from_home = true;
        assert_eq!(table.needs(&adult)[0], 0.0);

        let mut pupil = person(12);
        pupil.school_from_home = true;
        assert_eq!(table.needs(&pupil)[1], 0.0);
        assert_eq!(table.needs(&pupil)[3], 60.0);
    }

    #[test]
    fn load_from_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "age, park, school, office").unwrap();
        writeln!(file, "0, 20, 0, 0").unwrap();
        writeln!(file, "6, 10, 300, 0").unwrap();
        let table = NeedsTable::load(file.path()).unwrap();
        assert_eq!(table.minutes_for_age(2), [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 20.0]);
        assert_eq!(table.minutes_for_age(8)[1], 300.0);
        assert_eq!(table.minutes_for_age(8)[6], 10.0);
    }

    #[test]
    fn negative_minutes_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "age,park").unwrap();
        writeln!(file, "0,-5").unwrap();
        assert!(matches!(
            NeedsTable::load(file.path()),
            Err(FacsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn provider_can_be_replaced() {
        struct Parkgoer;
        impl NeedsProvider for Parkgoer {
            fn needs(&self, _person: &Person) -> Needs {
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 120.0]
            }
        }

        let mut context = Context::new();
        assert_eq!(context.needs_for(&person(30))[0], 300.0);
        context.set_needs_provider(Parkgoer);
        assert_eq!(context.needs_for(&person(30))[6], 120.0);
    }
}
