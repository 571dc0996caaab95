//! The location registry owns every house and amenity in the simulation. Houses and amenities
//! refer to each other only by `LocationId`; the registry resolves those ids.
use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::error::FacsError;
use crate::geometry::LatLon;
use crate::hashing::{HashMap, HashMapExt};
use crate::location::{Amenity, House, Location, LocationId, LocationType};
use crate::neighbourhood::{create_neighbourhood, NearestLocations};
use crate::random::ContextRandomExt;

define_rng!(LocationsRng);

#[derive(Copy, Clone, Debug)]
enum Slot {
    House(usize),
    Amenity(LocationType, usize),
}

#[derive(Debug)]
pub struct LocationRegistry {
    houses: Vec<House>,
    amenities: BTreeMap<LocationType, Vec<Amenity>>,
    index: HashMap<LocationId, Slot>,
}

impl Default for LocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        LocationRegistry {
            houses: Vec::new(),
            amenities: LocationType::AMENITIES
                .into_iter()
                .map(|kind| (kind, Vec::new()))
                .collect(),
            index: HashMap::new(),
        }
    }

    fn claim(&mut self, id: LocationId, slot: Slot) -> Result<(), FacsError> {
        if self.index.contains_key(&id) {
            return Err(FacsError::InvalidLocation(format!(
                "Duplicate location id {id}"
            )));
        }
        self.index.insert(id, slot);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if the id is already taken.
    pub fn add_house(&mut self, house: House) -> Result<LocationId, FacsError> {
        let id = house.id();
        self.claim(id, Slot::House(self.houses.len()))?;
        self.houses.push(house);
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if the id is already taken.
    pub fn add_amenity(&mut self, amenity: Amenity) -> Result<LocationId, FacsError> {
        let id = amenity.id();
        let kind = amenity.kind();
        let of_kind = self.amenities.entry(kind).or_default();
        let position = of_kind.len();
        if self.index.contains_key(&id) {
            return Err(FacsError::InvalidLocation(format!(
                "Duplicate location id {id}"
            )));
        }
        of_kind.push(amenity);
        self.index.insert(id, Slot::Amenity(kind, position));
        Ok(id)
    }

    #[must_use]
    pub fn houses(&self) -> &[House] {
        &self.houses
    }

    /// All amenities of one category, in insertion order.
    #[must_use]
    pub fn amenities(&self, kind: LocationType) -> &[Amenity] {
        self.amenities
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn amenities_by_type(&self) -> &BTreeMap<LocationType, Vec<Amenity>> {
        &self.amenities
    }

    #[must_use]
    pub fn num_locations(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn house(&self, id: LocationId) -> Option<&House> {
        match self.index.get(&id)? {
            Slot::House(position) => self.houses.get(*position),
            Slot::Amenity(..) => None,
        }
    }

    pub fn house_mut(&mut self, id: LocationId) -> Option<&mut House> {
        match self.index.get(&id)? {
            Slot::House(position) => self.houses.get_mut(*position),
            Slot::Amenity(..) => None,
        }
    }

    #[must_use]
    pub fn amenity(&self, id: LocationId) -> Option<&Amenity> {
        match self.index.get(&id)? {
            Slot::Amenity(kind, position) => self.amenities.get(kind)?.get(*position),
            Slot::House(_) => None,
        }
    }

    #[must_use]
    pub fn location(&self, id: LocationId) -> Option<&Location> {
        match self.index.get(&id)? {
            Slot::House(position) => self.houses.get(*position).map(|house| &**house),
            Slot::Amenity(kind, position) => self
                .amenities
                .get(kind)?
                .get(*position)
                .map(|amenity| &**amenity),
        }
    }


    /// The amenity of `kind` that members of group `group` always use. Groups wrap around the
    /// amenities of that kind. `None` if there are no amenities of that kind.
    #[must_use]
    pub fn location_by_group(&self, kind: LocationType, group: usize) -> Option<LocationId> {
        let of_kind = self.amenities(kind);
        if of_kind.is_empty() {
            return None;
        }
        Some(of_kind[group % of_kind.len()].id())
    }

    /// Ranks the amenities around every house, replacing any earlier neighbourhoods.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if the registry is inconsistent.
    pub fn build_neighbourhoods(
        &mut self,
        k_by_type: &BTreeMap<LocationType, isize>,
    ) -> Result<(), FacsError> {
        for house in &mut self.houses {
            let neighbourhood = create_neighbourhood(house, &self.amenities, k_by_type)?;
            house.set_neighbourhood(neighbourhood)?;
        }
        debug!("built neighbourhoods for {} houses", self.houses.len());
        Ok(())
    }

    /// The precomputed nearest locations of `kind` for a house. `None` if the house is unknown,
    /// has no neighbourhood yet, or has no neighbours of that kind.
    #[must_use]
    pub fn nearest_locations(
        &self,
        house: LocationId,
        kind: LocationType,
        weighted: bool,
    ) -> Option<NearestLocations> {
        self.house(house)?.neighbourhood()?.nearest(kind, weighted)
    }
}

#[derive(Debug, Deserialize)]
struct BuildingRecord {
    location_type: String,
    lon: f64,
    lat: f64,
    size: f64,
}

/// Reads a buildings file with one `location_type,lon,lat,size` row per location and no header.
/// The row number becomes the location id. House rows ignore the size column.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a row is malformed, or a location is invalid.
pub fn load_buildings(path: &Path) -> Result<LocationRegistry, FacsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut registry = LocationRegistry::new();

    for (row, record) in reader.deserialize::<BuildingRecord>().enumerate() {
        let record = record?;
        let id = LocationId(row);
        let coords = LatLon::new(record.lat, record.lon)?;
        match record.location_type.parse::<LocationType>()? {
            LocationType::House => registry.add_house(House::new(id, coords))?,
            kind => registry.add_amenity(Amenity::new(id, coords, record.size, kind)?)?,
        };
    }

    info!(
        "Loaded {} locations ({} houses) from {}",
        registry.num_locations(),
        registry.houses().len(),
        path.display()
    );
    Ok(registry)
}

define_data_plugin!(LocationsPlugin, LocationRegistry, LocationRegistry::new());

pub trait ContextLocationsExt {
    /// Installs `registry` and builds the neighbourhood of every house.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if a neighbourhood cannot be built.
    fn init_locations(
        &mut self,
        registry: LocationRegistry,
        k_by_type: &BTreeMap<LocationType, isize>,
    ) -> Result<(), FacsError>;

    fn locations(&mut self) -> &LocationRegistry;

    fn locations_mut(&mut self) -> &mut LocationRegistry;

    /// # Errors
    ///
    /// Returns `FacsError::UnknownLocation` if no location has this id.
    fn coordinates(&mut self, location: LocationId) -> Result<LatLon, FacsError>;

    /// Picks the hospital a newly hospitalised person is admitted to, uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::NoHospital` if there are no hospitals.
    fn find_hospital(&mut self) -> Result<LocationId, FacsError>;
}

impl ContextLocationsExt for Context {
    fn init_locations(
        &mut self,
        mut registry: LocationRegistry,
        k_by_type: &BTreeMap<LocationType, isize>,
    ) -> Result<(), FacsError> {
        registry.build_neighbourhoods(k_by_type)?;
        *self.get_data_container_mut(LocationsPlugin) = registry;
        Ok(())
    }

    fn locations(&mut self) -> &LocationRegistry {
        self.get_data_container_mut(LocationsPlugin)
    }

    fn locations_mut(&mut self) -> &mut LocationRegistry {
        self.get_data_container_mut(LocationsPlugin)
    }

    fn coordinates(&mut self, location: LocationId) -> Result<LatLon, FacsError> {
        self.locations()
            .location(location)
            .map(Location::coords)
            .ok_or(FacsError::UnknownLocation(location))
    }

    fn find_hospital(&mut self) -> Result<LocationId, FacsError> {
        let num_hospitals = self.locations().amenities(LocationType::Hospital).len();
        if num_hospitals == 0 {
            return Err(FacsError::NoHospital);
        }
        let choice = self.sample_range(LocationsRng, 0..num_hospitals);
        Ok(self.locations().amenities(LocationType::Hospital)[choice].id())
    }
}
