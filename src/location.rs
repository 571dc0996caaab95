//! Typed locations. Every location has an identity, validated coordinates and a non-negative
//! size. Houses additionally track the people currently present and, once the neighbourhoods are
//! built, their ranked view of nearby amenities.
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FacsError;
use crate::geometry::LatLon;
use crate::neighbourhood::Neighbourhood;
use crate::person::PersonId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    House,
    Office,
    School,
    Hospital,
    Leisure,
    Shopping,
    Supermarket,
    Park,
}

/// Number of amenity categories, i.e. every location type except `House`.
pub const AMENITY_COUNT: usize = 7;

impl LocationType {
    pub const ALL: [LocationType; 8] = [
        LocationType::House,
        LocationType::Office,
        LocationType::School,
        LocationType::Hospital,
        LocationType::Leisure,
        LocationType::Shopping,
        LocationType::Supermarket,
        LocationType::Park,
    ];

    /// The categories people visit, in the column order used by needs profiles.
    pub const AMENITIES: [LocationType; AMENITY_COUNT] = [
        LocationType::Office,
        LocationType::School,
        LocationType::Hospital,
        LocationType::Leisure,
        LocationType::Shopping,
        LocationType::Supermarket,
        LocationType::Park,
    ];

    #[must_use]
    pub fn is_amenity(self) -> bool {
        self != LocationType::House
    }

    /// Position of this category in `LocationType::AMENITIES`, `None` for houses.
    #[must_use]
    pub fn amenity_index(self) -> Option<usize> {
        LocationType::AMENITIES.iter().position(|kind| *kind == self)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LocationType::House => "house",
            LocationType::Office => "office",
            LocationType::School => "school",
            LocationType::Hospital => "hospital",
            LocationType::Leisure => "leisure",
            LocationType::Shopping => "shopping",
            LocationType::Supermarket => "supermarket",
            LocationType::Park => "park",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LocationType {
    type Err = FacsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocationType::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| FacsError::InvalidLocation(format!("Unknown location type '{s}'")))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub usize);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    id: LocationId,
    coords: LatLon,
    size: f64,
    kind: LocationType,
    num_agents: usize,
}

impl Location {
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if `size` is negative or not finite.
    pub fn new(
        id: LocationId,
        coords: LatLon,
        size: f64,
        kind: LocationType,
    ) -> Result<Self, FacsError> {
        if !size.is_finite() || size < 0.0 {
            return Err(FacsError::InvalidLocation(
                "Size must be greater or equal to 0".to_string(),
            ));
        }
        Ok(Location {
            id,
            coords,
            size,
            kind,
            num_agents: 0,
        })
    }

    #[must_use]
    pub fn id(&self) -> LocationId {
        self.id
    }

    #[must_use]
    pub fn coords(&self) -> LatLon {
        self.coords
    }

    #[must_use]
    pub fn size(&self) -> f64 {
        self.size
    }

    #[must_use]
    pub fn kind(&self) -> LocationType {
        self.kind
    }

    /// Number of people whose current location is this one.
    #[must_use]
    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn increment_num_agents(&mut self) {
        self.num_agents += 1;
    }
}

#[derive(Clone, Debug)]
pub struct House {
    location: Location,
    agents: BTreeSet<PersonId>,
    neighbourhood: Option<Neighbourhood>,
}

impl House {
    /// Houses always have size 0.
    #[must_use]
    pub fn new(id: LocationId, coords: LatLon) -> Self {
        House {
            location: Location {
                id,
                coords,
                size: 0.0,
                kind: LocationType::House,
                num_agents: 0,
            },
            agents: BTreeSet::new(),
            neighbourhood: None,
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.agents.iter().copied()
    }

    pub fn add_agent(&mut self, person_id: PersonId) -> bool {
        self.agents.insert(person_id)
    }

    #[must_use]
    pub fn neighbourhood(&self) -> Option<&Neighbourhood> {
        self.neighbourhood.as_ref()
    }

    /// Assigns the house's neighbourhood, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if the neighbourhood belongs to another house.
    pub fn set_neighbourhood(&mut self, neighbourhood: Neighbourhood) -> Result<(), FacsError> {
        if neighbourhood.house() != self.location.id {
            return Err(FacsError::InvalidLocation(format!(
                "Neighbourhood of house {} assigned to house {}",
                neighbourhood.house(),
                self.location.id
            )));
        }
        self.neighbourhood = Some(neighbourhood);
        Ok(())
    }
}

impl Deref for House {
    type Target = Location;

    fn deref(&self) -> &Location {
        &self.location
    }
}

impl DerefMut for House {
    fn deref_mut(&mut self) -> &mut Location {
        &mut self.location
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Amenity {
    location: Location,
}

impl Amenity {
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if `kind` is `House` or `size` is invalid.
    pub fn new(
        id: LocationId,
        coords: LatLon,
        size: f64,
        kind: LocationType,
    ) -> Result<Self, FacsError> {
        if !kind.is_amenity() {
            return Err(FacsError::InvalidLocation(
                "Amenity cannot be a house".to_string(),
            ));
        }
        Ok(Amenity {
            location: Location::new(id, coords, size, kind)?,
        })
    }
}

impl Deref for Amenity {
    type Target = Location;

    fn deref(&self) -> &Location {
        &self.location
    }
}

impl DerefMut for Amenity {
    fn deref_mut(&mut self) -> &mut Location {
        &mut self.location
    }
}
