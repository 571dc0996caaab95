//! Neighbourhood ranking. For each house, every amenity of each category is scored by
//! `size / distance` and the best `K` per category are kept in descending score order. The
//! ranking is computed once during setup and never changes afterwards.
use std::collections::BTreeMap;

use crate::error::FacsError;
use crate::geometry::haversine_distance;
use crate::location::{Amenity, House, LocationId, LocationType};

/// Distances below this many kilometres (including co-located buildings) are
/// treated as this distance when scoring, so scores stay finite.
pub const MIN_DISTANCE_KM: f64 = 0.001;

/// A scored relationship between one house and one amenity.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbour {
    house: LocationId,
    amenity: LocationId,
    amenity_type: LocationType,
    amenity_size: f64,
    distance: f64,
}

impl Neighbour {
    #[must_use]
    pub fn new(house: &House, amenity: &Amenity) -> Self {
        Neighbour {
            house: house.id(),
            amenity: amenity.id(),
            amenity_type: amenity.kind(),
            amenity_size: amenity.size(),
            distance: haversine_distance(house.coords(), amenity.coords()),
        }
    }

    #[must_use]
    pub fn house(&self) -> LocationId {
        self.house
    }

    #[must_use]
    pub fn amenity(&self) -> LocationId {
        self.amenity
    }

    #[must_use]
    pub fn amenity_type(&self) -> LocationType {
        self.amenity_type
    }

    #[must_use]
    pub fn amenity_size(&self) -> f64 {
        self.amenity_size
    }

    /// Great-circle distance between the house and the amenity in kilometres.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Attractiveness of the amenity for this house; higher is better.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.amenity_size / self.distance.max(MIN_DISTANCE_KM)
    }

    fn candidate(&self) -> Candidate {
        Candidate {
            location: self.amenity,
            size: self.amenity_size,
        }
    }
}

/// One location a person could visit, with the size used for weighted choice.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Candidate {
    pub location: LocationId,
    pub size: f64,
}

/// Result of a nearest-location lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum NearestLocations {
    /// Exactly one location to visit.
    Single(Candidate),
    /// Several co-equal choices in rank order; the planner picks one.
    Candidates(Vec<Candidate>),
}

/// A house's ranked view of the amenities around it.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbourhood {
    house: LocationId,
    neighbours: BTreeMap<LocationType, Vec<Neighbour>>,
}

impl Neighbourhood {
    /// # Errors
    ///
    /// Returns `FacsError::InvalidLocation` if a neighbour belongs to a different house or is
    /// filed under a category other than its amenity's type.
    pub fn new(
        house: LocationId,
        neighbours: BTreeMap<LocationType, Vec<Neighbour>>,
    ) -> Result<Self, FacsError> {
        for (kind, ranked) in &neighbours {
            for neighbour in ranked {
                if neighbour.house != house {
                    return Err(FacsError::InvalidLocation(
                        "House and neighbours must be in the same location".to_string(),
                    ));
                }
                if neighbour.amenity_type != *kind {
                    return Err(FacsError::InvalidLocation(format!(
                        "Amenity {} of type {} listed as {kind}",
                        neighbour.amenity, neighbour.amenity_type
                    )));
                }
            }
        }
        Ok(Neighbourhood { house, neighbours })
    }

    #[must_use]
    pub fn house(&self) -> LocationId {
        self.house
    }

    /// Ranked neighbours of the given type, best first. Empty if there are none.
    #[must_use]
    pub fn neighbours(&self, kind: LocationType) -> &[Neighbour] {
        self.neighbours
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The locations of `kind` a person from this house would go to. Weighted categories offer
    /// every kept neighbour as a candidate; other categories offer only the best one.
    #[must_use]
    pub fn nearest(&self, kind: LocationType, weighted: bool) -> Option<NearestLocations> {
        let ranked = self.neighbours(kind);
        let best = ranked.first()?;
        if weighted && ranked.len() > 1 {
            Some(NearestLocations::Candidates(
                ranked.iter().map(Neighbour::candidate).collect(),
            ))
        } else {
            Some(NearestLocations::Single(best.candidate()))
        }
    }
}

/// Builds the neighbourhood of `house`. For each category in `amenities_by_type`, every amenity is
/// scored and the best `K` are kept, where `K` comes from `k_by_type`. A negative or missing `K`
/// keeps all of them. Categories with no amenities get an empty list.
///
/// # Errors
///
/// Returns `FacsError::InvalidLocation` if an amenity is listed under a category other than its
/// own type.
pub fn create_neighbourhood(
    house: &House,
    amenities_by_type: &BTreeMap<LocationType, Vec<Amenity>>,
    k_by_type: &BTreeMap<LocationType, isize>,
) -> Result<Neighbourhood, FacsError> {
    let mut neighbours = BTreeMap::new();

    for (kind, amenities) in amenities_by_type {
        let mut ranked: Vec<Neighbour> = amenities
            .iter()
            .map(|amenity| Neighbour::new(house, amenity))
            .collect();
        // Stable sort, so equal scores keep their input order.
        ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));

        if let Some(&k) = k_by_type.get(kind) {
            if let Ok(k) = usize::try_from(k) {
                ranked.truncate(k);
            }
        }
        neighbours.insert(*kind, ranked);
    }

    Neighbourhood::new(house.id(), neighbours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LatLon;
    use assert_approx_eq::assert_approx_eq;

    fn house() -> House {
        House::new(LocationId(0), LatLon::new(0.0, 0.0).unwrap())
    }

    fn amenity(id: usize, lat: f64, size: f64, kind: LocationType) -> Amenity {
        Amenity::new(LocationId(id), LatLon::new(lat, 0.0).unwrap(), size, kind).unwrap()
    }

    fn shops() -> BTreeMap<LocationType, Vec<Amenity>> {
        BTreeMap::from([(
            LocationType::Shopping,
            vec![
                amenity(1, 0.02, 10.0, LocationType::Shopping),
                amenity(2, 0.01, 10.0, LocationType::Shopping),
                amenity(3, 0.01, 30.0, LocationType::Shopping),
                amenity(4, 0.05, 10.0, LocationType::Shopping),
            ],
        )])
    }

    fn ids(neighbours: &[Neighbour]) -> Vec<usize> {
        neighbours.iter().map(|n| n.amenity().0).collect()
    }

    #[test]
    fn ranks_by_size_over_distance() {
        let neighbourhood = create_neighbourhood(&house(), &shops(), &BTreeMap::new()).unwrap();
        let ranked = neighbourhood.neighbours(LocationType::Shopping);
        // Equal size: closer first. Equal distance: larger first.
        assert_eq!(ids(ranked), vec![3, 2, 1, 4]);
        assert!(ranked.windows(2).all(|w| w[0].score() >= w[1].score()));
        assert!(ranked.iter().all(|n| n.house() == LocationId(0)));
    }

    #[test]
    fn keeps_top_k() {
        let limits = BTreeMap::from([(LocationType::Shopping, 2)]);
        let neighbourhood = create_neighbourhood(&house(), &shops(), &limits).unwrap();
        assert_eq!(ids(neighbourhood.neighbours(LocationType::Shopping)), vec![3, 2]);

        let keep_all = BTreeMap::from([(LocationType::Shopping, -1)]);
        let neighbourhood = create_neighbourhood(&house(), &shops(), &keep_all).unwrap();
        assert_eq!(neighbourhood.neighbours(LocationType::Shopping).len(), 4);

        let none = BTreeMap::from([(LocationType::Shopping, 0)]);
        let neighbourhood = create_neighbourhood(&house(), &shops(), &none).unwrap();
        assert!(neighbourhood.neighbours(LocationType::Shopping).is_empty());
    }

    #[test]
    fn ranking_is_stable_for_fixed_inputs() {
        let first = create_neighbourhood(&house(), &shops(), &BTreeMap::new()).unwrap();
        let second = create_neighbourhood(&house(), &shops(), &BTreeMap::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ties_keep_input_order() {
        let amenities = BTreeMap::from([(
            LocationType::Park,
            vec![
                amenity(7, 0.01, 5.0, LocationType::Park),
                amenity(5, 0.01, 5.0, LocationType::Park),
                amenity(6, 0.01, 5.0, LocationType::Park),
            ],
        )]);
        let neighbourhood = create_neighbourhood(&house(), &amenities, &BTreeMap::new()).unwrap();
        assert_eq!(ids(neighbourhood.neighbours(LocationType::Park)), vec![7, 5, 6]);
    }

    #[test]
    fn empty_category_yields_empty_list() {
        let amenities = BTreeMap::from([(LocationType::Park, Vec::new())]);
        let neighbourhood = create_neighbourhood(&house(), &amenities, &BTreeMap::new()).unwrap();
        assert!(neighbourhood.neighbours(LocationType::Park).is_empty());
        assert!(neighbourhood.neighbours(LocationType::School).is_empty());
        assert!(neighbourhood.nearest(LocationType::Park, true).is_none());
    }

    #[test]
    fn co_located_amenity_has_finite_score() {
        let amenities = BTreeMap::from([(
            LocationType::Supermarket,
            vec![amenity(9, 0.0, 20.0, LocationType::Supermarket)],
        )]);
        let neighbourhood = create_neighbourhood(&house(), &amenities, &BTreeMap::new()).unwrap();
        let neighbour = &neighbourhood.neighbours(LocationType::Supermarket)[0];
        assert_approx_eq!(neighbour.distance(), 0.0);
        assert_approx_eq!(neighbour.score(), 20.0 / MIN_DISTANCE_KM);
    }

    #[test]
    fn mismatched_category_is_rejected() {
        let amenities = BTreeMap::from([(
            LocationType::School,
            vec![amenity(1, 0.01, 5.0, LocationType::Park)],
        )]);
        let result = create_neighbourhood(&house(), &amenities, &BTreeMap::new());
        assert!(matches!(result, Err(FacsError::InvalidLocation(_))));
    }

    #[test]
    fn foreign_neighbour_is_rejected() {
        let other = House::new(LocationId(99), LatLon::new(1.0, 1.0).unwrap());
        let neighbour = Neighbour::new(&other, &amenity(1, 0.01, 5.0, LocationType::Park));
        let result = Neighbourhood::new(
            LocationId(0),
            BTreeMap::from([(LocationType::Park, vec![neighbour])]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn nearest_respects_weighting() {
        let neighbourhood = create_neighbourhood(&house(), &shops(), &BTreeMap::new()).unwrap();
        match neighbourhood.nearest(LocationType::Shopping, false) {
            Some(NearestLocations::Single(candidate)) => {
                assert_eq!(candidate.location, LocationId(3));
            }
            other => panic!("expected a single location, got {other:?}"),
        }
        match neighbourhood.nearest(LocationType::Shopping, true) {
            Some(NearestLocations::Candidates(candidates)) => {
                assert_eq!(candidates.len(), 4);
                assert_eq!(candidates[0].location, LocationId(3));
            }
            other => panic!("expected candidates, got {other:?}"),
        }
    }
}
