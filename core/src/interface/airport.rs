use crate::math::geodesy::{great_circle_distance_estimate, GeoPosition};
use serde::{Deserialize, Serialize};

/// Airport reference record; elevation is in feet when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub iata: Option<String>,
    #[serde(default)]
    pub icao: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation_ft: Option<f64>,
}

impl Airport {
    pub fn position(&self) -> GeoPosition {
        GeoPosition::from_degrees(self.lat, self.lon)
    }
}

/// Read-only airport reference shared by all batch workers.
pub trait AirportLookup: Send + Sync {
    fn nearest_with_elevation(&self, position: GeoPosition) -> Option<&Airport>;
}

#[derive(Debug, Clone, Default)]
pub struct AirportTable {
    airports: Vec<Airport>,
}

impl AirportTable {
    pub fn new(airports: Vec<Airport>) -> Self {
        Self { airports }
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}

impl AirportLookup for AirportTable {
    fn nearest_with_elevation(&self, position: GeoPosition) -> Option<&Airport> {
        self.airports
            .iter()
            .filter(|airport| airport.elevation_ft.is_some())
            .map(|airport| {
                (
                    airport,
                    great_circle_distance_estimate(position, airport.position()),
                )
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(airport, _)| airport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airport(icao: &str, lat: f64, lon: f64, elevation_ft: Option<f64>) -> Airport {
        Airport {
            name: icao.into(),
            city: String::new(),
            country: String::new(),
            iata: None,
            icao: Some(icao.into()),
            lat,
            lon,
            elevation_ft,
        }
    }

    #[test]
    fn nearest_skips_airports_without_elevation() {
        let table = AirportTable::new(vec![
            airport("EDVE", 52.319, 10.556, None),
            airport("EDDV", 52.461, 9.685, Some(183.0)),
            airport("EDDM", 48.354, 11.786, Some(1487.0)),
        ]);
        let near_braunschweig = GeoPosition::from_degrees(52.3, 10.5);
        let found = table.nearest_with_elevation(near_braunschweig).unwrap();
        assert_eq!(found.icao.as_deref(), Some("EDDV"));
    }

    #[test]
    fn empty_table_finds_nothing() {
        let table = AirportTable::default();
        assert!(table.is_empty());
        assert!(table
            .nearest_with_elevation(GeoPosition::from_degrees(0.0, 0.0))
            .is_none());
    }
}
