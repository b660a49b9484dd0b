use anyhow::Context;
use log::info;
use std::fs;
use std::path::Path;
use trajcore::interface::airport::{Airport, AirportTable};

/// Reads a YAML list of airports.
pub fn load_airports<P: AsRef<Path>>(path: P) -> anyhow::Result<AirportTable> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref)
        .with_context(|| format!("reading airport list {}", path_ref.display()))?;
    let airports: Vec<Airport> = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing airport list {}", path_ref.display()))?;
    let with_elevation = airports.iter().filter(|a| a.elevation_ft.is_some()).count();
    info!(
        "loaded {} airports ({with_elevation} with elevation) from {}",
        airports.len(),
        path_ref.display()
    );
    Ok(AirportTable::new(airports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use trajcore::interface::airport::AirportLookup;
    use trajcore::math::geodesy::GeoPosition;

    #[test]
    fn airports_load_from_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"- name: Frankfurt\n  city: Frankfurt\n  country: Germany\n  iata: FRA\n  icao: EDDF\n  lat: 50.033\n  lon: 8.570\n  elevation_ft: 364\n\
- name: Egelsbach\n  lat: 49.961\n  lon: 8.641\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let table = load_airports(&path).unwrap();
        assert_eq!(table.len(), 2);
        let nearest = table
            .nearest_with_elevation(GeoPosition::from_degrees(49.96, 8.64))
            .unwrap();
        assert_eq!(nearest.icao.as_deref(), Some("EDDF"));
    }
}
