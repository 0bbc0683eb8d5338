// Circuit layouts loaded from GeoJSON LineStrings

use std::{collections::HashMap, fs, path::Path};

use log::{debug, info, warn};
use serde::Deserialize;
use uom::si::{f64::Length, length::meter};

use super::{LngLat, TrackPolyline};
use crate::TarmacError;

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    FeatureCollection { features: Vec<Feature> },
    Feature(Feature),
    LineString { coordinates: Vec<Vec<f64>> },
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString {
        coordinates: Vec<Vec<f64>>,
    },
    #[serde(other)]
    Unsupported,
}

impl Feature {
    fn name(&self) -> Option<&str> {
        ["Name", "name", "id"]
            .iter()
            .find_map(|key| self.properties.get(*key).and_then(|v| v.as_str()))
    }

    fn line_string(&self) -> Option<&[Vec<f64>]> {
        match &self.geometry {
            Some(Geometry::LineString { coordinates }) => Some(coordinates),
            _ => None,
        }
    }
}

/// Summary figures of a circuit layout
#[derive(Clone, Debug)]
pub struct TrackStats {
    pub length: Length,
    pub centroid: LngLat,
    /// [min_lng, min_lat, max_lng, max_lat]
    pub bbox: [f64; 4],
    pub coordinate_count: usize,
}

#[derive(Clone, Debug)]
pub struct Circuit {
    pub name: String,
    pub polyline: TrackPolyline,
}

impl Circuit {
    /// Parse a circuit from a GeoJSON LineString, Feature or FeatureCollection.
    ///
    /// For a collection, `name` selects the feature whose `Name`/`name`/`id`
    /// property matches; without it the first LineString feature is used.
    pub fn from_geojson_str(content: &str, name: Option<&str>) -> Result<Self, TarmacError> {
        let document: GeoJson = serde_json::from_str(content)
            .map_err(|e| TarmacError::CircuitParseError { source: e })?;

        let (circuit_name, raw) = match &document {
            GeoJson::LineString { coordinates } => {
                (name.unwrap_or("unnamed").to_string(), coordinates.as_slice())
            }
            GeoJson::Feature(feature) => {
                let raw = feature.line_string().ok_or_else(|| {
                    TarmacError::CircuitGeometryError {
                        reason: "feature geometry is not a LineString".to_string(),
                    }
                })?;
                let circuit_name = feature.name().or(name).unwrap_or("unnamed").to_string();
                (circuit_name, raw)
            }
            GeoJson::FeatureCollection { features } => {
                let feature = features
                    .iter()
                    .filter(|f| f.line_string().is_some())
                    .find(|f| name.is_none() || f.name() == name)
                    .ok_or_else(|| TarmacError::CircuitGeometryError {
                        reason: match name {
                            Some(n) => format!("no LineString feature named {n:?}"),
                            None => "collection holds no LineString feature".to_string(),
                        },
                    })?;
                let circuit_name = feature.name().unwrap_or("unnamed").to_string();
                (circuit_name, feature.line_string().unwrap_or_default())
            }
        };

        let coords: Vec<LngLat> = raw
            .iter()
            .filter_map(|position| match position.as_slice() {
                [lng, lat, ..] => Some(LngLat::new(*lng, *lat)),
                _ => {
                    warn!("Skipping malformed position {:?} in {}", position, circuit_name);
                    None
                }
            })
            .collect();

        if coords.is_empty() {
            return Err(TarmacError::CircuitGeometryError {
                reason: format!("{circuit_name} has no coordinates"),
            });
        }
        if coords.len() < 2 {
            warn!(
                "{} has a single coordinate, every car will be drawn at the same point",
                circuit_name
            );
        }
        debug!("Parsed {} coordinates for {}", coords.len(), circuit_name);

        Ok(Self {
            name: circuit_name,
            polyline: TrackPolyline::new(coords),
        })
    }

    pub fn stats(&self) -> TrackStats {
        let coords = self.polyline.coords();
        let count = coords.len().max(1) as f64;
        let centroid = LngLat::new(
            coords.iter().map(|c| c.lng).sum::<f64>() / count,
            coords.iter().map(|c| c.lat).sum::<f64>() / count,
        );
        let bbox = coords.iter().fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |b, c| [b[0].min(c.lng), b[1].min(c.lat), b[2].max(c.lng), b[3].max(c.lat)],
        );
        TrackStats {
            length: Length::new::<meter>(self.polyline.total_length_m()),
            centroid,
            bbox,
            coordinate_count: coords.len(),
        }
    }
}

pub fn load_circuit(path: &Path, name: Option<&str>) -> Result<Circuit, TarmacError> {
    let content =
        fs::read_to_string(path).map_err(|e| TarmacError::CircuitIOError { source: e })?;
    let circuit = Circuit::from_geojson_str(&content, name)?;
    info!(
        "Loaded circuit {} from {:?} ({} points, {:.0} m)",
        circuit.name,
        path,
        circuit.polyline.len(),
        circuit.polyline.total_length_m()
    );
    Ok(circuit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use uom::si::length::kilometer;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"Name": "Marker"}, "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}},
            {"type": "Feature", "properties": {"Name": "Circuit de Monaco"},
             "geometry": {"type": "LineString", "coordinates": [[7.42, 43.73, 12.0], [7.43, 43.73], [7.43, 43.74], [7.42, 43.73]]}},
            {"type": "Feature", "properties": {"Name": "Red Bull Ring"},
             "geometry": {"type": "LineString", "coordinates": [[14.76, 47.22], [14.77, 47.22]]}}
        ]
    }"#;

    #[test]
    fn test_select_feature_by_name() {
        let circuit = Circuit::from_geojson_str(COLLECTION, Some("Red Bull Ring")).unwrap();
        assert_eq!(circuit.name, "Red Bull Ring");
        assert_eq!(circuit.polyline.len(), 2);
    }

    #[test]
    fn test_first_line_string_without_name() {
        let circuit = Circuit::from_geojson_str(COLLECTION, None).unwrap();
        assert_eq!(circuit.name, "Circuit de Monaco");
        // altitude is dropped
        assert_eq!(circuit.polyline.coords()[0], LngLat::new(7.42, 43.73));
    }

    #[test]
    fn test_unknown_feature_name() {
        let result = Circuit::from_geojson_str(COLLECTION, Some("Imola"));
        assert!(matches!(result, Err(TarmacError::CircuitGeometryError { .. })));
    }

    #[test]
    fn test_bare_line_string_and_invalid_json() {
        let circuit = Circuit::from_geojson_str(
            r#"{"type":"LineString","coordinates":[[0.0,0.0],[0.0,1.0]]}"#,
            Some("test"),
        )
        .unwrap();
        assert_eq!(circuit.name, "test");

        assert!(matches!(
            Circuit::from_geojson_str("{not json", None),
            Err(TarmacError::CircuitParseError { .. })
        ));
        assert!(matches!(
            Circuit::from_geojson_str(r#"{"type":"LineString","coordinates":[]}"#, None),
            Err(TarmacError::CircuitGeometryError { .. })
        ));
    }

    #[test]
    fn test_track_stats() {
        let circuit = Circuit::from_geojson_str(
            r#"{"type":"LineString","coordinates":[[0.0,0.0],[0.0,1.0],[1.0,1.0]]}"#,
            None,
        )
        .unwrap();
        let stats = circuit.stats();
        assert_eq!(stats.coordinate_count, 3);
        assert_eq!(stats.bbox, [0.0, 0.0, 1.0, 1.0]);
        assert!((stats.centroid.lat - 2.0 / 3.0).abs() < 1e-12);
        // two one-degree legs near the equator
        assert!((stats.length.get::<kilometer>() - 222.37).abs() < 0.5);
    }

    #[test]
    fn test_load_circuit_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", COLLECTION).unwrap();
        file.flush().unwrap();
        let circuit = load_circuit(file.path(), Some("Circuit de Monaco")).unwrap();
        assert_eq!(circuit.polyline.len(), 4);

        assert!(matches!(
            load_circuit(Path::new("/no/such/circuit.geojson"), None),
            Err(TarmacError::CircuitIOError { .. })
        ));
    }
}
