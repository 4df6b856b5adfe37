//! Static landmark map.
//!
//! The map is ground truth supplied from outside the filter. It is only ever read by the filter, and the same
//! instance is shared by every particle on every timestep.
use std::path::Path;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::sim::whitespace_reader;

/// A single point landmark in the map frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapLandmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}
impl MapLandmark {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        MapLandmark { id, x, y }
    }
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Row layout of a map file: `x y id`.
#[derive(Debug, Deserialize)]
struct MapRecord {
    x: f64,
    y: f64,
    id: u32,
}

/// An immutable collection of landmarks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    landmarks: Vec<MapLandmark>,
}
impl Map {
    pub fn new(landmarks: Vec<MapLandmark>) -> Self {
        Map { landmarks }
    }
    pub fn landmarks(&self) -> &[MapLandmark] {
        &self.landmarks
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    pub fn get(&self, id: u32) -> Option<&MapLandmark> {
        self.landmarks.iter().find(|l| l.id == id)
    }
    /// Landmarks whose x and y offsets from `center` are both within `range`.
    ///
    /// This is an axis-aligned box rather than a circle, so landmarks near the corners of the box are
    /// included even though they are up to $\sqrt{2}$ times `range` away.
    pub fn landmarks_in_box(
        &self,
        center: &Point2<f64>,
        range: f64,
    ) -> impl Iterator<Item = &MapLandmark> + use<'_> {
        let center = *center;
        self.landmarks
            .iter()
            .filter(move |l| (l.x - center.x).abs() <= range && (l.y - center.y).abs() <= range)
    }
    /// Reads a map from a whitespace-delimited text file with one `x y id` row per landmark.
    ///
    /// # Arguments
    /// * `path` - Path to the map file.
    ///
    /// # Returns
    /// * `Ok(Map)` if successful.
    /// * `Err` if the file cannot be read or a row cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = whitespace_reader(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let record: MapRecord = result?;
            landmarks.push(MapLandmark::new(record.id, record.x, record.y));
        }
        Ok(Map { landmarks })
    }
}
impl From<Vec<MapLandmark>> for Map {
    fn from(landmarks: Vec<MapLandmark>) -> Self {
        Map::new(landmarks)
    }
}
