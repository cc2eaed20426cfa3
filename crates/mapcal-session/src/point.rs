use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One calibration landmark as listed by the project, in map coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub name: String,
    /// Distinguishes points sharing the same `name`.
    #[serde(default)]
    pub index: u32,
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub fn new(name: impl Into<String>, index: u32, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            index,
            x,
            y,
        }
    }

    /// Display label, e.g. `door_P0`.
    pub fn label(&self) -> String {
        format!("{}_P{}", self.name, self.index)
    }
}

/// A map point together with its (eventually) captured real coordinate.
///
/// The map coordinate is fixed at construction; the real coordinate is
/// written once, by the session, when the point is captured.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationPoint {
    name: String,
    index: u32,
    map: Point2<f64>,
    real: Option<Point2<f64>>,
}

impl CalibrationPoint {
    pub(crate) fn from_map_point(p: MapPoint) -> Self {
        Self {
            name: p.name,
            index: p.index,
            map: Point2::new(p.x, p.y),
            real: None,
        }
    }

    pub(crate) fn record_real(&mut self, real: Point2<f64>) {
        debug_assert!(self.real.is_none(), "{} captured twice", self.label());
        self.real = Some(real);
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn label(&self) -> String {
        format!("{}_P{}", self.name, self.index)
    }

    #[inline]
    pub fn map(&self) -> Point2<f64> {
        self.map
    }

    #[inline]
    pub fn real(&self) -> Option<Point2<f64>> {
        self.real
    }

    /// `(map, real)` once captured.
    pub fn correspondence(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        self.real.map(|real| (self.map, real))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_defaults_to_zero_in_json() {
        let p: MapPoint = serde_json::from_str(r#"{"name":"door","x":1.5,"y":-2}"#).unwrap();
        assert_eq!(p, MapPoint::new("door", 0, 1.5, -2.0));
        assert_eq!(p.label(), "door_P0");
    }

    #[test]
    fn correspondence_requires_capture() {
        let mut p = CalibrationPoint::from_map_point(MapPoint::new("hall", 2, 4.0, 5.0));
        assert_eq!(p.label(), "hall_P2");
        assert!(p.correspondence().is_none());

        p.record_real(Point2::new(0.4, 0.5));
        assert_eq!(
            p.correspondence(),
            Some((Point2::new(4.0, 5.0), Point2::new(0.4, 0.5)))
        );
    }
}
