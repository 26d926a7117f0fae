//! Planar polygon model and the point-in-polygon test used by the spatial
//! filter.
//!
//! The containment test is a deterministic ray cast with an explicit
//! boundary convention: a point lying exactly on a ring edge or vertex is
//! considered inside. This decides which grid cells at a region's edge get
//! included, so it is implemented here rather than delegated to a geometry
//! library with its own tie-breaking.

use crate::geometry::error::RegionError;

const EPS: f64 = 1e-12;

/// Geographic bounding box in degrees. `south < north`, `west < east`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self, RegionError> {
        if !(south < north && west < east)
            || !north.is_finite()
            || !south.is_finite()
            || !east.is_finite()
            || !west.is_finite()
        {
            return Err(RegionError::InvalidBoundingBox {
                north,
                south,
                east,
                west,
            });
        }
        Ok(Self {
            north,
            south,
            east,
            west,
        })
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            north: self.north.max(other.north),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            west: self.west.min(other.west),
        }
    }

    /// Expands the box outward to the nearest multiple of `step` degrees, so
    /// the retrieval request covers whole grid cells at the region's edge.
    pub fn snap_outward(&self, step: f64) -> BoundingBox {
        if step <= 0.0 {
            return *self;
        }
        BoundingBox {
            north: ((self.north / step).ceil() * step).min(90.0),
            south: ((self.south / step).floor() * step).max(-90.0),
            east: ((self.east / step).ceil() * step).min(180.0),
            west: ((self.west / step).floor() * step).max(-180.0),
        }
    }
}

/// A closed ring of (lon, lat) vertices. The closing vertex is implied.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    vertices: Vec<(f64, f64)>,
}

impl Ring {
    /// Builds a ring from (lon, lat) vertices, dropping an explicit closing
    /// vertex if present. Fails on fewer than 3 distinct vertices or zero
    /// area.
    pub fn new(mut vertices: Vec<(f64, f64)>, feature: &str) -> Result<Self, RegionError> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        let mut distinct = vertices.clone();
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(RegionError::DegenerateRing {
                feature: feature.to_string(),
                reason: format!("only {} distinct vertices", distinct.len()),
            });
        }
        let ring = Self { vertices };
        if ring.signed_area().abs() < EPS {
            return Err(RegionError::DegenerateRing {
                feature: feature.to_string(),
                reason: "zero area".to_string(),
            });
        }
        Ok(ring)
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Shoelace area; sign encodes winding order.
    fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        let mut acc = 0.0;
        for i in 0..n {
            let (x1, y1) = self.vertices[i];
            let (x2, y2) = self.vertices[(i + 1) % n];
            acc += x1 * y2 - x2 * y1;
        }
        acc / 2.0
    }

    fn bounding_box(&self) -> BoundingBox {
        let mut north = f64::NEG_INFINITY;
        let mut south = f64::INFINITY;
        let mut east = f64::NEG_INFINITY;
        let mut west = f64::INFINITY;
        for &(lon, lat) in &self.vertices {
            north = north.max(lat);
            south = south.min(lat);
            east = east.max(lon);
            west = west.min(lon);
        }
        BoundingBox {
            north,
            south,
            east,
            west,
        }
    }

    /// True when the point lies exactly on one of the ring's edges.
    fn on_boundary(&self, lon: f64, lat: f64) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let (x1, y1) = self.vertices[i];
            let (x2, y2) = self.vertices[(i + 1) % n];
            let cross = (x2 - x1) * (lat - y1) - (y2 - y1) * (lon - x1);
            if cross.abs() > EPS {
                continue;
            }
            let within_x = lon >= x1.min(x2) - EPS && lon <= x1.max(x2) + EPS;
            let within_y = lat >= y1.min(y2) - EPS && lat <= y1.max(y2) + EPS;
            if within_x && within_y {
                return true;
            }
        }
        false
    }

    /// Even-odd ray cast along +longitude. Excludes the boundary;
    /// [`Ring::covers`] layers the inclusive convention on top.
    fn crossings_contain(&self, lon: f64, lat: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > lat) != (yj > lat) {
                let x_cross = xj + (lat - yj) / (yi - yj) * (xi - xj);
                if lon < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Boundary-inclusive containment.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.on_boundary(lon, lat) || self.crossings_contain(lon, lat)
    }
}

/// One polygon: an exterior ring and zero or more holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.exterior.bounding_box()
    }

    /// Boundary-inclusive containment: on the exterior or a hole boundary
    /// counts as inside; strictly inside a hole does not.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        if self.exterior.on_boundary(lon, lat) {
            return true;
        }
        if !self.exterior.crossings_contain(lon, lat) {
            return false;
        }
        for hole in &self.holes {
            if hole.on_boundary(lon, lat) {
                return true;
            }
            if hole.crossings_contain(lon, lat) {
                return false;
            }
        }
        true
    }
}

/// A named region feature: one or more polygons plus the attribute values
/// used as extra aggregation-group keys ("distinguishing features").
#[derive(Debug, Clone)]
pub struct PolygonFeature {
    pub label: String,
    pub polygons: Vec<Polygon>,
    /// (property name, value) pairs, in the order the caller requested them.
    pub attrs: Vec<(String, String)>,
}

impl PolygonFeature {
    pub fn bounding_box(&self) -> BoundingBox {
        let mut boxes = self.polygons.iter().map(Polygon::bounding_box);
        let first = boxes.next().expect("feature has at least one polygon");
        boxes.fold(first, |acc, b| acc.union(&b))
    }

    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.covers(lon, lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Ring {
        Ring::new(
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
            "test",
        )
        .unwrap()
    }

    #[test]
    fn square_contains_interior_point() {
        let ring = unit_square();
        assert!(ring.covers(0.5, 0.5));
        assert!(!ring.covers(1.5, 0.5));
        assert!(!ring.covers(0.5, -0.1));
    }

    #[test]
    fn boundary_points_are_inside() {
        let ring = unit_square();
        assert!(ring.covers(0.0, 0.5)); // edge
        assert!(ring.covers(1.0, 1.0)); // vertex
        assert!(ring.covers(0.5, 0.0)); // bottom edge
    }

    #[test]
    fn degenerate_rings_are_rejected() {
        let two_points = Ring::new(vec![(0.0, 0.0), (1.0, 1.0)], "line");
        assert!(matches!(
            two_points,
            Err(RegionError::DegenerateRing { .. })
        ));

        let collinear = Ring::new(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)], "flat");
        assert!(matches!(collinear, Err(RegionError::DegenerateRing { .. })));
    }

    #[test]
    fn closing_vertex_is_dropped() {
        let ring = Ring::new(
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
            "closed",
        )
        .unwrap();
        assert_eq!(ring.vertices().len(), 4);
    }

    #[test]
    fn holes_are_excluded_but_their_boundary_counts() {
        let exterior = Ring::new(
            vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)],
            "outer",
        )
        .unwrap();
        let hole = Ring::new(
            vec![(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0)],
            "hole",
        )
        .unwrap();
        let poly = Polygon::new(exterior, vec![hole]);

        assert!(poly.covers(0.5, 0.5));
        assert!(!poly.covers(2.0, 2.0)); // inside the hole
        assert!(poly.covers(1.0, 2.0)); // on the hole boundary
        assert!(poly.covers(4.0, 4.0)); // exterior vertex
    }

    #[test]
    fn concave_polygon_ray_cast() {
        // A "U" shape; the notch between the arms is outside.
        let ring = Ring::new(
            vec![
                (0.0, 0.0),
                (5.0, 0.0),
                (5.0, 5.0),
                (4.0, 5.0),
                (4.0, 1.0),
                (1.0, 1.0),
                (1.0, 5.0),
                (0.0, 5.0),
            ],
            "u",
        )
        .unwrap();
        assert!(ring.covers(0.5, 3.0)); // left arm
        assert!(ring.covers(4.5, 3.0)); // right arm
        assert!(!ring.covers(2.5, 3.0)); // notch
        assert!(ring.covers(2.5, 0.5)); // base
    }

    #[test]
    fn bbox_union_and_snap() {
        let a = BoundingBox::new(2.0, 1.0, 2.0, 1.0).unwrap();
        let b = BoundingBox::new(4.1, 3.0, 4.1, 3.0).unwrap();
        let u = a.union(&b);
        assert_eq!(u.north, 4.1);
        assert_eq!(u.south, 1.0);

        let snapped = u.snap_outward(0.25);
        assert_eq!(snapped.north, 4.25);
        assert_eq!(snapped.south, 1.0);
        assert_eq!(snapped.east, 4.25);
        assert_eq!(snapped.west, 1.0);
    }

    #[test]
    fn invalid_bbox_is_rejected() {
        assert!(BoundingBox::new(1.0, 2.0, 3.0, 0.0).is_err()); // south > north
        assert!(BoundingBox::new(2.0, 1.0, 0.0, 3.0).is_err()); // west > east
    }
}
