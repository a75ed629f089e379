//! Classifies which sides of a polygon were cut off by a scene extent.
//!
//! The cut edges are the parts of the clipped polygon's boundary that do not
//! lie on the original polygon's boundary. Each cut edge is horizontal or
//! vertical by its angle (45° threshold) and is matched against the clipped
//! polygon's extreme coordinates to decide the side.

use std::f64::consts::{FRAC_PI_4, PI};

use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, Line, MultiPolygon, Polygon, Rect,
};

use crate::error::{DrillError, Result};

/// Boundary flag column names, in `Directions::flags` order.
pub const FLAG_COLUMNS: [&str; 4] = ["conflux_n", "conflux_s", "conflux_e", "conflux_w"];

/// Relative tolerance for coordinate comparisons after clipping.
const REL_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

/// Set of sides along which a polygon overflows an extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directions {
    pub north: bool,
    pub south: bool,
    pub east: bool,
    pub west: bool,
}

impl Directions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, direction: Direction) {
        match direction {
            Direction::North => self.north = true,
            Direction::South => self.south = true,
            Direction::East => self.east = true,
            Direction::West => self.west = true,
        }
    }

    pub fn contains(&self, direction: Direction) -> bool {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.north || self.south || self.east || self.west)
    }

    /// `[n, s, e, w]`, matching [`FLAG_COLUMNS`].
    pub fn flags(&self) -> [bool; 4] {
        [self.north, self.south, self.east, self.west]
    }
}

/// Sides of `original` cut away in `clipped`.
///
/// `clipped` must be `original` intersected with an extent. Returns an empty
/// set when no cut edge can be found; callers decide whether that is legal.
pub fn classify_cut(original: &MultiPolygon<f64>, clipped: &MultiPolygon<f64>) -> Directions {
    let mut directions = Directions::none();
    let Some(clip_bounds) = clipped.bounding_rect() else {
        return directions;
    };
    let tol = tolerance(original.bounding_rect().unwrap_or(clip_bounds));

    let original_edges = edges(original);
    for edge in edges(clipped) {
        for piece in uncovered_pieces(edge, &original_edges, tol) {
            if let Some(direction) = side_of(piece, &clip_bounds, tol) {
                directions.insert(direction);
            }
        }
    }
    directions
}

/// Clip `original` to `extent` and classify the cut sides.
///
/// Contained, disjoint and zero-area clips yield an empty set. A strict clip
/// (area ratio in (0, 1)) that yields no side is a
/// [`DrillError::GeometryInvariantViolation`].
pub fn boundary_directions(
    original: &MultiPolygon<f64>,
    extent: &Polygon<f64>,
) -> Result<Directions> {
    if extent.contains(original) {
        return Ok(Directions::none());
    }
    let original_area = original.unsigned_area();
    if original_area <= 0.0 {
        return Ok(Directions::none());
    }

    let clipped = original.intersection(&MultiPolygon::new(vec![extent.clone()]));
    let ratio = clipped.unsigned_area() / original_area;
    if ratio <= 0.0 || ratio >= 1.0 {
        return Ok(Directions::none());
    }

    let directions = classify_cut(original, &clipped);
    if directions.is_empty() {
        // Clipping noise can leave a ratio a hair under one with nothing cut.
        if 1.0 - ratio <= REL_TOLERANCE {
            return Ok(directions);
        }
        return Err(DrillError::geometry(format!(
            "clip kept {:.6} of the polygon but no cut side was found",
            ratio
        )));
    }
    Ok(directions)
}

fn tolerance(bounds: Rect<f64>) -> f64 {
    let scale = bounds.width().max(bounds.height()).max(1.0);
    scale * REL_TOLERANCE
}

fn edges(mp: &MultiPolygon<f64>) -> Vec<Line<f64>> {
    mp.iter()
        .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors()))
        .flat_map(|ring| ring.lines())
        .filter(|line| line.dx() != 0.0 || line.dy() != 0.0)
        .collect()
}

/// Parts of `edge` not lying along any of `covers`.
fn uncovered_pieces(edge: Line<f64>, covers: &[Line<f64>], tol: f64) -> Vec<Line<f64>> {
    let d = edge.delta();
    let len_sq = d.x * d.x + d.y * d.y;
    let len = len_sq.sqrt();
    if len <= tol {
        return Vec::new();
    }

    let mut covered: Vec<(f64, f64)> = covers
        .iter()
        .filter(|c| distance_to_line(edge, c.start) <= tol && distance_to_line(edge, c.end) <= tol)
        .filter_map(|c| {
            let t0 = project(edge, c.start, len_sq);
            let t1 = project(edge, c.end, len_sq);
            let (lo, hi) = (t0.min(t1).max(0.0), t0.max(t1).min(1.0));
            (hi > lo).then_some((lo, hi))
        })
        .collect();
    covered.sort_by(|a, b| a.0.total_cmp(&b.0));

    let step = tol / len;
    let mut pieces = Vec::new();
    let mut cursor = 0.0;
    for (lo, hi) in covered {
        if lo - cursor > step {
            pieces.push(sub_line(edge, cursor, lo));
        }
        cursor = cursor.max(hi);
    }
    if 1.0 - cursor > step {
        pieces.push(sub_line(edge, cursor, 1.0));
    }
    pieces
}

fn side_of(piece: Line<f64>, bounds: &Rect<f64>, tol: f64) -> Option<Direction> {
    let angle = piece.dy().atan2(piece.dx()).abs();
    let horizontal = angle <= FRAC_PI_4 || angle >= 3.0 * PI / 4.0;

    if horizontal {
        let lo = piece.start.y.min(piece.end.y);
        let hi = piece.start.y.max(piece.end.y);
        if (lo - bounds.min().y).abs() <= tol {
            Some(Direction::South)
        } else if (hi - bounds.max().y).abs() <= tol {
            Some(Direction::North)
        } else {
            None
        }
    } else {
        let lo = piece.start.x.min(piece.end.x);
        let hi = piece.start.x.max(piece.end.x);
        if (lo - bounds.min().x).abs() <= tol {
            Some(Direction::West)
        } else if (hi - bounds.max().x).abs() <= tol {
            Some(Direction::East)
        } else {
            None
        }
    }
}

fn distance_to_line(line: Line<f64>, p: Coord<f64>) -> f64 {
    let d = line.delta();
    let cross = d.x * (p.y - line.start.y) - d.y * (p.x - line.start.x);
    cross.abs() / (d.x * d.x + d.y * d.y).sqrt()
}

fn project(line: Line<f64>, p: Coord<f64>, len_sq: f64) -> f64 {
    let d = line.delta();
    ((p.x - line.start.x) * d.x + (p.y - line.start.y) * d.y) / len_sq
}

fn sub_line(line: Line<f64>, t0: f64, t1: f64) -> Line<f64> {
    let d = line.delta();
    let at = |t: f64| Coord {
        x: line.start.x + t * d.x,
        y: line.start.y + t * d.y,
    };
    Line::new(at(t0), at(t1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Rect};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 }).to_polygon()
    }

    fn mp(p: Polygon<f64>) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![p])
    }

    #[test]
    fn test_contained_polygon_has_no_directions() {
        let extent = rect(0.0, 0.0, 100.0, 100.0);
        let dirs = boundary_directions(&mp(rect(10.0, 10.0, 20.0, 20.0)), &extent).unwrap();
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_disjoint_polygon_has_no_directions() {
        let extent = rect(0.0, 0.0, 100.0, 100.0);
        let dirs = boundary_directions(&mp(rect(200.0, 10.0, 220.0, 20.0)), &extent).unwrap();
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_single_sides() {
        let extent = rect(0.0, 0.0, 100.0, 100.0);

        let east = boundary_directions(&mp(rect(90.0, 40.0, 110.0, 60.0)), &extent).unwrap();
        assert_eq!(east, Directions { east: true, ..Directions::none() });

        let west = boundary_directions(&mp(rect(-10.0, 40.0, 10.0, 60.0)), &extent).unwrap();
        assert_eq!(west, Directions { west: true, ..Directions::none() });

        let north = boundary_directions(&mp(rect(40.0, 95.0, 60.0, 120.0)), &extent).unwrap();
        assert_eq!(north, Directions { north: true, ..Directions::none() });

        let south = boundary_directions(&mp(rect(40.0, -5.0, 60.0, 5.0)), &extent).unwrap();
        assert_eq!(south, Directions { south: true, ..Directions::none() });
    }

    #[test]
    fn test_corner_overflow_reports_two_sides() {
        let extent = rect(0.0, 0.0, 100.0, 100.0);
        let dirs = boundary_directions(&mp(rect(90.0, 90.0, 110.0, 110.0)), &extent).unwrap();
        assert_eq!(
            dirs,
            Directions {
                north: true,
                east: true,
                ..Directions::none()
            }
        );
    }

    #[test]
    fn test_spanning_polygon_reports_opposite_sides() {
        let extent = rect(0.0, 0.0, 100.0, 100.0);
        let dirs = boundary_directions(&mp(rect(-10.0, 40.0, 110.0, 60.0)), &extent).unwrap();
        assert!(dirs.east && dirs.west);
        assert!(!dirs.north && !dirs.south);
    }

    #[test]
    fn test_triangle_cut_on_east_edge() {
        let extent = rect(0.0, 0.0, 100.0, 100.0);
        let triangle = polygon![(x: 60.0, y: 20.0), (x: 140.0, y: 50.0), (x: 60.0, y: 80.0)];
        let dirs = boundary_directions(&mp(triangle), &extent).unwrap();
        assert_eq!(dirs.flags(), [false, false, true, false]);
    }

    #[test]
    fn test_classify_cut_ignores_shared_edges() {
        let original = mp(rect(0.0, 0.0, 10.0, 10.0));
        assert!(classify_cut(&original, &original).is_empty());
    }
}
