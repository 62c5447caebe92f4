use crate::models::{BBox, CoordinateUnit};

/// Reduce a quadrilateral (or any polygon) to its axis-aligned bounding box
/// and the rotation of its first edge in degrees.
///
/// Producers emit corners clockwise from the top-left, so the first edge runs
/// along the text baseline direction.
pub fn polygon_to_bbox_and_rotation(points: &[[f64; 2]], unit: CoordinateUnit) -> Option<(BBox, f64)> {
    let first = points.first()?;
    let mut x0 = first[0];
    let mut y0 = first[1];
    let mut x1 = first[0];
    let mut y1 = first[1];
    for p in &points[1..] {
        x0 = x0.min(p[0]);
        y0 = y0.min(p[1]);
        x1 = x1.max(p[0]);
        y1 = y1.max(p[1]);
    }

    let rotation = match points.get(1) {
        Some(second) => {
            let angle = (second[1] - first[1]).atan2(second[0] - first[0]).to_degrees();
            // -0.0 and tiny float noise read as unrotated
            if angle.abs() < 1e-9 { 0.0 } else { angle }
        }
        None => 0.0,
    };

    Some((BBox::new(x0, y0, x1, y1, unit), rotation))
}

/// Parse a flat `[x1, y1, x2, y2, ...]` coordinate list into points.
pub fn flat_to_points(flat: &[f64]) -> Vec<[f64; 2]> {
    flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_aligned_quad() {
        let quad = [[10.0, 20.0], [110.0, 20.0], [110.0, 40.0], [10.0, 40.0]];
        let (bbox, rotation) = polygon_to_bbox_and_rotation(&quad, CoordinateUnit::Pixels).unwrap();
        assert_eq!((bbox.x0, bbox.y0, bbox.x1, bbox.y1), (10.0, 20.0, 110.0, 40.0));
        assert_eq!(rotation, 0.0);
    }

    #[test]
    fn test_rotated_quad() {
        let quad = [[0.0, 0.0], [10.0, 10.0], [0.0, 20.0], [-10.0, 10.0]];
        let (bbox, rotation) = polygon_to_bbox_and_rotation(&quad, CoordinateUnit::Pixels).unwrap();
        assert_eq!((bbox.x0, bbox.x1), (-10.0, 10.0));
        assert!((rotation - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_polygon() {
        assert!(polygon_to_bbox_and_rotation(&[], CoordinateUnit::Points).is_none());
    }

    #[test]
    fn test_flat_to_points_drops_odd_tail() {
        assert_eq!(flat_to_points(&[1.0, 2.0, 3.0, 4.0, 5.0]), vec![[1.0, 2.0], [3.0, 4.0]]);
    }
}
