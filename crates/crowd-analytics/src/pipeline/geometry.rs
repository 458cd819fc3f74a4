use common::crowd::BoundingBox;

/// Intersection over union of two boxes, in `[0, 1]`.
///
/// Callers must reject boxes with non-positive extent first; disjoint or
/// touching boxes yield 0.
pub fn intersection_over_union(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());

    let intersection = if x2 > x1 && y2 > y1 {
        (x2 - x1) * (y2 - y1)
    } else {
        0.0
    };

    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        (intersection / union).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Euclidean distance between two normalized points
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox::new(x, y, w, h)
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = bbox(0.1, 0.1, 0.1, 0.1);
        assert!((intersection_over_union(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = bbox(0.0, 0.0, 0.1, 0.1);
        let b = bbox(0.5, 0.5, 0.1, 0.1);
        assert_eq!(intersection_over_union(&a, &b), 0.0);

        // Touching edges do not intersect
        let c = bbox(0.1, 0.0, 0.1, 0.1);
        assert_eq!(intersection_over_union(&a, &c), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // Intersection 0.1 x 0.05, union 2 * 0.005 - 0.005
        let a = bbox(0.0, 0.0, 0.1, 0.1);
        let b = bbox(0.0, 0.05, 0.1, 0.1);
        assert!((intersection_over_union(&a, &b) - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_iou_symmetric_and_bounded() {
        let boxes = [
            bbox(0.0, 0.0, 0.3, 0.3),
            bbox(0.1, 0.2, 0.4, 0.2),
            bbox(0.25, 0.25, 0.05, 0.5),
            bbox(0.6, 0.1, 0.3, 0.8),
            bbox(0.05, 0.05, 0.9, 0.9),
        ];
        for a in &boxes {
            for b in &boxes {
                let ab = intersection_over_union(a, b);
                let ba = intersection_over_union(b, a);
                assert!((ab - ba).abs() < 1e-6);
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn test_contained_box() {
        let outer = bbox(0.0, 0.0, 0.4, 0.4);
        let inner = bbox(0.1, 0.1, 0.2, 0.2);
        assert!((intersection_over_union(&outer, &inner) - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_distance() {
        assert!((distance((0.0, 0.0), (0.3, 0.4)) - 0.5).abs() < 1e-6);
    }
}
