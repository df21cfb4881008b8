//! Annotation geometry: axis-aligned boxes and polygons in pixel space.

use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    /// Creates a new coordinate with the given x and y values.
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns true if both coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned bounding box in XYXY format (xmin, ymin, xmax, ymax).
///
/// Note: This type does NOT enforce that min < max in the constructor,
/// allowing malformed boxes to exist in a snapshot so validation can report
/// them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    /// Creates a new bounding box from explicit coordinates.
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Converts from XYWH format where (x, y) is the top-left corner.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_xyxy(x, y, x + width, y + height)
    }

    /// Returns the width of the box. May be negative if malformed.
    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Returns the height of the box. May be negative if malformed.
    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Returns the area of the box. May be negative if malformed.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns true if all coordinates are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite() && self.ymin.is_finite() && self.xmax.is_finite() && self.ymax.is_finite()
    }

    /// Returns true if the box is properly ordered (min <= max on both axes).
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.xmin <= self.xmax && self.ymin <= self.ymax
    }

    /// Area of the overlap between two boxes, zero when they do not touch.
    pub fn intersection(&self, other: &BBox) -> f64 {
        let w = self.xmax.min(other.xmax) - self.xmin.max(other.xmin);
        let h = self.ymax.min(other.ymax) - self.ymin.max(other.ymin);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Intersection over union. Degenerate boxes yield 0.
    pub fn iou(&self, other: &BBox) -> f64 {
        let inter = self.intersection(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area().max(0.0) + other.area().max(0.0) - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Overlap ratio used against crowd regions: intersection over the area
    /// of `self` alone.
    pub fn iou_crowd(&self, crowd: &BBox) -> f64 {
        let inter = self.intersection(crowd);
        let area = self.area();
        if inter <= 0.0 || area <= 0.0 {
            0.0
        } else {
            inter / area
        }
    }
}

/// The shape of one object annotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Box(BBox),
    /// Closed polygon; masks are stored in this form too.
    Polygon(Vec<Coord>),
}

impl Geometry {
    /// Returns the tightest axis-aligned box around the geometry.
    pub fn bounding_box(&self) -> BBox {
        match self {
            Geometry::Box(bbox) => *bbox,
            Geometry::Polygon(points) => {
                let mut iter = points.iter();
                let Some(first) = iter.next() else {
                    return BBox::default();
                };
                iter.fold(
                    BBox::from_xyxy(first.x, first.y, first.x, first.y),
                    |acc, p| BBox::from_xyxy(acc.xmin.min(p.x), acc.ymin.min(p.y), acc.xmax.max(p.x), acc.ymax.max(p.y)),
                )
            }
        }
    }

    /// Returns true if every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Geometry::Box(bbox) => bbox.is_finite(),
            Geometry::Polygon(points) => points.iter().all(Coord::is_finite),
        }
    }
}

impl From<BBox> for Geometry {
    fn from(bbox: BBox) -> Self {
        Geometry::Box(bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_xywh() {
        let bbox = BBox::from_xywh(10.0, 20.0, 90.0, 60.0);
        assert_eq!(bbox.xmax, 100.0);
        assert_eq!(bbox.ymax, 80.0);
        assert_eq!(bbox.area(), 5400.0);
    }

    #[test]
    fn test_bbox_ordering() {
        assert!(BBox::from_xyxy(10.0, 20.0, 100.0, 80.0).is_ordered());
        assert!(!BBox::from_xyxy(100.0, 80.0, 10.0, 20.0).is_ordered());
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = BBox::from_xyxy(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox::from_xyxy(0.0, 0.0, 10.0, 10.0);
        let b = BBox::from_xyxy(5.0, 0.0, 15.0, 10.0);
        let expected = 50.0 / 150.0;
        assert!((a.iou(&b) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BBox::from_xyxy(0.0, 0.0, 10.0, 10.0);
        let b = BBox::from_xyxy(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_crowd_uses_own_area() {
        let det = BBox::from_xyxy(0.0, 0.0, 10.0, 10.0);
        let crowd = BBox::from_xyxy(0.0, 0.0, 100.0, 100.0);
        assert_eq!(det.iou_crowd(&crowd), 1.0);
    }

    #[test]
    fn test_polygon_bounding_box() {
        let poly = Geometry::Polygon(vec![
            Coord::new(3.0, 4.0),
            Coord::new(10.0, 1.0),
            Coord::new(6.0, 9.0),
        ]);
        assert_eq!(poly.bounding_box(), BBox::from_xyxy(3.0, 1.0, 10.0, 9.0));
    }
}
