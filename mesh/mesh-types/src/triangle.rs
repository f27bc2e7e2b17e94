//! Triangle type for geometric calculations.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A triangle with concrete vertex positions.
///
/// Stores the actual vertex positions rather than indices. Winding is
/// **counter-clockwise (CCW) when viewed from the front**.
///
/// Barycentric coordinates returned by this type are always ordered
/// `[w0, w1, w2]` to match `v0`, `v1`, `v2`.
///
/// # Example
///
/// ```
/// use mesh_types::{Triangle, Point3};
///
/// let tri = Triangle::new(
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// );
///
/// assert!((tri.area() - 0.5).abs() < 1e-10);
/// let normal = tri.normal().unwrap();
/// assert!((normal.z - 1.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// First vertex.
    pub v0: Point3<f64>,
    /// Second vertex.
    pub v1: Point3<f64>,
    /// Third vertex.
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    #[must_use]
    pub const fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    ///
    /// The magnitude equals twice the triangle's area.
    #[inline]
    #[must_use]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    ///
    /// Returns `None` for degenerate triangles (zero area).
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{Triangle, Point3};
    ///
    /// let degen = Triangle::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(2.0, 0.0, 0.0),
    /// );
    /// assert!(degen.normal().is_none());
    /// ```
    #[must_use]
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON * f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Compute the centroid (center of mass).
    #[inline]
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// Compute the lengths of the three edges `[|v0v1|, |v1v2|, |v2v0|]`.
    #[inline]
    #[must_use]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm(),
            (self.v2 - self.v1).norm(),
            (self.v0 - self.v2).norm(),
        ]
    }

    /// Get vertices as an array.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> [Point3<f64>; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Barycentric coordinates of `point` projected onto the triangle plane.
    ///
    /// The coordinates always sum to one; any of them may be negative when
    /// the projection falls outside the triangle. Returns `None` for
    /// degenerate triangles.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{Triangle, Point3};
    ///
    /// let tri = Triangle::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.0, 1.0, 0.0),
    /// );
    /// let b = tri.barycentric(&Point3::new(0.25, 0.25, 3.0)).unwrap();
    /// assert!((b[0] - 0.5).abs() < 1e-12);
    /// assert!((b[1] - 0.25).abs() < 1e-12);
    /// assert!((b[2] - 0.25).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn barycentric(&self, point: &Point3<f64>) -> Option<[f64; 3]> {
        let e0 = self.v1 - self.v0;
        let e1 = self.v2 - self.v0;
        let ep = point - self.v0;

        let d00 = e0.dot(&e0);
        let d01 = e0.dot(&e1);
        let d11 = e1.dot(&e1);
        let d20 = ep.dot(&e0);
        let d21 = ep.dot(&e1);

        let denom = d00.mul_add(d11, -(d01 * d01));
        if denom.abs() <= f64::EPSILON * d00 * d11 {
            return None;
        }

        let w1 = d11.mul_add(d20, -(d01 * d21)) / denom;
        let w2 = d00.mul_add(d21, -(d01 * d20)) / denom;
        Some([1.0 - w1 - w2, w1, w2])
    }

    /// Point at the given barycentric coordinates.
    #[inline]
    #[must_use]
    pub fn point_at(&self, bary: &[f64; 3]) -> Point3<f64> {
        Point3::from(self.v0.coords * bary[0] + self.v1.coords * bary[1] + self.v2.coords * bary[2])
    }

    /// Closest point on the triangle to `point`, with its barycentrics.
    ///
    /// Follows the region-classification algorithm from "Real-Time
    /// Collision Detection" (Ericson). The returned coordinates are always
    /// non-negative and sum to one.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{Triangle, Point3};
    ///
    /// let tri = Triangle::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.0, 1.0, 0.0),
    /// );
    /// let (p, b) = tri.closest_point(&Point3::new(-1.0, -1.0, 0.0));
    /// assert_eq!(p, Point3::new(0.0, 0.0, 0.0));
    /// assert_eq!(b, [1.0, 0.0, 0.0]);
    /// ```
    #[must_use]
    pub fn closest_point(&self, point: &Point3<f64>) -> (Point3<f64>, [f64; 3]) {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;
        let ap = point - a;

        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return (a, [1.0, 0.0, 0.0]);
        }

        let bp = point - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return (b, [0.0, 1.0, 0.0]);
        }

        let vc = d1.mul_add(d4, -(d3 * d2));
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (a + ab * v, [1.0 - v, v, 0.0]);
        }

        let cp = point - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return (c, [0.0, 0.0, 1.0]);
        }

        let vb = d5.mul_add(d2, -(d1 * d6));
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (a + ac * w, [1.0 - w, 0.0, w]);
        }

        let va = d3.mul_add(d6, -(d5 * d4));
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (b + (c - b) * w, [0.0, 1.0 - w, w]);
        }

        let sum = va + vb + vc;
        if sum.abs() < f64::MIN_POSITIVE {
            // Collinear corners; every region test above was inconclusive.
            return (a, [1.0, 0.0, 0.0]);
        }
        let denom = 1.0 / sum;
        let v = vb * denom;
        let w = vc * denom;
        (a + ab * v + ac * w, [1.0 - v - w, v, w])
    }
}
