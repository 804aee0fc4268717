use nalgebra::Vector3;

/// Axis aligned box around a set of points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoundingBox {
    /// The smallest box containing every point. An empty iterator gives an inverted box.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f64>>) -> Self {
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);

        for point in points {
            min = min.inf(point);
            max = max.sup(point);
        }

        Self { min, max }
    }

    /// The smallest box containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn midpoint(&self) -> Vector3<f64> {
        (self.min + self.max) / 2.0
    }

    pub fn widths(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Squared distance between the closest points of two boxes, zero if they overlap.
    pub fn min_distance_sq(&self, other: &Self) -> f64 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let gap = (other.min[axis] - self.max[axis])
                .max(self.min[axis] - other.max[axis])
                .max(0.0);
            sum += gap * gap;
        }
        sum
    }

    /// Squared distance between the farthest points of two boxes.
    pub fn max_distance_sq(&self, other: &Self) -> f64 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let span = (other.max[axis] - self.min[axis]).max(self.max[axis] - other.min[axis]);
            sum += span * span;
        }
        sum
    }
}
