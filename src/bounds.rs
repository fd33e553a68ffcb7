use cgmath::{ElementWise, Vector3};

/// Axis-aligned box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Bounds {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self {
            min: min_elementwise(min, max),
            max: max_elementwise(min, max),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = Vector3::from(*points.next()?);
        let (min, max) = points.fold((first, first), |(min, max), p| {
            let p = Vector3::from(*p);
            (min_elementwise(min, p), max_elementwise(max, p))
        });
        Some(Self { min, max })
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn max_extent(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: min_elementwise(self.min, other.min),
            max: max_elementwise(self.max, other.max),
        }
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Maps a normalized `[0,1]` point into this box.
    pub fn lerp(&self, t: Vector3<f32>) -> Vector3<f32> {
        self.min + self.size().mul_element_wise(t)
    }
}

/// Grid coverage for a deforming source: the union of every sampled bound.
#[derive(Copy, Clone, Debug, Default)]
pub struct TrackingBounds {
    bounds: Option<Bounds>,
}

impl TrackingBounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows the tracked box to cover `sampled`. Never shrinks.
    pub fn track(&mut self, sampled: &Bounds) -> Bounds {
        let grown = match &self.bounds {
            Some(current) => current.union(sampled),
            None => *sampled,
        };
        self.bounds = Some(grown);
        grown
    }

    pub fn get(&self) -> Option<Bounds> {
        self.bounds
    }
}

fn min_elementwise(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

fn max_elementwise(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}
