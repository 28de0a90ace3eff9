use core::f64;
use nalgebra::Point3;

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
	a + (b - a) * t
}

//struct was originally named "Box", causing name conflict with the built in rust type
///Axis-aligned 3D box, primarily for bounding.
#[derive(Clone, Copy, Debug)]
pub struct AABB {
	pub min: Point3<f64>,
	pub max: Point3<f64>,
}

impl Default for AABB {
	///Default constructor is an infinite box that contains all space.
	fn default() -> Self {
		Self {
			min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
			max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
		}
	}
}

impl AABB {
	///Expand this box to include the given point.
	pub fn union_point(&mut self, p: Point3<f64>) {
		self.min = self.min.inf(&p);
		self.max = self.max.sup(&p);
	}

	///Does this box have finite bounds?
	pub fn is_finite(&self) -> bool {
		self.min.iter().all(|x| x.is_finite()) && self.max.iter().all(|x| x.is_finite())
	}
}
