///Distance below which two unit normals are considered equal.
pub const K_TOLERANCE: f64 = 1e-5;

macro_rules! next3 {
	($i:expr) => {
		match $i {
			0 => 1,
			1 => 2,
			2 => 0,
			_ => panic!("Invalid triangle index"),
		}
	};
}

#[inline]
pub const fn next3_i32(i: i32) -> i32 {
	next3!(i)
}

#[inline]
pub const fn next3_usize(i: usize) -> usize {
	next3!(i)
}
