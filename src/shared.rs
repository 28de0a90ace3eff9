use nalgebra::Vector3;

///Advance a halfedge index to the next one within its triangle.
#[inline]
pub fn next_halfedge(mut current: i32) -> i32 {
	current += 1;
	if current % 3 == 0 {
		current -= 3;
	}
	current
}

///Normalize a vector, returning zero instead of NaN when the input has no
///length.
#[inline]
pub fn safe_normalize(v: Vector3<f64>) -> Vector3<f64> {
	let out = v.normalize();
	if out.x.is_finite() { out } else { Vector3::zeros() }
}

///The fundamental component of the halfedge data structure used for storing
///and operating on the mesh.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Halfedge {
	pub start_vert: i32,
	pub end_vert: i32,
	pub paired_halfedge: i32,
	pub face: i32,
}

impl Halfedge {
	pub fn is_forward(&self) -> bool {
		self.start_vert < self.end_vert
	}
}

#[derive(Copy, Clone, Debug)]
pub struct TriRef {
	/// The unique ID of the mesh instance of this triangle. If .mesh_id and
	/// .tri match for two triangles, then they came from the same face.
	pub mesh_id: i32,
	/// The original mesh this triangle came from, for reapplying properties
	/// like UV coordinates to the output.
	pub original_id: i32,
	/// The triangle index of the original triangle this was part of.
	pub tri: i32,
}

impl Default for TriRef {
	fn default() -> Self {
		Self {
			mesh_id: -1,
			original_id: -1,
			tri: -1,
		}
	}
}

impl TriRef {
	pub fn same_face(&self, other: &TriRef) -> bool {
		self.mesh_id == other.mesh_id && self.tri == other.tri
	}
}

///Links a vertex to a barycentric coordinate within a source triangle. The
///components of uvw sum to one and are all non-negative.
#[derive(Clone, Copy, Debug)]
pub struct Barycentric {
	pub tri: i32,
	pub uvw: Vector3<f64>,
}

impl Default for Barycentric {
	fn default() -> Self {
		Self {
			tri: -1,
			uvw: Vector3::zeros(),
		}
	}
}

impl Barycentric {
	pub fn new(tri: i32, uvw: Vector3<f64>) -> Self {
		Self { tri, uvw }
	}
}

///A unique undirected edge: vertex ids with first < second, plus the index of
///the forward halfedge that represents it.
#[derive(Clone, Copy, Debug)]
pub struct TmpEdge {
	pub first: i32,
	pub second: i32,
	pub halfedge_idx: i32,
}

///One TmpEdge per undirected edge of the mesh, taken from the forward
///halfedges and sorted by vertex pair.
pub fn create_tmp_edges(halfedge: &[Halfedge]) -> Vec<TmpEdge> {
	let mut edges: Vec<TmpEdge> = halfedge
		.iter()
		.enumerate()
		.filter(|(_, h)| h.is_forward())
		.map(|(idx, h)| TmpEdge {
			first: h.start_vert,
			second: h.end_vert,
			halfedge_idx: idx as i32,
		})
		.collect();
	edges.sort_by_key(|e| (e.first, e.second));
	edges
}
