use nalgebra::{Point3, Vector3, Vector4};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::common::AABB;
use crate::error::MeshError;
use crate::parallel::{auto_policy, ExecutionPolicy};
use crate::shared::{next_halfedge, safe_normalize, Halfedge, TriRef};
use crate::utils::next3_usize;
use crate::vec::{vec_resize, vec_resize_nofill, vec_uninit};

pub static MESH_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

///Relates each triangle of the mesh back to the input it came from, and holds
///the interleaved per-property-vertex attribute table. Multiple property
///vertices may share one geometric vertex, which is how attributes become
///discontinuous across creases.
#[derive(Clone, Debug)]
pub struct MeshRelation {
	/// The original ID of this mesh if it is an original; -1 otherwise.
	pub original_id: i32,
	pub num_prop: i32,
	/// Flat property table of width num_prop.
	pub properties: Vec<f64>,
	/// Per-triangle property-vertex indices, one per corner.
	pub tri_properties: Vec<Vector3<i32>>,
	pub tri_ref: Vec<TriRef>,
}

impl Default for MeshRelation {
	fn default() -> Self {
		Self {
			original_id: -1,
			num_prop: 0,
			properties: Vec::default(),
			tri_properties: Vec::default(),
			tri_ref: Vec::default(),
		}
	}
}

///Internal representation of an oriented, 2-manifold triangle mesh: vertex
///positions, the halfedge connectivity, per-face and per-vertex normals, and
///the weighted cubic Bezier tangent assigned to each halfedge by the tangent
///builders. Triangles occupy contiguous halfedge triples 3t, 3t+1, 3t+2.
#[derive(Clone, Debug, Default)]
pub struct MeshImpl {
	pub bbox: AABB,
	pub status: MeshError,
	pub vert_pos: Vec<Point3<f64>>,
	pub halfedge: Vec<Halfedge>,
	/// Weighted cubic Bezier control per halfedge, from start_vert toward
	/// end_vert. Zero means a sharp terminus.
	pub halfedge_tangent: Vec<Vector4<f64>>,
	pub vert_normal: Vec<Vector3<f64>>,
	pub face_normal: Vec<Vector3<f64>>,
	pub mesh_relation: MeshRelation,
}

impl MeshImpl {
	pub fn is_empty(&self) -> bool {
		self.num_tri() == 0
	}

	pub fn num_vert(&self) -> usize {
		self.vert_pos.len()
	}

	pub fn num_edge(&self) -> usize {
		self.halfedge.len() / 2
	}

	pub fn num_tri(&self) -> usize {
		self.halfedge.len() / 3
	}

	pub fn num_prop(&self) -> usize {
		self.mesh_relation.num_prop as usize
	}

	pub fn num_prop_vert(&self) -> usize {
		if self.num_prop() == 0 {
			self.num_vert()
		} else {
			self.mesh_relation.properties.len() / self.num_prop()
		}
	}

	///Claim n globally unique mesh IDs.
	pub fn reserve_ids(n: usize) -> usize {
		MESH_ID_COUNTER.fetch_add(n, Ordering::Relaxed)
	}

	///Mark this mesh as an original: every triangle becomes its own source
	///face under a freshly reserved mesh ID.
	pub fn initialize_original(&mut self) {
		let mesh_id = Self::reserve_ids(1) as i32;
		self.mesh_relation.original_id = mesh_id;
		let num_tri = self.num_tri();
		let tri_ref = &mut self.mesh_relation.tri_ref;
		unsafe {
			vec_resize_nofill(tri_ref, num_tri);
		}
		for tri in 0..num_tri {
			tri_ref[tri] = TriRef {
				mesh_id,
				original_id: mesh_id,
				tri: tri as i32,
			};
		}
	}

	pub fn make_empty(&mut self, status: MeshError) {
		self.bbox = AABB::default();
		self.vert_pos = Vec::default();
		self.halfedge = Vec::default();
		self.halfedge_tangent = Vec::default();
		self.vert_normal = Vec::default();
		self.face_normal = Vec::default();
		self.mesh_relation = MeshRelation::default();
		self.status = status;
	}

	///Create the halfedge data structure from a list of triangles. Pairing
	///works by sorting undirected edge keys: for a closed oriented manifold
	///the backward halfedges fill the lower half of the sorted order and line
	///up one-to-one with the forward halfedges in the upper half.
	pub fn create_halfedges(&mut self, tri_verts: Vec<Vector3<i32>>) {
		let num_tri = tri_verts.len();
		let num_halfedge = 3 * num_tri;
		// drop the old value first to avoid copy
		self.halfedge.clear();
		unsafe {
			vec_resize_nofill(&mut self.halfedge, num_halfedge);
		}

		let mut edge: Vec<u64> = unsafe { vec_uninit(num_halfedge) };
		for tri in 0..num_tri {
			for i in 0..3 {
				let j = next3_usize(i);
				let e = 3 * tri + i;
				let v0 = tri_verts[tri][i];
				let v1 = tri_verts[tri][j];
				debug_assert!(v0 != v1, "topological degeneracy");
				self.halfedge[e] = Halfedge {
					start_vert: v0,
					end_vert: v1,
					paired_halfedge: -1,
					face: tri as i32,
				};
				edge[e] = ((v0 < v1) as u64) << 63
					| (v0.min(v1) as u64) << 32
					| v0.max(v1) as u64;
			}
		}

		let mut ids: Vec<i32> = (0..num_halfedge as i32).collect();
		if auto_policy(num_halfedge) == ExecutionPolicy::Par {
			ids.par_sort_unstable_by_key(|&i| edge[i as usize]);
		} else {
			ids.sort_unstable_by_key(|&i| edge[i as usize]);
		}

		let num_edge = num_halfedge / 2;
		for i in 0..num_edge {
			let pair0 = ids[i] as usize;
			let pair1 = ids[i + num_edge] as usize;
			self.halfedge[pair0].paired_halfedge = pair1 as i32;
			self.halfedge[pair1].paired_halfedge = pair0 as i32;
		}
	}

	///Returns true if this mesh is in fact an oriented even manifold and the
	///halfedge data structure is consistent.
	pub fn is_manifold(&self) -> bool {
		if self.halfedge.len() == 0 {
			return true;
		}
		if self.halfedge.len() % 3 != 0 {
			return false;
		}
		self.halfedge.iter().enumerate().all(|(e, halfedge)| {
			if halfedge.paired_halfedge < 0
				|| halfedge.paired_halfedge as usize >= self.halfedge.len()
			{
				return false;
			}
			let paired = self.halfedge[halfedge.paired_halfedge as usize];
			let mut good = true;
			good &= paired.paired_halfedge == e as i32;
			good &= halfedge.start_vert != halfedge.end_vert;
			good &= halfedge.start_vert == paired.end_vert;
			good &= halfedge.end_vert == paired.start_vert;
			good &= halfedge.face == e as i32 / 3;
			good &= paired.face != halfedge.face;
			good
		})
	}

	pub fn calculate_bbox(&mut self) {
		let mut bbox = AABB::default();
		for v in &self.vert_pos {
			bbox.union_point(*v);
		}
		self.bbox = bbox;
	}

	///If face normals are already present, this function uses them to compute
	///vertex normals (angle-weighted pseudo-normals); otherwise it also
	///computes the face normals.
	///
	///If the face normals have been invalidated by an operation, ensure you do
	///face_normal.clear() before calling this function to force recalculation.
	pub fn calculate_normals(&mut self) {
		let num_vert = self.num_vert();
		let num_tri = self.num_tri();

		if self.face_normal.len() != num_tri {
			unsafe {
				vec_resize_nofill(&mut self.face_normal, num_tri);
			}
			let vert_pos = &self.vert_pos;
			let halfedge = &self.halfedge;
			let fill = |face: usize, tri_normal: &mut Vector3<f64>| {
				let v0 = vert_pos[halfedge[3 * face].start_vert as usize];
				let v1 = vert_pos[halfedge[3 * face + 1].start_vert as usize];
				let v2 = vert_pos[halfedge[3 * face + 2].start_vert as usize];
				let edge0 = (v1 - v0).normalize();
				let edge1 = (v2 - v1).normalize();
				*tri_normal = edge0.cross(&edge1).normalize();
				if tri_normal.x.is_nan() {
					*tri_normal = Vector3::new(0.0, 0.0, 1.0);
				}
			};
			if auto_policy(num_tri) == ExecutionPolicy::Par {
				self.face_normal
					.par_iter_mut()
					.enumerate()
					.for_each(|(face, n)| fill(face, n));
			} else {
				self.face_normal
					.iter_mut()
					.enumerate()
					.for_each(|(face, n)| fill(face, n));
			}
		}

		vec_resize(&mut self.vert_normal, num_vert);
		self.vert_normal.fill(Vector3::zeros());
		for e in 0..self.halfedge.len() {
			let vert = self.halfedge[e].start_vert as usize;
			let center = self.vert_pos[vert];
			let curr_edge =
				(self.vert_pos[self.halfedge[e].end_vert as usize] - center).normalize();
			let prev_edge = (self.vert_pos
				[self.halfedge[next_halfedge(e as i32) as usize].end_vert as usize]
				- center)
				.normalize();
			// degenerate triangles are excluded from the accumulation
			if !curr_edge.x.is_finite() || !prev_edge.x.is_finite() {
				continue;
			}
			let dot = curr_edge.dot(&prev_edge);
			let phi = if dot >= 1.0 {
				0.0
			} else if dot <= -1.0 {
				core::f64::consts::PI
			} else {
				dot.acos()
			};
			self.vert_normal[vert] += phi * self.face_normal[e / 3];
		}
		for normal in self.vert_normal.iter_mut() {
			*normal = safe_normalize(*normal);
		}
	}

	///Once halfedge has been filled in, this can be called to bring the rest
	///of the derived data up to date.
	pub fn finish(&mut self) {
		if self.halfedge.len() == 0 {
			return;
		}

		self.calculate_bbox();
		if !self.bbox.is_finite() {
			self.make_empty(MeshError::NonFiniteVertex);
			return;
		}

		debug_assert!(
			self.halfedge.len() % 6 == 0,
			"Not an even number of faces!"
		);
		debug_assert!(
			self.mesh_relation.tri_ref.len() == self.num_tri()
				|| self.mesh_relation.tri_ref.len() == 0,
			"Mesh relation doesn't fit!"
		);

		self.calculate_normals();
	}

	///Visit every halfedge leaving the start vertex of the given halfedge,
	///ending on the given halfedge itself.
	#[inline]
	pub fn for_vert(&self, halfedge: i32, mut func: impl FnMut(i32)) {
		let mut current = halfedge;
		loop {
			current = next_halfedge(self.halfedge[current as usize].paired_halfedge);
			func(current);
			if current == halfedge {
				break;
			}
		}
	}

	#[inline]
	pub fn for_vert_mut(&mut self, halfedge: i32, mut func: impl FnMut(&mut Self, i32)) {
		let mut current = halfedge;
		loop {
			current = next_halfedge(self.halfedge[current as usize].paired_halfedge);
			func(self, current);
			if current == halfedge {
				break;
			}
		}
	}

	///Fan traversal carrying a value per halfedge: transform produces the
	///value, binary_op sees each consecutive (here, next) pair and may rewrite
	///next before it becomes here.
	#[inline]
	pub fn for_vert_fun<T>(
		&self,
		halfedge: i32,
		mut transform: impl FnMut(i32) -> T,
		mut binary_op: impl FnMut(i32, &T, &mut T),
	) {
		let mut here: T = transform(halfedge);
		let mut current: i32 = halfedge;
		loop {
			let next_edge: i32 = next_halfedge(self.halfedge[current as usize].paired_halfedge);
			let mut next: T = transform(next_edge);
			binary_op(current, &here, &mut next);
			here = next;
			current = next_edge;
			if current == halfedge {
				break;
			}
		}
	}

	///The property normal seen by the given halfedge at its start vertex.
	pub fn get_normal(&self, halfedge: i32, normal_idx: i32) -> Vector3<f64> {
		let tri = halfedge as usize / 3;
		let j = halfedge as usize % 3;
		let prop = self.mesh_relation.tri_properties[tri][j];
		let num_prop = self.mesh_relation.num_prop;
		let mut normal = Vector3::zeros();
		for i in 0..3 {
			normal[i] = self.mesh_relation.properties
				[(prop * num_prop + normal_idx) as usize + i];
		}
		normal
	}
}

#[cfg(test)]
mod tests {
	use crate::constructors;

	#[test]
	fn tetrahedron_is_manifold() {
		let mesh = constructors::tetrahedron();
		assert!(mesh.is_manifold());
		assert_eq!(mesh.num_vert(), 4);
		assert_eq!(mesh.num_edge(), 6);
		assert_eq!(mesh.num_tri(), 4);
	}

	#[test]
	fn halfedge_pairing_is_involution() {
		let mesh = constructors::cube();
		for (e, h) in mesh.halfedge.iter().enumerate() {
			let pair = &mesh.halfedge[h.paired_halfedge as usize];
			assert_eq!(pair.paired_halfedge, e as i32);
			assert_eq!(pair.start_vert, h.end_vert);
			assert_eq!(pair.end_vert, h.start_vert);
			assert_ne!(pair.face, h.face);
		}
	}

	#[test]
	fn vert_normals_point_outward_on_octahedron() {
		let mesh = constructors::octahedron();
		for (v, normal) in mesh.vert_normal.iter().enumerate() {
			// by symmetry each vertex normal is radial
			let radial = mesh.vert_pos[v].coords.normalize();
			assert!((normal - radial).norm() < 1e-12);
		}
	}

	#[test]
	fn fan_walk_visits_each_incident_edge_once() {
		let mesh = constructors::tetrahedron();
		let start = 0;
		let vert = mesh.halfedge[start].start_vert;
		let mut count = 0;
		mesh.for_vert(start as i32, |e| {
			assert_eq!(mesh.halfedge[e as usize].start_vert, vert);
			count += 1;
		});
		// every tetrahedron vertex has degree 3
		assert_eq!(count, 3);
	}
}
