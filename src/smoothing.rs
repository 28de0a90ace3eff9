use std::collections::{btree_map::Entry, BTreeMap, HashMap};
use std::mem;

use nalgebra::{Point3, Vector2, Vector3, Vector4};
use tracing::debug;

use crate::meshimpl::MeshImpl;
use crate::parallel::{auto_policy, for_each_mut};
use crate::shared::{next_halfedge, safe_normalize, Barycentric, Halfedge, TriRef};
use crate::utils::K_TOLERANCE;
use crate::vec::vec_uninit;

///A user request to dull the crease along one halfedge: 0 is perfectly sharp,
///1 leaves the edge fully smooth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Smoothness {
	pub halfedge: i32,
	pub smoothness: f64,
}

///Returns a vector orthogonal to ref in the plane of ref and in. Neither the
///input nor the output is normalized.
fn orthogonal_to(in_v: Vector3<f64>, ref_v: Vector3<f64>) -> Vector3<f64> {
	in_v - in_v.dot(&ref_v) * ref_v
}

///Get the angle between two unit-vectors.
fn angle_between(a: Vector3<f64>, b: Vector3<f64>) -> f64 {
	let dot = a.dot(&b);
	if dot >= 1.0 {
		0.0
	} else if dot <= -1.0 {
		core::f64::consts::PI
	} else {
		dot.acos()
	}
}

///Calculate a tangent vector in the form of a weighted cubic Bezier taking as
///input the desired tangent direction (length doesn't matter) and the edge
///vector to the neighboring vertex. In a symmetric situation where the
///tangents at each end are mirror images of each other, this will result in a
///circular arc.
pub fn circular_tangent(tangent: Vector3<f64>, edge_vec: Vector3<f64>) -> Vector4<f64> {
	let dir = safe_normalize(tangent);

	let mut weight = dir.dot(&safe_normalize(edge_vec)).abs();
	if weight == 0.0 {
		weight = 1.0;
	}
	// Quadratic weighted bezier for circular interpolation
	let bz2 = weight * (dir * edge_vec.norm() / (2.0 * weight)).push(1.0);
	// Equivalent cubic weighted bezier
	let bz3 = Vector4::new(0.0, 0.0, 0.0, 1.0).lerp(&bz2, 2.0 / 3.0);
	// Convert from homogeneous form to geometric form
	(bz3.xyz() / bz3.w).push(bz3.w)
}

///Fills one tangent per halfedge with the circular-arc control orthogonal to
///the vertex normal at its start, oriented along the mean of the two adjacent
///face normals.
struct SmoothBezier<'a> {
	vert_pos: &'a [Point3<f64>],
	tri_normal: &'a [Vector3<f64>],
	vert_normal: &'a [Vector3<f64>],
	halfedge: &'a [Halfedge],
}

impl SmoothBezier<'_> {
	fn call(&self, tangent: &mut Vector4<f64>, edge: Halfedge) {
		let edge_vec =
			self.vert_pos[edge.end_vert as usize] - self.vert_pos[edge.start_vert as usize];
		let edge_normal = (self.tri_normal[edge.face as usize]
			+ self.tri_normal[self.halfedge[edge.paired_halfedge as usize].face as usize])
			/ 2.0;
		let dir = edge_normal
			.cross(&edge_vec)
			.cross(&self.vert_normal[edge.start_vert as usize]);
		*tangent = circular_tangent(dir, edge_vec);
	}
}

///Evaluates the PN-triangle cubic Bezier patch defined by a source triangle's
///corners and its six incident halfedge tangents.
struct InterpTri<'a> {
	halfedge: &'a [Halfedge],
	halfedge_tangent: &'a [Vector4<f64>],
	vert_pos: &'a [Point3<f64>],
}

impl InterpTri<'_> {
	fn homogeneous(mut v: Vector4<f64>) -> Vector4<f64> {
		v.x *= v.w;
		v.y *= v.w;
		v.z *= v.w;
		v
	}

	fn homogeneous_point(v: Vector3<f64>) -> Vector4<f64> {
		v.push(1.0)
	}

	fn h_normalize(v: Vector4<f64>) -> Vector3<f64> {
		v.xyz() / v.w
	}

	fn bezier(point: Vector3<f64>, tangent: Vector4<f64>) -> Vector4<f64> {
		Self::homogeneous(point.push(0.0) + tangent)
	}

	///Two de Casteljau steps: the cubic collapses to the linear segment whose
	///interpolation at x gives the curve point.
	fn cubic_bezier2linear(
		p0: Vector4<f64>,
		p1: Vector4<f64>,
		p2: Vector4<f64>,
		p3: Vector4<f64>,
		x: f64,
	) -> [Vector4<f64>; 2] {
		let p12 = p1.lerp(&p2, x);
		[
			p0.lerp(&p1, x).lerp(&p12, x),
			p12.lerp(&p2.lerp(&p3, x), x),
		]
	}

	fn bezier_point(points: [Vector4<f64>; 2], x: f64) -> Vector3<f64> {
		Self::h_normalize(points[0].lerp(&points[1], x))
	}

	fn bezier_tangent(points: [Vector4<f64>; 2]) -> Vector3<f64> {
		safe_normalize(Self::h_normalize(points[1]) - Self::h_normalize(points[0]))
	}

	fn call(&self, pos: &mut Point3<f64>, bary: &Barycentric) {
		let tri = bary.tri as usize;
		let uvw = bary.uvw;

		let corners: [Vector3<f64>; 3] = core::array::from_fn(|i| {
			self.vert_pos[self.halfedge[3 * tri + i].start_vert as usize].coords
		});

		for i in 0..3 {
			if uvw[i] == 1.0 {
				*pos = Point3::from(corners[i]);
				return;
			}
		}

		let tangent_r: [Vector4<f64>; 3] =
			core::array::from_fn(|i| self.halfedge_tangent[3 * tri + i]);
		// tangent_l[j] leaves corner j along the paired halfedge of the edge
		// arriving at j
		let tangent_l: [Vector4<f64>; 3] = core::array::from_fn(|i| {
			self.halfedge_tangent
				[self.halfedge[3 * tri + (i + 2) % 3].paired_halfedge as usize]
		});

		let mut pos_h = Vector4::zeros();
		for i in 0..3 {
			let j = (i + 1) % 3;
			let k = (i + 2) % 3;
			let x = uvw[k] / (1.0 - uvw[i]);

			let bez = Self::cubic_bezier2linear(
				Self::homogeneous_point(corners[j]),
				Self::bezier(corners[j], tangent_r[j]),
				Self::bezier(corners[k], tangent_l[k]),
				Self::homogeneous_point(corners[k]),
				x,
			);
			let end = Self::bezier_point(bez, x);
			let tangent = Self::bezier_tangent(bez);

			let j_bitangent = safe_normalize(orthogonal_to(
				tangent_l[j].xyz(),
				safe_normalize(tangent_r[j].xyz()),
			));
			let k_bitangent = safe_normalize(orthogonal_to(
				tangent_r[k].xyz(),
				-safe_normalize(tangent_l[k].xyz()),
			));
			let normal = safe_normalize(j_bitangent.lerp(&k_bitangent, x).cross(&tangent));
			let delta = orthogonal_to(tangent_l[j].xyz().lerp(&tangent_r[k].xyz(), x), normal);
			let delta_w = tangent_l[j].w + (tangent_r[k].w - tangent_l[j].w) * x;

			let bez1 = Self::cubic_bezier2linear(
				Self::homogeneous_point(end),
				Self::homogeneous((end + delta).push(delta_w)),
				Self::bezier(corners[i], tangent_r[i].lerp(&tangent_l[i], x)),
				Self::homogeneous_point(corners[i]),
				uvw[i],
			);
			let p = Self::bezier_point(bez1, uvw[i]);
			let w = uvw[j] * uvw[j] * uvw[k] * uvw[k];
			pos_h += Self::homogeneous(p.push(w));
		}
		*pos = Point3::from(Self::h_normalize(pos_h));
	}
}

impl MeshImpl {
	fn smooth_bezier(&self, vert_normal: &[Vector3<f64>]) -> Vec<Vector4<f64>> {
		let num_halfedge = self.halfedge.len();
		let mut tangent: Vec<Vector4<f64>> = unsafe { vec_uninit(num_halfedge) };
		let kernel = SmoothBezier {
			vert_pos: &self.vert_pos,
			tri_normal: &self.face_normal,
			vert_normal,
			halfedge: &self.halfedge,
		};
		for_each_mut(auto_policy(num_halfedge), &mut tangent, |e, t| {
			kernel.call(t, self.halfedge[e])
		});
		tangent
	}

	///Find faces containing at least 3 triangles - these will not have
	///interpolated normals - all their vert normals must match their face
	///normal. A lone pair of co-referenced triangles does not yet make a face.
	pub fn flat_faces(&self) -> Vec<bool> {
		let num_tri = self.num_tri();
		let mut tri_is_flat_face = vec![false; num_tri];
		for tri in 0..num_tri {
			let tref = &self.mesh_relation.tri_ref[tri];
			let mut face_neighbors = 0;
			let mut face_tris = Vector3::new(-1i32, -1, -1);
			for j in 0..3 {
				let neighbor_tri =
					self.halfedge[self.halfedge[3 * tri + j].paired_halfedge as usize].face;
				let j_ref = &self.mesh_relation.tri_ref[neighbor_tri as usize];
				if j_ref.same_face(tref) {
					face_neighbors += 1;
					face_tris[j] = neighbor_tri;
				}
			}
			if face_neighbors > 1 {
				tri_is_flat_face[tri] = true;
				for j in 0..3 {
					if face_tris[j] >= 0 {
						tri_is_flat_face[face_tris[j] as usize] = true;
					}
				}
			}
		}
		tri_is_flat_face
	}

	///Returns a vector of length numVert holding a tri that is part of a
	///neighboring flat face if there is only one flat face there. If there are
	///none it gets -1, and if there are more than one it gets -2.
	pub fn vert_flat_face(&self, flat_faces: &[bool]) -> Vec<i32> {
		let mut vert_flat_face = vec![-1i32; self.num_vert()];
		let mut vert_ref = vec![TriRef::default(); self.num_vert()];
		for tri in 0..self.num_tri() {
			if flat_faces[tri] {
				for j in 0..3 {
					let vert = self.halfedge[3 * tri + j].start_vert as usize;
					if vert_ref[vert].same_face(&self.mesh_relation.tri_ref[tri]) {
						continue;
					}
					vert_ref[vert] = self.mesh_relation.tri_ref[tri];
					vert_flat_face[vert] = if vert_flat_face[vert] == -1 {
						tri as i32
					} else {
						-2
					};
				}
			}
		}
		vert_flat_face
	}

	///Sharpened edges are referenced to the source mesh, so their indices are
	///converted to the current triangle ordering through the mesh relation.
	pub fn update_sharpened_edges(&self, sharpened_edges: &[Smoothness]) -> Vec<Smoothness> {
		let mut old_halfedge2new = HashMap::new();
		for tri in 0..self.num_tri() {
			let old_tri = self.mesh_relation.tri_ref[tri].tri;
			for i in 0..3 {
				old_halfedge2new.insert(3 * old_tri + i, (3 * tri) as i32 + i);
			}
		}
		sharpened_edges
			.iter()
			.map(|edge| Smoothness {
				halfedge: old_halfedge2new.get(&edge.halfedge).copied().unwrap_or(0),
				smoothness: edge.smoothness,
			})
			.collect()
	}

	///Both halfedges of every edge whose dihedral angle exceeds minSharpAngle
	///(in degrees), at the given smoothness.
	pub fn sharpen_edges(&self, min_sharp_angle: f64, min_smoothness: f64) -> Vec<Smoothness> {
		let mut sharpened_edges = Vec::new();
		let min_radians = min_sharp_angle.to_radians();
		for e in 0..self.halfedge.len() {
			if !self.halfedge[e].is_forward() {
				continue;
			}
			let pair = self.halfedge[e].paired_halfedge;
			let dihedral = angle_between(
				self.face_normal[e / 3],
				self.face_normal[pair as usize / 3],
			);
			if dihedral > min_radians {
				sharpened_edges.push(Smoothness {
					halfedge: e as i32,
					smoothness: min_smoothness,
				});
				sharpened_edges.push(Smoothness {
					halfedge: pair,
					smoothness: min_smoothness,
				});
			}
		}
		sharpened_edges
	}

	///Instead of calculating the internal shared normals like
	///calculate_normals does, this method fills in vertex properties,
	///unshared across edges that are bent more than minSharpAngle (degrees).
	///Property vertices are duplicated along each crease so the two sides
	///carry distinct normals, while smooth fans keep sharing one.
	pub fn set_normals(&mut self, normal_idx: i32, min_sharp_angle: f64) {
		if self.is_empty() {
			return;
		}
		if normal_idx < 0 {
			return;
		}
		debug!(
			normal_idx,
			min_sharp_angle,
			num_prop_vert = self.num_prop_vert(),
			"splitting vertex normals"
		);

		let old_num_prop = self.mesh_relation.num_prop;
		let num_tri = self.num_tri();

		let tri_is_flat_face = self.flat_faces();
		let vert_flat_face = self.vert_flat_face(&tri_is_flat_face);
		let mut vert_num_sharp = vec![0i32; self.num_vert()];
		for e in 0..self.halfedge.len() {
			if !self.halfedge[e].is_forward() {
				continue;
			}
			let pair = self.halfedge[e].paired_halfedge as usize;
			let tri1 = e / 3;
			let tri2 = pair / 3;
			let dihedral =
				angle_between(self.face_normal[tri1], self.face_normal[tri2]).to_degrees();
			if dihedral > min_sharp_angle {
				vert_num_sharp[self.halfedge[e].start_vert as usize] += 1;
				vert_num_sharp[self.halfedge[e].end_vert as usize] += 1;
			} else {
				let face_split = tri_is_flat_face[tri1] != tri_is_flat_face[tri2]
					|| (tri_is_flat_face[tri1]
						&& tri_is_flat_face[tri2]
						&& !self.mesh_relation.tri_ref[tri1]
							.same_face(&self.mesh_relation.tri_ref[tri2]));
				if vert_flat_face[self.halfedge[e].start_vert as usize] == -2 && face_split {
					vert_num_sharp[self.halfedge[e].start_vert as usize] += 1;
				}
				if vert_flat_face[self.halfedge[e].end_vert as usize] == -2 && face_split {
					vert_num_sharp[self.halfedge[e].end_vert as usize] += 1;
				}
			}
		}

		let num_prop = old_num_prop.max(normal_idx + 3);
		let mut old_properties = vec![0.0; num_prop as usize * self.num_prop_vert()];
		mem::swap(&mut self.mesh_relation.properties, &mut old_properties);
		self.mesh_relation.num_prop = num_prop;
		if self.mesh_relation.tri_properties.is_empty() {
			self.mesh_relation.tri_properties = (0..num_tri)
				.map(|tri| {
					Vector3::new(
						self.halfedge[3 * tri].start_vert,
						self.halfedge[3 * tri + 1].start_vert,
						self.halfedge[3 * tri + 2].start_vert,
					)
				})
				.collect();
		}
		let mut old_tri_prop = vec![Vector3::new(-1i32, -1, -1); num_tri];
		mem::swap(&mut self.mesh_relation.tri_properties, &mut old_tri_prop);

		// This outer walk allocates property vertices and rewrites shared
		// tables, so it stays sequential.
		for tri in 0..num_tri {
			for i in 0..3 {
				if self.mesh_relation.tri_properties[tri][i] >= 0 {
					continue;
				}
				let start_edge = (3 * tri + i) as i32;
				let vert = self.halfedge[start_edge as usize].start_vert as usize;

				if vert_num_sharp[vert] < 2 {
					// vertex has a single normal
					let normal = if vert_flat_face[vert] >= 0 {
						self.face_normal[vert_flat_face[vert] as usize]
					} else {
						self.vert_normal[vert]
					};
					let mut last_prop = -1;
					self.for_vert_mut(start_edge, |m, current| {
						let this_tri = current as usize / 3;
						let j = current as usize % 3;
						let prop = old_tri_prop[this_tri][j];
						m.mesh_relation.tri_properties[this_tri][j] = prop;
						if prop == last_prop {
							return;
						}
						last_prop = prop;
						let src = (prop * old_num_prop) as usize;
						let dst = (prop * num_prop) as usize;
						m.mesh_relation.properties[dst..dst + old_num_prop as usize]
							.copy_from_slice(&old_properties[src..src + old_num_prop as usize]);
						for k in 0..3 {
							m.mesh_relation.properties[dst + normal_idx as usize + k] = normal[k];
						}
					});
				} else {
					// vertex has multiple normals
					let center_pos = self.vert_pos[vert].coords;
					// Length degree
					let mut group: Vec<i32> = Vec::new();
					// Length number of normals
					let mut normals: Vec<Vector3<f64>> = Vec::new();
					let mut current = start_edge;
					let mut prev_face = self.halfedge[current as usize].face as usize;

					// advance to a sharp boundary to anchor the first group
					loop {
						let next =
							next_halfedge(self.halfedge[current as usize].paired_halfedge);
						let face = self.halfedge[next as usize].face as usize;
						let dihedral =
							angle_between(self.face_normal[face], self.face_normal[prev_face])
								.to_degrees();
						if dihedral > min_sharp_angle
							|| tri_is_flat_face[face] != tri_is_flat_face[prev_face]
							|| (tri_is_flat_face[face]
								&& tri_is_flat_face[prev_face]
								&& !self.mesh_relation.tri_ref[face]
									.same_face(&self.mesh_relation.tri_ref[prev_face]))
						{
							break;
						}
						current = next;
						prev_face = face;
						if current == start_edge {
							break;
						}
					}

					let end_edge = current;
					let mut prev_edge_vec = safe_normalize(
						self.vert_pos[self.halfedge[current as usize].end_vert as usize].coords
							- center_pos,
					);

					// accumulate angle-weighted pseudo-normals between sharp
					// boundaries
					loop {
						current = next_halfedge(self.halfedge[current as usize].paired_halfedge);
						let face = self.halfedge[current as usize].face as usize;
						let dihedral =
							angle_between(self.face_normal[face], self.face_normal[prev_face])
								.to_degrees();
						if dihedral > min_sharp_angle
							|| tri_is_flat_face[face] != tri_is_flat_face[prev_face]
							|| (tri_is_flat_face[face]
								&& tri_is_flat_face[prev_face]
								&& !self.mesh_relation.tri_ref[face]
									.same_face(&self.mesh_relation.tri_ref[prev_face]))
						{
							normals.push(Vector3::zeros());
						}
						group.push(normals.len() as i32 - 1);

						let edge_vec = safe_normalize(
							self.vert_pos[self.halfedge[current as usize].end_vert as usize]
								.coords - center_pos,
						);
						let phi = angle_between(prev_edge_vec, edge_vec);
						*normals.last_mut().unwrap() += self.face_normal[face] * phi;

						prev_face = face;
						prev_edge_vec = edge_vec;
						if current == end_edge {
							break;
						}
					}

					for normal in normals.iter_mut() {
						*normal = safe_normalize(*normal);
					}

					let mut last_group = 0;
					let mut last_prop = -1;
					let mut new_prop = -1;
					let mut idx = 0usize;
					self.for_vert_mut(end_edge, |m, current| {
						let this_tri = current as usize / 3;
						let j = current as usize % 3;
						let prop = old_tri_prop[this_tri][j];
						let src = (prop * old_num_prop) as usize;

						if group[idx] != last_group && group[idx] != 0 && prop == last_prop {
							// split property vertex, duplicating it with an
							// updated normal
							last_group = group[idx];
							new_prop = m.num_prop_vert() as i32;
							let len = m.mesh_relation.properties.len();
							m.mesh_relation
								.properties
								.resize(len + num_prop as usize, 0.0);
							let dst = (new_prop * num_prop) as usize;
							m.mesh_relation.properties[dst..dst + old_num_prop as usize]
								.copy_from_slice(
									&old_properties[src..src + old_num_prop as usize],
								);
							for k in 0..3 {
								m.mesh_relation.properties[dst + normal_idx as usize + k] =
									normals[group[idx] as usize][k];
							}
						} else if prop != last_prop {
							// update property vertex in place
							last_prop = prop;
							new_prop = prop;
							let dst = (prop * num_prop) as usize;
							m.mesh_relation.properties[dst..dst + old_num_prop as usize]
								.copy_from_slice(
									&old_properties[src..src + old_num_prop as usize],
								);
							for k in 0..3 {
								m.mesh_relation.properties[dst + normal_idx as usize + k] =
									normals[group[idx] as usize][k];
							}
						}

						// point to the updated property vertex
						m.mesh_relation.tri_properties[this_tri][j] = new_prop;
						idx += 1;
					});
				}
			}
		}
	}

	///Calculates halfedgeTangent, allowing the mesh to be refined and
	///smoothed. The tangents form weighted cubic Beziers along each edge,
	///circular arcs where possible, constrained to the property normals at
	///normalIdx. Across edges where the normals are discontinuous the tangents
	///are zero-length, letting the shape keep a sharp corner.
	pub fn create_tangents_from_normals(&mut self, normal_idx: i32) {
		if self.is_empty() {
			return;
		}
		let num_vert = self.num_vert();
		let num_halfedge = self.halfedge.len();

		let mut vert_normal = vec![Vector3::zeros(); num_vert];
		let mut vert_sharp_halfedge = vec![Vector2::new(-1i32, -1i32); num_vert];
		for e in 0..num_halfedge {
			let vert = self.halfedge[e].start_vert as usize;
			let mut sharp_halfedge = vert_sharp_halfedge[vert];
			if sharp_halfedge[0] >= 0 && sharp_halfedge[1] >= 0 {
				continue;
			}

			let mut idx = 0usize;
			// only used when the fan is entirely smooth
			let mut last_normal = Vector3::zeros();
			self.for_vert_fun(
				e as i32,
				|halfedge| self.get_normal(halfedge, normal_idx),
				|halfedge, normal, next_normal| {
					let diff = *next_normal - *normal;
					if diff.dot(&diff) > K_TOLERANCE * K_TOLERANCE {
						if idx > 1 {
							sharp_halfedge[0] = -1;
						} else {
							sharp_halfedge[idx] = halfedge;
							idx += 1;
						}
					}
					last_normal = *normal;
				},
			);
			vert_normal[vert] = last_normal;
			vert_sharp_halfedge[vert] = sharp_halfedge;
		}

		let mut tangent = self.smooth_bezier(&vert_normal);

		for vert in 0..num_vert {
			let first = vert_sharp_halfedge[vert][0];
			let second = vert_sharp_halfedge[vert][1];
			if first == -1 && second == -1 {
				continue;
			}
			if first >= 0 && second >= 0 {
				// make a continuous crease through the two sharp halfedges
				let new_tangent = self
					.get_normal(first, normal_idx)
					.cross(&self.get_normal(second, normal_idx))
					.normalize();
				// colinear normals leave the smooth tangents in place
				if !new_tangent.x.is_finite() {
					continue;
				}

				let pos = self.vert_pos[vert];
				tangent[first as usize] = circular_tangent(
					new_tangent,
					self.vert_pos[self.halfedge[first as usize].end_vert as usize] - pos,
				);
				tangent[second as usize] = circular_tangent(
					-new_tangent,
					self.vert_pos[self.halfedge[second as usize].end_vert as usize] - pos,
				);

				self.for_vert(first, |current| {
					if current != first && current != second {
						tangent[current as usize] = Vector4::zeros();
					}
				});
			} else {
				// a lone or over-shared sharp edge: sharpen the whole vertex
				let start = if first >= 0 { first } else { second };
				self.for_vert(start, |current| {
					tangent[current as usize] = Vector4::zeros();
				});
			}
		}
		self.halfedge_tangent = tangent;
	}

	///Calculates halfedgeTangent, allowing the mesh to be refined and
	///smoothed. The tangents form weighted cubic Beziers along each edge,
	///circular arcs where possible, constrained to the vertex normals. Where
	///sharpenedEdges are specified, the tangents intersecting them are
	///shortened, concentrating the curvature there, while the tangents of the
	///sharp edges themselves are aligned for continuity.
	pub fn create_tangents_from_edges(&mut self, mut sharpened_edges: Vec<Smoothness>) {
		if self.is_empty() {
			return;
		}
		let tri_is_flat_face = self.flat_faces();
		let vert_flat_face = self.vert_flat_face(&tri_is_flat_face);
		let mut vert_normal = self.vert_normal.clone();
		for v in 0..self.num_vert() {
			if vert_flat_face[v] >= 0 {
				vert_normal[v] = self.face_normal[vert_flat_face[v] as usize];
			}
		}

		let mut tangent = self.smooth_bezier(&vert_normal);

		// Add sharpened edges around faces, just on the face side.
		for tri in 0..self.num_tri() {
			if !tri_is_flat_face[tri] {
				continue;
			}
			for j in 0..3 {
				let tri2 = self.halfedge[3 * tri + j].paired_halfedge as usize / 3;
				if !tri_is_flat_face[tri2]
					|| !self.mesh_relation.tri_ref[tri]
						.same_face(&self.mesh_relation.tri_ref[tri2])
				{
					sharpened_edges.push(Smoothness {
						halfedge: (3 * tri + j) as i32,
						smoothness: 0.0,
					});
				}
			}
		}

		if sharpened_edges.is_empty() {
			self.halfedge_tangent = tangent;
			return;
		}

		// Combine forward/backward requests per undirected edge, defaulting a
		// missing side to fully smooth and keeping the sharpest duplicate.
		let mut edges: BTreeMap<i32, (Smoothness, Smoothness)> = BTreeMap::new();
		for edge in sharpened_edges {
			if edge.smoothness >= 1.0 {
				continue;
			}
			let forward = self.halfedge[edge.halfedge as usize].is_forward();
			let pair = self.halfedge[edge.halfedge as usize].paired_halfedge;
			let idx = if forward { edge.halfedge } else { pair };
			match edges.entry(idx) {
				Entry::Vacant(vacancy) => {
					let mut value = (
						edge,
						Smoothness {
							halfedge: pair,
							smoothness: 1.0,
						},
					);
					if !forward {
						mem::swap(&mut value.0, &mut value.1);
					}
					vacancy.insert(value);
				}
				Entry::Occupied(mut occupied) => {
					let e = if forward {
						&mut occupied.get_mut().0
					} else {
						&mut occupied.get_mut().1
					};
					e.smoothness = edge.smoothness.min(e.smoothness);
				}
			}
		}

		let mut vert_tangents: BTreeMap<i32, Vec<(Smoothness, Smoothness)>> = BTreeMap::new();
		for edge in edges.values() {
			vert_tangents
				.entry(self.halfedge[edge.0.halfedge as usize].start_vert)
				.or_default()
				.push(*edge);
			vert_tangents
				.entry(self.halfedge[edge.1.halfedge as usize].start_vert)
				.or_default()
				.push((edge.1, edge.0));
		}

		for vert in vert_tangents.values() {
			// Sharp edges that end are smooth at their terminal vert.
			if vert.len() == 1 {
				continue;
			}
			if vert.len() == 2 {
				// make a continuous crease
				let first = vert[0].0.halfedge as usize;
				let second = vert[1].0.halfedge as usize;
				let new_tangent = (tangent[first].xyz() - tangent[second].xyz()).normalize();

				let pos = self.vert_pos[self.halfedge[first].start_vert as usize];
				tangent[first] = circular_tangent(
					new_tangent,
					self.vert_pos[self.halfedge[first].end_vert as usize] - pos,
				);
				tangent[second] = circular_tangent(
					-new_tangent,
					self.vert_pos[self.halfedge[second].end_vert as usize] - pos,
				);

				let smooth_half =
					|tangent: &mut Vec<Vector4<f64>>, first: usize, last: usize, smoothness: f64| {
						let mut current =
							next_halfedge(self.halfedge[first].paired_halfedge) as usize;
						while current != last {
							tangent[current] *= smoothness;
							current =
								next_halfedge(self.halfedge[current].paired_halfedge) as usize;
						}
					};

				smooth_half(
					&mut tangent,
					first,
					second,
					(vert[0].1.smoothness + vert[1].0.smoothness) / 2.0,
				);
				smooth_half(
					&mut tangent,
					second,
					first,
					(vert[1].1.smoothness + vert[0].0.smoothness) / 2.0,
				);
			} else {
				// sharpen vertex uniformly
				let mut smoothness = 0.0;
				for pair in vert {
					smoothness += pair.0.smoothness;
					smoothness += pair.1.smoothness;
				}
				smoothness /= (2 * vert.len()) as f64;

				let start = vert[0].0.halfedge as usize;
				let mut current = start;
				loop {
					tangent[current] *= smoothness;
					current = next_halfedge(self.halfedge[current].paired_halfedge) as usize;
					if current == start {
						break;
					}
				}
			}
		}
		self.halfedge_tangent = tangent;
	}

	///Subdivide and then move the new vertices onto the PN-triangle surface
	///defined by the halfedge tangents, leaving a G1-smooth mesh. Without
	///tangents this degenerates to flat subdivision.
	pub fn refine(&mut self, edge_divisions: impl Fn(Vector3<f64>) -> i32 + Send + Sync) {
		if self.is_empty() {
			return;
		}
		debug!(num_tri = self.num_tri(), "refining mesh");
		let old = self.clone();
		let vert_bary = self.subdivide(edge_divisions);
		if vert_bary.is_empty() {
			return;
		}

		if old.halfedge_tangent.len() == old.halfedge.len() {
			let kernel = InterpTri {
				halfedge: &old.halfedge,
				halfedge_tangent: &old.halfedge_tangent,
				vert_pos: &old.vert_pos,
			};
			let mut new_pos = mem::take(&mut self.vert_pos);
			for_each_mut(auto_policy(new_pos.len()), &mut new_pos, |vert, pos| {
				kernel.call(pos, &vert_bary[vert])
			});
			self.vert_pos = new_pos;
			// The subdivided faces have been warped off their planes, so they
			// no longer relate to the original faces.
			self.initialize_original();
		}

		self.halfedge_tangent.clear();
		self.finish();
	}
}
