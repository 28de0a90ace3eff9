use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use nalgebra::{Matrix3, Point3, Vector3, Vector4};
use tracing::debug;

use crate::common::lerp;
use crate::meshimpl::MeshImpl;
use crate::parallel::{auto_policy, exclusive_scan_iter, for_each_mut, transform_n};
use crate::shared::{create_tmp_edges, Barycentric, Halfedge, TmpEdge, TriRef};
use crate::utils::{next3_i32, next3_usize};
use crate::vec::vec_uninit;

static PARTITION_CACHE: LazyLock<Mutex<HashMap<Vector3<i32>, Partition>>> =
	LazyLock::new(|| Mutex::new(HashMap::new()));

///Look up the cached partition for a key, constructing it outside the lock on
///a miss. Concurrent producers may redundantly construct the same key; the
///copies are identical and the last insert wins.
fn get_or_build(key: Vector3<i32>, build: impl FnOnce() -> Partition) -> Partition {
	{
		let cache = PARTITION_CACHE.lock().unwrap();
		if let Some(cached) = cache.get(&key) {
			return cached.clone();
		}
	}
	let partition = build();
	let mut cache = PARTITION_CACHE.lock().unwrap();
	cache.insert(key, partition.clone());
	partition
}

///A topological triangulation of a canonical triangle whose three edges carry
///the sorted division counts. The first three vertBary entries are the
///corners, the next sum(n[i] - 1) are the edge insertions in traversal order,
///and the remainder are interior.
#[derive(Default, Clone, Debug)]
pub struct Partition {
	// The cached partitions don't have idx - it's added to the copy returned
	// from get_partition and maps the input divisions into the sorted
	// divisions that are uniquely cached.
	pub idx: Vector3<i32>,
	pub sorted_divisions: Vector3<i32>,
	pub vert_bary: Vec<Vector3<f64>>,
	pub tri_vert: Vec<Vector3<i32>>,
}

impl Partition {
	pub fn interior_offset(&self) -> i32 {
		self.sorted_divisions[0] + self.sorted_divisions[1] + self.sorted_divisions[2]
	}

	pub fn num_interior(&self) -> i32 {
		self.vert_bary.len() as i32 - self.interior_offset()
	}

	pub fn get_partition(divisions: Vector3<i32>) -> Self {
		let mut sorted_div = divisions;
		let mut tri_idx = Vector3::new(0i32, 1, 2);
		if sorted_div[2] > sorted_div[1] {
			sorted_div.as_mut_slice().swap(2, 1);
			tri_idx.as_mut_slice().swap(2, 1);
		}
		if sorted_div[1] > sorted_div[0] {
			sorted_div.as_mut_slice().swap(1, 0);
			tri_idx.as_mut_slice().swap(1, 0);
			if sorted_div[2] > sorted_div[1] {
				sorted_div.as_mut_slice().swap(2, 1);
				tri_idx.as_mut_slice().swap(2, 1);
			}
		}

		let mut partition = Self::get_cached_partition(sorted_div);
		partition.idx = tri_idx;

		partition
	}

	///Renumber this partition's vertex ids into the global numbering of the
	///containing triangle: corners, per-edge inserted vertices (walked in the
	///edge's direction), then interior vertices starting at interiorOffset.
	///The output triples are permuted so the result keeps the source
	///triangle's winding even when idx is a reflected permutation.
	pub fn reindex(
		&self,
		tri: Vector3<i32>,
		edge_offsets: Vector3<i32>,
		mut edge_fwd: Vector3<bool>,
		interior_offset: i32,
	) -> Vec<Vector3<i32>> {
		let mut new_verts: Vec<i32> = Vec::with_capacity(self.vert_bary.len());
		let mut tri_idx = self.idx;
		let mut out_tri = [0usize, 1, 2];
		if self.idx[1] != next3_i32(self.idx[0]) {
			tri_idx = Vector3::new(self.idx[2], self.idx[0], self.idx[1]);
			edge_fwd.iter_mut().for_each(|b| *b = !*b);
			out_tri.swap(0, 1);
		}
		for i in 0..3 {
			new_verts.push(tri[tri_idx[i] as usize]);
		}
		for i in 0..3 {
			let n = self.sorted_divisions[i] - 1;
			let fwd = edge_fwd[self.idx[i] as usize];
			let mut offset = edge_offsets[self.idx[i] as usize] + if fwd { 0 } else { n - 1 };
			for _ in 0..n {
				new_verts.push(offset);
				offset += if fwd { 1 } else { -1 };
			}
		}
		let offset = interior_offset - new_verts.len() as i32;
		for i in new_verts.len()..self.vert_bary.len() {
			new_verts.push(i as i32 + offset);
		}

		let mut new_tri_vert: Vec<Vector3<i32>> = vec![Vector3::zeros(); self.tri_vert.len()];
		for (out, tri_in) in new_tri_vert.iter_mut().zip(self.tri_vert.iter()) {
			for j in 0..3 {
				out[out_tri[j]] = new_verts[tri_in[j] as usize];
			}
		}
		new_tri_vert
	}

	// This triangulation is purely topological - it depends only on the number
	// of divisions of the three sides of the triangle. This allows them to be
	// cached and reused for similar triangles. The shape of the final surface
	// is defined by the tangents and the barycentric coordinates of the new
	// verts. The input must be sorted: n[0] >= n[1] >= n[2] > 0.
	fn get_cached_partition(n: Vector3<i32>) -> Self {
		get_or_build(n, || {
			let mut partition = Self {
				sorted_divisions: n,
				..Self::default()
			};
			partition.vert_bary.push(Vector3::new(1.0, 0.0, 0.0));
			partition.vert_bary.push(Vector3::new(0.0, 1.0, 0.0));
			partition.vert_bary.push(Vector3::new(0.0, 0.0, 1.0));
			for i in 0..3 {
				let next_bary = partition.vert_bary[(i + 1) % 3];
				for j in 1..n[i] {
					partition
						.vert_bary
						.push(partition.vert_bary[i].lerp(&next_bary, j as f64 / n[i] as f64));
				}
			}
			let edge_offsets = Vector3::new(3, 3 + n[0] - 1, 3 + n[0] - 1 + n[1] - 1);

			let f = (n[2] * n[2] + n[0] * n[0]) as f64;
			if n[1] == 1 {
				if n[0] == 1 {
					partition.tri_vert.push(Vector3::new(0, 1, 2));
				} else {
					Self::partition_fan(
						&mut partition.tri_vert,
						Vector3::new(0, 1, 2),
						n[0] - 1,
						edge_offsets[0],
					);
				}
			} else if ((n[1] * n[1]) as f64) > f - 2.0_f64.sqrt() * (n[0] * n[2]) as f64 {
				// acute-ish
				partition
					.tri_vert
					.push(Vector3::new(edge_offsets[1] - 1, 1, edge_offsets[1]));
				Self::partition_quad(
					&mut partition.tri_vert,
					&mut partition.vert_bary,
					Vector4::new(edge_offsets[1] - 1, edge_offsets[1], 2, 0),
					Vector4::new(-1, edge_offsets[1] + 1, edge_offsets[2], edge_offsets[0]),
					Vector4::new(0, n[1] - 2, n[2] - 1, n[0] - 2),
					Vector4::new(true, true, true, true),
				);
			} else {
				// obtuse -> split into two acute
				// portion of n[0] under n[2]
				let ns = (n[0] - 2)
					.min(((f - (n[1] * n[1]) as f64) / (2 * n[0]) as f64).round() as i32);
				// height from n[0]: nh <= n[2]
				let nh = 1.0_f64.max(((n[2] * n[2] - ns * ns) as f64).sqrt().round()) as i32;

				let h_offset = partition.vert_bary.len() as i32;
				let middle_bary = partition.vert_bary[(edge_offsets[0] + ns - 1) as usize];
				for j in 1..nh {
					partition
						.vert_bary
						.push(partition.vert_bary[2].lerp(&middle_bary, j as f64 / nh as f64));
				}

				partition
					.tri_vert
					.push(Vector3::new(edge_offsets[1] - 1, 1, edge_offsets[1]));
				Self::partition_quad(
					&mut partition.tri_vert,
					&mut partition.vert_bary,
					Vector4::new(
						edge_offsets[1] - 1,
						edge_offsets[1],
						2,
						edge_offsets[0] + ns - 1,
					),
					Vector4::new(-1, edge_offsets[1] + 1, h_offset, edge_offsets[0] + ns),
					Vector4::new(0, n[1] - 2, nh - 1, n[0] - ns - 2),
					Vector4::new(true, true, true, true),
				);

				if n[2] == 1 {
					Self::partition_fan(
						&mut partition.tri_vert,
						Vector3::new(0, edge_offsets[0] + ns - 1, 2),
						ns - 1,
						edge_offsets[0],
					);
				} else if ns == 1 {
					partition
						.tri_vert
						.push(Vector3::new(h_offset, 2, edge_offsets[2]));
					Self::partition_quad(
						&mut partition.tri_vert,
						&mut partition.vert_bary,
						Vector4::new(h_offset, edge_offsets[2], 0, edge_offsets[0]),
						Vector4::new(-1, edge_offsets[2] + 1, -1, h_offset + nh - 2),
						Vector4::new(0, n[2] - 2, ns - 1, nh - 2),
						Vector4::new(true, true, true, false),
					);
				} else {
					partition
						.tri_vert
						.push(Vector3::new(h_offset - 1, 0, edge_offsets[0]));
					Self::partition_quad(
						&mut partition.tri_vert,
						&mut partition.vert_bary,
						Vector4::new(h_offset - 1, edge_offsets[0], edge_offsets[0] + ns - 1, 2),
						Vector4::new(
							-1,
							edge_offsets[0] + 1,
							h_offset + nh - 2,
							edge_offsets[2],
						),
						Vector4::new(0, ns - 2, nh - 1, n[2] - 2),
						Vector4::new(true, true, false, true),
					);
				}
			}

			partition
		})
	}

	// Side 0 has added edges while sides 1 and 2 do not. Fan spreads from
	// vert 2.
	fn partition_fan(
		tri_vert: &mut Vec<Vector3<i32>>,
		corner_verts: Vector3<i32>,
		added: i32,
		edge_offset: i32,
	) {
		let mut last = corner_verts[0];
		for i in 0..added {
			let next = edge_offset + i;
			tri_vert.push(Vector3::new(last, next, corner_verts[2]));
			last = next;
		}
		tri_vert.push(Vector3::new(last, corner_verts[1], corner_verts[2]));
	}

	// Partitions are parallel to the first edge unless two consecutive
	// edgeAdded are zero, in which case a terminal triangulation is performed.
	fn partition_quad(
		tri_vert: &mut Vec<Vector3<i32>>,
		vert_bary: &mut Vec<Vector3<f64>>,
		corner_verts: Vector4<i32>,
		edge_offsets: Vector4<i32>,
		edge_added: Vector4<i32>,
		edge_fwd: Vector4<bool>,
	) {
		let get_edge_vert = |edge: usize, idx: i32| {
			edge_offsets[edge] + (if edge_fwd[edge] { 1 } else { -1 }) * idx
		};

		debug_assert!(
			edge_added.iter().all(|&added| added >= 0),
			"negative divisions!"
		);

		let mut corner = -1;
		let mut last = 3;
		let mut max_edge = -1;
		for i in 0..4 {
			if corner == -1 && edge_added[i] == 0 && edge_added[last as usize] == 0 {
				corner = i as i32;
			}
			if edge_added[i] > 0 {
				max_edge = if max_edge == -1 { i as i32 } else { -2 };
			}
			last = i as i32;
		}
		if corner >= 0 {
			// terminate
			if max_edge >= 0 {
				let max_edge = max_edge as usize;
				let edge: [usize; 4] = core::array::from_fn(|i| (i + max_edge) % 4);
				let middle = edge_added[max_edge] / 2;
				tri_vert.push(Vector3::new(
					corner_verts[edge[2]],
					corner_verts[edge[3]],
					get_edge_vert(max_edge, middle),
				));
				let mut last = corner_verts[edge[0]];
				for i in 0..=middle {
					let next = get_edge_vert(max_edge, i);
					tri_vert.push(Vector3::new(corner_verts[edge[3]], last, next));
					last = next;
				}
				last = corner_verts[edge[1]];
				for i in (middle..=(edge_added[max_edge] - 1)).rev() {
					let next = get_edge_vert(max_edge, i);
					tri_vert.push(Vector3::new(corner_verts[edge[2]], next, last));
					last = next;
				}
			} else {
				let corner = corner as usize;
				let mut side_vert = corner_verts[0]; // initial value is unused
				for j in [1usize, 2] {
					let side = (corner + j) % 4;
					if j == 2 && edge_added[side] > 0 {
						tri_vert.push(Vector3::new(
							corner_verts[side],
							get_edge_vert(side, 0),
							side_vert,
						));
					} else {
						side_vert = corner_verts[side];
					}
					for i in 0..edge_added[side] {
						let next_vert = get_edge_vert(side, i);
						tri_vert.push(Vector3::new(corner_verts[corner], side_vert, next_vert));
						side_vert = next_vert;
					}
					if j == 2 || edge_added[side] == 0 {
						tri_vert.push(Vector3::new(
							corner_verts[corner],
							side_vert,
							corner_verts[(corner + j + 1) % 4],
						));
					}
				}
			}
			return;
		}
		// recursively partition
		let partitions = 1 + edge_added[1].min(edge_added[3]);
		let mut new_corner_verts = Vector4::new(corner_verts[1], -1, -1, corner_verts[0]);
		let mut new_edge_offsets = Vector4::new(
			edge_offsets[1],
			-1,
			get_edge_vert(3, edge_added[3] + 1),
			edge_offsets[0],
		);
		let mut new_edge_added = Vector4::new(0, -1, 0, edge_added[0]);
		let mut new_edge_fwd = Vector4::new(edge_fwd[1], true, edge_fwd[3], edge_fwd[0]);

		for i in 1..partitions {
			let corner_offset1 = (edge_added[1] * i) / partitions;
			let corner_offset3 = edge_added[3] - 1 - (edge_added[3] * i) / partitions;
			let next_offset1 = get_edge_vert(1, corner_offset1 + 1);
			let next_offset3 = get_edge_vert(3, corner_offset3 + 1);
			let added = lerp(
				edge_added[0] as f64,
				edge_added[2] as f64,
				i as f64 / partitions as f64,
			)
			.round() as i32;

			new_corner_verts[1] = get_edge_vert(1, corner_offset1);
			new_corner_verts[2] = get_edge_vert(3, corner_offset3);
			new_edge_added[0] = (next_offset1 - new_edge_offsets[0]).abs() - 1;
			new_edge_added[1] = added;
			new_edge_added[2] = (next_offset3 - new_edge_offsets[2]).abs() - 1;
			new_edge_offsets[1] = vert_bary.len() as i32;
			new_edge_offsets[2] = next_offset3;

			for j in 0..added {
				vert_bary.push(vert_bary[new_corner_verts[1] as usize].lerp(
					&vert_bary[new_corner_verts[2] as usize],
					(j + 1) as f64 / (added + 1) as f64,
				));
			}

			Self::partition_quad(
				tri_vert,
				vert_bary,
				new_corner_verts,
				new_edge_offsets,
				new_edge_added,
				new_edge_fwd,
			);

			new_corner_verts[0] = new_corner_verts[1];
			new_corner_verts[3] = new_corner_verts[2];
			new_edge_added[3] = new_edge_added[1];
			new_edge_offsets[0] = next_offset1;
			new_edge_offsets[3] = new_edge_offsets[1] + new_edge_added[1] - 1;
			new_edge_fwd[3] = false;
		}

		new_corner_verts[1] = corner_verts[2];
		new_corner_verts[2] = corner_verts[3];
		new_edge_offsets[1] = edge_offsets[2];
		new_edge_added[0] = edge_added[1] - (new_edge_offsets[0] - edge_offsets[1]).abs();
		new_edge_added[1] = edge_added[2];
		new_edge_added[2] = (new_edge_offsets[2] - edge_offsets[3]).abs() - 1;
		new_edge_offsets[2] = edge_offsets[3];
		new_edge_fwd[1] = edge_fwd[2];

		Self::partition_quad(
			tri_vert,
			vert_bary,
			new_corner_verts,
			new_edge_offsets,
			new_edge_added,
			new_edge_fwd,
		);
	}
}

///Retained verts are part of several triangles, and it doesn't matter which
///one the vertBary refers to. Here, whichever is last will win and it's done
///sequentially for simplicity.
fn fill_retained_verts(vert_bary: &mut [Barycentric], halfedge: &[Halfedge]) {
	let num_tri = halfedge.len() / 3;
	for tri in 0..num_tri {
		for i in 0..3 {
			let mut uvw = Vector3::zeros();
			uvw[i] = 1.0;
			vert_bary[halfedge[3 * tri + i].start_vert as usize] =
				Barycentric::new(tri as i32, uvw);
		}
	}
}

impl MeshImpl {
	///Split each edge into n + 1 pieces as defined by calling the
	///edgeDivisions function, and sub-triangulate each triangle accordingly.
	///Returns the barycentric link of every new vertex into its source
	///triangle. This function doesn't run finish(), as the new vertices are
	///expected to move afterward (smoothing), which would invalidate it.
	pub fn subdivide(
		&mut self,
		edge_divisions: impl Fn(Vector3<f64>) -> i32 + Send + Sync,
	) -> Vec<Barycentric> {
		if self.is_empty() {
			return Vec::new();
		}
		let edges: Vec<TmpEdge> = create_tmp_edges(&self.halfedge);
		let num_vert = self.num_vert();
		let num_edge = edges.len();
		let num_tri = self.num_tri();
		let mut half2edge: Vec<i32> = vec![0; 2 * num_edge];
		for edge in 0..num_edge {
			let idx = edges[edge].halfedge_idx as usize;
			half2edge[idx] = edge as i32;
			half2edge[self.halfedge[idx].paired_halfedge as usize] = edge as i32;
		}

		let policy = auto_policy(num_edge);
		let edge_added: Vec<i32> = transform_n(policy, num_edge, |i| {
			let edge = edges[i];
			let vec = self.vert_pos[edge.first as usize] - self.vert_pos[edge.second as usize];
			edge_divisions(vec)
		});
		debug_assert!(
			edge_added.iter().all(|&n| n >= 0),
			"negative divisions!"
		);

		let mut edge_offset: Vec<i32> = vec![0; num_edge];
		exclusive_scan_iter(
			edge_added.iter().copied(),
			&mut edge_offset,
			num_vert as i32,
		);

		let mut vert_bary: Vec<Barycentric> = vec![
			Barycentric::default();
			(edge_offset[num_edge - 1] + edge_added[num_edge - 1]) as usize
		];
		let total_edge_added = vert_bary.len() - num_vert;
		debug!(
			num_tri,
			num_edge, total_edge_added, "subdividing mesh edges"
		);
		fill_retained_verts(&mut vert_bary, &self.halfedge);
		for i in 0..num_edge {
			let edge = edges[i];
			let n = edge_added[i];
			let offset = edge_offset[i];
			let frac = 1.0 / (n + 1) as f64;
			let v0 = edge.halfedge_idx as usize % 3;
			let v1 = next3_usize(v0);
			let tri = edge.halfedge_idx / 3;
			for k in 0..n {
				let mut uvw = Vector3::zeros();
				uvw[v1] = (k + 1) as f64 * frac;
				uvw[v0] = 1.0 - uvw[v1];
				vert_bary[(offset + k) as usize] = Barycentric::new(tri, uvw);
			}
		}

		let sub_tris: Vec<Partition> = transform_n(auto_policy(num_tri), num_tri, |tri| {
			let mut divisions = Vector3::zeros();
			for i in 0..3 {
				divisions[i] = edge_added[half2edge[3 * tri + i] as usize] + 1;
			}
			Partition::get_partition(divisions)
		});

		let mut tri_offset: Vec<i32> = vec![0; num_tri];
		exclusive_scan_iter(
			sub_tris.iter().map(|part| part.tri_vert.len() as i32),
			&mut tri_offset,
			0,
		);

		let mut interior_offset: Vec<i32> = vec![0; num_tri];
		exclusive_scan_iter(
			sub_tris.iter().map(|part| part.num_interior()),
			&mut interior_offset,
			vert_bary.len() as i32,
		);

		let mut tri_verts: Vec<Vector3<i32>> = vec![
			Vector3::zeros();
			(tri_offset[num_tri - 1] as usize) + sub_tris[num_tri - 1].tri_vert.len()
		];
		vert_bary.resize(
			(interior_offset[num_tri - 1] + sub_tris[num_tri - 1].num_interior()) as usize,
			Barycentric::default(),
		);
		let mut tri_ref: Vec<TriRef> = vec![TriRef::default(); tri_verts.len()];
		for tri in 0..num_tri {
			let mut tri3 = Vector3::zeros();
			let mut edge_offsets = Vector3::zeros();
			let mut edge_fwd = Vector3::new(false, false, false);
			for i in 0..3 {
				let halfedge = &self.halfedge[3 * tri + i];
				tri3[i] = halfedge.start_vert;
				edge_offsets[i] = edge_offset[half2edge[3 * tri + i] as usize];
				edge_fwd[i] = halfedge.is_forward();
			}

			let new_tris = sub_tris[tri].reindex(tri3, edge_offsets, edge_fwd, interior_offset[tri]);
			let start = tri_offset[tri] as usize;
			tri_verts[start..start + new_tris.len()].copy_from_slice(&new_tris);
			tri_ref[start..start + new_tris.len()].fill(self.mesh_relation.tri_ref[tri]);

			// permute interior barycentrics back into the source triangle's
			// canonical basis
			let idx = sub_tris[tri].idx;
			let v_idx = if idx[1] == next3_i32(idx[0]) {
				idx
			} else {
				Vector3::new(idx[2], idx[0], idx[1])
			};
			let mut r_idx = [0usize; 3];
			for i in 0..3 {
				r_idx[v_idx[i] as usize] = i;
			}

			let sub_bary = &sub_tris[tri].vert_bary;
			for (bary_in, bary_out) in sub_bary[sub_tris[tri].interior_offset() as usize..]
				.iter()
				.zip(vert_bary[interior_offset[tri] as usize..].iter_mut())
			{
				*bary_out = Barycentric::new(
					tri as i32,
					Vector3::new(bary_in[r_idx[0]], bary_in[r_idx[1]], bary_in[r_idx[2]]),
				);
			}
		}
		self.mesh_relation.tri_ref = tri_ref;

		let mut new_vert_pos: Vec<Point3<f64>> = unsafe { vec_uninit(vert_bary.len()) };
		for_each_mut(auto_policy(vert_bary.len()), &mut new_vert_pos, |vert, pos| {
			let bary = &vert_bary[vert];
			let mut tri_pos = Matrix3::zeros();
			for i in 0..3 {
				tri_pos.set_column(
					i,
					&self.vert_pos
						[self.halfedge[3 * bary.tri as usize + i].start_vert as usize]
						.coords,
				);
			}
			*pos = Point3::from(tri_pos * bary.uvw);
		});
		self.vert_pos = new_vert_pos;

		self.face_normal.clear();

		if self.mesh_relation.num_prop > 0 {
			let num_prop = self.mesh_relation.num_prop;
			let num_prop_vert = self.num_prop_vert() as i32;
			let added_verts = self.num_vert() as i32 - num_vert as i32;
			let prop_offset = num_prop_vert - num_vert as i32;
			// Duplicate the backward-edge prop verts even where both sides
			// share properties; the spares are simply never referenced.
			let mut prop: Vec<f64> = vec![
				0.0;
				(num_prop * (num_prop_vert + added_verts + total_edge_added as i32)) as usize
			];
			prop[0..self.mesh_relation.properties.len()]
				.copy_from_slice(&self.mesh_relation.properties);

			// interior and forward-edge prop verts, linearly interpolated
			for i in 0..added_verts {
				let vert = num_prop_vert + i;
				let bary = &vert_bary[num_vert + i as usize];
				for p in 0..num_prop {
					let mut tri_prop = Vector3::zeros();
					for k in 0..3 {
						tri_prop[k] = self.mesh_relation.properties
							[(self.mesh_relation.tri_properties[bary.tri as usize][k] * num_prop
								+ p) as usize];
					}
					prop[(vert * num_prop + p) as usize] = tri_prop.dot(&bary.uvw);
				}
			}

			// backward-edge prop verts, interpolated in the paired triangle's
			// frame; some of these are unreferenced duplicates
			for i in 0..num_edge {
				let n = edge_added[i];
				let offset = edge_offset[i] + prop_offset + added_verts;
				let frac = 1.0 / (n + 1) as f64;
				let halfedge_idx = self.halfedge[edges[i].halfedge_idx as usize].paired_halfedge;
				let v0 = halfedge_idx as usize % 3;
				let v1 = next3_usize(v0);
				let tri = halfedge_idx as usize / 3;
				for k in 0..n {
					let mut uvw = Vector3::zeros();
					uvw[v1] = (k + 1) as f64 * frac;
					uvw[v0] = 1.0 - uvw[v1];
					for p in 0..num_prop {
						let mut tri_prop = Vector3::zeros();
						for j in 0..3 {
							tri_prop[j] = self.mesh_relation.properties
								[(self.mesh_relation.tri_properties[tri][j] * num_prop + p)
									as usize];
						}
						prop[((offset + k) * num_prop + p) as usize] = tri_prop.dot(&uvw);
					}
				}
			}

			let mut tri_prop: Vec<Vector3<i32>> = vec![Vector3::zeros(); tri_verts.len()];
			for tri in 0..num_tri {
				let tri3 = self.mesh_relation.tri_properties[tri];
				let mut edge_offsets = Vector3::zeros();
				let mut edge_fwd = Vector3::new(true, true, true);
				for i in 0..3 {
					let halfedge = &self.halfedge[3 * tri + i];
					edge_offsets[i] = edge_offset[half2edge[3 * tri + i] as usize];
					if !halfedge.is_forward() {
						let pair_tri = halfedge.paired_halfedge as usize / 3;
						let j = halfedge.paired_halfedge as usize % 3;
						if self.mesh_relation.tri_properties[pair_tri][j]
							!= self.mesh_relation.tri_properties[tri][next3_usize(i)]
							|| self.mesh_relation.tri_properties[pair_tri][next3_usize(j)]
								!= self.mesh_relation.tri_properties[tri][i]
						{
							// properties split across this edge: point at the
							// duplicated backward block
							edge_offsets[i] += added_verts;
						} else {
							edge_fwd[i] = false;
						}
					}
				}

				let new_tris = sub_tris[tri].reindex(
					tri3,
					edge_offsets.add_scalar(prop_offset),
					edge_fwd,
					interior_offset[tri] + prop_offset,
				);
				let start = tri_offset[tri] as usize;
				tri_prop[start..start + new_tris.len()].copy_from_slice(&new_tris);
			}

			self.mesh_relation.properties = prop;
			self.mesh_relation.tri_properties = tri_prop;
		}

		self.create_halfedges(tri_verts);

		vert_bary
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::constructors;

	///Signed area of a partition triangle in the (v, w) plane of the simplex.
	fn signed_area(partition: &Partition, tri: Vector3<i32>) -> f64 {
		let p = |v: i32| {
			let bary = partition.vert_bary[v as usize];
			(bary[1], bary[2])
		};
		let (ax, ay) = p(tri[0]);
		let (bx, by) = p(tri[1]);
		let (cx, cy) = p(tri[2]);
		0.5 * ((bx - ax) * (cy - ay) - (by - ay) * (cx - ax))
	}

	#[test]
	fn partition_of_ones_is_single_triangle() {
		let partition = Partition::get_partition(Vector3::new(1, 1, 1));
		assert_eq!(
			partition.vert_bary,
			vec![
				Vector3::new(1.0, 0.0, 0.0),
				Vector3::new(0.0, 1.0, 0.0),
				Vector3::new(0.0, 0.0, 1.0)
			]
		);
		assert_eq!(partition.tri_vert, vec![Vector3::new(0, 1, 2)]);
	}

	#[test]
	fn partition_three_one_one_is_a_fan() {
		let partition = Partition::get_partition(Vector3::new(3, 1, 1));
		assert_eq!(partition.vert_bary.len(), 5);
		assert_eq!(
			partition.tri_vert,
			vec![
				Vector3::new(0, 3, 2),
				Vector3::new(3, 4, 2),
				Vector3::new(4, 1, 2)
			]
		);
	}

	#[test]
	fn partition_is_deterministic() {
		let a = Partition::get_partition(Vector3::new(2, 4, 3));
		let b = Partition::get_partition(Vector3::new(2, 4, 3));
		assert_eq!(a.idx, b.idx);
		assert_eq!(a.sorted_divisions, b.sorted_divisions);
		assert_eq!(a.tri_vert, b.tri_vert);
		assert_eq!(a.vert_bary, b.vert_bary);
	}

	#[test]
	fn partition_sorts_divisions() {
		let partition = Partition::get_partition(Vector3::new(2, 4, 3));
		assert_eq!(partition.sorted_divisions, Vector3::new(4, 3, 2));
		// idx maps sorted slots back to input slots
		assert_eq!(partition.idx, Vector3::new(1, 2, 0));
	}

	#[test]
	fn partition_covers_the_simplex() {
		for div in [
			Vector3::new(1, 1, 1),
			Vector3::new(2, 1, 1),
			Vector3::new(2, 2, 1),
			Vector3::new(3, 2, 2),
			Vector3::new(4, 4, 4),
			Vector3::new(5, 3, 2),
			Vector3::new(5, 5, 1),
			Vector3::new(8, 2, 2),
			Vector3::new(7, 5, 3),
		] {
			let partition = Partition::get_partition(div);
			let mut total = 0.0;
			for tri in &partition.tri_vert {
				let area = signed_area(&partition, *tri);
				assert!(area > 0.0, "flipped sub-triangle for {:?}", div);
				total += area;
			}
			assert!((total - 0.5).abs() < 1e-9, "coverage gap for {:?}", div);
			for bary in &partition.vert_bary {
				assert!((bary[0] + bary[1] + bary[2] - 1.0).abs() < 1e-9);
				assert!(bary.iter().all(|&x| x >= -1e-12));
			}
		}
	}

	#[test]
	fn partition_boundary_vertex_counts() {
		let n = Vector3::new(5, 4, 3);
		let partition = Partition::get_partition(n);
		// edge k of the sorted triangle lies where the opposite barycentric
		// component vanishes
		let on_edge = |bary: &Vector3<f64>, k: usize| bary[(k + 2) % 3].abs() < 1e-12;
		for k in 0..3 {
			let count = partition
				.vert_bary
				.iter()
				.filter(|&bary| on_edge(bary, k))
				.count() as i32;
			assert_eq!(count, n[k] + 1);
		}
		// interior verts stay strictly inside
		for bary in &partition.vert_bary[partition.interior_offset() as usize..] {
			assert!(bary.iter().all(|&x| x > 0.0));
		}
	}

	#[test]
	fn partition_cache_is_coherent_across_threads() {
		let reference = Partition::get_partition(Vector3::new(6, 5, 4));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				std::thread::spawn(|| Partition::get_partition(Vector3::new(6, 5, 4)))
			})
			.collect();
		for handle in handles {
			let partition = handle.join().unwrap();
			assert_eq!(partition.tri_vert, reference.tri_vert);
			assert_eq!(partition.vert_bary, reference.vert_bary);
		}
	}

	#[test]
	fn subdivide_zero_divisions_is_identity() {
		let mut mesh = constructors::tetrahedron();
		let old = mesh.clone();
		let vert_bary = mesh.subdivide(|_| 0);
		assert_eq!(mesh.num_vert(), old.num_vert());
		assert_eq!(mesh.num_tri(), old.num_tri());
		assert_eq!(vert_bary.len(), old.num_vert());
		for (v, bary) in vert_bary.iter().enumerate() {
			assert_eq!(bary.uvw.iter().filter(|&&x| x == 1.0).count(), 1);
			assert_eq!(mesh.vert_pos[v], old.vert_pos[v]);
		}
	}

	#[test]
	fn subdivide_counts_match_division_factor() {
		// one division per edge: each triangle becomes 4
		let mut mesh = constructors::tetrahedron();
		mesh.subdivide(|_| 1);
		assert_eq!(mesh.num_vert(), 4 + 6);
		assert_eq!(mesh.num_tri(), 16);
		assert!(mesh.is_manifold());

		// two divisions per edge: each triangle becomes 9, one interior vert
		let mut mesh = constructors::tetrahedron();
		mesh.subdivide(|_| 2);
		assert_eq!(mesh.num_vert(), 4 + 6 * 2 + 4);
		assert_eq!(mesh.num_tri(), 36);
		assert!(mesh.is_manifold());
	}

	#[test]
	fn subdivide_keeps_verts_on_source_planes() {
		let mut mesh = constructors::tetrahedron();
		let old = mesh.clone();
		let vert_bary = mesh.subdivide(|_| 2);
		for (v, bary) in vert_bary.iter().enumerate() {
			let mut expected = Vector3::zeros();
			for i in 0..3 {
				expected += bary.uvw[i]
					* old.vert_pos
						[old.halfedge[3 * bary.tri as usize + i].start_vert as usize]
						.coords;
			}
			assert!((mesh.vert_pos[v].coords - expected).norm() < 1e-12);
		}
	}
}
