use meshrefine::{cube, icosahedron, octahedron, tetrahedron, MeshImpl, Smoothness};
use nalgebra::{Vector3, Vector4};

///Evaluate the weighted cubic Bezier spanned by two endpoints and their
///halfedge tangents, in homogeneous Bernstein form.
fn eval_edge_bezier(
	p0: Vector3<f64>,
	t0: Vector4<f64>,
	t1: Vector4<f64>,
	p1: Vector3<f64>,
	t: f64,
) -> Vector3<f64> {
	let g = [
		p0.push(1.0),
		((p0 + t0.xyz()) * t0.w).push(t0.w),
		((p1 + t1.xyz()) * t1.w).push(t1.w),
		p1.push(1.0),
	];
	let b = [
		(1.0 - t).powi(3),
		3.0 * (1.0 - t).powi(2) * t,
		3.0 * (1.0 - t) * t * t,
		t.powi(3),
	];
	let sum = b[0] * g[0] + b[1] * g[1] + b[2] * g[2] + b[3] * g[3];
	sum.xyz() / sum.w
}

fn on_unit_boundary(x: f64) -> bool {
	x.abs() < 1e-9 || (x - 1.0).abs() < 1e-9
}

fn assert_outward_normals(mesh: &MeshImpl) {
	let center = mesh
		.vert_pos
		.iter()
		.fold(Vector3::zeros(), |acc, p| acc + p.coords)
		/ mesh.num_vert() as f64;
	for tri in 0..mesh.num_tri() {
		let centroid = (0..3).fold(Vector3::zeros(), |acc, i| {
			acc + mesh.vert_pos[mesh.halfedge[3 * tri + i].start_vert as usize].coords
		}) / 3.0;
		assert!(
			mesh.face_normal[tri].dot(&(centroid - center)) > 0.0,
			"flipped face {tri}"
		);
	}
}

#[test]
fn refine_preserves_corners_and_puts_midpoints_on_edge_beziers() {
	let mut mesh = tetrahedron();
	mesh.create_tangents_from_edges(Vec::new());
	let old = mesh.clone();

	// a parallel subdivision of a clone recovers the barycentric links the
	// refine consumed internally
	let mut probe = mesh.clone();
	let vert_bary = probe.subdivide(|_| 1);

	mesh.refine(|_| 1);
	assert_eq!(mesh.num_vert(), 10);
	assert!(mesh.is_manifold());

	for v in 0..old.num_vert() {
		assert_eq!(mesh.vert_pos[v], old.vert_pos[v]);
	}

	for v in old.num_vert()..mesh.num_vert() {
		let bary = &vert_bary[v];
		let i = (0..3).find(|&i| bary.uvw[i] == 0.0).unwrap();
		let j = (i + 1) % 3;
		let tri = bary.tri as usize;
		let halfedge = (3 * tri + j) as i32;
		let p0 = old.vert_pos[old.halfedge[halfedge as usize].start_vert as usize].coords;
		let p1 = old.vert_pos[old.halfedge[halfedge as usize].end_vert as usize].coords;
		let t0 = old.halfedge_tangent[halfedge as usize];
		let t1 = old.halfedge_tangent[old.halfedge[halfedge as usize].paired_halfedge as usize];
		let expected = eval_edge_bezier(p0, t0, t1, p1, 0.5);
		assert!(
			(mesh.vert_pos[v].coords - expected).norm() < 1e-9,
			"midpoint {v} off its edge bezier"
		);
	}
}

#[test]
fn refine_with_zero_divisions_changes_nothing() {
	let mut mesh = tetrahedron();
	mesh.create_tangents_from_edges(Vec::new());
	let old = mesh.clone();
	mesh.refine(|_| 0);
	assert_eq!(mesh.num_vert(), old.num_vert());
	assert_eq!(mesh.num_tri(), old.num_tri());
	for v in 0..old.num_vert() {
		assert_eq!(mesh.vert_pos[v], old.vert_pos[v]);
	}
}

#[test]
fn icosahedron_refines_toward_unit_sphere() {
	let mut mesh = icosahedron();
	mesh.create_tangents_from_edges(Vec::new());
	mesh.refine(|_| 3);

	assert_eq!(mesh.num_vert(), 12 + 30 * 3 + 20 * 3);
	assert_eq!(mesh.num_tri(), 20 * 16);
	assert!(mesh.is_manifold());

	// edge verts ride circular arcs of the unit sphere exactly
	for v in 12..12 + 30 * 3 {
		assert!((mesh.vert_pos[v].coords.norm() - 1.0).abs() < 1e-9);
	}
	// patch interiors sag slightly; flat faces would sit at radius 0.79
	for v in 0..mesh.num_vert() {
		assert!(
			(mesh.vert_pos[v].coords.norm() - 1.0).abs() < 5e-2,
			"vert {v} strays from the sphere"
		);
	}
	assert_outward_normals(&mesh);
}

#[test]
fn fully_sharpened_cube_refines_flat() {
	let mut mesh = cube();
	let sharpened = mesh.sharpen_edges(30.0, 0.0);
	mesh.create_tangents_from_edges(sharpened);
	let old = mesh.clone();
	mesh.refine(|_| 2);

	assert!(mesh.is_manifold());
	for v in 0..old.num_vert() {
		assert_eq!(mesh.vert_pos[v], old.vert_pos[v]);
	}
	for v in &mesh.vert_pos {
		assert!(
			v.coords.iter().any(|&x| on_unit_boundary(x)),
			"vert {v} left the cube surface"
		);
		assert!(v.coords.iter().all(|&x| -1e-9 < x && x < 1.0 + 1e-9));
	}
}

#[test]
fn normal_driven_sharp_cube_refines_flat() {
	let mut mesh = cube();
	mesh.set_normals(0, 30.0);
	mesh.create_tangents_from_normals(0);
	mesh.refine(|_| 1);

	assert!(mesh.is_manifold());
	for v in &mesh.vert_pos {
		assert!(v.coords.iter().any(|&x| on_unit_boundary(x)));
	}
}

#[test]
fn sharpened_equator_refines_to_a_great_circle() {
	let mut mesh = octahedron();
	// mark the four equatorial edges fully sharp, both directions
	let equator = [[0, 2], [2, 1], [1, 3], [3, 0]];
	let mut sharpened = Vec::new();
	for (e, halfedge) in mesh.halfedge.iter().enumerate() {
		if equator
			.iter()
			.any(|pair| pair.contains(&halfedge.start_vert) && pair.contains(&halfedge.end_vert))
		{
			sharpened.push(Smoothness {
				halfedge: e as i32,
				smoothness: 0.0,
			});
		}
	}
	assert_eq!(sharpened.len(), 8);
	mesh.create_tangents_from_edges(sharpened);

	let mut probe = mesh.clone();
	let vert_bary = probe.subdivide(|_| 1);
	let old = mesh.clone();
	mesh.refine(|_| 1);

	for v in old.num_vert()..mesh.num_vert() {
		let bary = &vert_bary[v];
		let tri = bary.tri as usize;
		let ends: Vec<i32> = (0..3)
			.filter(|&i| bary.uvw[i] > 0.0)
			.map(|i| old.halfedge[3 * tri + i].start_vert)
			.collect();
		let is_equator_edge = equator
			.iter()
			.any(|pair| pair.contains(&ends[0]) && pair.contains(&ends[1]));
		if is_equator_edge {
			// the crease bulges out to the unit circle in the z = 0 plane
			assert!(mesh.vert_pos[v].z.abs() < 1e-9);
			assert!((mesh.vert_pos[v].coords.norm() - 1.0).abs() < 1e-9);
		}
	}
}

#[test]
fn subdivide_carries_split_normals_per_face() {
	let mut mesh = cube();
	mesh.set_normals(0, 30.0);
	mesh.subdivide(|_| 1);
	assert!(mesh.is_manifold());

	for tri in 0..mesh.num_tri() {
		let p: Vec<Vector3<f64>> = (0..3)
			.map(|i| mesh.vert_pos[mesh.halfedge[3 * tri + i].start_vert as usize].coords)
			.collect();
		let geometric = (p[1] - p[0]).cross(&(p[2] - p[0])).normalize();
		for i in 0..3 {
			let normal = mesh.get_normal((3 * tri + i) as i32, 0);
			assert!(
				(normal - geometric).norm() < 1e-9,
				"tri {tri} corner {i}: prop normal {normal:?} vs face {geometric:?}"
			);
		}
	}
}

#[test]
fn update_sharpened_edges_follows_triangle_reordering() {
	let mesh = cube();
	let mut shuffled = mesh.clone();
	// pretend the triangles were rotated by one during construction
	let num_tri = shuffled.num_tri();
	for tri in 0..num_tri {
		shuffled.mesh_relation.tri_ref[tri].tri = ((tri + 1) % num_tri) as i32;
	}
	let edges = vec![Smoothness {
		halfedge: 3,
		smoothness: 0.5,
	}];
	let updated = shuffled.update_sharpened_edges(&edges);
	// old tri 1 now lives at tri 0
	assert_eq!(updated[0].halfedge, 0);
	assert_eq!(updated[0].smoothness, 0.5);
}
