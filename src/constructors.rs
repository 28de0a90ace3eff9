use nalgebra::{Point3, Vector3};

use crate::error::MeshError;
use crate::meshimpl::MeshImpl;

///Builds a mesh from validated data, finishing it and marking it original.
fn from_shape(vert_pos: Vec<Point3<f64>>, tri_verts: Vec<Vector3<i32>>) -> MeshImpl {
	let mut mesh = MeshImpl {
		vert_pos,
		..MeshImpl::default()
	};
	mesh.create_halfedges(tri_verts);
	mesh.finish();
	mesh.initialize_original();
	mesh
}

///Constructs a mesh from raw vertex positions and triangle indices. The
///triangles must form a closed oriented 2-manifold.
pub fn from_mesh(
	vert_pos: Vec<Point3<f64>>,
	tri_verts: Vec<Vector3<i32>>,
) -> Result<MeshImpl, MeshError> {
	if vert_pos.iter().any(|v| !v.coords.iter().all(|x| x.is_finite())) {
		return Err(MeshError::NonFiniteVertex);
	}
	let num_vert = vert_pos.len() as i32;
	for tri in &tri_verts {
		for i in 0..3 {
			if tri[i] < 0 || tri[i] >= num_vert {
				return Err(MeshError::VertexOutOfBounds);
			}
		}
		if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
			return Err(MeshError::NotManifold);
		}
	}

	let mut mesh = MeshImpl {
		vert_pos,
		..MeshImpl::default()
	};
	mesh.create_halfedges(tri_verts);
	if !mesh.is_manifold() {
		return Err(MeshError::NotManifold);
	}
	mesh.finish();
	mesh.initialize_original();
	if mesh.status != MeshError::NoError {
		return Err(mesh.status);
	}
	Ok(mesh)
}

///Regular tetrahedron centered at the origin with one vertex at (1,1,1) and
///the rest at similarly symmetric points.
pub fn tetrahedron() -> MeshImpl {
	from_shape(
		vec![
			Point3::new(-1.0, -1.0, 1.0),
			Point3::new(-1.0, 1.0, -1.0),
			Point3::new(1.0, -1.0, -1.0),
			Point3::new(1.0, 1.0, 1.0),
		],
		vec![
			Vector3::new(2, 0, 1),
			Vector3::new(0, 3, 1),
			Vector3::new(2, 3, 0),
			Vector3::new(3, 2, 1),
		],
	)
}

///Unit cube in the first octant, touching the origin.
pub fn cube() -> MeshImpl {
	from_shape(
		vec![
			Point3::new(0.0, 0.0, 0.0),
			Point3::new(0.0, 0.0, 1.0),
			Point3::new(0.0, 1.0, 0.0),
			Point3::new(0.0, 1.0, 1.0),
			Point3::new(1.0, 0.0, 0.0),
			Point3::new(1.0, 0.0, 1.0),
			Point3::new(1.0, 1.0, 0.0),
			Point3::new(1.0, 1.0, 1.0),
		],
		vec![
			Vector3::new(1, 0, 4),
			Vector3::new(2, 4, 0),
			Vector3::new(1, 3, 0),
			Vector3::new(3, 1, 5),
			Vector3::new(3, 2, 0),
			Vector3::new(3, 7, 2),
			Vector3::new(5, 4, 6),
			Vector3::new(5, 1, 4),
			Vector3::new(6, 4, 2),
			Vector3::new(7, 6, 2),
			Vector3::new(7, 3, 5),
			Vector3::new(7, 5, 6),
		],
	)
}

///Regular octahedron with unit circumradius.
pub fn octahedron() -> MeshImpl {
	from_shape(
		vec![
			Point3::new(1.0, 0.0, 0.0),
			Point3::new(-1.0, 0.0, 0.0),
			Point3::new(0.0, 1.0, 0.0),
			Point3::new(0.0, -1.0, 0.0),
			Point3::new(0.0, 0.0, 1.0),
			Point3::new(0.0, 0.0, -1.0),
		],
		vec![
			Vector3::new(0, 2, 4),
			Vector3::new(1, 5, 3),
			Vector3::new(2, 1, 4),
			Vector3::new(3, 5, 0),
			Vector3::new(1, 3, 4),
			Vector3::new(0, 5, 2),
			Vector3::new(3, 0, 4),
			Vector3::new(2, 5, 1),
		],
	)
}

///Regular icosahedron with unit circumradius, so its refined smooth surface
///approximates the unit sphere.
pub fn icosahedron() -> MeshImpl {
	let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
	let r = (1.0 + phi * phi).sqrt();
	let a = 1.0 / r;
	let b = phi / r;
	from_shape(
		vec![
			Point3::new(-a, b, 0.0),
			Point3::new(a, b, 0.0),
			Point3::new(-a, -b, 0.0),
			Point3::new(a, -b, 0.0),
			Point3::new(0.0, -a, b),
			Point3::new(0.0, a, b),
			Point3::new(0.0, -a, -b),
			Point3::new(0.0, a, -b),
			Point3::new(b, 0.0, -a),
			Point3::new(b, 0.0, a),
			Point3::new(-b, 0.0, -a),
			Point3::new(-b, 0.0, a),
		],
		vec![
			Vector3::new(0, 11, 5),
			Vector3::new(0, 5, 1),
			Vector3::new(0, 1, 7),
			Vector3::new(0, 7, 10),
			Vector3::new(0, 10, 11),
			Vector3::new(1, 5, 9),
			Vector3::new(5, 11, 4),
			Vector3::new(11, 10, 2),
			Vector3::new(10, 7, 6),
			Vector3::new(7, 1, 8),
			Vector3::new(3, 9, 4),
			Vector3::new(3, 4, 2),
			Vector3::new(3, 2, 6),
			Vector3::new(3, 6, 8),
			Vector3::new(3, 8, 9),
			Vector3::new(4, 9, 5),
			Vector3::new(2, 4, 11),
			Vector3::new(6, 2, 10),
			Vector3::new(8, 6, 7),
			Vector3::new(9, 8, 1),
		],
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn canonical_solids_are_manifold() {
		for mesh in [tetrahedron(), cube(), octahedron(), icosahedron()] {
			assert!(mesh.is_manifold());
			assert_eq!(mesh.status, MeshError::NoError);
			assert!(mesh.mesh_relation.original_id >= 0);
		}
	}

	#[test]
	fn solids_wind_outward() {
		for mesh in [tetrahedron(), cube(), octahedron(), icosahedron()] {
			let center = mesh
				.vert_pos
				.iter()
				.fold(Vector3::zeros(), |acc, p| acc + p.coords)
				/ mesh.num_vert() as f64;
			for tri in 0..mesh.num_tri() {
				let centroid = (0..3).fold(Vector3::zeros(), |acc, i| {
					acc + mesh.vert_pos[mesh.halfedge[3 * tri + i].start_vert as usize].coords
				}) / 3.0;
				assert!(mesh.face_normal[tri].dot(&(centroid - center)) > 0.0);
			}
		}
	}

	#[test]
	fn icosahedron_on_unit_sphere() {
		let mesh = icosahedron();
		for v in &mesh.vert_pos {
			assert!((v.coords.norm() - 1.0).abs() < 1e-12);
		}
	}

	#[test]
	fn from_mesh_rejects_open_surface() {
		// one lone triangle is not closed
		let result = from_mesh(
			vec![
				Point3::new(0.0, 0.0, 0.0),
				Point3::new(1.0, 0.0, 0.0),
				Point3::new(0.0, 1.0, 0.0),
			],
			vec![Vector3::new(0, 1, 2)],
		);
		assert_eq!(result.err(), Some(MeshError::NotManifold));
	}

	#[test]
	fn from_mesh_rejects_non_finite() {
		let result = from_mesh(
			vec![
				Point3::new(f64::NAN, 0.0, 0.0),
				Point3::new(1.0, 0.0, 0.0),
				Point3::new(0.0, 1.0, 0.0),
			],
			vec![Vector3::new(0, 1, 2)],
		);
		assert_eq!(result.err(), Some(MeshError::NonFiniteVertex));
	}

	#[test]
	fn from_mesh_accepts_tetrahedron_data() {
		let mesh = from_mesh(
			vec![
				Point3::new(-1.0, -1.0, 1.0),
				Point3::new(-1.0, 1.0, -1.0),
				Point3::new(1.0, -1.0, -1.0),
				Point3::new(1.0, 1.0, 1.0),
			],
			vec![
				Vector3::new(2, 0, 1),
				Vector3::new(0, 3, 1),
				Vector3::new(2, 3, 0),
				Vector3::new(3, 2, 1),
			],
		)
		.unwrap();
		assert_eq!(mesh.num_tri(), 4);
	}
}
