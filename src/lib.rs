//! Smoothing and refinement core for closed, oriented triangle meshes.
//!
//! Starting from a halfedge mesh with per-face normals, this crate computes
//! crease-aware vertex normal fields ([`MeshImpl::set_normals`]), derives
//! per-halfedge tangents as weighted cubic Bezier controls
//! ([`MeshImpl::create_tangents_from_normals`],
//! [`MeshImpl::create_tangents_from_edges`]), subdivides every triangle by an
//! edge-adaptive factor through a cached topological partition
//! ([`MeshImpl::subdivide`]), and interpolates the new vertices along the
//! PN-triangle patch of each source triangle ([`MeshImpl::refine`]), yielding
//! a G1-smooth surface with sharp features where requested.

pub use crate::constructors::{cube, from_mesh, icosahedron, octahedron, tetrahedron};
pub use crate::error::MeshError;
pub use crate::meshimpl::{MeshImpl, MeshRelation};
pub use crate::shared::{create_tmp_edges, Barycentric, Halfedge, TmpEdge, TriRef};
pub use crate::smoothing::{circular_tangent, Smoothness};
pub use crate::subdivision::Partition;

mod common;
mod constructors;
mod error;
mod meshimpl;
mod parallel;
mod shared;
mod smoothing;
mod subdivision;
mod utils;
mod vec;
