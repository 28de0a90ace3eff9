use thiserror::Error;

///Status of a mesh. Construction failures leave an empty mesh carrying the
///error so downstream operations degrade to no-ops instead of panicking.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Error)]
pub enum MeshError {
	#[default]
	#[error("no error")]
	NoError,
	#[error("mesh contains a non-finite vertex position")]
	NonFiniteVertex,
	#[error("triangle references a vertex out of bounds")]
	VertexOutOfBounds,
	#[error("mesh is not a closed oriented 2-manifold")]
	NotManifold,
}
