pub mod affine;
pub mod delaunay;
pub mod gaussian;
pub mod landmark_compositor;
pub mod mask;
