// Eigen-like aliases.
pub type Vector2d = nalgebra::Vector2::<f64>;
pub type Vector4d = nalgebra::Vector4::<f64>;
pub type Matrix2d = nalgebra::Matrix2::<f64>;
pub type Matrix4d = nalgebra::Matrix4::<f64>;
pub type Matrix24d = nalgebra::Matrix2x4::<f64>;
pub type Matrix42d = nalgebra::Matrix4x2::<f64>;
pub type Matrixd = nalgebra::DMatrix::<f64>;

// Per-frame vertex positions, `None` for a lost vertex.
pub type VertexPositions = Vec<Option<Vector2d>>;
