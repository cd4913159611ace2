pub mod arrays;
pub mod mass_axis;

pub use arrays::Array2D;
pub use mass_axis::MassAxis;
