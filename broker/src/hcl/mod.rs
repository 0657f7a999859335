//! HCL reads and rewrites used when subsuming existing resources

pub mod extract;
pub mod transform;

pub use extract::{get_parameters, ExtractVariable};
pub use transform::{ParameterMapping, Transformer};
