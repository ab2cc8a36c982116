pub mod analyze;
pub mod model;

pub use analyze::{analyze_entries, build_report, Analysis, Block, EdgeKind, EdgeOut, FunctionOut, Report};
pub use model::{load_image, read_u32, Image, ImageKind};
