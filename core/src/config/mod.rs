mod options;
mod system;

pub use options::MultiTreeOptions;
pub use system::ConfigSystem;
