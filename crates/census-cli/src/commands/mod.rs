pub mod census;
pub mod check;
pub mod keygen;
pub mod root;
pub mod stats;
pub mod status;
pub mod submit;

/// Default API endpoint of a local node.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9101";
