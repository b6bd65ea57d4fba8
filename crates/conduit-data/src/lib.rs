pub mod loader;
pub mod pack;
pub mod schema;

pub use loader::DataLoadError;
pub use pack::{DataPack, Layout, load_config, load_data_pack};
