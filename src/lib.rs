pub mod logging;
pub mod model;
pub mod server;
pub mod storage;
pub mod sync;
