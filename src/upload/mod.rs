//! Upload of unsynced records to the remote time-series store.

pub mod influx;
pub mod line_protocol;
pub mod task;

pub use influx::{InfluxWriter, RemoteWriter, WriteError};
pub use line_protocol::ToLine;
pub use task::{upload_unsynced, UploadTask};
