pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::{AccessUnit, ParameterSetProvider, ParameterSets, SharedParameterSets};
pub use server::{IngestHandle, Server, ServerConfig, Viewer};
