mod backend;
mod prompt;
mod reply;
mod stub;

#[cfg(feature = "remote-processor")]
mod remote;

pub use backend::{FrameMetadata, FrameProcessor, Inference, SIZE_WARNING_BYTES};
pub use prompt::build_prompt;
pub use reply::parse_model_reply;
pub use stub::StubProcessor;

#[cfg(feature = "remote-processor")]
pub use remote::{RemoteConfig, RemoteProcessor};
