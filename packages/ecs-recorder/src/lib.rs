//! Flight recorder for `ecs-core`: binary keyframe/delta capture, a
//! background-thread writer, and seekable replay.

pub mod binding;
pub mod capture;
pub mod codec;
pub mod controller;
pub mod error;
pub mod frame;
pub mod io_utils;
pub mod playback;
pub mod reader;
pub mod writer;

pub use binding::{ManagedBinding, TypedBinding, TypedManagedBinding, UnmanagedBinding};
pub use capture::Bindings;
pub use codec::{JsonCodec, ManagedCodec};
pub use controller::PlaybackController;
pub use error::{RecorderError, RecorderResult};
pub use frame::{FrameReadOutcome, FrameType, ParsedFrame, SectionTag};
pub use playback::apply_frame;
pub use reader::RecordingReader;
pub use writer::AsyncRecorder;
