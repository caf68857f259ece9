//! Follow-me robot pilot
//!
//! Fuses a person detection and hand-gesture detection into one motion
//! command per tick and writes it to the robot controller as a single byte.
//!
//! # Architecture
//!
//! - `snapshot`: per-tick detections (camera + detector, or a replay file)
//! - `decision`: pure mapping from a detection to a `Command`
//! - `channel`: byte-stream session to the controller with the stop guarantee
//! - `control`: the loop tying them together, quit handling, exit reasons
//! - `config`: file + environment configuration
//!
//! The robot is always sent STOP (`x`) before the session is released,
//! whether the loop ends by quit request, tick limit, end of input, a
//! channel or source failure, or a panic.

pub mod channel;
pub mod command;
pub mod config;
pub mod control;
pub mod decision;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod snapshot;
pub mod ui;

pub use channel::{
    open_dispatch, ChannelStats, CommandChannel, ConnectionState, ControllerEndpoint,
    ControllerSettings, Dispatch, LocalTransport, RetryPolicy, SenderWorker, TcpTransport,
    Transport,
};
pub use command::{Command, CommandCounts};
pub use config::PilotConfig;
pub use control::{ControlLoop, ExitReason, LoopReport, LoopSettings, QuitSignal};
pub use decision::{decide, GeometryConfig};
pub use detect::{
    BoundingBox, Detection, DetectorBackend, FistPolicy, HandGesture, HandLandmarks, Observation,
};
pub use frame::{Capture, Frame};
pub use ingest::{FrameSource, SourceSettings};
pub use snapshot::{
    open_detection_source, DetectionSource, GestureSettings, ReplaySource, Snapshot,
    SnapshotBuilder,
};
