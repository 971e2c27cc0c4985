use thiserror::Error;

use crate::frame::Frame;

/// Failure crossing the device-link boundary. Every variant is caught at
/// the call site; none of these ever unwinds through the run loop.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("device not reachable: {0}")]
    Unreachable(String),
    #[error("command refused: {0}")]
    CommandFailed(String),
    #[error("video channel error: {0}")]
    VideoChannel(String),
}

/// Readable "current frame" handle for one video channel, as handed out by
/// [`DeviceLink::get_frame_read`]. `frame()` returns the most recently
/// decoded picture, `None` before the first one arrives, or an error when
/// the underlying transport broke.
pub trait FrameRead: Send {
    fn frame(&self) -> Result<Option<Frame>, LinkError>;
}

/// The device SDK as seen from this crate. One implementation per physical
/// device; shared between the controller thread and that device's capture
/// thread, hence `Send + Sync`.
///
/// All operations are bounded by the SDK's own timeouts; this crate adds no
/// timeout layer of its own.
pub trait DeviceLink: Send + Sync {
    fn connect(&self) -> Result<(), LinkError>;
    fn set_speed(&self, speed: i32) -> Result<(), LinkError>;
    fn streamon(&self) -> Result<(), LinkError>;
    fn streamoff(&self) -> Result<(), LinkError>;
    fn get_frame_read(&self, port: u16) -> Result<Box<dyn FrameRead>, LinkError>;
    fn takeoff(&self) -> Result<(), LinkError>;
    fn land(&self) -> Result<(), LinkError>;
    fn send_rc_control(&self, lr: i32, fb: i32, ud: i32, yaw: i32) -> Result<(), LinkError>;
    fn get_battery(&self) -> Result<u8, LinkError>;
    fn end(&self) -> Result<(), LinkError>;
}
