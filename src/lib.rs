pub mod env;
pub mod fleet;
pub mod frame;
pub mod input;
pub mod link;
pub mod stream;
pub mod ui;

#[macro_use]
extern crate lazy_static;

pub use fleet::{DeviceConfig, FleetController, FleetOptions};
pub use frame::Frame;
pub use input::{Axis, Key, VelocityCommand};
pub use link::{DeviceLink, FrameRead, LinkError};
pub use stream::StreamAgent;
pub use ui::{Event, EventSource, Screen};
