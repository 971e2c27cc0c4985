use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU8, Ordering},
    sync::Arc,
    time::Duration,
};

use tello_fleet::{
    DeviceConfig, DeviceLink, Event, EventSource, FleetController, FleetOptions, Frame, FrameRead,
    Key, LinkError, Screen,
};

/// Simulated device: always reachable, serves a slowly shifting solid
/// color as its video feed. Stands in for the real SDK so the front-end
/// can be exercised without hardware.
struct SimLink {
    tint: Arc<AtomicU8>,
    battery: AtomicU8,
}

impl SimLink {
    fn new(tint: u8) -> Self {
        Self {
            tint: Arc::new(AtomicU8::new(tint)),
            battery: AtomicU8::new(98),
        }
    }
}

struct SimReader {
    tint: Arc<AtomicU8>,
}

impl FrameRead for SimReader {
    fn frame(&self) -> Result<Option<Frame>, LinkError> {
        let t = self.tint.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Frame::filled(96, 72, [t, 128, 255 - t])))
    }
}

impl DeviceLink for SimLink {
    fn connect(&self) -> Result<(), LinkError> {
        Ok(())
    }
    fn set_speed(&self, _speed: i32) -> Result<(), LinkError> {
        Ok(())
    }
    fn streamon(&self) -> Result<(), LinkError> {
        Ok(())
    }
    fn streamoff(&self) -> Result<(), LinkError> {
        Ok(())
    }
    fn get_frame_read(&self, _port: u16) -> Result<Box<dyn FrameRead>, LinkError> {
        Ok(Box::new(SimReader {
            tint: self.tint.clone(),
        }))
    }
    fn takeoff(&self) -> Result<(), LinkError> {
        Ok(())
    }
    fn land(&self) -> Result<(), LinkError> {
        Ok(())
    }
    fn send_rc_control(&self, lr: i32, fb: i32, ud: i32, yaw: i32) -> Result<(), LinkError> {
        tracing::info!(lr, fb, ud, yaw, "rc command");
        Ok(())
    }
    fn get_battery(&self) -> Result<u8, LinkError> {
        Ok(self.battery.load(Ordering::Relaxed))
    }
    fn end(&self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Headless surface: just logs what would be drawn.
#[derive(Default)]
struct ConsoleScreen {
    panes: u32,
    frames: u32,
}

impl Screen for ConsoleScreen {
    fn clear(&mut self) {
        self.panes = 0;
    }
    fn blit(&mut self, frame: &Frame, x: u32, y: u32) {
        self.panes += 1;
        tracing::debug!(frame.width, frame.height, x, y, "blit pane");
    }
    fn draw_status(&mut self, line: &str, _x: u32, _y: u32) {
        tracing::debug!(line, "status");
    }
    fn present(&mut self) {
        if self.frames % 10 == 0 {
            tracing::info!(frame = self.frames, panes = self.panes, "presented");
        }
        self.frames += 1;
    }
}

/// Scripted keyboard session: take off the first device, fly a little,
/// hop to the second device, land everything, quit.
struct ScriptedPilot {
    script: VecDeque<Vec<Event>>,
}

impl ScriptedPilot {
    fn new() -> Self {
        let script: Vec<Vec<Event>> = vec![
            vec![Event::KeyUp(Key::T)],
            vec![Event::Tick],
            vec![Event::KeyDown(Key::Up), Event::Tick],
            vec![Event::Tick],
            vec![Event::KeyUp(Key::Up), Event::Tick],
            vec![Event::KeyDown(Key::D), Event::Tick],
            vec![Event::KeyUp(Key::D), Event::Tick],
            vec![Event::KeyUp(Key::L)],
            vec![Event::KeyDown(Key::Num(2))],
            vec![Event::KeyUp(Key::T), Event::Tick],
            vec![Event::Tick],
            vec![Event::KeyUp(Key::L)],
            vec![Event::KeyDown(Key::Escape)],
        ];
        Self {
            script: script.into(),
        }
    }
}

impl EventSource for ScriptedPilot {
    fn drain(&mut self) -> Vec<Event> {
        self.script.pop_front().unwrap_or_else(|| vec![Event::Quit])
    }
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let devices: Vec<(DeviceConfig, Arc<dyn DeviceLink>)> = vec![
        (
            DeviceConfig::new("192.168.10.1", 11111),
            Arc::new(SimLink::new(0)),
        ),
        (
            DeviceConfig::new("192.168.3.21", 11118),
            Arc::new(SimLink::new(128)),
        ),
    ];

    let options = FleetOptions {
        settle: Duration::from_millis(10),
        frame_interval: Duration::from_millis(50),
        ..FleetOptions::default()
    };

    let mut fleet = FleetController::with_options(devices, options);
    let mut pilot = ScriptedPilot::new();
    let mut screen = ConsoleScreen::default();
    fleet.run(&mut pilot, &mut screen);
    tracing::info!("fleet session finished");
}
