use std::{sync::Arc, thread, time::Duration};

use chrono::Local;

use crate::{
    env,
    frame::{grid_columns, grid_rows, pane_position},
    input::{binding_for, Key, VelocityCommand},
    link::{DeviceLink, LinkError},
    stream::StreamAgent,
    ui::{Event, EventSource, Screen},
};

/// Identity of one fleet member: network address plus the UDP port its
/// video transport arrives on. Immutable after registration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub addr: String,
    pub video_port: u16,
}

impl DeviceConfig {
    pub fn new(addr: &str, video_port: u16) -> Self {
        Self {
            addr: addr.to_owned(),
            video_port,
        }
    }
}

/// Tunables for the controller. `default()` reads the `ENV_FLEET_*`
/// variables; tests shrink the delays to keep things fast.
#[derive(Debug, Clone)]
pub struct FleetOptions {
    /// Magnitude written into an axis on key-down.
    pub speed: i32,
    /// Cruise speed configured on each device during connect.
    pub cruise_speed: i32,
    /// Settle delay after streamoff/streamon during connect.
    pub settle: Duration,
    /// Target interval between presented frames.
    pub frame_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Capture thread poll interval.
    pub poll_interval: Duration,
    pub pane_width: u32,
    pub pane_height: u32,
}

impl Default for FleetOptions {
    fn default() -> Self {
        let fps = (*env::ENV_FLEET_FPS).max(1);
        Self {
            speed: *env::ENV_FLEET_SPEED,
            cruise_speed: *env::ENV_FLEET_CRUISE_SPEED,
            settle: Duration::from_millis(*env::ENV_FLEET_SETTLE_MS),
            frame_interval: Duration::from_secs(1) / fps,
            max_retries: *env::ENV_FLEET_MAX_RETRIES,
            retry_delay: Duration::from_millis(*env::ENV_FLEET_RETRY_DELAY_MS),
            poll_interval: Duration::from_secs(1) / fps,
            pane_width: *env::ENV_FLEET_PANE_WIDTH,
            pane_height: *env::ENV_FLEET_PANE_HEIGHT,
        }
    }
}

struct DeviceSlot {
    config: DeviceConfig,
    link: Arc<dyn DeviceLink>,
    agent: Option<StreamAgent>,
    velocity: VelocityCommand,
    armed: bool,
}

/// Owns the fleet: per-device link handles, stream agents, commanded
/// velocities and armed flags, plus the single "selected device" that
/// keyboard input steers. `run()` is the main loop; it is the only writer
/// of this state and the only reader of the agents' frames.
pub struct FleetController {
    devices: Vec<DeviceSlot>,
    selected: usize,
    options: FleetOptions,
    should_stop: bool,
    cleaned_up: bool,
}

impl FleetController {
    pub fn new(devices: Vec<(DeviceConfig, Arc<dyn DeviceLink>)>) -> Self {
        Self::with_options(devices, FleetOptions::default())
    }

    pub fn with_options(
        devices: Vec<(DeviceConfig, Arc<dyn DeviceLink>)>,
        options: FleetOptions,
    ) -> Self {
        let method_name = "fleet_new";
        let n = devices.len();
        let cols = grid_columns(n);
        let rows = grid_rows(n);
        let window_width = options.pane_width * cols as u32;
        let window_height = options.pane_height * rows as u32;
        tracing::info!(
            method_name,
            n,
            cols,
            rows,
            window_width,
            window_height,
            "fleet window layout"
        );
        let devices = devices
            .into_iter()
            .map(|(config, link)| DeviceSlot {
                config,
                link,
                agent: None,
                velocity: VelocityCommand::default(),
                armed: false,
            })
            .collect();
        Self {
            devices,
            selected: 0,
            options,
            should_stop: false,
            cleaned_up: false,
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn armed(&self, index: usize) -> Option<bool> {
        self.devices.get(index).map(|s| s.armed)
    }

    pub fn velocity(&self, index: usize) -> Option<VelocityCommand> {
        self.devices.get(index).map(|s| s.velocity)
    }

    pub fn agent(&self, index: usize) -> Option<&StreamAgent> {
        self.devices.get(index).and_then(|s| s.agent.as_ref())
    }

    /// Connects every registered device in order and starts its stream
    /// agent. A failure skips that device and moves on; flying a partial
    /// fleet is an accepted outcome.
    pub fn connect_all(&mut self) {
        let method_name = "connect_all";
        for i in 0..self.devices.len() {
            if self.devices[i].agent.is_some() {
                continue;
            }
            let (addr, port, link) = {
                let s = &self.devices[i];
                (s.config.addr.clone(), s.config.video_port, s.link.clone())
            };
            tracing::info!(method_name, addr, port, "connecting");
            match self.connect_one(&link) {
                Ok(()) => {
                    let mut agent = StreamAgent::with_policy(
                        &addr,
                        port,
                        link,
                        self.options.max_retries,
                        self.options.retry_delay,
                        self.options.poll_interval,
                    );
                    agent.start();
                    self.devices[i].agent = Some(agent);
                    tracing::info!(method_name, addr, port, "connected");
                }
                Err(e) => {
                    tracing::warn!(method_name, addr, "connect failed, skipping device: {}", e);
                }
            }
        }
    }

    fn connect_one(&self, link: &Arc<dyn DeviceLink>) -> Result<(), LinkError> {
        link.connect()?;
        link.set_speed(self.options.cruise_speed)?;
        link.streamoff()?;
        thread::sleep(self.options.settle);
        link.streamon()?;
        thread::sleep(self.options.settle);
        Ok(())
    }

    /// Main loop: drain events, apply them, composite all panes, present,
    /// sleep to the next frame boundary. Exits only on a quit event or
    /// escape, then cleans up exactly once.
    pub fn run(&mut self, events: &mut dyn EventSource, screen: &mut dyn Screen) {
        let method_name = "fleet_run";
        self.connect_all();
        tracing::info!(method_name, "entering main loop");
        while !self.should_stop {
            for ev in events.drain() {
                match ev {
                    Event::Tick => self.control_tick(),
                    Event::Quit => {
                        tracing::info!(method_name, "quit event received");
                        self.should_stop = true;
                    }
                    Event::KeyDown(key) => self.key_down(key),
                    Event::KeyUp(key) => self.key_up(key),
                }
            }
            self.composite(screen);
            thread::sleep(self.options.frame_interval);
        }
        tracing::info!(method_name, "main loop finished");
        self.cleanup();
    }

    fn key_down(&mut self, key: Key) {
        let method_name = "key_down";
        match key {
            Key::Escape => {
                tracing::info!(method_name, "escape pressed, stopping");
                self.should_stop = true;
            }
            Key::Num(n) => self.select_device(n),
            _ => {
                if self.devices.is_empty() {
                    return;
                }
                if let Some(b) = binding_for(key) {
                    let value = b.sign * self.options.speed;
                    let slot = &mut self.devices[self.selected];
                    slot.velocity.set(b.axis, value);
                    let addr = &slot.config.addr;
                    tracing::debug!(method_name, addr, axis = ?b.axis, value, "axis set");
                }
            }
        }
    }

    fn key_up(&mut self, key: Key) {
        let method_name = "key_up";
        if self.devices.is_empty() {
            return;
        }
        match key {
            Key::T => {
                let slot = &mut self.devices[self.selected];
                let addr = slot.config.addr.clone();
                tracing::info!(method_name, addr, "takeoff command");
                match slot.link.takeoff() {
                    // armed only after the device confirmed the takeoff
                    Ok(()) => slot.armed = true,
                    Err(e) => tracing::warn!(method_name, addr, "takeoff failed: {}", e),
                }
            }
            Key::L => {
                let slot = &mut self.devices[self.selected];
                let addr = slot.config.addr.clone();
                tracing::info!(method_name, addr, "land command");
                match slot.link.land() {
                    // a device that refused to land is still airborne, so
                    // it stays armed and commandable
                    Ok(()) => slot.armed = false,
                    Err(e) => tracing::warn!(method_name, addr, "land failed: {}", e),
                }
            }
            _ => {
                if let Some(b) = binding_for(key) {
                    // release of either key of a pair zeroes the shared axis
                    let slot = &mut self.devices[self.selected];
                    slot.velocity.reset(b.axis);
                    let addr = &slot.config.addr;
                    tracing::debug!(method_name, addr, axis = ?b.axis, "axis reset");
                }
            }
        }
    }

    fn select_device(&mut self, n: u8) {
        let method_name = "select_device";
        if n == 0 {
            return;
        }
        let index = (n - 1) as usize;
        if index >= self.devices.len() {
            tracing::debug!(method_name, n, "selection out of range, ignored");
            return;
        }
        if index == self.selected {
            return;
        }
        // the outgoing device must not keep a stale nonzero command it
        // would resume with when re-selected while armed
        self.devices[self.selected].velocity.zero();
        self.selected = index;
        let addr = &self.devices[index].config.addr;
        tracing::info!(method_name, addr, "selected device");
    }

    /// Fixed-rate control send: the selected device gets its four-axis
    /// command, but only while armed. Nobody else is ever sent commands.
    fn control_tick(&self) {
        let method_name = "control_tick";
        if self.devices.is_empty() {
            return;
        }
        let slot = &self.devices[self.selected];
        if !slot.armed {
            return;
        }
        let v = slot.velocity;
        let r = slot
            .link
            .send_rc_control(v.left_right, v.for_back, v.up_down, v.yaw);
        if let Err(e) = r {
            let addr = &slot.config.addr;
            tracing::warn!(method_name, addr, "rc send failed: {}", e);
        }
    }

    /// One presentation pass: every live pane gets the freshest frame,
    /// a status line, and its grid cell. A permanently stopped agent's
    /// pane simply stays blank.
    fn composite(&self, screen: &mut dyn Screen) {
        let method_name = "composite";
        screen.clear();
        let cols = grid_columns(self.devices.len());
        for (i, slot) in self.devices.iter().enumerate() {
            let agent = match &slot.agent {
                Some(a) if !a.is_stopped() => a,
                _ => continue,
            };
            let frame = match agent.get_frame() {
                Some(f) => f,
                None => continue,
            };
            if let Some(t) = agent.last_capture() {
                let age_ms = (Local::now() - t).num_milliseconds();
                tracing::trace!(method_name, i, age_ms, "pane frame age");
            }
            let battery = match slot.link.get_battery() {
                Ok(b) => format!("{}%", b),
                Err(e) => {
                    let addr = &slot.config.addr;
                    tracing::debug!(method_name, addr, "battery read failed: {}", e);
                    "--".to_owned()
                }
            };
            let marker = if i == self.selected { "SELECTED" } else { "" };
            let line = format!(
                "IP: {} | Port: {} | Bat: {} | {}",
                slot.config.addr, slot.config.video_port, battery, marker
            );
            let (x, y) = pane_position(i, cols, self.options.pane_width, self.options.pane_height);
            screen.blit(&frame.to_display(), x, y);
            screen.draw_status(&line, x + 5, y + self.options.pane_height - 5);
        }
        screen.present();
    }

    /// Ordered shutdown, each device and each step fault-isolated. Safe
    /// to call more than once; only the first call does the work.
    pub fn cleanup(&mut self) {
        let method_name = "cleanup";
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        for slot in &mut self.devices {
            let addr = slot.config.addr.clone();
            tracing::info!(method_name, addr, "cleaning up device");
            if let Some(agent) = slot.agent.as_mut() {
                agent.stop();
                agent.join();
            }
            if slot.armed {
                match slot.link.land() {
                    Ok(()) => slot.armed = false,
                    Err(e) => tracing::warn!(method_name, addr, "land during cleanup failed: {}", e),
                }
            }
            if let Err(e) = slot.link.streamoff() {
                tracing::warn!(method_name, addr, "streamoff during cleanup failed: {}", e);
            }
            if let Err(e) = slot.link.end() {
                tracing::warn!(method_name, addr, "link end failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::link::FrameRead;
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    };

    struct SteadyReader {
        ok: bool,
    }

    impl FrameRead for SteadyReader {
        fn frame(&self) -> Result<Option<Frame>, LinkError> {
            if self.ok {
                Ok(Some(Frame::filled(4, 2, [10, 20, 30])))
            } else {
                Err(LinkError::VideoChannel("packet loss".to_owned()))
            }
        }
    }

    #[derive(Default)]
    struct MockLink {
        fail_connect: bool,
        fail_takeoff: bool,
        fail_land: bool,
        fail_battery: bool,
        video_faulty: bool,
        takeoffs: AtomicU32,
        lands: AtomicU32,
        streamons: AtomicU32,
        streamoffs: AtomicU32,
        ends: AtomicU32,
        rc: Mutex<Vec<(i32, i32, i32, i32)>>,
    }

    impl MockLink {
        fn rc_calls(&self) -> Vec<(i32, i32, i32, i32)> {
            self.rc.lock().unwrap().clone()
        }
    }

    impl DeviceLink for MockLink {
        fn connect(&self) -> Result<(), LinkError> {
            if self.fail_connect {
                return Err(LinkError::Unreachable("no route".to_owned()));
            }
            Ok(())
        }
        fn set_speed(&self, _speed: i32) -> Result<(), LinkError> {
            Ok(())
        }
        fn streamon(&self) -> Result<(), LinkError> {
            self.streamons.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn streamoff(&self) -> Result<(), LinkError> {
            self.streamoffs.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn get_frame_read(&self, _port: u16) -> Result<Box<dyn FrameRead>, LinkError> {
            Ok(Box::new(SteadyReader {
                ok: !self.video_faulty,
            }))
        }
        fn takeoff(&self) -> Result<(), LinkError> {
            self.takeoffs.fetch_add(1, Ordering::Relaxed);
            if self.fail_takeoff {
                return Err(LinkError::CommandFailed("motor check".to_owned()));
            }
            Ok(())
        }
        fn land(&self) -> Result<(), LinkError> {
            self.lands.fetch_add(1, Ordering::Relaxed);
            if self.fail_land {
                return Err(LinkError::CommandFailed("not responding".to_owned()));
            }
            Ok(())
        }
        fn send_rc_control(&self, lr: i32, fb: i32, ud: i32, yaw: i32) -> Result<(), LinkError> {
            self.rc.lock().unwrap().push((lr, fb, ud, yaw));
            Ok(())
        }
        fn get_battery(&self) -> Result<u8, LinkError> {
            if self.fail_battery {
                return Err(LinkError::CommandFailed("no reply".to_owned()));
            }
            Ok(87)
        }
        fn end(&self) -> Result<(), LinkError> {
            self.ends.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Delivers the scripted batches in order, then a quit event so the
    /// run loop terminates.
    struct ScriptedEvents {
        batches: VecDeque<Vec<Event>>,
    }

    impl ScriptedEvents {
        fn new(batches: Vec<Vec<Event>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    impl EventSource for ScriptedEvents {
        fn drain(&mut self) -> Vec<Event> {
            self.batches.pop_front().unwrap_or_else(|| vec![Event::Quit])
        }
    }

    /// Records one entry per clear..present cycle.
    #[derive(Default)]
    struct RecordingScreen {
        cycles: Vec<Vec<(u32, u32)>>,
        statuses: Vec<String>,
        current: Vec<(u32, u32)>,
    }

    impl Screen for RecordingScreen {
        fn clear(&mut self) {
            self.current.clear();
        }
        fn blit(&mut self, _frame: &Frame, x: u32, y: u32) {
            self.current.push((x, y));
        }
        fn draw_status(&mut self, line: &str, _x: u32, _y: u32) {
            self.statuses.push(line.to_owned());
        }
        fn present(&mut self) {
            self.cycles.push(self.current.clone());
        }
    }

    fn fast_options() -> FleetOptions {
        FleetOptions {
            speed: 60,
            cruise_speed: 10,
            settle: Duration::ZERO,
            frame_interval: Duration::from_millis(2),
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            pane_width: 960,
            pane_height: 720,
        }
    }

    fn controller(links: &[Arc<MockLink>]) -> FleetController {
        let devices = links
            .iter()
            .enumerate()
            .map(|(i, l)| {
                (
                    DeviceConfig::new(&format!("192.168.10.{}", i + 1), 11111 + i as u16),
                    l.clone() as Arc<dyn DeviceLink>,
                )
            })
            .collect();
        FleetController::with_options(devices, fast_options())
    }

    #[test]
    fn test_keydown_sets_axis_keyup_resets() {
        let link = Arc::new(MockLink::default());
        let mut fleet = controller(&[link]);

        fleet.key_down(Key::Left);
        assert_eq!(fleet.velocity(0).unwrap().left_right, -60);
        // releasing the paired key zeroes the shared axis
        fleet.key_up(Key::Right);
        assert_eq!(fleet.velocity(0).unwrap().left_right, 0);

        fleet.key_down(Key::Up);
        assert_eq!(fleet.velocity(0).unwrap().for_back, 60);
        fleet.key_up(Key::Up);
        assert_eq!(fleet.velocity(0).unwrap().for_back, 0);

        fleet.key_down(Key::A);
        fleet.key_down(Key::W);
        let v = fleet.velocity(0).unwrap();
        assert_eq!(v.yaw, -60);
        assert_eq!(v.up_down, 60);
    }

    #[test]
    fn test_selection_bounds_and_deselect() {
        let links = [
            Arc::new(MockLink::default()),
            Arc::new(MockLink::default()),
        ];
        let mut fleet = controller(&links);
        assert_eq!(fleet.selected(), 0);

        fleet.key_down(Key::Num(5));
        assert_eq!(fleet.selected(), 0);

        fleet.key_down(Key::Up);
        fleet.key_down(Key::Num(2));
        assert_eq!(fleet.selected(), 1);
        // outgoing device holds no stale command
        assert!(fleet.velocity(0).unwrap().is_zero());

        fleet.key_down(Key::Down);
        assert_eq!(fleet.velocity(1).unwrap().for_back, -60);
        assert!(fleet.velocity(0).unwrap().is_zero());
    }

    #[test]
    fn test_takeoff_failure_keeps_disarmed() {
        let link = Arc::new(MockLink {
            fail_takeoff: true,
            ..MockLink::default()
        });
        let mut fleet = controller(&[link.clone()]);

        fleet.key_up(Key::T);
        assert_eq!(link.takeoffs.load(Ordering::Relaxed), 1);
        assert_eq!(fleet.armed(0), Some(false));

        fleet.control_tick();
        assert!(link.rc_calls().is_empty());
    }

    #[test]
    fn test_armed_tick_sends_selected_velocity() {
        let link = Arc::new(MockLink::default());
        let mut fleet = controller(&[link.clone()]);

        fleet.control_tick();
        assert!(link.rc_calls().is_empty());

        fleet.key_up(Key::T);
        assert_eq!(fleet.armed(0), Some(true));
        fleet.key_down(Key::Up);
        fleet.key_down(Key::D);
        fleet.control_tick();
        assert_eq!(link.rc_calls(), vec![(0, 60, 0, 60)]);
    }

    #[test]
    fn test_tick_skips_unselected_armed_device() {
        let links = [
            Arc::new(MockLink::default()),
            Arc::new(MockLink::default()),
        ];
        let mut fleet = controller(&links);

        fleet.key_up(Key::T); // arm device 0
        fleet.key_down(Key::Num(2)); // select unarmed device 1
        fleet.control_tick();
        assert!(links[0].rc_calls().is_empty());
        assert!(links[1].rc_calls().is_empty());
    }

    #[test]
    fn test_land_failure_keeps_armed() {
        let link = Arc::new(MockLink {
            fail_land: true,
            ..MockLink::default()
        });
        let mut fleet = controller(&[link.clone()]);

        fleet.key_up(Key::T);
        assert_eq!(fleet.armed(0), Some(true));
        fleet.key_up(Key::L);
        assert_eq!(link.lands.load(Ordering::Relaxed), 1);
        assert_eq!(fleet.armed(0), Some(true));
    }

    #[test]
    fn test_land_success_disarms() {
        let link = Arc::new(MockLink::default());
        let mut fleet = controller(&[link.clone()]);

        fleet.key_up(Key::T);
        fleet.key_up(Key::L);
        assert_eq!(fleet.armed(0), Some(false));
        fleet.control_tick();
        assert!(link.rc_calls().is_empty());
    }

    #[test]
    fn test_connect_all_tolerates_one_bad_device() {
        let links = [
            Arc::new(MockLink::default()),
            Arc::new(MockLink {
                fail_connect: true,
                ..MockLink::default()
            }),
        ];
        let mut fleet = controller(&links);
        fleet.connect_all();

        assert!(fleet.agent(0).is_some());
        assert!(fleet.agent(1).is_none());
        fleet.cleanup();
    }

    #[test]
    fn test_cleanup_is_fault_isolated_and_idempotent() {
        let links = [
            Arc::new(MockLink {
                fail_land: true,
                ..MockLink::default()
            }),
            Arc::new(MockLink::default()),
        ];
        let mut fleet = controller(&links);
        fleet.connect_all();
        fleet.key_up(Key::T); // arm device 0; its land will fail in cleanup

        fleet.cleanup();
        assert_eq!(links[0].lands.load(Ordering::Relaxed), 1);
        assert_eq!(links[0].ends.load(Ordering::Relaxed), 1);
        // failure on device 0 never blocked device 1's teardown
        assert_eq!(links[1].ends.load(Ordering::Relaxed), 1);

        fleet.cleanup();
        assert_eq!(links[0].ends.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_status_line_battery_and_selection() {
        let link = Arc::new(MockLink {
            fail_battery: true,
            ..MockLink::default()
        });
        let mut fleet = controller(&[link]);
        let mut events = ScriptedEvents::new(vec![vec![]; 50]);
        let mut screen = RecordingScreen::default();
        fleet.run(&mut events, &mut screen);

        let line = screen.statuses.last().expect("no status drawn");
        assert!(line.contains("IP: 192.168.10.1"), "{}", line);
        assert!(line.contains("Port: 11111"), "{}", line);
        assert!(line.contains("Bat: --"), "{}", line);
        assert!(line.contains("SELECTED"), "{}", line);
    }

    #[test]
    fn test_run_survives_one_dead_stream() {
        let links = [
            Arc::new(MockLink::default()),
            Arc::new(MockLink {
                video_faulty: true,
                ..MockLink::default()
            }),
        ];
        let mut fleet = controller(&links);
        // enough iterations for device 1 to burn its whole retry budget
        let mut events = ScriptedEvents::new(vec![vec![]; 100]);
        let mut screen = RecordingScreen::default();
        fleet.run(&mut events, &mut screen);

        let faulty = fleet.agent(1).expect("agent missing");
        assert!(faulty.is_stopped());
        assert_eq!(faulty.retry_count(), 3); // 2 reconnects + terminal fault
        assert_eq!(links[1].streamons.load(Ordering::Relaxed), 3); // connect + 2 reconnects

        let healthy = fleet.agent(0).expect("agent missing");
        assert_eq!(healthy.retry_count(), 0);

        // last composite shows only device 0's pane
        let last = screen.cycles.last().expect("nothing presented");
        assert!(last.contains(&(0, 0)));
        assert!(!last.contains(&(960, 0)));
    }
}
