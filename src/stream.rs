use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::{DateTime, Local};

use crate::{
    env,
    frame::{Frame, FrameCell},
    link::DeviceLink,
};

/// Background capture task for one device: keeps the freshest decoded
/// frame available behind [`FrameCell`] and reconnects the video channel
/// on failure, up to a bounded number of retries. The wireless transport
/// is assumed flaky; a read error is an event, not a bug.
pub struct StreamAgent {
    addr: String,
    port: u16,
    link: Arc<dyn DeviceLink>,
    cell: Arc<FrameCell>,
    stopped: Arc<AtomicBool>,
    retries: Arc<AtomicU32>,
    max_retries: u32,
    retry_delay: Duration,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl StreamAgent {
    pub fn new(addr: &str, port: u16, link: Arc<dyn DeviceLink>) -> Self {
        let fps = (*env::ENV_FLEET_FPS).max(1);
        Self::with_policy(
            addr,
            port,
            link,
            *env::ENV_FLEET_MAX_RETRIES,
            Duration::from_millis(*env::ENV_FLEET_RETRY_DELAY_MS),
            Duration::from_secs(1) / fps,
        )
    }

    pub fn with_policy(
        addr: &str,
        port: u16,
        link: Arc<dyn DeviceLink>,
        max_retries: u32,
        retry_delay: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            addr: addr.to_owned(),
            port,
            link,
            cell: Arc::new(FrameCell::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            retries: Arc::new(AtomicU32::new(0)),
            max_retries,
            retry_delay,
            poll_interval,
            handle: None,
        }
    }

    /// Spawns the capture thread and returns immediately. Restarting a
    /// stopped agent is not supported; a second call is a no-op.
    pub fn start(&mut self) {
        let method_name = "stream_start";
        if self.handle.is_some() {
            tracing::warn!(method_name, self.addr, "agent already started");
            return;
        }
        tracing::info!(method_name, self.addr, self.port, "starting capture thread");
        let addr = self.addr.clone();
        let port = self.port;
        let link = self.link.clone();
        let cell = self.cell.clone();
        let stopped = self.stopped.clone();
        let retries = self.retries.clone();
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;
        let poll_interval = self.poll_interval;
        self.handle = Some(thread::spawn(move || {
            capture_loop(
                &addr,
                port,
                link,
                cell,
                stopped,
                retries,
                max_retries,
                retry_delay,
                poll_interval,
            );
        }));
    }

    /// Copy of the most recent frame, `None` before the first capture.
    /// Never blocks on the network; never aliases the agent's own slot.
    pub fn get_frame(&self) -> Option<Frame> {
        self.cell.load()
    }

    pub fn last_capture(&self) -> Option<DateTime<Local>> {
        self.cell.last_capture()
    }

    /// One-way stop request; the thread observes it after its current
    /// sleep or read. Use [`join`](Self::join) to wait for the exit.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn join(&mut self) {
        let method_name = "stream_join";
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::error!(method_name, self.addr, "capture thread panicked");
            }
        }
    }

    /// True once the agent stopped, either on request or after the retry
    /// budget ran out.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[allow(clippy::too_many_arguments)]
fn capture_loop(
    addr: &str,
    port: u16,
    link: Arc<dyn DeviceLink>,
    cell: Arc<FrameCell>,
    stopped: Arc<AtomicBool>,
    retries: Arc<AtomicU32>,
    max_retries: u32,
    retry_delay: Duration,
    poll_interval: Duration,
) {
    let method_name = "capture_loop";
    while !stopped.load(Ordering::Relaxed) {
        let reader = match link.get_frame_read(port) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(method_name, addr, "video channel open failed: {}", e);
                if !retry(addr, &link, &retries, max_retries, retry_delay) {
                    break;
                }
                continue;
            }
        };
        loop {
            if stopped.load(Ordering::Relaxed) {
                tracing::info!(method_name, addr, "stop requested");
                return;
            }
            match reader.frame() {
                Ok(Some(frame)) => cell.store(&frame),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(method_name, addr, "video read error: {}", e);
                    if !retry(addr, &link, &retries, max_retries, retry_delay) {
                        stopped.store(true, Ordering::Relaxed);
                        return;
                    }
                    break;
                }
            }
            thread::sleep(poll_interval);
        }
    }
    stopped.store(true, Ordering::Relaxed);
}

/// Bookkeeping for one channel fault. Returns false once the retry budget
/// is exhausted; otherwise sleeps the backoff and cycles the video stream
/// off and on, swallowing failures since the caller reopens the channel
/// anyway.
fn retry(
    addr: &str,
    link: &Arc<dyn DeviceLink>,
    retries: &Arc<AtomicU32>,
    max_retries: u32,
    retry_delay: Duration,
) -> bool {
    let method_name = "stream_retry";
    let count = retries.fetch_add(1, Ordering::Relaxed) + 1;
    if count > max_retries {
        tracing::error!(method_name, addr, count, "max retries exceeded, giving up");
        return false;
    }
    tracing::info!(method_name, addr, count, max_retries, "retrying video stream");
    thread::sleep(retry_delay);
    if let Err(e) = link.streamoff() {
        tracing::warn!(method_name, addr, "streamoff during reconnect failed: {}", e);
    }
    if let Err(e) = link.streamon() {
        tracing::warn!(method_name, addr, "streamon during reconnect failed: {}", e);
    }
    true
}
