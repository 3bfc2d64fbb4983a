//! Live reload over Server-Sent Events.
//!
//! A rebuild signal is handed to exactly one listener. With several browser
//! tabs open, whichever `/reload` stream is waiting takes the signal and the
//! others keep waiting; with nobody waiting the signal is dropped.
//!
//! ```text
//! watcher ── notify() ──► ReloadChannel ──► one waiting stream ──► "event: reload"
//! ```

use crate::log;
use parking_lot::{Condvar, Mutex};
use std::{
    io::{self, Write},
    time::{Duration, Instant},
};
use tiny_http::Request;

/// URL path of the event stream.
pub const RELOAD_PATH: &str = "/reload";

/// Interval between keepalive comments; a failed write ends the stream.
const KEEPALIVE: Duration = Duration::from_secs(5);

const SSE_HEADERS: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\r\n";

const RELOAD_EVENT: &[u8] = b"event: reload\ndata: \n\n";
const KEEPALIVE_COMMENT: &[u8] = b": keepalive\n\n";

/// Unbuffered single-consumer signal between the watcher and the streams.
#[derive(Debug, Default)]
pub struct ReloadChannel {
    state: Mutex<State>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct State {
    /// Streams currently blocked in `wait`
    waiting: usize,
    /// Signals handed over but not yet taken; never exceeds `waiting`
    tokens: usize,
}

impl ReloadChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a signal to one waiting stream without blocking.
    ///
    /// Returns `false` when every waiting stream already has a signal pending,
    /// or nobody waits; the signal is dropped then.
    pub fn notify(&self) -> bool {
        let mut state = self.state.lock();
        if state.tokens >= state.waiting {
            return false;
        }
        state.tokens += 1;
        self.ready.notify_one();
        true
    }

    /// Block up to `timeout` for a signal. Returns whether one was taken.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.waiting += 1;

        let received = loop {
            if state.tokens > 0 {
                state.tokens -= 1;
                break true;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() && state.tokens == 0 {
                break false;
            }
        };

        state.waiting -= 1;
        received
    }

    /// Number of streams currently blocked in [`wait`](Self::wait).
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }
}

/// Take over `request` as an event stream until the client goes away.
pub fn serve_events(request: Request, channel: &ReloadChannel) {
    let peer = request
        .remote_addr()
        .map_or_else(|| "unknown".to_owned(), ToString::to_string);
    log!("reload"; "client {peer} connected");

    if let Err(err) = stream_events(request.into_writer(), channel, KEEPALIVE) {
        log!("reload"; "client {peer} disconnected: {err}");
    }
}

/// Write the stream headers, then one frame per signal or keepalive tick.
///
/// Only returns on a write error, which is how a closed client shows up.
fn stream_events<W: Write>(
    mut writer: W,
    channel: &ReloadChannel,
    keepalive: Duration,
) -> io::Result<()> {
    writer.write_all(SSE_HEADERS)?;
    writer.flush()?;

    loop {
        if channel.wait(keepalive) {
            log!("reload"; "initiating reload");
            writer.write_all(RELOAD_EVENT)?;
        } else {
            writer.write_all(KEEPALIVE_COMMENT)?;
        }
        writer.flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
    };

    /// Records writes until `closed` is set, then fails like a dropped socket.
    #[derive(Clone, Default)]
    struct Client {
        buf: Arc<Mutex<Vec<u8>>>,
        closed: Arc<AtomicBool>,
    }

    impl Write for Client {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.buf.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Client {
        fn text(&self) -> String {
            String::from_utf8(self.buf.lock().clone()).unwrap()
        }

        fn got_reload(&self) -> bool {
            self.text().contains("event: reload\ndata: \n\n")
        }
    }

    fn wait_for_listeners(channel: &ReloadChannel, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.waiting() < n {
            assert!(Instant::now() < deadline, "listeners never connected");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_notify_without_listener_is_dropped() {
        let channel = ReloadChannel::new();
        assert!(!channel.notify());
        // the dropped signal is not delivered later
        assert!(!channel.wait(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_times_out() {
        let channel = ReloadChannel::new();
        let start = Instant::now();
        assert!(!channel.wait(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(channel.waiting(), 0);
    }

    #[test]
    fn test_one_signal_wakes_exactly_one_waiter() {
        let channel = Arc::new(ReloadChannel::new());
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || channel.wait(Duration::from_millis(500)))
            })
            .collect();

        wait_for_listeners(&channel, 2);
        assert!(channel.notify());

        let received = waiters
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|got| *got)
            .count();
        assert_eq!(received, 1);
    }

    #[test]
    fn test_second_signal_needs_second_waiter() {
        let channel = Arc::new(ReloadChannel::new());
        let waiter = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.wait(Duration::from_secs(5)))
        };

        wait_for_listeners(&channel, 1);
        assert!(channel.notify());
        assert!(!channel.notify());
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_two_streams_one_reload_event() {
        let channel = Arc::new(ReloadChannel::new());
        let clients = [Client::default(), Client::default()];
        let streams: Vec<_> = clients
            .iter()
            .cloned()
            .map(|client| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || stream_events(client, &channel, Duration::from_millis(300)))
            })
            .collect();

        wait_for_listeners(&channel, 2);
        assert!(channel.notify());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !clients.iter().any(Client::got_reload) {
            assert!(Instant::now() < deadline, "no client saw the reload");
            thread::sleep(Duration::from_millis(5));
        }
        // let both streams run through at least one keepalive tick
        thread::sleep(Duration::from_millis(400));

        for client in &clients {
            client.closed.store(true, Ordering::SeqCst);
        }
        for stream in streams {
            assert!(stream.join().unwrap().is_err());
        }

        let reloaded = clients.iter().filter(|c| c.got_reload()).count();
        assert_eq!(reloaded, 1);
        for client in &clients {
            let text = client.text();
            assert!(text.starts_with("HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n"));
            assert!(text.contains(": keepalive\n\n"));
        }
    }
}
