//! Single-threaded poll loop
//!
//! Multiplexes the Wayland connection, standard input, the feed interval
//! timer and the signal channel. [`Schedule`] decides when a redraw happens.

use jiff::Timestamp;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use wayland_client::{EventQueue, backend::WaylandError};

use super::OverlayError;
use super::wayland::OverlayApp;
use crate::feed::{FEED_CAPACITY, FeedMode, LineSplitter, TextFeed, until_next_second};

/// Poll timeout while not ready or while a redraw is waiting
const BUSY_TIMEOUT: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 4096;

/// Redraw bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    redraw_pending: bool,
    check_due: bool,
    first_frame: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            redraw_pending: true,
            check_due: false,
            first_frame: true,
        }
    }

    #[cfg(test)]
    pub fn redraw_pending(&self) -> bool {
        self.redraw_pending
    }

    /// New text was promoted
    pub fn text_changed(&mut self) {
        self.redraw_pending = true;
    }

    /// The interval timer fired
    pub fn tick(&mut self) {
        self.check_due = true;
    }

    /// Redraw on the next pass regardless of the timer
    pub fn force(&mut self) {
        self.redraw_pending = true;
        self.check_due = true;
    }

    /// How long poll may sleep. `None` blocks until an fd is readable.
    pub fn timeout(&self, ready: bool, clock_wait: Option<Duration>) -> Option<Duration> {
        let base = (!ready || self.redraw_pending).then_some(BUSY_TIMEOUT);
        match (base, clock_wait) {
            (Some(base), Some(wait)) => Some(base.min(wait)),
            (base, wait) => base.or(wait),
        }
    }

    /// Whether to render now; clears the flags when it does
    pub fn take_render(&mut self, ready: bool) -> bool {
        if ready && self.redraw_pending && (self.check_due || self.first_frame) {
            self.redraw_pending = false;
            self.check_due = false;
            self.first_frame = false;
            true
        } else {
            false
        }
    }
}

fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        // Rounded up: a sub-millisecond wait must not become 0
        Some(timeout) => {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
        }
    }
}

/// What a signal asks of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Exit,
    Refresh,
    Ignore,
}

impl SignalAction {
    pub fn from_signal(signal: Signal) -> Self {
        match signal {
            Signal::SIGINT | Signal::SIGTERM | Signal::SIGQUIT => SignalAction::Exit,
            Signal::SIGUSR1 | Signal::SIGUSR2 => SignalAction::Refresh,
            _ => SignalAction::Ignore,
        }
    }
}

fn signal_channel() -> Result<SignalFd, OverlayError> {
    let mut mask = SigSet::empty();
    for signal in [
        Signal::SIGINT,
        Signal::SIGTERM,
        Signal::SIGQUIT,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ] {
        mask.add(signal);
    }
    block_signals(mask, |mask| SignalFd::with_flags(mask, SfdFlags::SFD_NONBLOCK))
}

/// Block `mask` and open a reader for it; the mask is unblocked again if that fails
fn block_signals<T, F>(mask: SigSet, open: F) -> Result<T, OverlayError>
where
    F: FnOnce(&SigSet) -> nix::Result<T>,
{
    mask.thread_block().map_err(OverlayError::Signal)?;
    open(&mask).map_err(|e| {
        if let Err(unblock) = mask.thread_unblock() {
            warn!("failed to unblock signals: {}", unblock);
        }
        OverlayError::Signal(e)
    })
}

fn interval_timer(interval: Duration) -> Result<TimerFd, OverlayError> {
    let timer = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)
        .map_err(OverlayError::Timer)?;
    timer
        .set(
            Expiration::Interval(TimeSpec::from_duration(interval)),
            TimerSetTimeFlags::empty(),
        )
        .map_err(OverlayError::Timer)?;
    Ok(timer)
}

/// Input split into lines and assembled into text
struct Input<R = File> {
    source: R,
    splitter: LineSplitter,
    feed: TextFeed,
}

impl Input<File> {
    /// Standard input, duplicated so the loop owns its descriptor
    fn stdin(mode: FeedMode) -> Result<Self, OverlayError> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self::new(File::from(fd), mode))
    }
}

impl<R: Read + AsFd> Input<R> {
    fn new(source: R, mode: FeedMode) -> Self {
        Self {
            source,
            splitter: LineSplitter::new(FEED_CAPACITY),
            feed: TextFeed::new(mode),
        }
    }

    /// Read one chunk. Returns promoted text and whether input reached EOF.
    fn read_chunk(&mut self) -> Result<(Option<String>, bool), OverlayError> {
        let mut buf = [0u8; READ_CHUNK];
        let n = match self.source.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok((None, false)),
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Ok((self.finish(), true));
        }
        trace!(bytes = n, "read stdin");
        let mut promoted = None;
        for line in self.splitter.push(&buf[..n]) {
            if let Some(text) = self.feed.push_line(&line) {
                promoted = Some(text);
            }
        }
        Ok((promoted, false))
    }

    /// Writer hung up: consume what is left and flush
    fn drain(&mut self) -> Result<Option<String>, OverlayError> {
        let mut promoted = None;
        loop {
            let (text, eof) = self.read_chunk()?;
            if text.is_some() {
                promoted = text;
            }
            if eof {
                return Ok(promoted);
            }
        }
    }

    fn finish(&mut self) -> Option<String> {
        let mut promoted = None;
        if let Some(line) = self.splitter.finish() {
            promoted = self.feed.push_line(&line);
        }
        self.feed.close().or(promoted)
    }
}

/// Run until a terminating signal or a fatal error
pub fn run(
    event_queue: &mut EventQueue<OverlayApp>,
    app: &mut OverlayApp,
    feed: FeedMode,
    interval: Duration,
) -> Result<(), OverlayError> {
    let qh = event_queue.handle();
    let clock = feed == FeedMode::Clock;

    let mut input = if feed.reads_input() {
        Some(Input::stdin(feed)?)
    } else {
        None
    };
    let timer = if clock {
        None
    } else {
        Some(interval_timer(interval)?)
    };
    let mut signals = match signal_channel() {
        Ok(signals) => Some(signals),
        Err(e) => {
            warn!("signals will not be handled: {}", e);
            None
        }
    };

    let mut schedule = Schedule::new();
    let mut shown_second = Timestamp::now().as_second();
    loop {
        event_queue.dispatch_pending(app)?;
        flush(event_queue)?;

        let Some(guard) = event_queue.prepare_read() else {
            // Events were queued meanwhile
            continue;
        };

        let clock_wait = clock.then(until_next_second);
        let timeout = schedule.timeout(app.is_ready(), clock_wait);
        trace!(?timeout, "polling");

        let (wayland, stdin, tick, signal) = {
            let mut fds = vec![PollFd::new(guard.connection_fd(), PollFlags::POLLIN)];
            let stdin_idx = input.as_ref().map(|input| {
                fds.push(PollFd::new(input.source.as_fd(), PollFlags::POLLIN));
                fds.len() - 1
            });
            let timer_idx = timer.as_ref().map(|timer| {
                fds.push(PollFd::new(timer.as_fd(), PollFlags::POLLIN));
                fds.len() - 1
            });
            let signal_idx = signals.as_ref().map(|signals| {
                fds.push(PollFd::new(signals.as_fd(), PollFlags::POLLIN));
                fds.len() - 1
            });

            match poll(&mut fds, poll_timeout(timeout)) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(OverlayError::Io(e.into())),
            }
            let revents = |idx: Option<usize>| {
                idx.and_then(|idx| fds[idx].revents()).unwrap_or(PollFlags::empty())
            };
            (revents(Some(0)), revents(stdin_idx), revents(timer_idx), revents(signal_idx))
        };

        if wayland.intersects(PollFlags::POLLIN) {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(OverlayError::Read(e)),
            }
            event_queue.dispatch_pending(app)?;
            flush(event_queue)?;
        } else {
            drop(guard);
        }
        if wayland.intersects(PollFlags::POLLERR | PollFlags::POLLHUP) {
            return Err(OverlayError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "compositor closed the connection",
            )));
        }

        if let Some(reader) = input.as_mut() {
            let mut closed = false;
            let mut promoted = None;
            if stdin.intersects(PollFlags::POLLIN) {
                let (text, eof) = reader.read_chunk()?;
                promoted = text;
                closed = eof;
            }
            if !closed && stdin.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
                info!("input closed");
                promoted = reader.drain()?.or(promoted);
                closed = true;
            }
            if let Some(text) = promoted {
                debug!(len = text.len(), "new text");
                app.set_text(text);
                schedule.text_changed();
            }
            if closed {
                input = None;
            }
        }

        if tick.intersects(PollFlags::POLLIN) {
            if let Some(timer) = &timer {
                // Non-blocking: EAGAIN just means another pass consumed it
                let _ = timer.wait();
            }
            trace!("timer tick");
            schedule.tick();
        }

        if signal.intersects(PollFlags::POLLIN) {
            if let Some(signals) = signals.as_mut() {
                while let Ok(Some(info)) = signals.read_signal() {
                    let Ok(received) = Signal::try_from(info.ssi_signo as i32) else {
                        continue;
                    };
                    match SignalAction::from_signal(received) {
                        SignalAction::Exit => {
                            info!(signal = ?received, "exiting");
                            return Ok(());
                        }
                        SignalAction::Refresh => {
                            info!(signal = ?received, "forcing update");
                            schedule.force();
                        }
                        SignalAction::Ignore => {}
                    }
                }
            }
        }

        if clock {
            let second = Timestamp::now().as_second();
            if second != shown_second {
                shown_second = second;
                schedule.force();
            }
        }

        if schedule.take_render(app.is_ready()) {
            app.redraw_all(&qh);
        }
    }
}

fn flush(event_queue: &EventQueue<OverlayApp>) -> Result<(), OverlayError> {
    match event_queue.flush() {
        Ok(()) => Ok(()),
        Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(OverlayError::Flush(e)),
    }
}
