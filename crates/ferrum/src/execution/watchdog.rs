//! Deadline watchdog: kills processes whose wall-clock budget elapsed
//!
//! One worker thread per [`Watchdog`] owns the deadline heap; producers only
//! hand entries over an mpsc channel, so the heap itself needs no lock. A
//! process-wide instance is created lazily by [`Watchdog::shared`]; tests
//! construct their own with a fake [`Clock`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Time source for deadline arithmetic. Swappable in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The real wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Deadline {
    due: Instant,
    pid: i32,
    timed_out: Arc<AtomicBool>,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due)
    }
}

/// Background monitor that force-kills processes past their deadline.
///
/// Dropping the last handle to a `Watchdog` closes the channel and the
/// worker thread exits.
pub struct Watchdog {
    tx: Sender<Deadline>,
    clock: Arc<dyn Clock>,
}

static SHARED: OnceLock<Arc<Watchdog>> = OnceLock::new();

impl Watchdog {
    /// A watchdog driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A watchdog driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::channel::<Deadline>();
        let worker_clock = clock.clone();
        thread::Builder::new()
            .name("ferrum-watchdog".to_string())
            .spawn(move || worker(rx, worker_clock))
            .expect("failed to spawn watchdog thread");
        Self { tx, clock }
    }

    /// The lazily-created process-wide watchdog.
    pub fn shared() -> Arc<Watchdog> {
        SHARED.get_or_init(|| Arc::new(Watchdog::new())).clone()
    }

    /// Register a process to be killed `timeout` from now unless it exits
    /// first. When the watchdog kills it, `timed_out` is set.
    pub fn enqueue(&self, pid: u32, timeout: Duration, timed_out: Arc<AtomicBool>) {
        let entry = Deadline {
            due: self.clock.now() + timeout,
            pid: pid as i32,
            timed_out,
        };
        if self.tx.send(entry).is_err() {
            log::warn!("watchdog worker is gone; timeout for pid {} will not fire", pid);
        }
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

fn worker(rx: Receiver<Deadline>, clock: Arc<dyn Clock>) {
    let mut waiting: BinaryHeap<Reverse<Deadline>> = BinaryHeap::new();
    loop {
        // sleep until the nearest deadline, waking early for new entries
        let received = match waiting.peek() {
            Some(Reverse(next)) => {
                let wait = next.due.saturating_duration_since(clock.now());
                match rx.recv_timeout(wait) {
                    Ok(entry) => Some(entry),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(entry) => Some(entry),
                Err(_) => break,
            },
        };
        if let Some(entry) = received {
            waiting.push(Reverse(entry));
        }
        let now = clock.now();
        while waiting
            .peek()
            .map(|Reverse(d)| d.due <= now)
            .unwrap_or(false)
        {
            if let Some(Reverse(expired)) = waiting.pop() {
                kill_expired(&expired);
            }
        }
    }
}

fn kill_expired(entry: &Deadline) {
    if !still_running(entry.pid) {
        return;
    }
    // mark before killing so the waiter cannot observe the kill without the flag
    entry.timed_out.store(true, Ordering::SeqCst);
    match kill(Pid::from_raw(entry.pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("failed to kill timed-out pid {}: {}", entry.pid, e),
    }
}

/// Probe /proc for the process state; a reaped or zombie process counts as
/// exited.
fn still_running(pid: i32) -> bool {
    let stat = match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(s) => s,
        Err(_) => return false,
    };
    // the state field follows the parenthesized comm, which may contain spaces
    let state = stat
        .rfind(')')
        .and_then(|i| stat[i + 1..].trim_start().chars().next());
    !matches!(state, Some('Z') | None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    struct FakeClock {
        now: std::sync::Mutex<Instant>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: std::sync::Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn spawn_sleeper() -> std::process::Child {
        Command::new("sleep").arg("30").spawn().unwrap()
    }

    #[test]
    fn deadlines_order_by_due_time() {
        let base = Instant::now();
        let early = Deadline {
            due: base,
            pid: 1,
            timed_out: Arc::new(AtomicBool::new(false)),
        };
        let late = Deadline {
            due: base + Duration::from_secs(1),
            pid: 2,
            timed_out: Arc::new(AtomicBool::new(false)),
        };
        assert!(early < late);
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(late));
        heap.push(Reverse(early));
        assert_eq!(heap.pop().map(|Reverse(d)| d.pid), Some(1));
    }

    #[test]
    fn expired_deadline_kills_the_process() {
        let wd = Watchdog::new();
        let mut child = spawn_sleeper();
        let flag = Arc::new(AtomicBool::new(false));
        wd.enqueue(child.id(), Duration::from_millis(10), flag.clone());

        let status = child.wait().unwrap();
        assert!(!status.success());
        // the flag is set before the kill signal is sent
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn fake_clock_controls_expiry() {
        let clock = Arc::new(FakeClock::new());
        let wd = Watchdog::with_clock(clock.clone());
        let mut child = spawn_sleeper();
        let flag = Arc::new(AtomicBool::new(false));
        wd.enqueue(child.id(), Duration::from_secs(3600), flag.clone());

        std::thread::sleep(Duration::from_millis(50));
        assert!(!flag.load(Ordering::SeqCst), "deadline fired too early");

        // advancing the clock alone is not observed until the worker wakes;
        // a later entry for the same pid provides the wake-up
        clock.advance(Duration::from_secs(7200));
        wd.enqueue(child.id(), Duration::from_secs(3600), flag.clone());

        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn already_exited_process_is_not_marked() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let wd = Watchdog::new();
        let flag = Arc::new(AtomicBool::new(false));
        wd.enqueue(pid, Duration::ZERO, flag.clone());
        std::thread::sleep(Duration::from_millis(100));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
