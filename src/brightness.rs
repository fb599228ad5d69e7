//! Observation of the backlight brightness in /sys

use std::{
    error::Error,
    ffi::OsStr,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom},
    os::fd::AsFd,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    thread::JoinHandle,
};

use log::{debug, error, warn};
use nix::{
    errno::Errno,
    sys::{
        epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout},
        eventfd::{EfdFlags, EventFd},
        inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor},
    },
};
use snafu::ResultExt;

use crate::{
    alpha::MAX_BRIGHTNESS,
    errors::{DimmerError, EpollSnafu, EventFdSnafu, InotifySnafu, SpawnSnafu},
};

/// Reading used when the backlight can not be read.
pub(crate) const DEFAULT_BRIGHTNESS: u8 = 127;

const BRIGHTNESS: &str = "brightness";
const MAX_BRIGHTNESS_FILE: &str = "max_brightness";
const ACTUAL_BRIGHTNESS: &str = "actual_brightness";

/// Marker values in epoll.
const INOTIFY_HANDLE: u64 = 1;
const STOP_HANDLE: u64 = 2;
const PRIORITY_HANDLE: u64 = 3;

/// Helper to read an integer from a path.
fn read_int(p: &Path) -> Result<u32, Box<dyn Error>> {
    let mut f = OpenOptions::new().read(true).open(p)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    Ok(buf.trim_end_matches('\n').parse()?)
}

/// Scale a raw backlight value in `0..=max` to `0..=255`.
fn scale(raw: u32, max: u32) -> u8 {
    if max == 0 {
        return DEFAULT_BRIGHTNESS;
    }
    let raw = u64::from(raw.min(max));
    let max = u64::from(max);
    ((raw * MAX_BRIGHTNESS as u64 + max / 2) / max) as u8
}

/// A sysfs backlight device (`/sys/class/backlight/<name>`).
#[derive(Debug, Clone)]
pub(crate) struct BrightnessSource {
    dir: PathBuf,
}

impl BrightnessSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn brightness_path(&self) -> PathBuf {
        self.dir.join(BRIGHTNESS)
    }

    fn read_scaled(&self) -> Result<u8, Box<dyn Error>> {
        let raw = read_int(&self.brightness_path())?;
        let max = match read_int(&self.dir.join(MAX_BRIGHTNESS_FILE)) {
            Ok(max) if max > 0 => max,
            _ => MAX_BRIGHTNESS as u32,
        };
        Ok(scale(raw, max))
    }

    /// Current reading in `0..=255`, or [`DEFAULT_BRIGHTNESS`] if the
    /// backlight can not be read.
    pub fn current(&self) -> u8 {
        match self.read_scaled() {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "Could not read brightness from {}: {err}. Using {DEFAULT_BRIGHTNESS}",
                    self.dir.display()
                );
                DEFAULT_BRIGHTNESS
            }
        }
    }

    /// Start observing the brightness.
    ///
    /// `on_change` is called on a watcher thread: first with the current
    /// reading, then once per change notification. Dropping (or calling
    /// [`Subscription::unsubscribe`] on) the returned handle stops the
    /// stream.
    ///
    /// On sysfs, `actual_brightness` is polled for `POLLPRI`, which the
    /// backlight class raises for every change, including those made by the
    /// kernel (hotkeys, firmware). Elsewhere the directory is watched with
    /// inotify, so a brightness file that does not exist yet is picked up
    /// once written.
    pub fn subscribe<F>(&self, on_change: F) -> Result<Subscription, DimmerError>
    where
        F: FnMut(u8) + Send + 'static,
    {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).context(EpollSnafu)?;
        let stop = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .context(EventFdSnafu)?;
        epoll
            .add(stop.as_fd(), EpollEvent::new(EpollFlags::EPOLLIN, STOP_HANDLE))
            .context(EpollSnafu)?;

        let trigger = match self.pollable(&epoll) {
            Some(file) => Trigger::Sysfs(file),
            None => self.inotify(&epoll)?,
        };

        let gate = Gate::default();
        let initial = self.current();
        let watcher = Watcher {
            source: self.clone(),
            trigger,
            epoll,
            gate: gate.clone(),
        };
        let thread = std::thread::Builder::new()
            .name("brightness-watch".into())
            .spawn(move || watcher.run(initial, on_change))
            .context(SpawnSnafu {
                name: "brightness-watch",
            })?;
        debug!("Subscribed to {}", self.dir.display());
        Ok(Subscription {
            stop,
            gate,
            thread: Some(thread),
        })
    }

    /// Open `actual_brightness` and register it for `POLLPRI`. Regular files
    /// can not be polled (epoll reports `EPERM`), so this is `None` outside
    /// of sysfs.
    fn pollable(&self, epoll: &Epoll) -> Option<File> {
        let path = self.dir.join(ACTUAL_BRIGHTNESS);
        let mut file = OpenOptions::new().read(true).open(&path).ok()?;
        // sysfs only signals changes after the attribute was read once.
        let mut buf = String::new();
        file.read_to_string(&mut buf).ok()?;
        match epoll.add(
            file.as_fd(),
            EpollEvent::new(EpollFlags::EPOLLPRI | EpollFlags::EPOLLERR, PRIORITY_HANDLE),
        ) {
            Ok(()) => {
                debug!("Polling {}", path.display());
                Some(file)
            }
            Err(err) => {
                debug!("{} is not pollable ({err}), using inotify", path.display());
                None
            }
        }
    }

    /// Watch the backlight directory for writes to the brightness file.
    fn inotify(&self, epoll: &Epoll) -> Result<Trigger, DimmerError> {
        let inotify =
            Inotify::init(InitFlags::IN_CLOEXEC | InitFlags::IN_NONBLOCK).context(InotifySnafu)?;
        // Writers open, write and close, so there is exactly one close per
        // change. A rename into place counts as a change too.
        let wd = match inotify.add_watch(
            &self.dir,
            AddWatchFlags::IN_CLOSE_WRITE | AddWatchFlags::IN_MOVED_TO,
        ) {
            Ok(wd) => Some(wd),
            Err(err) => {
                warn!(
                    "Can not watch {}: {err}. Brightness changes will not be seen",
                    self.dir.display()
                );
                None
            }
        };
        epoll
            .add(
                inotify.as_fd(),
                EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLERR, INOTIFY_HANDLE),
            )
            .context(EpollSnafu)?;
        Ok(Trigger::Inotify { inotify, wd })
    }
}

/// What wakes the watcher up on a brightness change.
enum Trigger {
    /// `actual_brightness` on sysfs, signalled with `POLLPRI`.
    Sysfs(File),
    /// Directory watch, `None` if the directory could not be watched.
    Inotify {
        inotify: Inotify,
        wd: Option<WatchDescriptor>,
    },
}

/// Lets [`Subscription`] cut off callbacks even if the watcher thread
/// could not be woken up. A callback runs with the lock held, so closing
/// waits for one in progress.
#[derive(Debug, Clone)]
struct Gate(Arc<Mutex<bool>>);

impl Default for Gate {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }
}

impl Gate {
    fn pass<F: FnOnce()>(&self, f: F) {
        let open = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            f();
        }
    }

    fn close(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// State owned by the watcher thread of one subscription.
struct Watcher {
    source: BrightnessSource,
    trigger: Trigger,
    epoll: Epoll,
    gate: Gate,
}

impl Watcher {
    fn run<F: FnMut(u8)>(mut self, initial: u8, mut on_change: F) {
        self.gate.pass(|| on_change(initial));
        'main_loop: loop {
            let mut events = [EpollEvent::empty(); 4];
            let n = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue 'main_loop,
                Err(err) => {
                    error!("Brightness watcher epoll error: {err}");
                    break 'main_loop;
                }
            };
            if events[..n].iter().any(|e| e.data() == STOP_HANDLE) {
                break 'main_loop;
            }
            let changes = match self.changes() {
                Ok(changes) => changes,
                Err(err) => {
                    error!("Brightness watcher error: {err}");
                    break 'main_loop;
                }
            };
            for _ in 0..changes {
                let reading = self.source.current();
                self.gate.pass(|| on_change(reading));
            }
        }
        if let Trigger::Inotify {
            inotify,
            wd: Some(wd),
        } = &self.trigger
        {
            if let Err(err) = inotify.rm_watch(*wd) {
                debug!("Removing brightness watch: {err}");
            }
        }
    }

    /// Consume the pending notifications and count the brightness changes.
    fn changes(&mut self) -> Result<usize, Box<dyn Error>> {
        match &mut self.trigger {
            Trigger::Sysfs(file) => {
                // Re-read to acknowledge, otherwise POLLPRI stays raised.
                file.seek(SeekFrom::Start(0))?;
                let mut buf = String::new();
                file.read_to_string(&mut buf)?;
                Ok(1)
            }
            Trigger::Inotify { inotify, wd } => match inotify.read_events() {
                Ok(ievents) => Ok(ievents
                    .iter()
                    .filter(|ev| Some(ev.wd) == *wd)
                    .filter(|ev| ev.name.as_deref() == Some(OsStr::new(BRIGHTNESS)))
                    .count()),
                Err(Errno::EAGAIN) => Ok(0),
                Err(err) => Err(err.into()),
            },
        }
    }
}

/// Handle to a running brightness subscription.
pub(crate) struct Subscription {
    stop: EventFd,
    gate: Gate,
    thread: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop observing. No callback runs after this returns.
    pub fn unsubscribe(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.gate.close();
        if let Err(err) = self.stop.write(1) {
            // The gate is closed, so the thread is silent from here on.
            error!("Failed to stop brightness watcher, leaving it behind: {err}");
            return;
        }
        if thread.join().is_err() {
            error!("Brightness watcher panicked");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::mpsc, time::Duration};

    use tempfile::TempDir;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(300);

    fn backlight(brightness: &str, max: Option<&str>) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BRIGHTNESS), brightness).unwrap();
        if let Some(max) = max {
            fs::write(dir.path().join(MAX_BRIGHTNESS_FILE), max).unwrap();
        }
        dir
    }

    #[test]
    fn scaling() {
        assert_eq!(scale(0, 1000), 0);
        assert_eq!(scale(500, 1000), 128);
        assert_eq!(scale(1000, 1000), 255);
        assert_eq!(scale(5000, 1000), 255);
        assert_eq!(scale(40, 255), 40);
        assert_eq!(scale(3, 0), DEFAULT_BRIGHTNESS);
    }

    #[test]
    fn current_reads_and_scales() {
        let dir = backlight("48000\n", Some("96000\n"));
        let source = BrightnessSource::new(dir.path().to_path_buf());
        assert_eq!(source.current(), 128);
    }

    #[test]
    fn missing_max_assumes_255() {
        let dir = backlight("200\n", None);
        let source = BrightnessSource::new(dir.path().to_path_buf());
        assert_eq!(source.current(), 200);
    }

    #[test]
    fn unreadable_uses_default() {
        let dir = backlight("garbage", Some("255"));
        let source = BrightnessSource::new(dir.path().to_path_buf());
        assert_eq!(source.current(), DEFAULT_BRIGHTNESS);

        let source = BrightnessSource::new(dir.path().join("does-not-exist"));
        assert_eq!(source.current(), DEFAULT_BRIGHTNESS);
    }

    #[test]
    fn subscribe_with_unset_value_emits_default() {
        let dir = backlight("", Some("255"));
        let source = BrightnessSource::new(dir.path().to_path_buf());
        let (tx, rx) = mpsc::channel();
        let sub = source.subscribe(move |v| tx.send(v).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(DEFAULT_BRIGHTNESS));
        sub.unsubscribe();
    }

    #[test]
    fn missing_brightness_file_emits_default_then_follows() {
        let dir = tempfile::tempdir().unwrap();
        let source = BrightnessSource::new(dir.path().to_path_buf());
        let (tx, rx) = mpsc::channel();
        let sub = source
            .subscribe(move |v| {
                let _ = tx.send(v);
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(DEFAULT_BRIGHTNESS));

        fs::write(dir.path().join(MAX_BRIGHTNESS_FILE), "255\n").unwrap();
        assert!(rx.recv_timeout(QUIET).is_err(), "other files are ignored");
        fs::write(dir.path().join(BRIGHTNESS), "12\n").unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(12));
        sub.unsubscribe();
    }

    #[test]
    fn missing_directory_still_emits_default() {
        let dir = tempfile::tempdir().unwrap();
        let source = BrightnessSource::new(dir.path().join("gone"));
        let (tx, rx) = mpsc::channel();
        let sub = source
            .subscribe(move |v| {
                let _ = tx.send(v);
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(DEFAULT_BRIGHTNESS));
        sub.unsubscribe();
    }

    #[test]
    fn unpollable_actual_brightness_falls_back_to_inotify() {
        let dir = backlight("30\n", Some("255\n"));
        fs::write(dir.path().join(ACTUAL_BRIGHTNESS), "30\n").unwrap();
        let source = BrightnessSource::new(dir.path().to_path_buf());
        let (tx, rx) = mpsc::channel();
        let sub = source
            .subscribe(move |v| {
                let _ = tx.send(v);
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(30));
        fs::write(dir.path().join(BRIGHTNESS), "31\n").unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(31));
        sub.unsubscribe();
    }

    #[test]
    fn closed_gate_blocks_callbacks() {
        let gate = Gate::default();
        let mut calls = 0;
        gate.pass(|| calls += 1);
        gate.close();
        gate.clone().pass(|| calls += 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn initial_then_changes_then_silence() {
        let dir = backlight("180\n", Some("255\n"));
        let source = BrightnessSource::new(dir.path().to_path_buf());
        let (tx, rx) = mpsc::channel();
        let sub = source
            .subscribe(move |v| {
                let _ = tx.send(v);
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(180));

        fs::write(dir.path().join(BRIGHTNESS), "40\n").unwrap();
        assert_eq!(rx.recv_timeout(WAIT), Ok(40));
        assert!(rx.recv_timeout(QUIET).is_err(), "exactly one emission per change");

        sub.unsubscribe();
        fs::write(dir.path().join(BRIGHTNESS), "90\n").unwrap();
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn subscriptions_are_independent() {
        let dir = backlight("10\n", Some("255\n"));
        let source = BrightnessSource::new(dir.path().to_path_buf());
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        let sub_a = source
            .subscribe(move |v| {
                let _ = tx_a.send(v);
            })
            .unwrap();
        let sub_b = source
            .subscribe(move |v| {
                let _ = tx_b.send(v);
            })
            .unwrap();
        assert_eq!(rx_a.recv_timeout(WAIT), Ok(10));
        assert_eq!(rx_b.recv_timeout(WAIT), Ok(10));

        drop(sub_a);
        fs::write(dir.path().join(BRIGHTNESS), "20\n").unwrap();
        assert_eq!(rx_b.recv_timeout(WAIT), Ok(20));
        assert!(rx_a.recv_timeout(QUIET).is_err());
        sub_b.unsubscribe();
    }
}
