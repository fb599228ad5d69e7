//! Runtime control through signals
//!
//! | Signal       | Effect                        |
//! |--------------|-------------------------------|
//! | SIGUSR1      | toggle the overlay            |
//! | SIGUSR2      | toggle automatic alpha        |
//! | SIGRTMIN     | manual alpha down one step    |
//! | SIGRTMIN+1   | manual alpha up one step      |
//! | SIGTERM/INT  | shut down                     |

use std::{sync::mpsc::Sender, thread::JoinHandle};

use log::{debug, error};
use nix::{
    libc,
    sys::{
        signal::{SigSet, Signal},
        signalfd::{SfdFlags, SignalFd},
    },
};
use snafu::ResultExt;

use crate::{
    errors::{DimmerError, SignalSnafu, SpawnSnafu},
    panel::PanelEvent,
};

/// Manual alpha change per SIGRTMIN/SIGRTMIN+1, in percent.
const ALPHA_STEP: i8 = 5;

const HANDLED: [Signal; 4] = [
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGTERM,
    Signal::SIGINT,
];

fn alpha_down() -> i32 {
    libc::SIGRTMIN()
}

fn alpha_up() -> i32 {
    libc::SIGRTMIN() + 1
}

fn event_for(signo: i32) -> Option<PanelEvent> {
    if signo == alpha_down() {
        return Some(PanelEvent::StepManualAlpha(-ALPHA_STEP));
    }
    if signo == alpha_up() {
        return Some(PanelEvent::StepManualAlpha(ALPHA_STEP));
    }
    match Signal::try_from(signo).ok()? {
        Signal::SIGUSR1 => Some(PanelEvent::ToggleOverlay),
        Signal::SIGUSR2 => Some(PanelEvent::ToggleAutoAdjust),
        Signal::SIGTERM | Signal::SIGINT => Some(PanelEvent::Shutdown),
        _ => None,
    }
}

/// All signals we take over. The realtime ones have no [`Signal`] variant.
fn handled_mask() -> SigSet {
    let mut mask = SigSet::empty();
    for signal in HANDLED {
        mask.add(signal);
    }
    let mut raw = *mask.as_ref();
    // SAFETY: `raw` is an initialised sigset_t and both numbers are valid
    // realtime signals on this system.
    unsafe {
        libc::sigaddset(&mut raw, alpha_down());
        libc::sigaddset(&mut raw, alpha_up());
        SigSet::from_sigset_t_unchecked(raw)
    }
}

/// Block the handled signals in the calling thread and open a signalfd for
/// them. Must run before any other thread is spawned so the mask is
/// inherited everywhere.
pub(crate) fn block() -> Result<SignalFd, DimmerError> {
    let mask = handled_mask();
    mask.thread_block().context(SignalSnafu)?;
    SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC).context(SignalSnafu)
}

/// Forward signals as panel events until shutdown is requested.
pub(crate) fn spawn(
    sfd: SignalFd,
    events: Sender<PanelEvent>,
) -> Result<JoinHandle<()>, DimmerError> {
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || loop {
            let info = match sfd.read_signal() {
                Ok(Some(info)) => info,
                Ok(None) => continue,
                Err(err) => {
                    error!("Reading signalfd failed: {err}");
                    let _ = events.send(PanelEvent::Shutdown);
                    return;
                }
            };
            let signo = info.ssi_signo as i32;
            let Some(event) = event_for(signo) else {
                debug!("Ignoring signal {signo}");
                continue;
            };
            debug!("Signal {signo}: {event:?}");
            if events.send(event).is_err() || event == PanelEvent::Shutdown {
                return;
            }
        })
        .context(SpawnSnafu { name: "signals" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping() {
        assert_eq!(event_for(Signal::SIGUSR1 as i32), Some(PanelEvent::ToggleOverlay));
        assert_eq!(
            event_for(Signal::SIGUSR2 as i32),
            Some(PanelEvent::ToggleAutoAdjust)
        );
        assert_eq!(event_for(Signal::SIGTERM as i32), Some(PanelEvent::Shutdown));
        assert_eq!(event_for(Signal::SIGINT as i32), Some(PanelEvent::Shutdown));
        assert_eq!(
            event_for(libc::SIGRTMIN()),
            Some(PanelEvent::StepManualAlpha(-ALPHA_STEP))
        );
        assert_eq!(
            event_for(libc::SIGRTMIN() + 1),
            Some(PanelEvent::StepManualAlpha(ALPHA_STEP))
        );
        assert_eq!(event_for(Signal::SIGHUP as i32), None);
        assert_eq!(event_for(libc::SIGRTMIN() + 2), None);
    }

    #[test]
    fn mask_covers_every_mapped_signal() {
        let mask = handled_mask();
        assert!(HANDLED.iter().all(|s| mask.contains(*s)));
        assert!(HANDLED.iter().all(|s| event_for(*s as i32).is_some()));
        // SAFETY: sigismember only reads the initialised set.
        let has_rt = |signo| unsafe { libc::sigismember(mask.as_ref(), signo) } == 1;
        assert!(has_rt(alpha_down()));
        assert!(has_rt(alpha_up()));
    }
}
