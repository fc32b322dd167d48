//! Choosing between inline and worker-thread channel processing.

use std::sync::Arc;

use allargando_core::ThreadingMode;

use crate::channel::ChannelState;
use crate::plan::FramePlan;
use crate::pool::WorkerPool;

/// Resolve a threading mode for a channel count.
///
/// `Auto` threads only when there is more than one channel and the host
/// reports more than one core.
pub fn use_threads(mode: ThreadingMode, channels: usize) -> bool {
    match mode {
        ThreadingMode::Never => false,
        ThreadingMode::Always => true,
        ThreadingMode::Auto => {
            channels > 1
                && std::thread::available_parallelism()
                    .map(|n| n.get() > 1)
                    .unwrap_or(false)
        }
    }
}

pub(crate) enum Dispatcher {
    Inline,
    Workers(WorkerPool),
}

impl Dispatcher {
    pub fn new(mode: ThreadingMode, channels: usize) -> std::io::Result<Self> {
        if use_threads(mode, channels) {
            Ok(Self::Workers(WorkerPool::new(channels)?))
        } else {
            Ok(Self::Inline)
        }
    }

    #[inline]
    pub fn is_threaded(&self) -> bool {
        matches!(self, Self::Workers(_))
    }

    pub fn run(&self, channels: &mut Vec<Box<ChannelState>>, plans: &Arc<Vec<FramePlan>>) {
        if plans.is_empty() {
            return;
        }
        match self {
            Self::Inline => {
                for channel in channels.iter_mut() {
                    channel.run(plans);
                }
            }
            Self::Workers(pool) => pool.run(channels, plans),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_threads() {
        assert!(!use_threads(ThreadingMode::Never, 8));
        assert!(use_threads(ThreadingMode::Always, 1));
        assert!(!use_threads(ThreadingMode::Auto, 1));
    }

    #[test]
    fn test_auto_follows_host_cores() {
        let multi_core = std::thread::available_parallelism()
            .map(|n| n.get() > 1)
            .unwrap_or(false);
        assert_eq!(use_threads(ThreadingMode::Auto, 2), multi_core);
        assert_eq!(use_threads(ThreadingMode::Auto, 6), multi_core);
        assert_eq!(
            Dispatcher::new(ThreadingMode::Auto, 2).unwrap().is_threaded(),
            multi_core
        );
    }

    #[test]
    fn test_dispatcher_kinds() {
        assert!(!Dispatcher::new(ThreadingMode::Never, 2).unwrap().is_threaded());
        assert!(Dispatcher::new(ThreadingMode::Always, 2).unwrap().is_threaded());
    }
}
