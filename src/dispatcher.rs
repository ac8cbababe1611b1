//! Background worker for best-effort transport and history calls.
//!
//! Unsubscribes run on the caller's thread, ahead of the membership write.
//! History fetches and subscribes run here, one job at a time in submission
//! order. Every switch attempt bumps an epoch under the [`Link`] lock, and a
//! job only subscribes while holding that lock with its own epoch still
//! live, so a retired channel is never subscribed after its unsubscribe.

use crate::events::{EventBus, SyncEvent, TransportOperation};
use crate::transport::{HistorySync, SubscriptionTransport};
use crate::types::ChannelId;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Transport access shared by `synchronize` callers and the worker.
pub(crate) struct Link {
    transport: Arc<dyn SubscriptionTransport>,
    events: Arc<EventBus>,
    /// Bumped once per switch attempt. Held across retire and subscribe.
    epoch: Mutex<u64>,
}

impl Link {
    pub(crate) fn new(transport: Arc<dyn SubscriptionTransport>, events: Arc<EventBus>) -> Self {
        Self {
            transport,
            events,
            epoch: Mutex::new(0),
        }
    }

    /// Start a switch attempt: supersede queued work and unsubscribe `old`.
    /// Returns the epoch jobs of this attempt must carry.
    pub(crate) fn retire(&self, old: Option<&ChannelId>) -> u64 {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        if let Some(channel) = old {
            match self.transport.unsubscribe(std::slice::from_ref(channel)) {
                Ok(()) => {
                    tracing::info!(channel = %channel, "unsubscribed");
                    self.events.publish(SyncEvent::Unsubscribed {
                        channel: channel.clone(),
                    });
                }
                Err(e) => self.failed(channel.clone(), TransportOperation::Unsubscribe, e.to_string()),
            }
        }
        *epoch
    }

    fn failed(&self, channel: ChannelId, operation: TransportOperation, error: String) {
        tracing::warn!(channel = %channel, ?operation, error = %error, "best-effort call failed");
        self.events.publish(SyncEvent::TransportFailed {
            channel,
            operation,
            error,
        });
    }
}

pub(crate) enum Job {
    /// Sync history for `channel` and subscribe to it.
    Establish {
        channel: ChannelId,
        generation: u64,
        epoch: u64,
        presence: bool,
    },
    Barrier(Sender<()>),
}

/// Everything the worker thread needs.
struct Worker {
    link: Arc<Link>,
    history: Arc<dyn HistorySync>,
}

impl Worker {
    fn run(self, jobs: Receiver<Job>) {
        for job in jobs {
            match job {
                Job::Establish {
                    channel,
                    generation,
                    epoch,
                    presence,
                } => self.establish(channel, generation, epoch, presence),
                Job::Barrier(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        tracing::debug!("dispatcher queue closed");
    }

    fn establish(&self, channel: ChannelId, generation: u64, epoch: u64, presence: bool) {
        if self.superseded(&channel, generation, epoch, *self.link.epoch.lock()) {
            return;
        }
        match self.history.fetch(&channel) {
            Ok(()) => self.link.events.publish(SyncEvent::HistorySynced {
                channel: channel.clone(),
            }),
            Err(e) => self
                .link
                .failed(channel.clone(), TransportOperation::HistorySync, e.to_string()),
        }

        let live = self.link.epoch.lock();
        if self.superseded(&channel, generation, epoch, *live) {
            return;
        }
        match self
            .link
            .transport
            .subscribe(std::slice::from_ref(&channel), presence)
        {
            Ok(()) => {
                tracing::info!(channel = %channel, generation, presence, "subscribed");
                self.link
                    .events
                    .publish(SyncEvent::Subscribed { channel, presence });
            }
            Err(e) => self
                .link
                .failed(channel, TransportOperation::Subscribe, e.to_string()),
        }
    }

    fn superseded(&self, channel: &ChannelId, generation: u64, epoch: u64, live: u64) -> bool {
        if live == epoch {
            return false;
        }
        tracing::debug!(channel = %channel, generation, epoch, live, "skipping superseded channel");
        self.link.events.publish(SyncEvent::Superseded {
            channel: channel.clone(),
            generation,
        });
        true
    }
}

/// Handle to the worker thread.
///
/// Dropping it closes the queue and waits up to the shutdown timeout for the
/// worker to finish what is left. A worker still stuck in a transport call
/// after that is detached, not joined.
pub(crate) struct Dispatcher {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    /// Disconnects when the worker thread exits.
    exited: Receiver<()>,
    shutdown_timeout: Option<Duration>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        link: Arc<Link>,
        history: Arc<dyn HistorySync>,
        shutdown_timeout: Option<Duration>,
    ) -> std::io::Result<Self> {
        let (jobs, rx) = unbounded();
        let (alive, exited) = bounded::<()>(1);
        let worker = Worker { link, history };
        let handle = std::thread::Builder::new()
            .name("channel-dispatch".into())
            .spawn(move || {
                let _alive = alive;
                worker.run(rx);
            })?;
        Ok(Self {
            jobs: Some(jobs),
            handle: Some(handle),
            exited,
            shutdown_timeout,
        })
    }

    pub(crate) fn submit(&self, job: Job) {
        let sent = self.jobs.as_ref().map(|jobs| jobs.send(job).is_ok());
        if sent != Some(true) {
            tracing::warn!("dispatcher worker is gone, dropping job");
        }
    }

    /// Block until every job submitted before this call has run.
    pub(crate) fn drain(&self) {
        let (ack, done) = bounded(1);
        self.submit(Job::Barrier(ack));
        let _ = done.recv();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish what is left and exit.
        self.jobs.take();
        let finished = match self.shutdown_timeout {
            Some(timeout) => !matches!(
                self.exited.recv_timeout(timeout),
                Err(RecvTimeoutError::Timeout)
            ),
            None => {
                let _ = self.exited.recv();
                true
            }
        };
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !finished {
            tracing::warn!("dispatcher worker still busy at shutdown, detaching");
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("dispatcher worker panicked");
        }
    }
}
