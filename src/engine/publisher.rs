// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::boundary::CancelledSubscription;
use crate::engine::host::HostMessage;
use crate::engine::shell::ShellId;
use crate::errors::StreamError;
use crate::traits::{Publisher, Subscriber};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

struct PublisherState {
    /// `None` once the publisher has shut down.
    pending: Option<Vec<Arc<dyn Subscriber>>>,
    shutdown_reason: Option<StreamError>,
}

/// The publisher handed out for one output boundary of a shell.
///
/// Subscribers are parked here until the shell picks them up on
/// `SubscribePending`. After [`shutdown`](Self::shutdown) every parked and
/// every later subscriber is immediately given a cancelled subscription and
/// the terminal signal the output ended with.
pub struct ExposedPublisher {
    shell: ShellId,
    output: usize,
    host: UnboundedSender<HostMessage>,
    state: Mutex<PublisherState>,
}

impl ExposedPublisher {
    pub(crate) fn new(shell: ShellId, output: usize, host: UnboundedSender<HostMessage>) -> Self {
        Self {
            shell,
            output,
            host,
            state: Mutex::new(PublisherState {
                pending: Some(Vec::new()),
                shutdown_reason: None,
            }),
        }
    }

    pub fn shell(&self) -> ShellId {
        self.shell
    }

    pub fn output(&self) -> usize {
        self.output
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribers that arrived since the last call, oldest first.
    pub(crate) fn take_pending(&self) -> Vec<Arc<dyn Subscriber>> {
        match self.lock().pending.as_mut() {
            Some(pending) => std::mem::take(pending),
            None => Vec::new(),
        }
    }

    /// `None` means the output completed normally. Only the first call counts.
    pub(crate) fn shutdown(&self, reason: Option<StreamError>) {
        let parked = {
            let mut state = self.lock();
            match state.pending.take() {
                Some(parked) => {
                    state.shutdown_reason = reason.clone();
                    parked
                }
                None => return,
            }
        };
        for subscriber in parked {
            report_subscribe_failure(subscriber.as_ref(), &reason);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().pending.is_none()
    }
}

impl Publisher for ExposedPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        let late = {
            let mut state = self.lock();
            match state.pending.as_mut() {
                Some(pending) => {
                    pending.push(subscriber.clone());
                    None
                }
                None => Some(state.shutdown_reason.clone()),
            }
        };
        match late {
            Some(reason) => report_subscribe_failure(subscriber.as_ref(), &reason),
            None => {
                let message = HostMessage::SubscribePending {
                    shell: self.shell,
                    output: self.output,
                };
                if self.host.send(message).is_err() {
                    self.shutdown(Some(StreamError::AbruptTermination));
                }
            }
        }
    }
}

fn report_subscribe_failure(subscriber: &dyn Subscriber, reason: &Option<StreamError>) {
    subscriber.on_subscribe(Arc::new(CancelledSubscription));
    match reason {
        Some(cause) => subscriber.on_error(cause.clone()),
        None => subscriber.on_complete(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ProbeSubscriber;
    use tokio::sync::mpsc;

    #[test]
    fn test_subscribe_parks_and_notifies_shell() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let publisher = ExposedPublisher::new(ShellId(4), 1, tx);
        let probe = ProbeSubscriber::<i64>::new();

        publisher.subscribe(probe.clone());

        assert!(matches!(
            rx.try_recv(),
            Ok(HostMessage::SubscribePending { shell: ShellId(4), output: 1 })
        ));
        assert_eq!(publisher.take_pending().len(), 1);
        assert!(publisher.take_pending().is_empty());
        assert!(!probe.is_subscribed());
    }

    #[test]
    fn test_shutdown_reports_to_parked_and_late_subscribers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let publisher = ExposedPublisher::new(ShellId(1), 0, tx);
        let parked = ProbeSubscriber::<i64>::new();
        publisher.subscribe(parked.clone());

        publisher.shutdown(Some(StreamError::failed("boom")));
        publisher.shutdown(None);

        let late = ProbeSubscriber::<i64>::new();
        publisher.subscribe(late.clone());

        for probe in [parked, late] {
            assert!(probe.is_subscribed());
            assert_eq!(probe.error(), Some(StreamError::failed("boom")));
            assert!(!probe.is_completed());
        }
    }

    #[test]
    fn test_completed_publisher_completes_late_subscribers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let publisher = ExposedPublisher::new(ShellId(1), 0, tx);
        publisher.shutdown(None);

        let late = ProbeSubscriber::<i64>::new();
        publisher.subscribe(late.clone());
        assert!(late.is_completed());
        assert!(late.error().is_none());
    }

    #[test]
    fn test_subscribe_without_host_fails_abruptly() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let publisher = ExposedPublisher::new(ShellId(1), 0, tx);
        let probe = ProbeSubscriber::<i64>::new();

        publisher.subscribe(probe.clone());
        assert_eq!(probe.error(), Some(StreamError::AbruptTermination));
    }
}
