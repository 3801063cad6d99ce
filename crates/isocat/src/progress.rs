//! Observer and cancellation interfaces handed to a build.
//!
//! Notifications are delivered synchronously on the thread running the build, in order.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
  pub current: u64,
  pub maximum: u64,
  pub action: String,
}

/// Receives progress, completion and abort notifications.
pub trait ProgressSink {
  fn progress(&mut self, _progress: &Progress) {}

  fn finished(&mut self, _message: &str) {}

  fn aborted(&mut self, _message: &str) {}
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
  fn progress(&mut self, progress: &Progress) {
    (**self).progress(progress)
  }

  fn finished(&mut self, message: &str) {
    (**self).finished(message)
  }

  fn aborted(&mut self, message: &str) {
    (**self).aborted(message)
  }
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone)]
pub struct LogSink {
  action: String,
}

impl ProgressSink for LogSink {
  fn progress(&mut self, progress: &Progress) {
    if progress.action != self.action {
      log::info!("{}", progress.action);
      self.action.clone_from(&progress.action);
    }
    log::debug!("{}: {}/{}", progress.action, progress.current, progress.maximum);
  }

  fn finished(&mut self, message: &str) {
    log::info!("{message}");
  }

  fn aborted(&mut self, message: &str) {
    log::error!("{message}");
  }
}

/// A notification as seen by an [FnSink] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent<'e> {
  Progress(&'e Progress),
  Finished(&'e str),
  Aborted(&'e str),
}

/// Routes every notification through a single callback.
pub struct FnSink<F>(pub F)
where
  F: FnMut(BuildEvent<'_>);

impl<F> ProgressSink for FnSink<F>
where
  F: FnMut(BuildEvent<'_>),
{
  fn progress(&mut self, progress: &Progress) {
    (self.0)(BuildEvent::Progress(progress))
  }

  fn finished(&mut self, message: &str) {
    (self.0)(BuildEvent::Finished(message))
  }

  fn aborted(&mut self, message: &str) {
    (self.0)(BuildEvent::Aborted(message))
  }
}

/// Polled by a build between steps; once it reports an abort the build stops.
pub trait AbortSignal {
  fn is_aborted(&self) -> bool;
}

impl AbortSignal for AtomicBool {
  fn is_aborted(&self) -> bool {
    self.load(Ordering::Relaxed)
  }
}

impl<T: AbortSignal + ?Sized> AbortSignal for Arc<T> {
  fn is_aborted(&self) -> bool {
    (**self).is_aborted()
  }
}

impl<T: AbortSignal + ?Sized> AbortSignal for &T {
  fn is_aborted(&self) -> bool {
    (**self).is_aborted()
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
  fn is_aborted(&self) -> bool {
    false
  }
}

/// Cloneable abort flag, for cancelling a build running on another thread.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }
}

impl AbortSignal for CancelToken {
  fn is_aborted(&self) -> bool {
    self.0.is_aborted()
  }
}
