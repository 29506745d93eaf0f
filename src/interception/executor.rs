// src/interception/executor.rs
//! Interceptor chain executor
//!
//! Runs a frame through its interceptor snapshot and, at the end of the
//! chain, the invocation target.
//!
//! # Chain levels
//!
//! ```text
//! level 0      interceptor[0]   ─ proceed() ─┐
//! level 1      interceptor[1]   ◄────────────┘ ─ proceed() ─┐
//! ...                                                       │
//! level n      target.invoke    ◄───────────────────────────┘
//! ```
//!
//! Each level is marked as running while it executes. Entering a level at
//! or below one that is still running (a captured [`ProceedInfo`] invoked
//! from inside the target, or two threads resuming the same segment) is
//! rejected with `NotAValidProceedPoint`.

use crate::contract::signature::ConcreteMethod;
use crate::interception::frame::{Frame, FramePhase, Invocation};
use crate::interception::value::Value;
use crate::utils::errors::{ProxyError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Marks a level as running until dropped
struct LevelGuard<'a> {
    frame: &'a Frame,
    level: usize,
}

impl<'a> LevelGuard<'a> {
    fn enter(frame: &'a Frame, level: usize) -> Result<Self> {
        let mut running = frame.running.lock();
        if let Some(active) = running.range(level..).next() {
            return Err(ProxyError::NotAValidProceedPoint {
                method: frame.method.to_string(),
                reason: format!(
                    "chain position {} is already executing (entered at {})",
                    active, level
                ),
            });
        }
        running.insert(level);
        Ok(Self { frame, level })
    }
}

impl Drop for LevelGuard<'_> {
    fn drop(&mut self) {
        self.frame.running.lock().remove(&self.level);
    }
}

impl Frame {
    /// Run the chain from `level` to the end
    pub(crate) fn run_from(self: &Arc<Self>, level: usize) -> Result<()> {
        let _guard = LevelGuard::enter(self, level)?;

        if level < self.interceptors.len() {
            self.set_phase(FramePhase::Intercepting(level));
            trace!("Intercepting {} at position {}", self.method, level);
            let invocation = Invocation {
                frame: Arc::clone(self),
                position: level,
            };
            self.interceptors[level].intercept(&invocation)
        } else {
            self.proceed_to_target()
        }
    }

    fn proceed_to_target(&self) -> Result<()> {
        self.set_phase(FramePhase::Proceeding);

        let target = self.target.lock().clone();
        let target = match target {
            Some(target) => target,
            None => {
                if self.return_value.lock().is_some() {
                    return Ok(());
                }
                return Err(ProxyError::NoTargetToProceed {
                    method: self.method.to_string(),
                });
            }
        };

        // copy in; the slots stay unlocked while the target runs
        let mut arguments = self.arguments.lock().clone();
        let outcome = target.invoke(&self.method, &mut arguments);

        {
            let mut slots = self.arguments.lock();
            for (i, direction) in self.directions.iter().enumerate() {
                if direction.copies_back() {
                    if let (Some(slot), Some(value)) = (slots.get_mut(i), arguments.get(i)) {
                        *slot = value.clone();
                    }
                }
            }
        }

        match outcome {
            Ok(value) => {
                if !self.method.is_void() {
                    *self.return_value.lock() = Some(value);
                }
                Ok(())
            }
            Err(error) => Err(ProxyError::from_target(error)),
        }
    }
}

impl Invocation {
    /// Run the rest of the chain (next interceptor, or the target)
    pub fn proceed(&self) -> Result<()> {
        self.frame.run_from(self.position + 1)
    }

    /// Capture a token that resumes the chain after this interceptor
    pub fn capture_proceed_info(&self) -> ProceedInfo {
        ProceedInfo {
            frame: Arc::clone(&self.frame),
            cursor: self.position + 1,
        }
    }
}

/// Resumable continuation of a frame at a fixed chain position
#[derive(Clone)]
pub struct ProceedInfo {
    frame: Arc<Frame>,
    cursor: usize,
}

impl ProceedInfo {
    /// Resume the chain at the captured position
    pub fn invoke(&self) -> Result<()> {
        self.frame.run_from(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn method(&self) -> &ConcreteMethod {
        &self.frame.method
    }

    /// Current return slot of the captured frame
    pub fn return_value(&self) -> Option<Value> {
        self.frame.return_value.lock().clone()
    }
}

impl PartialEq for ProceedInfo {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame) && self.cursor == other.cursor
    }
}

impl Eq for ProceedInfo {}

impl fmt::Debug for ProceedInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedInfo")
            .field("method", &self.frame.method.to_string())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Run a frame through its whole chain
pub(crate) fn execute(frame: &Arc<Frame>) -> Result<()> {
    debug!(
        "Dispatching {} through {} interceptor(s)",
        frame.method,
        frame.chain_len()
    );

    let outcome = frame.run_from(0);
    frame.set_phase(if outcome.is_ok() {
        FramePhase::Completed
    } else {
        FramePhase::Faulted
    });
    outcome
}
