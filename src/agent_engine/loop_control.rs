use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative abort request. Set from anywhere; the loop only looks at it
/// between steps.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Step budget for one task.
pub struct LoopController {
    max_steps: u32,
    step: u32,
}

impl LoopController {
    pub fn new(max_steps: u32) -> Self {
        Self { max_steps, step: 0 }
    }

    /// True once `max_steps` steps have been started.
    pub fn should_stop(&self) -> bool {
        self.step >= self.max_steps
    }

    /// Start the next step and return its 1-based number.
    pub fn begin_step(&mut self) -> u32 {
        self.step += 1;
        self.step
    }

    pub fn step(&self) -> u32 {
        self.step
    }
}
