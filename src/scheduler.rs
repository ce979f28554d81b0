use std::io;
use std::thread;

/// Spawns the background work the clock needs (timer threads).
pub trait Scheduler: Send + Sync {
    fn spawn<F>(&self, name: &str, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static;
}

/// Runs every task on its own named OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        ThreadScheduler
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn<F>(&self, name: &str, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // Detached: tasks end themselves when their cancel channel closes.
        thread::Builder::new().name(name.to_string()).spawn(f)?;
        Ok(())
    }
}
