//! Runtime system trait

use crate::callback::TickTime;
use crate::stage::Stage;
use crate::world::World;

/// A subsystem driven by the scheduler.
///
/// Subscriptions are declared up front; the scheduler registers one callback
/// per `(stage, priority)` pair when it is built, in the order systems were
/// added. Systems with equal priority in a stage run in that order.
pub trait RuntimeSystem {
    /// Human-readable name, used as the callback label
    fn name(&self) -> &str;

    /// Stages this system runs in, with its priority in each
    fn subscriptions(&self) -> Vec<(Stage, i32)>;

    /// Called once while the scheduler is built
    fn initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every subscribed stage. Fixed stages pass simulated time.
    fn run(&mut self, stage: Stage, world: &mut World, time: &TickTime) -> anyhow::Result<()>;

    /// Called when the scheduler shuts down, after every component is destroyed
    fn shutdown(&mut self, _world: &mut World) -> anyhow::Result<()> {
        Ok(())
    }
}
