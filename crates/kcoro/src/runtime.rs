//! Multi-core runtime: one scheduler and one run-loop context per core

use crate::config::RuntimeConfig;
use crate::scheduler::Scheduler;
use kcoro_hal::{Cpu, StackfulContext, Switched};
use parking_lot::Mutex;
use std::sync::Arc;

struct Core {
    cpu: Arc<Cpu>,
    scheduler: Arc<Scheduler>,
    context: Mutex<Option<Arc<StackfulContext>>>,
}

/// Set of cores
///
/// A core's run loop lives in a [`StackfulContext`] that the host process
/// scheduler switches into with [`tick`](Runtime::tick); it switches back
/// whenever its ready queue runs dry.
pub struct Runtime {
    config: RuntimeConfig,
    cores: Vec<Core>,
}

impl Runtime {
    /// Bring up `config.cores` cores; no run loop starts until [`tick`](Self::tick)
    pub fn new(config: RuntimeConfig) -> Self {
        let count = config.cores.max(1);
        let cores = (0..count)
            .map(|id| Core {
                cpu: Arc::new(Cpu::new(id)),
                scheduler: Scheduler::with_capacity(id, config.queue_capacity),
                context: Mutex::new(None),
            })
            .collect();
        log::info!("kcoro runtime: {} cores", count);
        Self { config, cores }
    }

    /// Configuration the runtime was built with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of cores
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Scheduler of `core`. Panics if `core` is out of range.
    pub fn scheduler(&self, core: usize) -> &Arc<Scheduler> {
        &self.cores[core].scheduler
    }

    /// Processor state of `core`. Panics if `core` is out of range.
    pub fn cpu(&self, core: usize) -> &Arc<Cpu> {
        &self.cores[core].cpu
    }

    /// Make the calling thread run as `core` and return its scheduler
    pub fn enter(&self, core: usize) -> &Arc<Scheduler> {
        let core = &self.cores[core];
        core.cpu.bind();
        &core.scheduler
    }

    /// Run-loop context of `core`, created on first use
    pub fn boot(&self, core: usize) -> Arc<StackfulContext> {
        let slot = &self.cores[core];
        let mut context = slot.context.lock();
        if let Some(ctx) = context.as_ref() {
            return ctx.clone();
        }

        let scheduler = slot.scheduler.clone();
        let ctx = StackfulContext::with_stack_size(
            format!("{}-{}", self.config.context_name, core),
            slot.cpu.clone(),
            self.config.context_stack_size,
            move |ctx| scheduler.run(&*ctx),
        );
        log::debug!("core {}: booted {}", core, ctx.name());
        *context = Some(ctx.clone());
        ctx
    }

    /// Switch into the run loop of `core` until its queue runs dry
    pub fn tick(&self, core: usize) -> Switched {
        let ctx = self.boot(core);
        let _irq = self.cores[core].cpu.disable_interrupts();
        ctx.save_and_switch()
    }

    /// Halt every scheduler and let every run loop exit
    pub fn shutdown(&self) {
        for (id, core) in self.cores.iter().enumerate() {
            core.scheduler.halt();
            let Some(ctx) = core.context.lock().take() else {
                continue;
            };
            if !ctx.has_exited() {
                let _irq = core.cpu.disable_interrupts();
                ctx.save_and_switch();
            }
            ctx.join();
            log::debug!("core {}: run loop exited", id);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
