//! Integration tests for stackful contexts driven by a trivial process scheduler

use kcoro_hal::{ContextSwitch, Cpu, SpinLock, StackfulContext, Switched};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_round_robin_two_contexts() {
    init_logging();
    let cpu = Arc::new(Cpu::new(0));
    cpu.bind();
    let trace = Arc::new(SpinLock::new("trace", Vec::new()));

    let make = |tag: &'static str, rounds: usize| {
        let trace = trace.clone();
        StackfulContext::new(format!("rr-{}", tag), cpu.clone(), move |ctx| {
            for i in 0..rounds {
                trace.lock().push(format!("{}{}", tag, i));
                let _irq = ctx.cpu().disable_interrupts();
                ctx.switch_back();
            }
        })
    };
    let contexts = vec![make("a", 2), make("b", 3)];

    // Process scheduler: resume every live context until all have exited
    let mut live = contexts.clone();
    while !live.is_empty() {
        live.retain(|ctx| {
            let _irq = cpu.disable_interrupts();
            ctx.save_and_switch() == Switched::Yielded
        });
    }
    for ctx in &contexts {
        ctx.join();
    }

    assert_eq!(*trace.lock(), vec!["a0", "b0", "a1", "b1", "b2"]);
    assert_eq!(cpu.depth(), 0);
}

#[test]
fn test_interrupt_baseline_survives_switch() {
    init_logging();
    let cpu = Arc::new(Cpu::new(1));
    cpu.bind();

    let ctx = StackfulContext::new("baseline", cpu.clone(), |ctx| {
        let cpu = ctx.cpu().clone();
        // Leave the section the host switched in with: interrupts come back on
        cpu.pop_off();
        assert!(cpu.intr_get());

        // Open a section of our own with interrupts already off
        cpu.intr_off();
        cpu.push_off();
        assert!(!cpu.base_interrupt_status());
        ctx.switch_back();

        // Our baseline is back after the host ran with its own
        assert!(!cpu.base_interrupt_status());
    });

    cpu.intr_on();
    cpu.push_off();
    assert!(cpu.base_interrupt_status());
    assert_eq!(ctx.save_and_switch(), Switched::Yielded);

    // The host's baseline was restored across the switch
    assert!(cpu.base_interrupt_status());
    cpu.pop_off();
    assert!(cpu.intr_get());

    cpu.push_off();
    assert_eq!(ctx.save_and_switch(), Switched::Exited);
    ctx.join();
}

#[test]
fn test_dedicated_stack_size() {
    init_logging();
    let cpu = Arc::new(Cpu::new(2));
    let ctx = StackfulContext::with_stack_size("big-stack", cpu.clone(), 256 * 1024, |_| {
        // Touch a buffer that only fits on a dedicated stack
        let buf = [7u8; 128 * 1024];
        assert_eq!(buf.iter().map(|b| *b as usize).sum::<usize>(), 7 * 128 * 1024);
    });

    let _irq = cpu.disable_interrupts();
    assert_eq!(ctx.save_and_switch(), Switched::Exited);
    ctx.join();
}
