//! Fence & Ledger Tests
//!
//! Tests for:
//! - Fence: pending / submitted / signaled lifecycle, cached flag, handle release
//! - FenceLedger: boundary rotation, in-order sweep, tracking foreign fences
//! - CompletionLatch: single-shot completion

mod common;

use std::time::Duration;

use myth_streaming::{
    CommandStream, CompletionLatch, Fence, FenceLedger, GpuBackend, HeadlessGpu, RetireMode,
};

const TIMEOUT: Duration = Duration::from_micros(1);

fn manual() -> HeadlessGpu {
    common::init_logger();
    HeadlessGpu::new(RetireMode::Manual)
}

// ============================================================================
// Fence Tests
// ============================================================================

#[test]
fn pending_fence_never_signals() {
    let gpu = manual();
    let fence = Fence::pending(CommandStream::Primary);

    gpu.retire(CommandStream::Primary);
    assert!(!fence.is_submitted());
    assert!(!fence.poll(&gpu, TIMEOUT));
    assert!(!fence.is_signaled());
}

#[test]
fn timeout_is_not_a_signal() {
    let gpu = manual();
    let fence = Fence::pending(CommandStream::Primary);
    fence.submit(&gpu);

    for _ in 0..4 {
        assert!(!fence.poll(&gpu, TIMEOUT));
    }
    gpu.retire(CommandStream::Primary);
    assert!(fence.poll(&gpu, TIMEOUT));
}

#[test]
fn clones_share_the_signal() {
    let gpu = manual();
    let fence = Fence::pending(CommandStream::Primary);
    let observer = fence.clone();

    fence.submit(&gpu);
    assert!(observer.is_submitted());

    gpu.retire(CommandStream::Primary);
    fence.poll(&gpu, TIMEOUT);
    assert!(observer.is_signaled());
}

#[test]
fn signaled_fence_releases_its_handle() {
    let gpu = manual();
    let fence = Fence::pending(CommandStream::Secondary);
    fence.submit(&gpu);
    assert_eq!(gpu.live_fences(), 1);

    gpu.retire(CommandStream::Secondary);
    assert!(fence.poll(&gpu, TIMEOUT));
    assert_eq!(gpu.live_fences(), 0);

    // Later polls only read the cached flag
    assert!(fence.poll(&gpu, TIMEOUT));
}

#[test]
#[should_panic(expected = "submitted twice")]
fn fence_cannot_be_submitted_twice() {
    let gpu = manual();
    let fence = Fence::pending(CommandStream::Primary);
    fence.submit(&gpu);
    fence.submit(&gpu);
}

// ============================================================================
// FenceLedger Tests
// ============================================================================

#[test]
fn end_boundary_rotates_current_fence() {
    let gpu = manual();
    let mut ledger = FenceLedger::new(CommandStream::Primary, TIMEOUT);

    let first = ledger.current().clone();
    ledger.begin_boundary(&gpu);
    ledger.end_boundary(&gpu);

    assert!(first.is_submitted());
    assert!(!ledger.current().is_submitted());
    assert_eq!(ledger.outstanding(), 1);
}

#[test]
fn sweep_stops_at_first_pending_fence() {
    let gpu = manual();
    let mut ledger = FenceLedger::new(CommandStream::Primary, TIMEOUT);

    let mut fences = Vec::new();
    for _ in 0..3 {
        fences.push(ledger.current().clone());
        ledger.end_boundary(&gpu);
    }

    // Each boundary submits one fence command
    gpu.retire_steps(CommandStream::Primary, 1);
    assert_eq!(ledger.sweep(&gpu), 1);
    assert_eq!(ledger.outstanding(), 2);
    assert!(fences[0].is_signaled());
    assert!(!fences[1].is_signaled());
    assert!(!fences[2].is_signaled());

    gpu.retire(CommandStream::Primary);
    assert_eq!(ledger.sweep(&gpu), 2);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn older_fences_signal_no_later_than_newer_ones() {
    let gpu = manual();
    let mut ledger = FenceLedger::new(CommandStream::Secondary, TIMEOUT);

    let fences: Vec<Fence> = (0..5)
        .map(|_| {
            let fence = Fence::pending(CommandStream::Secondary);
            fence.submit(&gpu);
            ledger.track(fence.clone());
            fence
        })
        .collect();

    for step in 1..=5 {
        gpu.retire_steps(CommandStream::Secondary, 1);
        ledger.sweep(&gpu);
        let signaled: Vec<bool> = fences.iter().map(Fence::is_signaled).collect();
        assert!(
            signaled.windows(2).all(|w| w[0] || !w[1]),
            "newer fence signaled before an older one: {signaled:?}"
        );
        assert_eq!(signaled.iter().filter(|s| **s).count(), step);
    }
}

#[test]
fn begin_boundary_sweeps() {
    let gpu = HeadlessGpu::new(RetireMode::Immediate);
    let mut ledger = FenceLedger::new(CommandStream::Primary, TIMEOUT);

    for _ in 0..3 {
        ledger.begin_boundary(&gpu);
        ledger.end_boundary(&gpu);
    }
    assert_eq!(ledger.outstanding(), 1);
    ledger.begin_boundary(&gpu);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
#[should_panic(expected = "foreign ledger")]
fn ledger_rejects_foreign_stream() {
    let gpu = manual();
    let mut ledger = FenceLedger::new(CommandStream::Primary, TIMEOUT);
    let fence = Fence::pending(CommandStream::Secondary);
    fence.submit(&gpu);
    ledger.track(fence);
}

#[test]
fn release_drops_backend_fences() {
    let gpu = manual();
    let mut ledger = FenceLedger::new(CommandStream::Primary, TIMEOUT);
    ledger.end_boundary(&gpu);
    ledger.end_boundary(&gpu);
    assert_eq!(gpu.live_fences(), 2);

    ledger.release(&gpu);
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(gpu.live_fences(), 0);
}

#[test]
fn headless_reports_timeout_for_unretired_fence() {
    let gpu = manual();
    let id = gpu.create_fence(CommandStream::Primary);
    assert_eq!(
        gpu.poll_fence(CommandStream::Primary, id, TIMEOUT),
        myth_streaming::FenceStatus::TimeoutExpired
    );
}

// ============================================================================
// CompletionLatch Tests
// ============================================================================

#[test]
fn latch_reports_completion_once() {
    let mut latch = CompletionLatch::new();
    let observations: Vec<bool> = [false, false, true, true, true]
        .into_iter()
        .map(|done| latch.poll(|| done))
        .collect();
    assert_eq!(observations, vec![false, false, true, false, false]);
}
