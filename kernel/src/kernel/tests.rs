// kernel/src/kernel/tests.rs
//
// KernelState を SimMachine 上でブートし、fork / switch_task のシナリオを通しで確認する。

use std::boxed::Box;
use std::vec::Vec;

use proptest::prelude::*;

use super::entry::boot;
use super::fork::{replicate, ForkOutcome};
use super::sched::{switch_task, SwitchOutcome};
use super::{KernelState, LogEvent, ProcessIndex};
use crate::arch::sim::SimMachine;
use crate::config::{InvalidationStrategy, KernelConfig};
use crate::mem::addr::{PhysAddr, VirtAddr, VirtPage};
use crate::mem::layout::{ProcessWindow, MIB};
use crate::mm::MapError;

const IMAGE_START: VirtAddr = VirtAddr::new(0x18_0000);
const PAGING_BASE: PhysAddr = PhysAddr::new(0x9_0000);
const PHYS_WINDOW: VirtAddr = VirtAddr::new(0x10_8000);

fn config(process_count: usize, invalidation: InvalidationStrategy) -> KernelConfig {
    KernelConfig::new(process_count, IMAGE_START, 16 * MIB, invalidation).unwrap()
}

fn booted(process_count: usize) -> (Box<KernelState>, SimMachine, ForkOutcome) {
    booted_with(process_count, InvalidationStrategy::PerPage)
}

fn booted_with(
    process_count: usize,
    invalidation: InvalidationStrategy,
) -> (Box<KernelState>, SimMachine, ForkOutcome) {
    let mut ks = Box::new(KernelState::new(config(process_count, invalidation)));
    let mut m = SimMachine::new(process_count.max(1));
    let outcome = boot(&mut m, &mut ks, PAGING_BASE, Some(PHYS_WINDOW));
    (ks, m, outcome)
}

fn window_frames(ks: &KernelState) -> Vec<u32> {
    ks.config()
        .window()
        .pages()
        .map(|p| ks.paging().entry(p).unwrap().frame().number)
        .collect()
}

fn target(ks: &KernelState, raw: usize) -> ProcessIndex {
    ks.process(raw).unwrap()
}

// ─────────────────────────────────────────────
// boot / fork
// ─────────────────────────────────────────────

#[test]
fn boot_enables_paging_on_the_built_directory() {
    let (ks, m, outcome) = booted(2);
    assert_eq!(outcome, ForkOutcome::Forked { copies: 1 });
    assert_eq!(m.cr3, Some(PAGING_BASE));
    assert!(ks.is_paging_enabled());
    assert_eq!(ks.active_process(), ProcessIndex::ZERO);
    assert!(ks.window_matches_active_slot());
    assert_eq!(ks.phys_window_base(), Some(PHYS_WINDOW));
}

#[test]
fn fork_copies_the_window_into_every_slot() {
    let mut ks = Box::new(KernelState::new(config(3, InvalidationStrategy::PerPage)));
    let mut m = SimMachine::new(3);
    let window = ks.config().window();
    m.fill_pattern(PhysAddr::new(window.start().as_u32()), window.len_bytes(), 0x5a);

    let outcome = boot(&mut m, &mut ks, PAGING_BASE, None);
    assert_eq!(outcome, ForkOutcome::Forked { copies: 2 });

    let original = m.read(PhysAddr::new(window.start().as_u32()), window.len_bytes()).to_vec();
    for slot in 1..3u32 {
        let copy = m.read(PhysAddr::new(window.start().as_u32() + slot * MIB), window.len_bytes());
        assert_eq!(copy, &original[..]);
    }
    assert_eq!(m.copies.len(), 2);
}

#[test]
fn fork_seeds_every_other_context_with_one_capture() {
    let (ks, m, _) = booted(4);
    assert_eq!(m.captures, 1);
    assert!(!ks.contexts()[0].is_seeded());
    let seed = ks.contexts()[1];
    assert!(seed.is_seeded());
    assert!(ks.contexts()[1..].iter().all(|ctx| *ctx == seed));
    assert!(ks.is_replicated());
    assert!(ks.events().any(|ev| ev == LogEvent::ContextsSeeded { count: 3 }));
}

#[test]
fn fork_runs_only_once() {
    let (mut ks, mut m, _) = booted(2);
    assert_eq!(replicate(&mut ks, &mut m), ForkOutcome::AlreadyDone);
    assert_eq!(m.copies.len(), 1);
    assert_eq!(m.captures, 1);
}

#[test]
fn replicated_process_leaves_the_refresh_hook_to_the_caller() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    fn hook() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    let mut ks = Box::new(KernelState::new(config(2, InvalidationStrategy::PerPage)));
    let mut m = SimMachine::new(2);
    ks.build_page_tables(PAGING_BASE);
    unsafe { ks.enable_paging(&mut m) };
    ks.set_console_refresh(Some(hook));

    m.resume_next_capture();
    assert_eq!(replicate(&mut ks, &mut m), ForkOutcome::Resumed);
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert!(m.copies.is_empty());
    assert!(!ks.is_replicated());
    assert!(ks.console_refresh_hook().is_some());
}

// ─────────────────────────────────────────────
// switch_task
// ─────────────────────────────────────────────

#[test]
fn switch_to_slot_two_offsets_the_window_by_two_megabytes() {
    let (mut ks, mut m, _) = booted(3);
    let before = window_frames(&ks);

    let to = target(&ks, 2);
    assert_eq!(switch_task(&mut ks, &mut m, to), SwitchOutcome::Transferred);

    assert_eq!(ks.active_process(), to);
    let after = window_frames(&ks);
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(*a, *b + 2 * 256);
    }
    assert!(ks.window_matches_active_slot());
    assert_eq!(m.restored, [ks.contexts()[2]]);
}

#[test]
fn switch_captures_the_outgoing_process() {
    let (mut ks, mut m, _) = booted(2);
    assert!(!ks.contexts()[0].is_seeded());

    let to = target(&ks, 1);
    switch_task(&mut ks, &mut m, to);

    assert_eq!(m.captures, 2);
    assert!(ks.contexts()[0].is_seeded());
    assert_ne!(ks.contexts()[0], ks.contexts()[1]);
}

#[test]
fn slot_zero_is_left_in_place_while_others_run() {
    let (mut ks, mut m, _) = booted(3);
    let window = ks.config().window();
    let slot0 = PhysAddr::new(window.start().as_u32());
    m.fill_pattern(slot0, window.len_bytes(), 0x5a);
    let snapshot = m.read(slot0, window.len_bytes()).to_vec();

    for raw in [1, 2, 1] {
        let to = target(&ks, raw);
        switch_task(&mut ks, &mut m, to);
    }

    assert_eq!(m.read(slot0, window.len_bytes()), &snapshot[..]);
    let back = target(&ks, 0);
    switch_task(&mut ks, &mut m, back);
    assert_eq!(window_frames(&ks)[0], window.first_page().number);
}

#[test]
fn per_page_invalidation_covers_exactly_the_window() {
    let (mut ks, mut m, _) = booted(3);
    let window = ks.config().window();
    m.invalidated.clear();

    let to = target(&ks, 1);
    switch_task(&mut ks, &mut m, to);

    let expected: Vec<VirtPage> = window.pages().collect();
    assert_eq!(m.invalidated, expected);
    assert_eq!(m.full_flushes, 0);
}

#[test]
fn full_flush_invalidation_reloads_once_per_switch() {
    let (mut ks, mut m, _) = booted_with(3, InvalidationStrategy::FullFlush);
    m.invalidated.clear();

    let to = target(&ks, 2);
    switch_task(&mut ks, &mut m, to);
    let back = target(&ks, 0);
    switch_task(&mut ks, &mut m, back);

    assert_eq!(m.full_flushes, 2);
    assert!(m.invalidated.is_empty());
}

#[test]
fn patch_and_restore_happen_with_interrupts_masked() {
    let (mut ks, mut m, _) = booted(3);
    for raw in [1, 2, 0, 2] {
        let to = target(&ks, raw);
        switch_task(&mut ks, &mut m, to);
    }
    assert_eq!(m.unmasked_mutations, 0);
    assert!(m.interrupts_enabled);
}

#[test]
fn switching_to_the_active_process_does_nothing() {
    let (mut ks, mut m, _) = booted(3);
    let before = window_frames(&ks);
    let captures = m.captures;
    m.invalidated.clear();

    let same = ks.active_process();
    assert_eq!(switch_task(&mut ks, &mut m, same), SwitchOutcome::Unchanged);

    assert_eq!(m.captures, captures);
    assert!(m.invalidated.is_empty());
    assert_eq!(m.full_flushes, 0);
    assert!(m.restored.is_empty());
    assert_eq!(window_frames(&ks), before);
}

#[test]
fn resumed_branch_keeps_the_mapping_and_defers_the_refresh() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    fn hook() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    let (mut ks, mut m, _) = booted(2);
    ks.set_console_refresh(Some(hook));
    let before = window_frames(&ks);

    m.resume_next_capture();
    let to = target(&ks, 1);
    assert_eq!(switch_task(&mut ks, &mut m, to), SwitchOutcome::Resumed);

    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(window_frames(&ks), before);
    assert!(ks.events().any(|ev| ev == LogEvent::TaskResumed(ProcessIndex::ZERO)));
}

#[test]
#[should_panic(expected = "bad saved context")]
fn corrupted_context_halts() {
    let (mut ks, mut m, _) = booted(2);
    ks.contexts[1].esp = 0x9_f000;
    let to = target(&ks, 1);
    switch_task(&mut ks, &mut m, to);
}

#[test]
#[should_panic(expected = "window patch failed")]
fn mis_targeted_patch_halts() {
    let (mut ks, mut m, _) = booted(3);
    // 窓の途中のエントリだけ別スロットを指している
    let page = ks.config().window().first_page().checked_add(5).unwrap();
    let bogus = PhysAddr::new(0x30_0000 + 5 * 4096);
    ks.paging.map_physical_page(page.start_address(), bogus).unwrap();

    let to = target(&ks, 1);
    switch_task(&mut ks, &mut m, to);
}

// ─────────────────────────────────────────────
// 縮退構成（N = 1）
// ─────────────────────────────────────────────

#[test]
fn single_process_never_copies_or_switches() {
    let (mut ks, mut m, outcome) = booted(1);
    assert_eq!(outcome, ForkOutcome::Skipped);
    assert!(m.copies.is_empty());
    assert_eq!(m.captures, 0);
    assert!(ks.contexts().iter().all(|ctx| !ctx.is_seeded()));

    let effects = m.effects();
    let events = ks.events().count();
    let before = window_frames(&ks);
    let only = target(&ks, 0);
    assert_eq!(switch_task(&mut ks, &mut m, only), SwitchOutcome::Unchanged);
    assert_eq!(replicate(&mut ks, &mut m), ForkOutcome::Skipped);
    assert_eq!(ks.process(1), None);

    assert_eq!(m.effects(), effects);
    assert_eq!(ks.events().count(), events);
    assert!(!ks.is_replicated());
    assert_eq!(window_frames(&ks), before);
    assert_eq!(ks.active_process(), ProcessIndex::ZERO);
    assert_eq!(ks.paging().table_count(), 1);
}

#[test]
fn zero_processes_behave_like_one() {
    let (ks, m, outcome) = booted(0);
    assert_eq!(outcome, ForkOutcome::Skipped);
    assert_eq!(ks.config().process_count(), 1);
    assert!(m.copies.is_empty());
}

// ─────────────────────────────────────────────
// 物理メモリ覗き窓
// ─────────────────────────────────────────────

#[test]
fn phys_mem_map_repoints_and_invalidates_the_window() {
    let (mut ks, mut m, _) = booted(2);
    m.invalidated.clear();

    let virt = ks.phys_mem_map(&mut m, PhysAddr::new(0x000a_0010)).unwrap();
    assert_eq!(virt, VirtAddr::new(PHYS_WINDOW.as_u32() + 0x10));
    assert_eq!(ks.paging().translate(virt), Some(PhysAddr::new(0x000a_0010)));
    assert_eq!(m.invalidated.len(), 4);
    assert_eq!(m.unmasked_mutations, 0);
    assert!(ks.window_matches_active_slot());
}

#[test]
fn phys_mem_map_past_the_top_of_memory_changes_nothing() {
    let (mut ks, mut m, _) = booted(2);
    let first = PHYS_WINDOW.page();
    let before = ks.paging().entry(first).unwrap().raw();
    let events = ks.events().count();
    m.invalidated.clear();

    assert_eq!(
        ks.phys_mem_map(&mut m, PhysAddr::new(0xffff_e000)),
        Err(MapError::FrameOutOfRange(PhysAddr::new(0xffff_e000)))
    );

    assert_eq!(ks.paging().entry(first).unwrap().raw(), before);
    assert!(m.invalidated.is_empty());
    assert_eq!(ks.events().count(), events);
}

// ─────────────────────────────────────────────
// 性質テスト
// ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn matching_switch_pair_restores_the_window(n in 2usize..=8, a in 0usize..8, b in 0usize..8) {
        let a = a % n;
        let b = b % n;
        prop_assume!(a != b);

        let (mut ks, mut m, _) = booted(n);
        let start = target(&ks, a);
        switch_task(&mut ks, &mut m, start);
        let before = window_frames(&ks);

        let there = target(&ks, b);
        switch_task(&mut ks, &mut m, there);
        let back = target(&ks, a);
        switch_task(&mut ks, &mut m, back);

        prop_assert_eq!(window_frames(&ks), before);
        prop_assert!(ks.window_matches_active_slot());
    }

    #[test]
    fn window_always_tracks_the_active_slot(n in 2usize..=8, targets in proptest::collection::vec(0usize..8, 1..12)) {
        let (mut ks, mut m, _) = booted(n);
        for raw in targets {
            let to = target(&ks, raw % n);
            switch_task(&mut ks, &mut m, to);
            prop_assert_eq!(ks.active_process(), to);
            prop_assert!(ks.window_matches_active_slot());
        }
        prop_assert_eq!(m.unmasked_mutations, 0);
    }

    #[test]
    fn replicated_slots_equal_the_original_image(n in 2usize..=4, seed in any::<u8>(), start_page in 0u32..255) {
        let image_start = VirtAddr::new(MIB + start_page * 4096 + 4096);
        let cfg = KernelConfig::new(n, image_start, 16 * MIB, InvalidationStrategy::PerPage).unwrap();
        let window: ProcessWindow = cfg.window();
        let mut ks = Box::new(KernelState::new(cfg));
        let mut m = SimMachine::new(n);
        m.fill_pattern(PhysAddr::new(image_start.as_u32()), window.len_bytes(), seed);

        boot(&mut m, &mut ks, PAGING_BASE, None);

        let original = m.read(PhysAddr::new(image_start.as_u32()), window.len_bytes()).to_vec();
        for slot in 1..n as u32 {
            let copy = m.read(PhysAddr::new(image_start.as_u32() + slot * MIB), window.len_bytes());
            prop_assert_eq!(copy, &original[..]);
        }
    }
}
