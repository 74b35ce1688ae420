// kernel/src/kernel/fork.rs
//
// 役割:
// - ページング有効化後に 1 回だけ、この場所でコンテキストを capture し、
//   プロセス 1..N の保存コンテキストをその値で seed する。
// - capture の直後に共有窓（image_start .. 2MiB）を
//   スロット 1..N の物理位置（image_start + k MiB）へコピーする。
//   capture 前に退避されたこのフレームの値は、コピーにすべて含まれる。
//
// 再開:
// - 各プロセスは最初の switch_task で、この関数の capture 地点から Resumed として走り出す。
//   スタックは窓ごとコピー済みなので、このフレームから普通に return できる。
//
// やらないこと:
// - process_count < 2 のときは何もしない（コピーもコンテキストも作らない）。

use crate::arch::{Continuation, Machine, SavedContext};
use crate::logging;
use crate::mem::addr::PhysAddr;
use crate::mem::layout::SLOT_STRIDE;

use super::trace::{trace_fork, ForkTracePoint};
use super::{KernelState, LogEvent, ProcessIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkOutcome {
    /// プロセスが 1 つしかない構成
    Skipped,
    /// 複製した（プロセス 0 側）。copies はコピーしたスロット数。
    Forked { copies: usize },
    /// 最初の switch_task で、複製されたプロセスとして戻ってきた。
    /// 呼び出し側は console_refresh_hook() を実行すること。
    Resumed,
    /// 2 回目以降の呼び出し
    AlreadyDone,
}

pub fn replicate<M: Machine>(ks: &mut KernelState, m: &mut M) -> ForkOutcome {
    if !ks.config.is_multiprocess() {
        logging::info("fork: single process configuration; nothing to replicate");
        return ForkOutcome::Skipped;
    }
    if ks.replicated {
        return ForkOutcome::AlreadyDone;
    }
    if !ks.paging_enabled {
        logging::error("fork: replicate called before paging was enabled");
        panic!("replicate: paging not enabled");
    }

    let window = ks.config.window();
    let count = ks.config.process_count();
    let len = window.len_bytes();

    let mut seed = SavedContext::empty();
    // Safety: 複製されたプロセスは窓ごとコピーされたスタックでこのフレームに戻ってくる
    match unsafe { m.capture(&mut seed) } {
        Continuation::Captured => {}
        Continuation::Resumed => {
            trace_fork(ForkTracePoint::Resumed);
            return ForkOutcome::Resumed;
        }
    }

    for slot in 1..count {
        let phys_start = PhysAddr::new(window.start().as_u32() + slot as u32 * SLOT_STRIDE);
        trace_fork(ForkTracePoint::Copy { slot, phys_start });
        // Safety: スロット k は identity map 済みで、まだどのプロセスの窓にも使われていない
        unsafe { m.copy_to_physical(phys_start, window.start(), len) };
        ks.push_event(LogEvent::SlotReplicated {
            slot: ProcessIndex(slot),
            phys_start,
            bytes: len,
        });
    }

    for ctx in ks.contexts[1..count].iter_mut() {
        *ctx = seed;
    }
    ks.replicated = true;
    ks.push_event(LogEvent::ContextsSeeded { count: count - 1 });

    logging::info_u64("fork: replicated slots", (count - 1) as u64);
    ForkOutcome::Forked { copies: count - 1 }
}
