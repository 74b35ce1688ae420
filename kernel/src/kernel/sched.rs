// kernel/src/kernel/sched.rs
//
// 協調スケジューラ: switch_task(target)
//
// 手順:
// 1. target == active、またはプロセス 1 つの構成なら何もしない。
// 2. 実行中プロセスのコンテキストを capture する。
//    - Captured: 3 へ進む（往路）。
//    - Resumed: 別プロセスの switch_task がこのプロセスを restore した（復路）。
//      そのまま return する。画面再描画フックは呼び出し側が KernelState の
//      ロックを手放してから呼ぶ（services::switch_to）。
// 3. active = target。
// 4. 共有窓の PTE を slot_base(from) → slot_base(target) にずらす。
// 5. 書き換えた範囲のアドレス変換キャッシュを捨てる。
// 6. target のコンテキストを restore する（実機では戻らない）。
//
// 2〜6 は割り込み禁止区間の中で行う。4〜6 は Machine::remap_and_restore が
// 共有窓の外のスタック上で一気に実行する。

use crate::arch::{Continuation, Machine};
use crate::logging;
use crate::mm::window::WindowPatch;

use super::trace::{trace_switch, SwitchTracePoint};
use super::{KernelState, LogEvent, ProcessIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// 何もしなかった（同じプロセス、またはプロセス 1 つの構成）
    Unchanged,
    /// 切り替えた先から、いずれ別プロセスによってここへ戻ってきた。
    /// 呼び出し側は console_refresh_hook() を実行すること。
    Resumed,
    /// restore を実行したが制御が戻ってきた（シミュレーションのみ）
    Transferred,
}

pub fn switch_task<M: Machine>(ks: &mut KernelState, m: &mut M, target: ProcessIndex) -> SwitchOutcome {
    // 何もしない経路では KernelState に一切書き込まない
    if !ks.config.is_multiprocess() || target == ks.active {
        trace_switch(SwitchTracePoint::Skipped { target: target.0 });
        return SwitchOutcome::Unchanged;
    }
    if target.0 >= ks.config.process_count() || !ks.replicated {
        logging::error("sched: switch_task target has no replicated slot");
        logging::info_u64(" target", target.0 as u64);
        panic!("switch_task: target {} is not runnable", target.0);
    }

    let window = ks.config.window();
    let invalidation = ks.config.invalidation();
    let frame_limit = ks.frame_limit();

    let outcome = m.without_interrupts(|m| {
        let from = ks.active;

        // Safety: このフレームは restore されるまで return しない（restore 後は Resumed で抜ける）
        match unsafe { m.capture(&mut ks.contexts[from.0]) } {
            Continuation::Captured => {}
            Continuation::Resumed => return SwitchOutcome::Resumed,
        }
        trace_switch(SwitchTracePoint::Captured { from: from.0 });

        if let Err(err) = ks.contexts[target.0].validate(window) {
            logging::error("sched: saved context of the target is corrupted");
            logging::info_u64(" target", target.0 as u64);
            panic!("switch_task: bad saved context: {:?}", err);
        }

        ks.active = target;
        ks.push_event(LogEvent::TaskSwitched { from, to: target });
        ks.push_event(LogEvent::WindowPatched {
            from_slot: from.0,
            to_slot: target.0,
            pages: window.page_count(),
        });
        trace_switch(SwitchTracePoint::Patching { from: from.0, to: target.0 });

        let patch = WindowPatch::new(window, from.0, target.0, frame_limit);
        // Safety: 割り込み禁止区間の中。paging / contexts は KernelState ごと .boot_shared にある
        unsafe { m.remap_and_restore(&mut ks.paging, patch, invalidation, &ks.contexts[target.0]) };
        SwitchOutcome::Transferred
    });

    if outcome == SwitchOutcome::Resumed {
        trace_switch(SwitchTracePoint::Resumed { active: ks.active.0 });
        ks.push_event(LogEvent::TaskResumed(ks.active));
    }
    outcome
}
