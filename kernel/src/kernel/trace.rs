// kernel/src/kernel/trace.rs
//
// 低コスト trace（観測性）を 1 箇所に集約する。
// - switch_task の経路（skip / capture / patch / resumed）を trace できる
// - fork のスロットコピーと再開を trace できる
//
// 設計方針:
// - logging 側に新 API を要求しない（info / info_u64 / info_hex のみで完結）
// - no_std 前提で heap 確保なし（固定文字列 + u64）
// - feature off のときは引数を捨てるだけ
//
// feature:
// - switch_trace: 経路 trace を有効化
//
// 使い方:
// - sched.rs で trace_switch(...) を呼ぶ
// - fork.rs で trace_fork(...) を呼ぶ

use crate::mem::addr::PhysAddr;

// ★ feature off でもコンパイルできるよう、イベント型は常に存在させる
#[derive(Clone, Copy)]
pub enum SwitchTracePoint {
    Skipped { target: usize },
    Captured { from: usize },
    Patching { from: usize, to: usize },
    Resumed { active: usize },
}

#[derive(Clone, Copy)]
pub enum ForkTracePoint {
    Copy { slot: usize, phys_start: PhysAddr },
    Resumed,
}

/// switch_task の経路 trace
#[inline(always)]
pub fn trace_switch(ev: SwitchTracePoint) {
    #[cfg(feature = "switch_trace")]
    {
        use crate::logging;
        match ev {
            SwitchTracePoint::Skipped { target } => {
                logging::info("switch_trace path=skipped");
                logging::info_u64(" target", target as u64);
            }
            SwitchTracePoint::Captured { from } => {
                logging::info("switch_trace path=captured");
                logging::info_u64(" from", from as u64);
            }
            SwitchTracePoint::Patching { from, to } => {
                logging::info("switch_trace path=patching");
                logging::info_u64(" from", from as u64);
                logging::info_u64(" to", to as u64);
            }
            SwitchTracePoint::Resumed { active } => {
                logging::info("switch_trace path=resumed");
                logging::info_u64(" active", active as u64);
            }
        }
    }
    #[cfg(not(feature = "switch_trace"))]
    {
        let _ = ev;
    }
}

/// fork の経路 trace
#[inline(always)]
pub fn trace_fork(ev: ForkTracePoint) {
    #[cfg(feature = "switch_trace")]
    {
        use crate::logging;
        match ev {
            ForkTracePoint::Copy { slot, phys_start } => {
                logging::info("switch_trace fork=copy");
                logging::info_u64(" slot", slot as u64);
                logging::info_hex(" phys_start", phys_start.as_u32() as u64);
            }
            ForkTracePoint::Resumed => logging::info("switch_trace fork=resumed"),
        }
    }
    #[cfg(not(feature = "switch_trace"))]
    {
        let _ = ev;
    }
}
