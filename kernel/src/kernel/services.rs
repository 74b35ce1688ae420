// kernel/src/kernel/services.rs
//
// シェル（外部のスクリプトエンジン）から見えるカーネルの入口。
// - active_process / process_count: 現在のプロセス番号とプロセス数
// - switch_to: 番号を検証して switch_task（不正な番号はログに出して無視）
// - set_console_refresh_hook: switch 後に呼ぶ画面再描画
// - phys_mem_window_base / phys_mem_map: 物理メモリ覗き窓
// - reboot: 8042 経由のリセット（実機のみ）
//
// 実機では shell_abi が extern "C" のシンボルとして同じものを公開する。

use crate::arch::Machine;
use crate::logging;
use crate::mem::addr::{PhysAddr, VirtAddr};
use crate::mm::MapError;

use super::sched::{switch_task, SwitchOutcome};
use super::state_ref::with_kernel_state;
use super::ProcessIndex;

/// 未登録なら None
pub fn active_process() -> Option<ProcessIndex> {
    with_kernel_state(|ks| ks.active_process())
}

pub fn process_count() -> Option<usize> {
    with_kernel_state(|ks| ks.config().process_count())
}

/// 不正な番号・未登録なら None（何もしない）
///
/// Resumed で戻ってきた場合、KernelState のロックを解放してから再描画フックを呼ぶ。
/// フックの中から services を呼んでもよい。
pub fn switch_to<M: Machine>(m: &mut M, raw_index: usize) -> Option<SwitchOutcome> {
    let (outcome, hook) = with_kernel_state(|ks| {
        let Some(target) = ks.process(raw_index) else {
            logging::error("services: switch_to ignored; no such process");
            logging::info_u64(" requested", raw_index as u64);
            logging::info_u64(" process_count", ks.config().process_count() as u64);
            return None;
        };
        let outcome = switch_task(ks, m, target);
        Some((outcome, ks.console_refresh_hook()))
    })
    .flatten()?;

    if outcome == SwitchOutcome::Resumed {
        if let Some(hook) = hook {
            hook();
        }
    }
    Some(outcome)
}

pub fn set_console_refresh_hook(hook: fn()) -> bool {
    with_kernel_state(|ks| ks.set_console_refresh(Some(hook))).is_some()
}

pub fn phys_mem_window_base() -> Option<VirtAddr> {
    with_kernel_state(|ks| ks.phys_window_base()).flatten()
}

pub fn phys_mem_map<M: Machine>(m: &mut M, phys: PhysAddr) -> Result<VirtAddr, MapError> {
    with_kernel_state(|ks| ks.phys_mem_map(m, phys)).unwrap_or(Err(MapError::PhysWindowUninitialized))
}

#[cfg(target_os = "none")]
pub fn reboot() -> ! {
    logging::info("services: reboot requested");
    crate::arch::reset::reboot()
}

#[cfg(target_os = "none")]
pub mod shell_abi {
    use spin::Mutex;

    use crate::arch::paging::X86Machine;
    use crate::mem::addr::PhysAddr;

    /// シェルが登録する再描画関数（全プロセス共通なので共有窓の外に置く）
    #[link_section = ".boot_shared"]
    static SHELL_REFRESH: Mutex<Option<extern "C" fn()>> = Mutex::new(None);

    fn call_shell_refresh() {
        let hook = *SHELL_REFRESH.lock();
        if let Some(hook) = hook {
            hook();
        }
    }

    #[no_mangle]
    pub extern "C" fn dt_active_process() -> u32 {
        super::active_process().map_or(0, |p| p.as_usize() as u32)
    }

    #[no_mangle]
    pub extern "C" fn dt_switch_task(index: u32) {
        let _ = super::switch_to(&mut X86Machine, index as usize);
    }

    #[no_mangle]
    pub extern "C" fn dt_set_console_refresh_hook(hook: extern "C" fn()) {
        *SHELL_REFRESH.lock() = Some(hook);
        super::set_console_refresh_hook(call_shell_refresh);
    }

    #[no_mangle]
    pub extern "C" fn dt_phys_mem_window_base() -> u32 {
        super::phys_mem_window_base().map_or(0, |v| v.as_u32())
    }

    /// 失敗したら 0
    #[no_mangle]
    pub extern "C" fn dt_phys_mem_map(phys: u32) -> u32 {
        super::phys_mem_map(&mut X86Machine, PhysAddr::new(phys)).map_or(0, |v| v.as_u32())
    }

    #[no_mangle]
    pub extern "C" fn dt_reboot() -> ! {
        super::reboot()
    }
}
