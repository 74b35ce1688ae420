// kernel/src/kernel/state_ref.rs
//
// 役割:
// - シェル境界（services）から KernelState にアクセスするための “唯一の入口” を提供する。
//
// やること:
// - KernelState を .boot_shared 上の static に置く（共有窓の外なので全プロセスから同じ実体が見える）。
// - 呼び出し側は with_kernel_state() 経由でのみ &mut KernelState を得る。
//
// ロックと switch_task:
// - switch_task はロックを保持したまま別プロセスへ restore する。
// - restore 先も「ロックを保持したまま capture した」地点（switch_task か fork）なので、
//   そちらがクロージャを抜けた時点でロックは 1 回だけ解放される。
// - 画面再描画フックはロックの外で呼ぶ（services::switch_to, entry::start）。

use spin::Mutex;

use crate::config::KernelConfig;

use super::KernelState;

#[cfg_attr(target_os = "none", link_section = ".boot_shared")]
static KERNEL_STATE: Mutex<Option<KernelState>> = Mutex::new(None);

/// KernelState を作って登録する（entry.rs から 1 回だけ呼ぶ）。既に登録済みなら false。
pub fn install(config: KernelConfig) -> bool {
    let mut slot = KERNEL_STATE.lock();
    if slot.is_some() {
        return false;
    }
    *slot = Some(KernelState::new(config));
    true
}

/// 登録を解除する（テスト用）
#[cfg(test)]
pub fn uninstall() {
    *KERNEL_STATE.lock() = None;
}

/// KernelState を一時的に借用して処理する。未登録なら None。
pub fn with_kernel_state<R>(f: impl FnOnce(&mut KernelState) -> R) -> Option<R> {
    let mut slot = KERNEL_STATE.lock();
    slot.as_mut().map(f)
}
