// kernel/src/kernel/entry.rs
//
// dt-kernel: kernel entry glue
//
// 役割:
// - ブート手順を 1 か所にまとめる:
//   構成の検証 → ページテーブル構築 → ページング有効化 → 物理メモリ覗き窓
//   → fork → services へ登録 → シェルへ移譲
//
// やること:
// - boot(): Machine に依存しない手順本体（テストからも呼ぶ）
// - start(): 実機でのリンカシンボル・静的領域の解決と、シェルへの移譲
//
// やらないこと:
// - switch_task を自分から呼ぶこと（切替は常にシェル側が決める）

use crate::arch::Machine;
use crate::logging;
use crate::mem::addr::{PhysAddr, VirtAddr};

use super::fork::{replicate, ForkOutcome};
use super::KernelState;

/// ページテーブル構築から fork まで。
///
/// - paging_base: ks のページング構造が置かれている物理アドレス
/// - phys_window: 物理メモリ覗き窓の仮想アドレス（None なら作らない）
///
/// 戻り値はプロセスごとに異なる（プロセス 0 は Forked / Skipped、他は Resumed）。
/// Resumed のときは呼び出し側がロックの外で console_refresh_hook() を呼ぶ。
pub fn boot<M: Machine>(
    m: &mut M,
    ks: &mut KernelState,
    paging_base: PhysAddr,
    phys_window: Option<VirtAddr>,
) -> ForkOutcome {
    logging::info_u64("entry: process_count", ks.config().process_count() as u64);
    logging::info_hex("entry: image_start", ks.config().window().start().as_u32() as u64);

    ks.build_page_tables(paging_base);

    // Safety: paging_base は ks.paging() の実際の物理位置（呼び出し側の責務）
    unsafe { ks.enable_paging(m) };

    if let Some(base) = phys_window {
        // 覗き窓はシェルの補助機能なので、無くても起動は続ける
        if ks.init_phys_window(m, base).is_err() {
            logging::error("entry: physical memory window unavailable");
            logging::info_hex(" base", base.as_u32() as u64);
        }
    }

    ks.set_console_refresh(Some(logging::refresh_console));

    let outcome = replicate(ks, m);
    ks.debug_check_invariants();
    outcome
}

// リンカスクリプトが定義するシンボル
#[cfg(target_os = "none")]
mod image {
    extern "C" {
        /// 共有窓の先頭（.data の先頭）
        pub static _data_start: u8;
        /// 物理メモリ覗き窓として予約した 4 ページ（共有窓より下）
        pub static _phys_mem_window: u8;
    }
}

/// 搭載メモリ量の検出はしない。QEMU 既定の 128MiB より小さい値を決め打ちにする。
#[cfg(target_os = "none")]
const ASSUMED_PHYSICAL_MEMORY: u32 = 32 * crate::mem::layout::MIB;

#[cfg(target_os = "none")]
fn report_config_error(err: crate::config::ConfigError) {
    use crate::config::ConfigError;

    logging::error("entry: invalid kernel configuration");
    match err {
        ConfigError::TooManyProcesses { requested, max } => {
            logging::info_u64(" requested_processes", requested as u64);
            logging::info_u64(" max_processes", max as u64);
        }
        ConfigError::ImageStartMisaligned(start) => {
            logging::info_hex(" misaligned_image_start", start.as_u32() as u64);
        }
        ConfigError::ImageStartOutsideWindow(start) => {
            logging::info_hex(" image_start_outside_window", start.as_u32() as u64);
        }
        ConfigError::InsufficientMemory { required_bytes, available_bytes } => {
            logging::info_u64(" required_bytes", required_bytes as u64);
            logging::info_u64(" available_bytes", available_bytes as u64);
        }
    }
}

/// 実機の入口（main から呼ばれる）。boot 後、全プロセスが shell に入る。
#[cfg(target_os = "none")]
pub fn start(shell: fn() -> !) -> ! {
    use core::ptr::addr_of;

    use crate::arch::paging::{physical_address_of, X86Machine};
    use crate::config::{InvalidationStrategy, KernelConfig, DEFAULT_PROCESS_COUNT};

    use super::state_ref;

    logging::init();
    logging::info("kernel::start()");

    let image_start = VirtAddr::new(unsafe { addr_of!(image::_data_start) } as usize as u32);
    let config = match KernelConfig::new(
        DEFAULT_PROCESS_COUNT,
        image_start,
        ASSUMED_PHYSICAL_MEMORY,
        InvalidationStrategy::default_for_build(),
    ) {
        Ok(config) => config,
        Err(err) => {
            report_config_error(err);
            panic!("invalid kernel configuration");
        }
    };

    if !state_ref::install(config) {
        logging::error("entry: kernel state installed twice");
        panic!("kernel state installed twice");
    }

    let phys_window = VirtAddr::new(unsafe { addr_of!(image::_phys_mem_window) } as usize as u32);
    let mut machine = X86Machine;
    let booted = state_ref::with_kernel_state(|ks| {
        let base = physical_address_of(ks.paging());
        let outcome = boot(&mut machine, ks, base, Some(phys_window));
        (outcome, ks.console_refresh_hook())
    });

    match booted {
        Some((ForkOutcome::Resumed, hook)) => {
            logging::info("entry: replicated process started");
            if let Some(hook) = hook {
                hook();
            }
        }
        Some(_) => {
            state_ref::with_kernel_state(|ks| ks.dump_events());
        }
        None => {
            logging::error("entry: kernel state disappeared during boot");
            panic!("kernel state missing");
        }
    }

    shell()
}
