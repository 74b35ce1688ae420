// kernel/src/main.rs
//
// ブートイメージの入口（kernel-image feature 時のみビルドされる）。
// - Multiboot ローダから 32bit プロテクトモード・ページング無効で _start に飛んでくる前提。
// - 初期スタックは .bss（共有窓の中）に置く。fork で窓ごとコピーされ、
//   各プロセスはそれぞれのスロットの同じ仮想アドレスでこのスタックを使い続ける。
// - 本来のシェル（スクリプトエンジン）はこのリポジトリの外。ここでは
//   プロセスを順番に 1 周ずつ回すだけの簡易シェルを渡す。

#![no_std]
#![no_main]

use dt_kernel::arch::paging::X86Machine;
use dt_kernel::kernel::{entry, services};
use dt_kernel::logging;

const BOOT_STACK_SIZE: usize = 128 * 1024;

const DEMO_ROUNDS: u64 = 3;

#[repr(C, align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

#[no_mangle]
static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

// Multiboot v1 ヘッダ（QEMU -kernel / GRUB がこれを見て 32bit で _start に飛ぶ）
core::arch::global_asm!(
    ".section .multiboot, \"a\"",
    ".align 4",
    ".long 0x1BADB002",
    ".long 0",
    ".long -0x1BADB002",
    ".text",
    ".global _start",
    "_start:",
    "    cli",
    "    lea esp, [BOOT_STACK + {size}]",
    "    xor ebp, ebp",
    "    call {main}",
    "2:  hlt",
    "    jmp 2b",
    size = const BOOT_STACK_SIZE,
    main = sym kernel_main,
);

extern "C" fn kernel_main() -> ! {
    entry::start(round_robin_shell)
}

/// 各プロセスが自分の番号を出して次のプロセスへ譲る。round はプロセスごとの .bss にある。
fn round_robin_shell() -> ! {
    static mut ROUND: u64 = 0;

    let mut machine = X86Machine;
    loop {
        let (Some(active), Some(count)) = (services::active_process(), services::process_count())
        else {
            logging::error("shell: kernel state not installed");
            break;
        };
        let round = unsafe {
            ROUND += 1;
            ROUND
        };
        logging::info_u64("shell: running process", active.as_usize() as u64);
        logging::info_u64(" round", round);
        if round > DEMO_ROUNDS {
            break;
        }

        let _ = services::switch_to(&mut machine, (active.as_usize() + 1) % count);
    }

    logging::info("shell: demo finished; halting");
    dt_kernel::arch::halt_loop()
}
