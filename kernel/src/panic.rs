// kernel/src/panic.rs
//
// no_std カーネル用 panic ハンドラ（target_os = "none" のみ）。
// - 挙動は「割り込み禁止 → 緊急出力（ロック無し） → CPU 停止」に固定する。
// - 窓の付け替え途中で落ちることがあるので、VGA シャドウや logging は使わない。
// - 二重 panic は即停止。
// - message の文字列化は行わない。

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::port::{HwPorts, PortIo};
use crate::arch::{self, cpu};

static PANIC_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

const DEBUGCON: u16 = 0xE9;
const COM1_DATA: u16 = 0x3F8;
const COM1_LSR: u16 = 0x3FD;

// ─────────────────────────────────────────────
// 緊急出力（ロック無し）
// - QEMU debugcon(0xE9) と COM1(0x3F8)
// ─────────────────────────────────────────────

fn emergency_write_byte(b: u8) {
    let mut ports = HwPorts;

    ports.write_u8(DEBUGCON, b);

    for _ in 0..10_000 {
        if (ports.read_u8(COM1_LSR) & 0x20) != 0 {
            break;
        }
    }
    ports.write_u8(COM1_DATA, b);
}

fn emergency_write_str(s: &str) {
    for b in s.bytes() {
        emergency_write_byte(b);
    }
}

fn emergency_write_hex_u32(v: u32) {
    emergency_write_str("0x");
    for i in (0..8).rev() {
        let n = ((v >> (i * 4)) & 0xF) as u8;
        let c = if n < 10 { b'0' + n } else { b'a' + (n - 10) };
        emergency_write_byte(c);
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cpu::disable_interrupts();

    if PANIC_IN_PROGRESS.swap(true, Ordering::AcqRel) {
        emergency_write_str("[PANIC] re-entered => halt\n");
        return arch::halt_loop();
    }

    emergency_write_str("[PANIC] kernel panic\n");

    let _ = info.message();

    if let Some(loc) = info.location() {
        emergency_write_str("[PANIC] location line=");
        emergency_write_hex_u32(loc.line());
        emergency_write_str(" col=");
        emergency_write_hex_u32(loc.column());
        emergency_write_str("\n");
    } else {
        emergency_write_str("[PANIC] location unknown\n");
    }

    arch::halt_loop()
}
