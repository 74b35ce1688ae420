// src/arch/cpu.rs
// CPU 命令ラッパ（i686）。unsafe は最小限。

use core::arch::asm;

const EFLAGS_IF: u32 = 1 << 9;

pub fn halt_loop() -> ! {
    loop {
        unsafe {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

pub fn interrupts_enabled() -> bool {
    let eflags: u32;
    unsafe {
        asm!("pushfd", "pop {}", out(reg) eflags, options(preserves_flags));
    }
    eflags & EFLAGS_IF != 0
}

pub fn disable_interrupts() {
    unsafe {
        asm!("cli", options(nomem, nostack));
    }
}

pub fn enable_interrupts() {
    unsafe {
        asm!("sti", options(nomem, nostack));
    }
}
