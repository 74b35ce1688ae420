// kernel/src/arch/paging.rs
//
// 役割:
// - Machine の実機（i686, 非 PAE）実装。
// - CR3 / CR0.PG / invlpg の操作と、switch_task の「窓付け替え → 復元」を
//   切替用スタック上で実行する仕組みをまとめる。
//
// 切替用スタックが必要な理由:
// - 窓の PTE を書き換えた瞬間から、今のスタック（窓の中）は別プロセスのスタックに見える。
// - なので付け替えと復元は .boot_shared 上の専用スタックで行い、その間は
//   窓の中のメモリに一切触れない。要求（SwitchRequest）も .boot_shared に置く。

use core::arch::asm;
use core::ptr::{addr_of, addr_of_mut};

use crate::arch::context::{dt_context_capture, dt_context_restore};
use crate::arch::{cpu, Continuation, Machine, SavedContext};
use crate::config::InvalidationStrategy;
use crate::mem::addr::{PhysAddr, VirtAddr, VirtPage};
use crate::mm::window::{commit_window_patch, WindowPatch};
use crate::mm::PagingStructures;

const CR0_PG: u32 = 1 << 31;

const SWITCH_STACK_SIZE: usize = 4096;

#[repr(C, align(16))]
struct SwitchStack([u8; SWITCH_STACK_SIZE]);

#[derive(Clone, Copy)]
struct SwitchRequest {
    paging: *mut PagingStructures,
    patch: WindowPatch,
    invalidation: InvalidationStrategy,
    ctx: *const SavedContext,
}

#[link_section = ".boot_shared"]
static mut SWITCH_STACK: SwitchStack = SwitchStack([0; SWITCH_STACK_SIZE]);

#[link_section = ".boot_shared"]
static mut SWITCH_REQUEST: Option<SwitchRequest> = None;

/// 実機の Machine（状態を持たない）
#[derive(Clone, Copy, Debug, Default)]
pub struct X86Machine;

/// identity map 上の static の物理アドレス（= 仮想アドレス）
pub fn physical_address_of<T>(value: &T) -> PhysAddr {
    PhysAddr::new(value as *const T as usize as u32)
}

impl Machine for X86Machine {
    unsafe fn activate_paging(&mut self, directory: PhysAddr) {
        asm!("mov cr3, {}", in(reg) directory.as_u32(), options(nostack, preserves_flags));

        let mut cr0: u32;
        asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        cr0 |= CR0_PG;
        asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
    }

    fn invalidate_page(&mut self, page: VirtPage) {
        let addr = page.start_address().as_u32();
        unsafe {
            asm!("invlpg [{}]", in(reg) addr, options(nostack, preserves_flags));
        }
    }

    fn flush_tlb(&mut self) {
        unsafe {
            asm!(
                "mov {tmp}, cr3",
                "mov cr3, {tmp}",
                tmp = out(reg) _,
                options(nostack, preserves_flags),
            );
        }
    }

    fn without_interrupts<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let was_enabled = cpu::interrupts_enabled();
        if was_enabled {
            cpu::disable_interrupts();
        }
        let ret = f(self);
        if was_enabled {
            cpu::enable_interrupts();
        }
        ret
    }

    unsafe fn copy_to_physical(&mut self, dst: PhysAddr, src: VirtAddr, len: u32) {
        // dst は identity map 範囲なので仮想 = 物理
        core::ptr::copy_nonoverlapping(
            src.as_u32() as usize as *const u8,
            dst.as_u32() as usize as *mut u8,
            len as usize,
        );
    }

    // 呼び出し元のフレームに展開されないと、再開時に戻り先のフレームが壊れている。
    #[inline(always)]
    unsafe fn capture(&mut self, ctx: &mut SavedContext) -> Continuation {
        match dt_context_capture(ctx as *mut SavedContext) {
            0 => Continuation::Captured,
            _ => Continuation::Resumed,
        }
    }

    unsafe fn remap_and_restore(
        &mut self,
        pg: &mut PagingStructures,
        patch: WindowPatch,
        invalidation: InvalidationStrategy,
        ctx: &SavedContext,
    ) {
        *addr_of_mut!(SWITCH_REQUEST) = Some(SwitchRequest {
            paging: pg as *mut PagingStructures,
            patch,
            invalidation,
            ctx: ctx as *const SavedContext,
        });

        let top = addr_of!(SWITCH_STACK) as usize + SWITCH_STACK_SIZE;
        asm!(
            "mov esp, {top}",
            "call {entry}",
            top = in(reg) top,
            entry = sym switch_on_private_stack,
            options(noreturn),
        );
    }
}

/// 切替用スタック上で実行される後半。ここから先は窓の中のメモリを読まない。
extern "C" fn switch_on_private_stack() -> ! {
    let request = unsafe { (*addr_of_mut!(SWITCH_REQUEST)).take() };
    let Some(request) = request else {
        panic!("switch_on_private_stack: no pending request");
    };

    let mut machine = X86Machine;
    unsafe {
        commit_window_patch(&mut machine, &mut *request.paging, request.patch, request.invalidation);
        dt_context_restore(request.ctx)
    }
}
