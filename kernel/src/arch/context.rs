// kernel/src/arch/context.rs
//
// 保存コンテキスト。
// - cdecl の callee-saved レジスタ + esp + 再開アドレスだけを持つ（setjmp 相当）。
// - 再開すると capture の呼び出し元に「2 回目の return」として戻る。
// - eip == 0 は「まだ一度も保存されていない」。
//
// 実機の capture / restore はこのファイルの global_asm! が実体。

use crate::mem::addr::VirtAddr;
use crate::mem::layout::ProcessWindow;

/// capture の結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continuation {
    /// 今保存した。処理を先へ進める。
    Captured,
    /// 以前保存したコンテキストが restore されて戻ってきた。
    Resumed,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub ebx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextError {
    /// 一度も capture / seed されていない
    NotSeeded,
    /// スタックポインタが共有窓の外を指している
    StackOutsideWindow(VirtAddr),
}

impl SavedContext {
    pub const fn empty() -> Self {
        SavedContext {
            ebx: 0,
            esi: 0,
            edi: 0,
            ebp: 0,
            esp: 0,
            eip: 0,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.eip != 0
    }

    /// restore してよいかの最低限の検査。
    ///
    /// スタックは必ず共有窓の中にある（窓ごとスロットが切り替わるため）。
    pub fn validate(&self, window: ProcessWindow) -> Result<(), ContextError> {
        if !self.is_seeded() {
            return Err(ContextError::NotSeeded);
        }
        let esp = VirtAddr::new(self.esp);
        if esp <= window.start() || esp > window.end() {
            return Err(ContextError::StackOutsideWindow(esp));
        }
        Ok(())
    }
}

#[cfg(target_os = "none")]
extern "C" {
    /// 0 = 保存した、1 = restore されて戻ってきた
    pub fn dt_context_capture(ctx: *mut SavedContext) -> u32;
    pub fn dt_context_restore(ctx: *const SavedContext) -> !;
}

// SavedContext のオフセット: ebx=0 esi=4 edi=8 ebp=12 esp=16 eip=20
#[cfg(target_os = "none")]
core::arch::global_asm!(
    ".global dt_context_capture",
    "dt_context_capture:",
    "    mov eax, [esp + 4]",
    "    mov [eax + 0], ebx",
    "    mov [eax + 4], esi",
    "    mov [eax + 8], edi",
    "    mov [eax + 12], ebp",
    "    lea ecx, [esp + 4]",
    "    mov [eax + 16], ecx",
    "    mov ecx, [esp]",
    "    mov [eax + 20], ecx",
    "    xor eax, eax",
    "    ret",
    "",
    ".global dt_context_restore",
    "dt_context_restore:",
    "    mov eax, [esp + 4]",
    "    mov ebx, [eax + 0]",
    "    mov esi, [eax + 4]",
    "    mov edi, [eax + 8]",
    "    mov ebp, [eax + 12]",
    "    mov ecx, [eax + 20]",
    "    mov esp, [eax + 16]",
    "    mov eax, 1",
    "    jmp ecx",
);
