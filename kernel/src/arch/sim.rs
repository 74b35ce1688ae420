// kernel/src/arch/sim.rs
//
// テスト用の Machine。
// - 物理メモリは Vec<u8>（identity map 範囲ぶん）。
// - CR3 設定・invlpg・flush・コピー・capture/restore をすべて記録するだけ。
// - restore は実機と違って戻ってくる（= Transferred として観測できる）。
// - resume_next_capture() を呼ぶと、次の capture が Resumed を返す
//   （別プロセスから切り替えられて戻ってきた状況の再現）。

use std::vec;
use std::vec::Vec;

use crate::arch::{Continuation, Machine, SavedContext};
use crate::config::InvalidationStrategy;
use crate::mem::addr::{PhysAddr, VirtAddr, VirtPage};
use crate::mem::layout::{WINDOW_CEILING, MIB};
use crate::mm::window::{commit_window_patch, WindowPatch};
use crate::mm::PagingStructures;

/// seed されたかどうかの見分けがつくよう、eip は 0 以外から始める
const SIM_CODE_BASE: u32 = 0x0010_2000;

pub struct SimMachine {
    pub phys: Vec<u8>,
    pub cr3: Option<PhysAddr>,
    pub interrupts_enabled: bool,
    pub invalidated: Vec<VirtPage>,
    pub full_flushes: usize,
    pub copies: Vec<(PhysAddr, VirtAddr, u32)>,
    pub captures: usize,
    pub restored: Vec<SavedContext>,
    /// 割り込み許可のまま TLB / 窓に触った回数（0 でなければならない）
    pub unmasked_mutations: usize,
    resume_next: bool,
}

impl SimMachine {
    /// (process_count + 1) MiB の物理メモリを持つマシン
    pub fn new(process_count: usize) -> Self {
        SimMachine {
            phys: vec![0; (process_count + 1) * MIB as usize],
            cr3: None,
            interrupts_enabled: true,
            invalidated: Vec::new(),
            full_flushes: 0,
            copies: Vec::new(),
            captures: 0,
            restored: Vec::new(),
            unmasked_mutations: 0,
            resume_next: false,
        }
    }

    pub fn resume_next_capture(&mut self) {
        self.resume_next = true;
    }

    /// 物理メモリの一部を決まったパターンで埋める
    pub fn fill_pattern(&mut self, start: PhysAddr, len: u32, seed: u8) {
        let start = start.as_u32() as usize;
        for (i, byte) in self.phys[start..start + len as usize].iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(31).wrapping_add(seed);
        }
    }

    pub fn read(&self, start: PhysAddr, len: u32) -> &[u8] {
        let start = start.as_u32() as usize;
        &self.phys[start..start + len as usize]
    }

    /// ハードウェアへの作用の回数（invlpg, flush, capture, restore）。no-op 判定用。
    pub fn effects(&self) -> (usize, usize, usize, usize) {
        (
            self.invalidated.len(),
            self.full_flushes,
            self.captures,
            self.restored.len(),
        )
    }
}

impl Machine for SimMachine {
    unsafe fn activate_paging(&mut self, directory: PhysAddr) {
        self.cr3 = Some(directory);
    }

    fn invalidate_page(&mut self, page: VirtPage) {
        if self.interrupts_enabled {
            self.unmasked_mutations += 1;
        }
        self.invalidated.push(page);
    }

    fn flush_tlb(&mut self) {
        if self.interrupts_enabled {
            self.unmasked_mutations += 1;
        }
        self.full_flushes += 1;
    }

    fn without_interrupts<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let was_enabled = self.interrupts_enabled;
        self.interrupts_enabled = false;
        let ret = f(self);
        self.interrupts_enabled = was_enabled;
        ret
    }

    unsafe fn copy_to_physical(&mut self, dst: PhysAddr, src: VirtAddr, len: u32) {
        // replicate はプロセス 0 の identity map 上で走るので src の仮想 = 物理
        let src_start = src.as_u32() as usize;
        let dst_start = dst.as_u32() as usize;
        self.phys
            .copy_within(src_start..src_start + len as usize, dst_start);
        self.copies.push((dst, src, len));
    }

    unsafe fn capture(&mut self, ctx: &mut SavedContext) -> Continuation {
        if self.resume_next {
            self.resume_next = false;
            return Continuation::Resumed;
        }

        self.captures += 1;
        let label = self.captures as u32;
        *ctx = SavedContext {
            ebx: label,
            esi: 0,
            edi: 0,
            ebp: WINDOW_CEILING - 0x20,
            esp: WINDOW_CEILING - 0x40,
            eip: SIM_CODE_BASE + label * 0x10,
        };
        Continuation::Captured
    }

    unsafe fn remap_and_restore(
        &mut self,
        pg: &mut PagingStructures,
        patch: WindowPatch,
        invalidation: InvalidationStrategy,
        ctx: &SavedContext,
    ) {
        if self.interrupts_enabled {
            self.unmasked_mutations += 1;
        }
        commit_window_patch(self, pg, patch, invalidation);
        self.restored.push(*ctx);
    }
}
