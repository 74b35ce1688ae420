// kernel/src/mm/window.rs
//
// 共有窓（データ + スタック）の付け替え。
// - 窓の各 PTE について new_frame = old_frame - old_slot_base + new_slot_base。
// - 書き換える前に全エントリを検証し、1 つでも期待とずれていれば何も書かずにエラーを返す。
// - 書き換えた範囲の TLB 無効化は commit_window_patch がまとめて行う。

use crate::arch::Machine;
use crate::config::InvalidationStrategy;
use crate::logging;
use crate::mem::addr::{PhysFrame, VirtPage};
use crate::mem::layout::{slot_base, ProcessWindow};
use crate::mm::PagingStructures;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// 窓のページにテーブルが無い、または not-present
    NotMapped(VirtPage),
    /// 現在のフレームが「付け替え元スロットの identity + offset」になっていない
    FrameMismatch {
        page: VirtPage,
        found: PhysFrame,
        expected: PhysFrame,
    },
    /// 付け替え先が identity map 範囲の外に出る
    OutOfRange(VirtPage),
}

/// 書き換えた窓の範囲
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchedRange {
    pub first: VirtPage,
    pub count: u32,
}

impl PatchedRange {
    pub fn pages(&self) -> impl Iterator<Item = VirtPage> {
        let first = self.first.number;
        (first..first + self.count).map(VirtPage::from_index)
    }
}

/// 窓をスロット from からスロット to に付け替える要求。Copy なので
/// 切替用スタックへそのまま持ち出せる。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPatch {
    window: ProcessWindow,
    from: usize,
    to: usize,
    frame_limit: u32,
}

impl WindowPatch {
    /// frame_limit: identity map 済みのフレーム数（これ以上のフレームは指せない）
    pub fn new(window: ProcessWindow, from: usize, to: usize, frame_limit: u32) -> Self {
        WindowPatch {
            window,
            from,
            to,
            frame_limit,
        }
    }

    pub fn from_slot(&self) -> usize {
        self.from
    }

    pub fn to_slot(&self) -> usize {
        self.to
    }

    fn target_frame(&self, page: VirtPage, current: PhysFrame) -> Result<PhysFrame, PatchError> {
        let from_base = slot_base(self.from);
        let expected = from_base
            .checked_add(page.number)
            .ok_or(PatchError::OutOfRange(page))?;
        if current != expected {
            return Err(PatchError::FrameMismatch {
                page,
                found: current,
                expected,
            });
        }

        let moved = current
            .rebase(from_base, slot_base(self.to))
            .ok_or(PatchError::OutOfRange(page))?;
        if moved.number >= self.frame_limit {
            return Err(PatchError::OutOfRange(page));
        }
        Ok(moved)
    }

    /// 検証してから書き換える。エラー時は 1 エントリも変更しない。
    pub fn apply(&self, pg: &mut PagingStructures) -> Result<PatchedRange, PatchError> {
        for page in self.window.pages() {
            let entry = pg.entry(page).ok_or(PatchError::NotMapped(page))?;
            if !entry.is_present() {
                return Err(PatchError::NotMapped(page));
            }
            self.target_frame(page, entry.frame())?;
        }

        for page in self.window.pages() {
            if let Some(entry) = pg.entry_mut(page) {
                let moved = self.target_frame(page, entry.frame())?;
                entry.set_frame(moved);
            }
        }

        Ok(PatchedRange {
            first: self.window.first_page(),
            count: self.window.page_count(),
        })
    }
}

/// 書き換えた範囲のアドレス変換キャッシュを捨てる。
pub fn invalidate<M: Machine>(m: &mut M, range: PatchedRange, strategy: InvalidationStrategy) {
    match strategy {
        InvalidationStrategy::PerPage => {
            for page in range.pages() {
                m.invalidate_page(page);
            }
        }
        InvalidationStrategy::FullFlush => m.flush_tlb(),
    }
}

/// 窓の付け替え + TLB 無効化。どちらも割り込み禁止区間の中で呼ぶこと。
///
/// 付け替えに失敗した場合は復旧手段が無いので panic（= 停止）する。
pub fn commit_window_patch<M: Machine>(
    m: &mut M,
    pg: &mut PagingStructures,
    patch: WindowPatch,
    strategy: InvalidationStrategy,
) -> PatchedRange {
    match patch.apply(pg) {
        Ok(range) => {
            invalidate(m, range, strategy);
            range
        }
        Err(err) => {
            logging::error("mm::window: patch landed outside the expected window");
            logging::info_u64(" from_slot", patch.from as u64);
            logging::info_u64(" to_slot", patch.to as u64);
            panic!("window patch failed: {:?}", err);
        }
    }
}
