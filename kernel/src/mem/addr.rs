// kernel/src/mem/addr.rs
//
// 役割:
// - 32bit 保護モード用の物理アドレス / 仮想アドレス / フレーム / ページの基本型を定義する。
// - 「これは物理フレーム番号」「これは仮想ページ番号」を型で区別し、
//   窓の付け替え（frame = frame - old_base + new_base）を checked 演算で行えるようにする。
// やること:
// - u32 の生アドレスに型を付ける。
// - フレーム番号は PTE/PDE の 20bit フィールドに収まることを保証する。
// やらないこと:
// - CR3 / PTE を直接触る処理（arch / mm 側の責務）。

use core::fmt;

/// 物理アドレス（バイト単位）
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysAddr(pub u32);

/// 仮想アドレス（バイト単位）
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtAddr(pub u32);

/// ページサイズ（4KiB 固定）
pub const PAGE_SIZE: u32 = 4096;

/// PAGE_SIZE の log2
pub const PAGE_SHIFT: u32 = 12;

/// エントリの physical_address フィールドは 20bit
pub const MAX_FRAME_NUMBER: u32 = (1 << 20) - 1;

/// 物理フレーム（4KiB ごとの番号）
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysFrame {
    pub number: u32, // frame index = phys_addr / PAGE_SIZE
}

/// 仮想ページ（4KiB ごとの番号）
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtPage {
    pub number: u32, // page index = virt_addr / PAGE_SIZE
}

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        PhysAddr(addr)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    /// 下位ビットを切り捨てて、ページ境界に揃える。
    pub fn align_down(self) -> PhysAddr {
        PhysAddr(self.0 & !(PAGE_SIZE - 1))
    }

    /// このアドレスが含まれる物理フレームを返す。
    pub fn frame(self) -> PhysFrame {
        PhysFrame {
            number: self.0 >> PAGE_SHIFT,
        }
    }

    pub fn checked_add(self, bytes: u32) -> Option<PhysAddr> {
        self.0.checked_add(bytes).map(PhysAddr)
    }
}

impl VirtAddr {
    pub const fn new(addr: u32) -> Self {
        VirtAddr(addr)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    /// 下位ビットを切り捨てて、ページ境界に揃える。
    pub fn align_down(self) -> VirtAddr {
        VirtAddr(self.0 & !(PAGE_SIZE - 1))
    }

    /// このアドレスが含まれる仮想ページを返す。
    pub fn page(self) -> VirtPage {
        VirtPage {
            number: self.0 >> PAGE_SHIFT,
        }
    }

    pub fn checked_add(self, bytes: u32) -> Option<VirtAddr> {
        self.0.checked_add(bytes).map(VirtAddr)
    }
}

impl PhysFrame {
    /// フレーム先頭の物理アドレスを返す。
    pub fn start_address(self) -> PhysAddr {
        PhysAddr(self.number << PAGE_SHIFT)
    }

    /// インデックスから直接フレームを作る（テスト用途など）。
    pub const fn from_index(number: u32) -> Self {
        PhysFrame { number }
    }

    /// 20bit に収まる場合のみフレームを作る。
    pub fn checked_from_index(number: u32) -> Option<Self> {
        if number > MAX_FRAME_NUMBER {
            return None;
        }
        Some(PhysFrame { number })
    }

    pub fn checked_add(self, frames: u32) -> Option<PhysFrame> {
        PhysFrame::checked_from_index(self.number.checked_add(frames)?)
    }

    /// `self - from + to` をフレーム番号で計算する。
    ///
    /// - self が from より下にある場合（= 付け替え元スロットの外）は None。
    /// - 結果が 20bit を超える場合も None。
    pub fn rebase(self, from: PhysFrame, to: PhysFrame) -> Option<PhysFrame> {
        let offset = self.number.checked_sub(from.number)?;
        to.checked_add(offset)
    }
}

impl VirtPage {
    /// ページ先頭の仮想アドレスを返す。
    pub fn start_address(self) -> VirtAddr {
        VirtAddr(self.number << PAGE_SHIFT)
    }

    /// インデックスから直接仮想ページを作る。
    pub const fn from_index(number: u32) -> Self {
        VirtPage { number }
    }

    pub fn checked_add(self, pages: u32) -> Option<VirtPage> {
        self.number.checked_add(pages).map(VirtPage::from_index)
    }

    /// ページディレクトリ index（bits 31..22）
    pub const fn directory_index(self) -> usize {
        (self.number >> 10) as usize
    }

    /// ページテーブル index（bits 21..12）
    pub const fn table_index(self) -> usize {
        (self.number & 0x3ff) as usize
    }
}

// --- Debug 実装（ログで見やすくするため） ---

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Debug for PhysFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // フレーム先頭の物理アドレスを表示
        write!(f, "PhysFrame({:#x})", self.start_address().0)
    }
}

impl fmt::Debug for VirtPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtPage({:#x})", self.start_address().0)
    }
}
