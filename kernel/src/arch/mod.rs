// kernel/src/arch/mod.rs
//
// アーキ依存部。unsafe をできるだけここに閉じ込める方針。
// - context: 保存コンテキスト（SavedContext）と capture/restore
// - cpu: hlt / cli / sti など CPU 固有処理（実機のみ）
// - paging: Machine の実機実装（CR3 / CR0 / invlpg / 切替用スタック）
// - port: I/O ポート
// - reset: 8042 経由のリセット
// - sim: テスト用のシミュレーション Machine
//
// kernel / mm 側は Machine トレイト越しにしかハードウェアに触らない。

pub mod context;
pub mod port;
pub mod reset;

#[cfg(target_os = "none")]
pub mod cpu;
#[cfg(target_os = "none")]
pub mod paging;

#[cfg(test)]
pub mod sim;

use crate::config::InvalidationStrategy;
use crate::mem::addr::{PhysAddr, VirtAddr, VirtPage};
use crate::mm::window::WindowPatch;
use crate::mm::PagingStructures;

pub use context::{Continuation, SavedContext};

/// kernel から見たハードウェア。
pub trait Machine {
    /// CR3 にページディレクトリを設定し、CR0.PG を立てる。
    ///
    /// # Safety
    /// - directory は構築済みで、実行中のコード・スタックを identity map していること。
    unsafe fn activate_paging(&mut self, directory: PhysAddr);

    /// 1 ページ分のアドレス変換キャッシュを捨てる（invlpg）。
    fn invalidate_page(&mut self, page: VirtPage);

    /// アドレス変換キャッシュ全体を捨てる（CR3 再ロード）。
    fn flush_tlb(&mut self);

    /// 割り込みを禁止して f を実行し、元の状態に戻す。
    fn without_interrupts<R, F>(&mut self, f: F) -> R
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> R;

    /// 仮想アドレス src から len バイトを物理アドレス dst にコピーする。
    ///
    /// # Safety
    /// - dst..dst+len は identity map 済みで、どのプロセスの窓にも現在使われていないこと。
    unsafe fn copy_to_physical(&mut self, dst: PhysAddr, src: VirtAddr, len: u32);

    /// 現在の実行状態を ctx に保存する。
    ///
    /// 保存した直後は Captured、後で ctx が restore されてここに戻ってきた時は Resumed。
    ///
    /// # Safety
    /// - 呼び出し元の関数は、ctx が restore されうる間は return してはならない
    ///   （fork のように窓ごとコピー済みのスタックで再開する場合を除く）。
    unsafe fn capture(&mut self, ctx: &mut SavedContext) -> Continuation;

    /// 窓を付け替え、TLB を無効化し、ctx を復元する。実機では戻らない。
    ///
    /// # Safety
    /// - 割り込み禁止区間の中で呼ぶこと。
    /// - pg / ctx は共有窓の外（.boot_shared）に置かれていること。
    unsafe fn remap_and_restore(
        &mut self,
        pg: &mut PagingStructures,
        patch: WindowPatch,
        invalidation: InvalidationStrategy,
        ctx: &SavedContext,
    );
}

/// CPU を停止させるループ
#[cfg(target_os = "none")]
pub fn halt_loop() -> ! {
    cpu::halt_loop()
}
