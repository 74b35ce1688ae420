// kernel/src/kernel/mod.rs
//
// dt-kernel: 単一ページディレクトリ上の協調マルチプロセス
//
// - KernelState: ページング構造・保存コンテキスト・ActiveProcess を 1 つにまとめた所有者
// - fork:     共有窓（データ + スタック）を各スロットへ複製し、コンテキストを seed する
// - sched:    switch_task（capture → 窓の付け替え → restore）
// - services: シェル側から見える入口（現在のプロセス番号、切替、再起動など）
// - entry:    ブート手順
//
// [設計上の不変条件（このモジュールにおける仕様）]
//
// 1. ActiveProcess
//    - 常に 0 <= active < process_count。
//    - 書き換えるのは sched::switch_task だけ（割り込み禁止区間の中）。
//
// 2. 共有窓
//    - 窓の各ページ p について、PTE のフレーム == slot_base(active) + p。
//    - 窓以外の PTE はブート後に変化しない（物理メモリ覗き窓を除く）。
//
// 3. 保存コンテキスト
//    - contexts[0] は最初の switch まで未使用（プロセス 0 が実行中）。
//    - fork 後、contexts[1..N] は同じ再開点で seed 済み。
//
// 4. process_count < 2 の構成では fork / switch_task は何も変更しない。
//
// これらは debug_check_invariants() によってログ出力ベースで検証される。

pub mod entry;
pub mod fork;
pub mod sched;
pub mod services;
pub mod state_ref;
pub mod trace;

#[cfg(test)]
mod tests;

use crate::arch::{Machine, SavedContext};
use crate::config::{KernelConfig, MAX_PROCESSES};
use crate::logging;
use crate::mem::addr::{PhysAddr, VirtAddr};
use crate::mem::layout::{identity_mapped_pages, slot_base};
use crate::mm::pagetable_init::{populate_initial_page_directory, BuildSummary};
use crate::mm::physmap::PhysMemWindow;
use crate::mm::{MapError, PagingStructures};

const EVENT_LOG_CAP: usize = 256;

//
// ──────────────────────────────────────────────
// ProcessIndex
// ──────────────────────────────────────────────
//

/// 検証済みのプロセス番号（= スロット番号）。KernelState::process() でしか作れない。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessIndex(usize);

impl ProcessIndex {
    pub const ZERO: ProcessIndex = ProcessIndex(0);

    pub fn as_usize(self) -> usize {
        self.0
    }
}

//
// ──────────────────────────────────────────────
// LogEvent（抽象イベントログ）
// ──────────────────────────────────────────────
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogEvent {
    TablesBuilt { tables: usize, mapped_pages: u32 },
    PagingEnabled { directory: PhysAddr },
    SlotReplicated { slot: ProcessIndex, phys_start: PhysAddr, bytes: u32 },
    ContextsSeeded { count: usize },
    TaskSwitched { from: ProcessIndex, to: ProcessIndex },
    WindowPatched { from_slot: usize, to_slot: usize, pages: u32 },
    TaskResumed(ProcessIndex),
    PhysWindowMapped { phys: PhysAddr },
}

//
// ──────────────────────────────────────────────
// KernelState
// ──────────────────────────────────────────────
//

pub struct KernelState {
    config: KernelConfig,

    // ページディレクトリ + ページテーブル（.boot_shared 上）
    paging: PagingStructures,
    tables_built: bool,
    paging_enabled: bool,

    // プロセスごとの保存コンテキスト
    contexts: [SavedContext; MAX_PROCESSES],
    active: ProcessIndex,
    replicated: bool,

    // Resumed 側で呼ぶ画面再描画
    console_refresh: Option<fn()>,

    physmap: Option<PhysMemWindow>,

    // 抽象イベントログ
    event_log: [Option<LogEvent>; EVENT_LOG_CAP],
    event_log_len: usize,
}

impl KernelState {
    pub const fn new(config: KernelConfig) -> Self {
        KernelState {
            config,
            paging: PagingStructures::new(),
            tables_built: false,
            paging_enabled: false,
            contexts: [SavedContext::empty(); MAX_PROCESSES],
            active: ProcessIndex::ZERO,
            replicated: false,
            console_refresh: None,
            physmap: None,
            event_log: [None; EVENT_LOG_CAP],
            event_log_len: 0,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn paging(&self) -> &PagingStructures {
        &self.paging
    }

    pub fn active_process(&self) -> ProcessIndex {
        self.active
    }

    pub fn contexts(&self) -> &[SavedContext] {
        &self.contexts[..self.config.process_count()]
    }

    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// raw をプロセス番号として検証する
    pub fn process(&self, raw: usize) -> Option<ProcessIndex> {
        if raw < self.config.process_count() {
            Some(ProcessIndex(raw))
        } else {
            None
        }
    }

    pub fn set_console_refresh(&mut self, hook: Option<fn()>) {
        self.console_refresh = hook;
    }

    /// Resumed で戻ったプロセスが呼ぶ再描画フック。KernelState のロックを手放してから呼ぶこと。
    pub fn console_refresh_hook(&self) -> Option<fn()> {
        self.console_refresh
    }

    /// identity map 済みのフレーム数（付け替え先の上限）
    pub(crate) fn frame_limit(&self) -> u32 {
        identity_mapped_pages(self.config.process_count())
    }

    pub(crate) fn push_event(&mut self, ev: LogEvent) {
        if self.event_log_len < EVENT_LOG_CAP {
            self.event_log[self.event_log_len] = Some(ev);
            self.event_log_len += 1;
        }
    }

    pub fn events(&self) -> impl Iterator<Item = LogEvent> + '_ {
        self.event_log[..self.event_log_len].iter().flatten().copied()
    }

    //
    // ページテーブル構築（ページング無効のうちに 1 回だけ）
    //
    pub fn build_page_tables(&mut self, base: PhysAddr) -> BuildSummary {
        let summary =
            populate_initial_page_directory(&mut self.paging, base, self.config.process_count());
        self.tables_built = true;

        logging::info("kernel: page tables built");
        logging::info_u64(" tables", summary.tables as u64);
        logging::info_u64(" mapped_pages", summary.mapped_pages as u64);
        logging::info_hex(" directory", base.as_u32() as u64);

        self.push_event(LogEvent::TablesBuilt {
            tables: summary.tables,
            mapped_pages: summary.mapped_pages,
        });
        summary
    }

    /// CR3 / CR0.PG を設定する。
    ///
    /// # Safety
    /// - build_page_tables 済みで、base が PagingStructures の実際の物理位置であること。
    pub unsafe fn enable_paging<M: Machine>(&mut self, m: &mut M) {
        if !self.tables_built {
            logging::error("kernel: enable_paging before page tables were built");
            panic!("enable_paging: page tables not built");
        }
        if self.paging_enabled {
            return;
        }

        let directory = self.paging.directory_address();
        m.activate_paging(directory);
        self.paging_enabled = true;

        logging::info("kernel: paging enabled");
        self.push_event(LogEvent::PagingEnabled { directory });
    }

    pub fn is_paging_enabled(&self) -> bool {
        self.paging_enabled
    }

    //
    // 物理メモリ覗き窓
    //
    pub fn init_phys_window<M: Machine>(&mut self, m: &mut M, base: VirtAddr) -> Result<(), MapError> {
        let window = PhysMemWindow::init(&mut self.paging, base, self.config.window())?;
        if self.paging_enabled {
            // キャッシュ無効化を反映させる
            m.without_interrupts(|m| {
                for page in window.pages() {
                    m.invalidate_page(page);
                }
            });
        }
        self.physmap = Some(window);
        logging::info_hex("kernel: phys window at", base.as_u32() as u64);
        Ok(())
    }

    pub fn phys_window_base(&self) -> Option<VirtAddr> {
        self.physmap.map(|w| w.base())
    }

    /// 覗き窓を phys に向ける。戻り値は窓の仮想アドレス（phys のページ内オフセット込み）。
    pub fn phys_mem_map<M: Machine>(&mut self, m: &mut M, phys: PhysAddr) -> Result<VirtAddr, MapError> {
        let Some(window) = self.physmap else {
            return Err(MapError::PhysWindowUninitialized);
        };

        let range = m.without_interrupts(|m| {
            let range = window.map(&mut self.paging, phys)?;
            for page in range.pages() {
                m.invalidate_page(page);
            }
            Ok::<_, MapError>(range)
        })?;

        self.push_event(LogEvent::PhysWindowMapped { phys });
        let offset = phys.as_u32() - phys.align_down().as_u32();
        Ok(VirtAddr::new(range.first.start_address().as_u32() + offset))
    }

    //
    // 窓の不変条件: 窓の全 PTE がアクティブなスロットを指しているか
    //
    pub fn window_matches_active_slot(&self) -> bool {
        let base = slot_base(self.active.0);
        self.config.window().pages().all(|page| {
            match (self.paging.entry(page), base.checked_add(page.number)) {
                (Some(entry), Some(expected)) => entry.is_present() && entry.frame() == expected,
                _ => false,
            }
        })
    }

    //
    // 簡易的な不変条件チェック（デバッグ用）
    //
    pub fn debug_check_invariants(&self) {
        let count = self.config.process_count();

        if self.active.0 >= count {
            logging::error("INVARIANT VIOLATION: active process out of range");
            logging::info_u64(" active", self.active.0 as u64);
        }

        if self.tables_built && !self.window_matches_active_slot() {
            logging::error("INVARIANT VIOLATION: window is not mapped to the active slot");
            logging::info_u64(" active", self.active.0 as u64);
        }

        if self.replicated {
            for (idx, ctx) in self.contexts().iter().enumerate().skip(1) {
                if ctx.validate(self.config.window()).is_err() {
                    logging::error("INVARIANT VIOLATION: context of a replicated process is not restorable");
                    logging::info_u64(" process", idx as u64);
                }
            }
        }

        if !self.config.is_multiprocess() && (self.replicated || self.active.0 != 0) {
            logging::error("INVARIANT VIOLATION: single-process configuration was mutated");
        }
    }

    //
    // dump_events()
    //
    pub fn dump_events(&self) {
        logging::info("=== KernelState Event Log Dump ===");

        for ev in self.events() {
            log_event(ev);
        }

        logging::info("=== End of Event Log ===");

        logging::info("=== Process Dump ===");
        logging::info_u64(" process_count", self.config.process_count() as u64);
        logging::info_u64(" active", self.active.0 as u64);

        for (idx, ctx) in self.contexts().iter().enumerate() {
            logging::info_u64(" process", idx as u64);
            logging::info_hex("  slot_base", slot_base(idx).start_address().as_u32() as u64);
            if ctx.is_seeded() {
                logging::info_hex("  eip", ctx.eip as u64);
                logging::info_hex("  esp", ctx.esp as u64);
            } else {
                logging::info("  context = None");
            }
        }

        logging::info("=== End of Process Dump ===");
    }
}

// ─────────────────────────────────────────────
// LogEvent → ログ出力
// ─────────────────────────────────────────────

fn log_event(ev: LogEvent) {
    match ev {
        LogEvent::TablesBuilt { tables, mapped_pages } => {
            logging::info("EVENT: TablesBuilt");
            logging::info_u64(" tables", tables as u64);
            logging::info_u64(" mapped_pages", mapped_pages as u64);
        }
        LogEvent::PagingEnabled { directory } => {
            logging::info("EVENT: PagingEnabled");
            logging::info_hex(" directory", directory.as_u32() as u64);
        }
        LogEvent::SlotReplicated { slot, phys_start, bytes } => {
            logging::info("EVENT: SlotReplicated");
            logging::info_u64(" slot", slot.0 as u64);
            logging::info_hex(" phys_start", phys_start.as_u32() as u64);
            logging::info_u64(" bytes", bytes as u64);
        }
        LogEvent::ContextsSeeded { count } => {
            logging::info("EVENT: ContextsSeeded");
            logging::info_u64(" count", count as u64);
        }
        LogEvent::TaskSwitched { from, to } => {
            logging::info("EVENT: TaskSwitched");
            logging::info_u64(" from", from.0 as u64);
            logging::info_u64(" to", to.0 as u64);
        }
        LogEvent::WindowPatched { from_slot, to_slot, pages } => {
            logging::info("EVENT: WindowPatched");
            logging::info_u64(" from_slot", from_slot as u64);
            logging::info_u64(" to_slot", to_slot as u64);
            logging::info_u64(" pages", pages as u64);
        }
        LogEvent::TaskResumed(idx) => {
            logging::info("EVENT: TaskResumed");
            logging::info_u64(" process", idx.0 as u64);
        }
        LogEvent::PhysWindowMapped { phys } => {
            logging::info("EVENT: PhysWindowMapped");
            logging::info_hex(" phys", phys.as_u32() as u64);
        }
    }
}
