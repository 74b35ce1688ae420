// kernel/src/arch/reset.rs
//
// 8042 キーボードコントローラ経由で CPU の RESET ピンをパルスさせる。
// 1. ステータスポート(0x64) の bit1（入力バッファ full）が落ちるまで待つ
// 2. 0x64 に 0xFE（リセットパルス）を書く
// 戻らない前提。書いた後は hlt で待つ。

use crate::arch::port::PortIo;

pub const KBC_STATUS_PORT: u16 = 0x64;
pub const KBC_COMMAND_PORT: u16 = 0x64;
pub const KBC_INPUT_BUFFER_FULL: u8 = 1 << 1;
pub const KBC_PULSE_RESET: u8 = 0xfe;

/// ポーリング + リセットコマンド書き込み。ポーリング回数を返す。
pub fn pulse_reset_line<P: PortIo>(ports: &mut P) -> usize {
    let mut polls = 1;
    while ports.read_u8(KBC_STATUS_PORT) & KBC_INPUT_BUFFER_FULL != 0 {
        polls += 1;
    }
    ports.write_u8(KBC_COMMAND_PORT, KBC_PULSE_RESET);
    polls
}

/// 再起動。割り込みを止めてからリセットを要求し、CPU を止める。
#[cfg(target_os = "none")]
pub fn reboot() -> ! {
    use crate::arch::{cpu, port::HwPorts};

    cpu::disable_interrupts();
    pulse_reset_line(&mut HwPorts);
    cpu::halt_loop()
}
