// kernel/src/arch/port.rs
//
// x86 I/O ポート。
// - PortIo: ポートの読み書きを抽象化（reset プロトコルをテストで差し替えるため）
// - HwPorts: 実機の in/out 命令（target_os = "none" のみ）

pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);
}

/// 実機の I/O 空間
#[derive(Clone, Copy, Debug, Default)]
pub struct HwPorts;

#[cfg(target_os = "none")]
impl PortIo for HwPorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }
}
