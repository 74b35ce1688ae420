// kernel/src/logging/serial.rs
//
// COM1 (0x3F8) への最小限のシリアル出力。
// - init(): 115200bps, 8N1 に初期化
// - write_str(): 文字列を送信
// - write_line(): 文字列＋改行を送信
// ホストでは何もしない。

#[cfg(target_os = "none")]
mod hw {
    use core::sync::atomic::{AtomicBool, Ordering};

    use crate::arch::port::{HwPorts, PortIo};

    const COM1: u16 = 0x3F8;
    const LSR_TX_EMPTY: u8 = 0x20;

    static SERIAL_INITIALIZED: AtomicBool = AtomicBool::new(false);

    pub fn init() {
        if SERIAL_INITIALIZED.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut ports = HwPorts;
        ports.write_u8(COM1 + 1, 0x00);

        ports.write_u8(COM1 + 3, 0x80);
        ports.write_u8(COM1, 0x01);
        ports.write_u8(COM1 + 1, 0x00);

        ports.write_u8(COM1 + 3, 0x03);
        ports.write_u8(COM1 + 2, 0xC7);
        ports.write_u8(COM1 + 4, 0x0B);
    }

    pub fn write_byte(byte: u8) {
        let mut ports = HwPorts;
        while (ports.read_u8(COM1 + 5) & LSR_TX_EMPTY) == 0 {}
        ports.write_u8(COM1, byte);
    }
}

#[cfg(not(target_os = "none"))]
mod hw {
    pub fn init() {}

    pub fn write_byte(_byte: u8) {}
}

pub fn init() {
    hw::init();
}

pub fn write_str(s: &str) {
    for b in s.bytes() {
        hw::write_byte(b);
    }
}

pub fn write_line(s: &str) {
    write_str(s);
    write_str("\r\n");
}

pub fn write_prefixed_line(prefix: &str, msg: &str) {
    write_str(prefix);
    write_line(msg);
}
