// kernel/src/logging/mod.rs
//
// ログ出力の入口。VGA（シャドウ経由）と COM1 の両方に 1 行ずつ出す。
// - ホスト（テスト）ではどちらのシンクも何もしない。
// - refresh_console(): 今のプロセスのシャドウで画面を描き直す（switch 後のフック）。

mod serial;
mod vga;

pub fn init() {
    vga::init();
    serial::init();
}

/// 共有窓の中のシャドウバッファから画面を描き直す
pub fn refresh_console() {
    vga::refresh();
}

pub fn info(msg: &str) {
    vga::write_prefixed_line("[INFO] ", msg);
    serial::write_prefixed_line("[INFO] ", msg);
}

pub fn error(msg: &str) {
    vga::write_prefixed_line("[ERROR] ", msg);
    serial::write_prefixed_line("[ERROR] ", msg);
}

pub fn info_u64(label: &str, value: u64) {
    info_kv(label, value);
}

pub fn info_kv(key: &str, value: u64) {
    let mut buf = [0u8; 21];
    let s = u64_to_decimal(value, &mut buf);
    write_kv(key, s);
}

/// アドレス・フレーム番号向け（0x 付き 16 進）
pub fn info_hex(key: &str, value: u64) {
    let mut buf = [0u8; 18];
    let s = u64_to_hex(value, &mut buf);
    write_kv(key, s);
}

fn write_kv(key: &str, s: &str) {
    if key.is_empty() {
        vga::write_str("[INFO] ");
        vga::write_line(s);

        serial::write_str("[INFO] ");
        serial::write_line(s);
        return;
    }

    vga::write_str("[INFO] ");
    vga::write_str(key);
    vga::write_str(" = ");
    vga::write_line(s);

    serial::write_str("[INFO] ");
    serial::write_str(key);
    serial::write_str(" = ");
    serial::write_line(s);
}

fn u64_to_decimal(mut value: u64, buf: &mut [u8; 21]) -> &str {
    if value == 0 {
        let last = buf.len() - 1;
        buf[last] = b'0';
        return unsafe { core::str::from_utf8_unchecked(&buf[last..]) };
    }

    let mut i = buf.len();
    while value > 0 {
        let digit = (value % 10) as u8;
        i -= 1;
        buf[i] = b'0' + digit;
        value /= 10;
    }

    unsafe { core::str::from_utf8_unchecked(&buf[i..]) }
}

fn u64_to_hex(mut value: u64, buf: &mut [u8; 18]) -> &str {
    let mut i = buf.len();
    loop {
        let n = (value & 0xf) as u8;
        i -= 1;
        buf[i] = if n < 10 { b'0' + n } else { b'a' + (n - 10) };
        value >>= 4;
        if value == 0 {
            break;
        }
    }
    i -= 1;
    buf[i] = b'x';
    i -= 1;
    buf[i] = b'0';

    unsafe { core::str::from_utf8_unchecked(&buf[i..]) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_formatting() {
        let mut buf = [0u8; 21];
        assert_eq!(u64_to_decimal(0, &mut buf), "0");
        assert_eq!(u64_to_decimal(512, &mut buf), "512");
        assert_eq!(u64_to_decimal(u64::MAX, &mut buf), "18446744073709551615");
    }

    #[test]
    fn hex_formatting() {
        let mut buf = [0u8; 18];
        assert_eq!(u64_to_hex(0, &mut buf), "0x0");
        assert_eq!(u64_to_hex(0x18_0000, &mut buf), "0x180000");
        assert_eq!(u64_to_hex(u64::MAX, &mut buf), "0xffffffffffffffff");
    }

    #[test]
    fn host_sinks_accept_output() {
        init();
        info("host");
        error("host");
        info_hex("addr", 0xb8000);
        refresh_console();
    }
}
