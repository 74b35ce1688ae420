// kernel/src/logging/vga.rs
//
// VGA テキストモード(0xb8000)への出力。
// - 文字はまずシャドウ画面（.bss = 共有窓の中）に書き、それを実画面へ写す。
// - シャドウはプロセスごとに別物になる（窓ごと付け替わるため）。
//   switch 後に refresh() すると、そのプロセスが書いた画面がそのまま戻る。
// - ホストでは何もしない（ShadowScreen 自体はテストで使う）。

use core::fmt::{self, Write};

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

#[derive(Clone, Copy)]
#[repr(u8)]
enum Color {
    Black = 0x0,
    LightGray = 0x7,
}

const DEFAULT_COLOR: u8 = (Color::LightGray as u8) | ((Color::Black as u8) << 4);

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScreenChar {
    ascii_character: u8,
    color_code: u8,
}

const BLANK: ScreenChar = ScreenChar {
    ascii_character: b' ',
    color_code: DEFAULT_COLOR,
};

#[cfg_attr(not(target_os = "none"), allow(dead_code))]
struct ShadowScreen {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
    col: usize,
}

#[cfg_attr(not(target_os = "none"), allow(dead_code))]
impl ShadowScreen {
    const fn new() -> Self {
        ShadowScreen {
            chars: [[BLANK; BUFFER_WIDTH]; BUFFER_HEIGHT],
            col: 0,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.col = 0,
            byte => {
                if self.col >= BUFFER_WIDTH {
                    self.new_line();
                }
                self.chars[BUFFER_HEIGHT - 1][self.col] = ScreenChar {
                    ascii_character: byte,
                    color_code: DEFAULT_COLOR,
                };
                self.col += 1;
            }
        }
    }

    fn new_line(&mut self) {
        self.chars.copy_within(1.., 0);
        self.chars[BUFFER_HEIGHT - 1] = [BLANK; BUFFER_WIDTH];
        self.col = 0;
    }

    fn clear(&mut self) {
        *self = ShadowScreen::new();
    }
}

impl Write for ShadowScreen {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.write_byte(b);
        }
        Ok(())
    }
}

#[cfg(target_os = "none")]
mod hw {
    use core::fmt::Write;

    use spin::Mutex;
    use volatile::Volatile;

    use super::{ScreenChar, ShadowScreen, BUFFER_HEIGHT, BUFFER_WIDTH};

    const VGA_TEXT_BUFFER: usize = 0xb8000;

    #[repr(transparent)]
    struct Buffer {
        chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
    }

    static SHADOW: Mutex<ShadowScreen> = Mutex::new(ShadowScreen::new());

    fn present(shadow: &ShadowScreen) {
        let buffer = unsafe { &mut *(VGA_TEXT_BUFFER as *mut Buffer) };
        for (row, cells) in shadow.chars.iter().enumerate() {
            for (col, ch) in cells.iter().enumerate() {
                buffer.chars[row][col].write(*ch);
            }
        }
    }

    pub fn init() {
        let mut shadow = SHADOW.lock();
        shadow.clear();
        present(&shadow);
    }

    pub fn write_str(s: &str) {
        let mut shadow = SHADOW.lock();
        let _ = shadow.write_str(s);
        present(&shadow);
    }

    pub fn refresh() {
        present(&SHADOW.lock());
    }
}

#[cfg(not(target_os = "none"))]
mod hw {
    pub fn init() {}

    pub fn write_str(_s: &str) {}

    pub fn refresh() {}
}

pub fn init() {
    hw::init();
}

pub fn refresh() {
    hw::refresh();
}

pub fn write_str(s: &str) {
    hw::write_str(s);
}

pub fn write_line(s: &str) {
    hw::write_str(s);
    hw::write_str("\n");
}

pub fn write_prefixed_line(prefix: &str, msg: &str) {
    write_str(prefix);
    write_line(msg);
}
