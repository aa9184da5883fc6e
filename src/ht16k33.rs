//! Driver for the HT16K33 LED controller on the Adafruit quad 14-segment alphanumeric
//! backpack.

const DISPLAY_BUFFER_SIZE: usize = 8;

/// Digits wired up on the quad alphanumeric backpack
pub const DIGITS: usize = 4;

const ALPHA_FONT_TABLE: [u16; 128] = [
    0b0000_0000_0000_0001,
    0b0000_0000_0000_0010,
    0b0000_0000_0000_0100,
    0b0000_0000_0000_1000,
    0b0000_0000_0001_0000,
    0b0000_0000_0010_0000,
    0b0000_0000_0100_0000,
    0b0000_0000_1000_0000,
    0b0000_0001_0000_0000,
    0b0000_0010_0000_0000,
    0b0000_0100_0000_0000,
    0b0000_1000_0000_0000,
    0b0001_0000_0000_0000,
    0b0010_0000_0000_0000,
    0b0100_0000_0000_0000,
    0b1000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0000_0000_0000_0000,
    0b0001_0010_1100_1001,
    0b0001_0101_1100_0000,
    0b0001_0010_1111_1001,
    0b0000_0000_1110_0011,
    0b0000_0101_0011_0000,
    0b0001_0010_1100_1000,
    0b0011_1010_0000_0000,
    0b0001_0111_0000_0000,
    0b0000_0000_0000_0000, //
    0b0000_0000_0000_0110, // !
    0b0000_0010_0010_0000, // "
    0b0001_0010_1100_1110, // #
    0b0001_0010_1110_1101, // $
    0b0000_1100_0010_0100, // %
    0b0010_0011_0101_1101, // &
    0b0000_0100_0000_0000, // '
    0b0010_0100_0000_0000, // (
    0b0000_1001_0000_0000, // )
    0b0011_1111_1100_0000, // *
    0b0001_0010_1100_0000, // +
    0b0000_1000_0000_0000, // ,
    0b0000_0000_1100_0000, // -
    0b0000_0000_0000_0000, // .
    0b0000_1100_0000_0000, // /
    0b0000_1100_0011_1111, // 0
    0b0000_0000_0000_0110, // 1
    0b0000_0000_1101_1011, // 2
    0b0000_0000_1000_1111, // 3
    0b0000_0000_1110_0110, // 4
    0b0010_0000_0110_1001, // 5
    0b0000_0000_1111_1101, // 6
    0b0000_0000_0000_0111, // 7
    0b0000_0000_1111_1111, // 8
    0b0000_0000_1110_1111, // 9
    0b0001_0010_0000_0000, // :
    0b0000_1010_0000_0000, // ;
    0b0010_0100_0000_0000, // <
    0b0000_0000_1100_1000, // =
    0b0000_1001_0000_0000, // >
    0b0001_0000_1000_0011, // ?
    0b0000_0010_1011_1011, // @
    0b0000_0000_1111_0111, // A
    0b0001_0010_1000_1111, // B
    0b0000_0000_0011_1001, // C
    0b0001_0010_0000_1111, // D
    0b0000_0000_1111_1001, // E
    0b0000_0000_0111_0001, // F
    0b0000_0000_1011_1101, // G
    0b0000_0000_1111_0110, // H
    0b0001_0010_0000_0000, // I
    0b0000_0000_0001_1110, // J
    0b0010_0100_0111_0000, // K
    0b0000_0000_0011_1000, // L
    0b0000_0101_0011_0110, // M
    0b0010_0001_0011_0110, // N
    0b0000_0000_0011_1111, // O
    0b0000_0000_1111_0011, // P
    0b0010_0000_0011_1111, // Q
    0b0010_0000_1111_0011, // R
    0b0000_0000_1110_1101, // S
    0b0001_0010_0000_0001, // T
    0b0000_0000_0011_1110, // U
    0b0000_1100_0011_0000, // V
    0b0010_1000_0011_0110, // W
    0b0010_1101_0000_0000, // X
    0b0001_0101_0000_0000, // Y
    0b0000_1100_0000_1001, // Z
    0b0000_0000_0011_1001, // [
    0b0010_0001_0000_0000, //
    0b0000_0000_0000_1111, // ]
    0b0000_1100_0000_0011, // ^
    0b0000_0000_0000_1000, // _
    0b0000_0001_0000_0000, // `
    0b0001_0000_0101_1000, // a
    0b0010_0000_0111_1000, // b
    0b0000_0000_1101_1000, // c
    0b0000_1000_1000_1110, // d
    0b0000_1000_0101_1000, // e
    0b0000_0000_0111_0001, // f
    0b0000_0100_1000_1110, // g
    0b0001_0000_0111_0000, // h
    0b0001_0000_0000_0000, // i
    0b0000_0000_0000_1110, // j
    0b0011_0110_0000_0000, // k
    0b0000_0000_0011_0000, // l
    0b0001_0000_1101_0100, // m
    0b0001_0000_0101_0000, // n
    0b0000_0000_1101_1100, // o
    0b0000_0001_0111_0000, // p
    0b0000_0100_1000_0110, // q
    0b0000_0000_0101_0000, // r
    0b0010_0000_1000_1000, // s
    0b0000_0000_0111_1000, // t
    0b0000_0000_0001_1100, // u
    0b0010_0000_0000_0100, // v
    0b0010_1000_0001_0100, // w
    0b0010_1000_1100_0000, // x
    0b0010_0000_0000_1100, // y
    0b0000_1000_0100_1000, // z
    0b0000_1001_0100_1001, // {
    0b0001_0010_0000_0000, // |
    0b0010_0100_1000_1001, // }
    0b0000_0101_0010_0000, // ~
    0b0011_1111_1111_1111,
];

const HT16K33_SYSTEM_SETUP: u8 = 0x20;
const HT16K33_OSCILLATOR_ON: u8 = 0x01;

const HT16K33_BLINK_CMD: u8 = 0x80;
const HT16K33_BLINK_DISPLAYON: u8 = 0x01;
const HT16K33_BLINK_OFF: u8 = 0;

const HT16K33_CMD_BRIGHTNESS: u8 = 0xE0;
const HT16K33_MAX_BRIGHTNESS: u8 = 15;

const ALPHA_POINT_MASK: u16 = 1 << 14;

pub struct HT16K33 {
    i2c_addr: u8,
    display_buffer: [u16; DISPLAY_BUFFER_SIZE],
}

impl HT16K33 {
    /// Starts the oscillator, stops blinking and sets full brightness.
    ///
    /// Fails with the bus error if nothing acks at `addr`.
    pub fn init<I2C, CommE>(addr: u8, i2c: &mut I2C) -> Result<Self, CommE>
    where
        I2C: embedded_hal::blocking::i2c::Write<Error = CommE>,
    {
        let mut ht = Self {
            i2c_addr: addr,
            display_buffer: [0; DISPLAY_BUFFER_SIZE],
        };

        ht.configure_standby(i2c, false)?;
        ht.blink_rate(HT16K33_BLINK_OFF, i2c)?;
        ht.set_brightness(HT16K33_MAX_BRIGHTNESS, i2c)?;

        Ok(ht)
    }

    /// 0 (dimmest) to 15. Larger values are clamped.
    pub fn set_brightness<I2C, CommE>(&mut self, b: u8, i2c: &mut I2C) -> Result<(), CommE>
    where
        I2C: embedded_hal::blocking::i2c::Write<Error = CommE>,
    {
        let b = b.min(HT16K33_MAX_BRIGHTNESS);
        i2c.write(self.i2c_addr, &[HT16K33_CMD_BRIGHTNESS | b])
    }

    /// 0 is steady, 1-3 are 2Hz, 1Hz and 0.5Hz. Anything else turns blinking off.
    pub fn blink_rate<I2C, CommE>(&mut self, b: u8, i2c: &mut I2C) -> Result<(), CommE>
    where
        I2C: embedded_hal::blocking::i2c::Write<Error = CommE>,
    {
        let bm = if b > 3 { HT16K33_BLINK_OFF } else { b };
        i2c.write(
            self.i2c_addr,
            &[HT16K33_BLINK_CMD | HT16K33_BLINK_DISPLAYON | (bm << 1)],
        )
    }

    /// Stops the oscillator (standby) or starts it again. RAM contents are kept.
    pub fn configure_standby<I2C, CommE>(&mut self, i2c: &mut I2C, standby: bool) -> Result<(), CommE>
    where
        I2C: embedded_hal::blocking::i2c::Write<Error = CommE>,
    {
        let oscillator = if standby { 0 } else { HT16K33_OSCILLATOR_ON };
        i2c.write(self.i2c_addr, &[HT16K33_SYSTEM_SETUP | oscillator])
    }

    pub fn clear(&mut self) {
        self.display_buffer = [0; DISPLAY_BUFFER_SIZE];
    }

    pub fn write_digit_value(&mut self, n: u8, number: u8, point: bool) {
        self.write_digit_ascii(n, (b'0' + number % 10) as char, point);
    }

    /// Non-ASCII characters show as a blank digit. Digits past the buffer are ignored.
    pub fn write_digit_ascii(&mut self, n: u8, character: char, point: bool) {
        let n = n as usize;
        if n >= DISPLAY_BUFFER_SIZE {
            return;
        }
        self.display_buffer[n] = if character.is_ascii() {
            ALPHA_FONT_TABLE[character as usize]
        } else {
            0
        };
        if point {
            self.display_buffer[n] |= ALPHA_POINT_MASK;
        }
    }

    /// Lights (or clears) the decimal point of a digit without touching its character
    pub fn set_point(&mut self, n: u8, point: bool) {
        let n = n as usize;
        if n >= DISPLAY_BUFFER_SIZE {
            return;
        }
        if point {
            self.display_buffer[n] |= ALPHA_POINT_MASK;
        } else {
            self.display_buffer[n] &= !ALPHA_POINT_MASK;
        }
    }

    /// Replaces the buffer with `s`, left aligned. A '.' goes on the decimal point of the
    /// digit before it, so "3.70V" takes four digits. Extra characters are dropped.
    pub fn write_str(&mut self, s: &str) {
        self.clear();
        let mut digit: usize = 0;
        let mut point_used = false;
        for c in s.chars() {
            if c == '.' && digit > 0 && !point_used {
                self.set_point((digit - 1) as u8, true);
                point_used = true;
                continue;
            }
            if digit >= DIGITS {
                break;
            }
            if c == '.' {
                self.write_digit_ascii(digit as u8, ' ', true);
                point_used = true;
            } else {
                self.write_digit_ascii(digit as u8, c, false);
                point_used = false;
            }
            digit += 1;
        }
    }

    /// Segment bits of one digit as they'll be sent on the next `write_display`
    pub fn digit_segments(&self, n: usize) -> u16 {
        self.display_buffer.get(n).copied().unwrap_or(0)
    }

    /// Pushes the buffer to the display RAM
    pub fn write_display<I2C, CommE>(&mut self, i2c: &mut I2C) -> Result<(), CommE>
    where
        I2C: embedded_hal::blocking::i2c::Write<Error = CommE>,
    {
        // Start at display RAM address 0, two bytes per digit, low byte first
        let mut data: [u8; 2 * DISPLAY_BUFFER_SIZE + 1] = [0; 2 * DISPLAY_BUFFER_SIZE + 1];
        for (i, segments) in self.display_buffer.iter().enumerate() {
            data[2 * i + 1] = (segments & 0xFF) as u8;
            data[2 * i + 2] = (segments >> 8) as u8;
        }
        i2c.write(self.i2c_addr, &data)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use heapless::Vec;

    /// Records every I2C write, optionally failing all of them
    #[derive(Default)]
    pub(crate) struct MockI2c {
        pub writes: Vec<(u8, Vec<u8, 17>), 32>,
        pub fail: bool,
    }

    impl embedded_hal::blocking::i2c::Write for MockI2c {
        type Error = ();

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            let mut data = Vec::new();
            data.extend_from_slice(bytes).map_err(|_| ())?;
            self.writes.push((address, data)).map_err(|_| ())
        }
    }

    fn font(c: char) -> u16 {
        ALPHA_FONT_TABLE[c as usize]
    }

    #[test]
    fn init_sequence() {
        let mut i2c = MockI2c::default();
        HT16K33::init(0x70, &mut i2c).unwrap();
        let commands: Vec<u8, 8> = i2c.writes.iter().map(|(_, d)| d[0]).collect();
        assert_eq!(&commands[..], &[0x21, 0x81, 0xEF]);
        assert!(i2c.writes.iter().all(|(addr, _)| *addr == 0x70));
    }

    #[test]
    fn init_reports_missing_display() {
        let mut i2c = MockI2c {
            fail: true,
            ..MockI2c::default()
        };
        assert!(HT16K33::init(0x70, &mut i2c).is_err());
    }

    #[test]
    fn brightness_is_clamped() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        display.set_brightness(200, &mut i2c).unwrap();
        assert_eq!(i2c.writes.last().unwrap().1[0], 0xEF);
    }

    #[test]
    fn standby_toggles_oscillator() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        display.configure_standby(&mut i2c, true).unwrap();
        assert_eq!(i2c.writes.last().unwrap().1[0], 0x20);
        display.configure_standby(&mut i2c, false).unwrap();
        assert_eq!(i2c.writes.last().unwrap().1[0], 0x21);
    }

    #[test]
    fn points_attach_to_previous_digit() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        display.write_str("3.70V");
        assert_eq!(display.digit_segments(0), font('3') | ALPHA_POINT_MASK);
        assert_eq!(display.digit_segments(1), font('7'));
        assert_eq!(display.digit_segments(2), font('0'));
        assert_eq!(display.digit_segments(3), font('V'));
    }

    #[test]
    fn digit_values_and_bad_input() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        display.write_digit_value(0, 7, true);
        display.write_digit_ascii(1, 'é', false);
        display.write_digit_ascii(9, 'A', false);
        assert_eq!(display.digit_segments(0), font('7') | ALPHA_POINT_MASK);
        assert_eq!(display.digit_segments(1), 0);

        display.set_point(0, false);
        assert_eq!(display.digit_segments(0), font('7'));
    }

    #[test]
    fn long_strings_are_cut() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        display.write_str("Invalid");
        assert_eq!(display.digit_segments(3), font('a'));
        assert_eq!(display.digit_segments(4), 0);
    }

    #[test]
    fn write_display_payload() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        display.write_str("3S");
        display.write_display(&mut i2c).unwrap();

        let (_, payload) = i2c.writes.last().unwrap();
        assert_eq!(payload.len(), 17);
        assert_eq!(payload[0], 0);
        assert_eq!(payload[1], (font('3') & 0xFF) as u8);
        assert_eq!(payload[2], (font('3') >> 8) as u8);
        assert_eq!(payload[3], (font('S') & 0xFF) as u8);
        assert!(payload[5..].iter().all(|b| *b == 0));
    }
}
