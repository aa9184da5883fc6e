//! What the four digit display shows for a battery reading.
//!
//! A reading doesn't fit on four digits, so it's split into pages that are shown one after
//! the other.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::Write;
use heapless::{String, Vec};
use ufmt::uwrite;

use crate::battery::BatteryAnalysis;
use crate::ht16k33::{DIGITS, HT16K33};
use crate::logger::Fixed;

/// One screenful
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    /// Text for `HT16K33::write_str`. Decimal points don't take a digit.
    pub text: String<8>,
    /// Number of decimal points lit from the left as a charge gauge
    pub bar: u8,
}

impl Page {
    pub fn new(text: &str) -> Page {
        let mut page = Page {
            text: String::new(),
            bar: 0,
        };
        for c in text.chars() {
            if page.text.push(c).is_err() {
                break;
            }
        }
        page
    }
}

pub const MAX_PAGES: usize = 4;

pub type Pages = Vec<Page, MAX_PAGES>;

/// Shown while the board starts up
pub fn boot_pages() -> Pages {
    let mut pages = Pages::new();
    let _ = pages.push(Page::new("LIPO"));
    let _ = pages.push(Page::new("TEST"));
    pages
}

/// "ERR!" followed by the first few characters of `message`
pub fn error_pages(message: &str) -> Pages {
    let mut pages = Pages::new();
    let _ = pages.push(Page::new("ERR!"));
    let _ = pages.push(Page::new(message));
    pages
}

/// Decimal points to light for a charge percentage, 0 to 4
pub fn charge_bar(percentage: u8) -> u8 {
    (percentage.min(100) as usize * DIGITS / 100) as u8
}

/// Pages for one reading: cell count, pack voltage, per cell voltage (packs with more than
/// one cell) and charge. An invalid reading gets its own pages instead of zeroes.
pub fn battery_pages(analysis: &BatteryAnalysis) -> Pages {
    let mut pages = Pages::new();
    if !analysis.is_valid {
        let _ = pages.push(Page::new("INV "));
        let _ = pages.push(Page::new("BATT"));
        return pages;
    }

    let mut cells = Page::new("");
    let _ = uwrite!(cells.text, "{}S", analysis.cell_count);
    let _ = pages.push(cells);

    let _ = pages.push(voltage_page("", analysis.total_voltage));
    if analysis.cell_count > 1 {
        let _ = pages.push(voltage_page("C", analysis.average_cell_voltage));
    }

    let mut charge = Page::new("");
    let percentage = analysis.charge_percentage;
    if percentage < 100 {
        let _ = charge.text.push(' ');
    }
    if percentage < 10 {
        let _ = charge.text.push(' ');
    }
    let _ = uwrite!(charge.text, "{}%", percentage);
    charge.bar = charge_bar(percentage);
    let _ = pages.push(charge);

    pages
}

/// Three significant digits: "3.70V", "11.1V", or with a prefix "C3.70"
fn voltage_page(prefix: &str, volts: f32) -> Page {
    let mut page = Page::new(prefix);
    let decimals = if volts < 10. { 2 } else { 1 };
    let _ = uwrite!(page.text, "{}", Fixed(volts, decimals));
    if prefix.is_empty() {
        let _ = page.text.push('V');
    }
    page
}

/// Puts one page on the display
pub fn show_page<I2C, CommE>(
    page: &Page,
    i2c: &mut I2C,
    display: &mut HT16K33,
) -> Result<(), CommE>
where
    I2C: Write<Error = CommE>,
{
    display.write_str(page.text.as_str());
    for digit in 0..page.bar.min(DIGITS as u8) {
        display.set_point(digit, true);
    }
    display.write_display(i2c)
}

/// Cycles through `pages`, holding each one for `page_ms`. Stops at the first bus error.
pub fn show_pages<I2C, CommE, D>(
    pages: &[Page],
    page_ms: u32,
    i2c: &mut I2C,
    display: &mut HT16K33,
    delay: &mut D,
) -> Result<(), CommE>
where
    I2C: Write<Error = CommE>,
    D: DelayMs<u32>,
{
    for page in pages {
        show_page(page, i2c, display)?;
        delay.delay_ms(page_ms);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::battery::analyze_battery;
    use crate::ht16k33::test::MockI2c;

    fn texts(pages: &Pages) -> Vec<&str, MAX_PAGES> {
        pages.iter().map(|p| p.text.as_str()).collect()
    }

    struct NoDelay;

    impl DelayMs<u32> for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    #[test]
    fn three_cell_pages() {
        let pages = battery_pages(&analyze_battery(11.1));
        assert_eq!(&texts(&pages)[..], &["3S", "11.1V", "C3.70", " 44%"]);
        assert_eq!(pages[3].bar, 1);
    }

    #[test]
    fn single_cell_skips_average() {
        let pages = battery_pages(&analyze_battery(4.2));
        assert_eq!(&texts(&pages)[..], &["1S", "4.20V", "100%"]);
        assert_eq!(pages[2].bar, 4);
    }

    #[test]
    fn empty_but_valid_pack() {
        let pages = battery_pages(&analyze_battery(3.0));
        assert_eq!(&texts(&pages)[..], &["1S", "3.00V", "  0%"]);
        assert_eq!(pages[2].bar, 0);
    }

    #[test]
    fn invalid_pack_has_no_numbers() {
        let pages = battery_pages(&analyze_battery(0.5));
        assert_eq!(&texts(&pages)[..], &["INV ", "BATT"]);
        assert!(pages.iter().all(|p| p.bar == 0));
    }

    #[test]
    fn charge_bar_quarters() {
        assert_eq!(charge_bar(0), 0);
        assert_eq!(charge_bar(24), 0);
        assert_eq!(charge_bar(25), 1);
        assert_eq!(charge_bar(74), 2);
        assert_eq!(charge_bar(99), 3);
        assert_eq!(charge_bar(100), 4);
        assert_eq!(charge_bar(250), 4);
    }

    #[test]
    fn error_message_is_truncated_to_page() {
        let pages = error_pages("ADC conversion failed");
        assert_eq!(pages[0].text.as_str(), "ERR!");
        assert_eq!(pages[1].text.as_str(), "ADC conv");
    }

    #[test]
    fn pages_go_out_in_order() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        let before = i2c.writes.len();

        let pages = battery_pages(&analyze_battery(11.1));
        show_pages(&pages, 1_000, &mut i2c, &mut display, &mut NoDelay).unwrap();
        assert_eq!(i2c.writes.len() - before, pages.len());

        // gauge point on the first digit of the charge page
        let (_, last) = i2c.writes.last().unwrap();
        assert_ne!(last[2] & 0x40, 0);
        assert_eq!(last[4] & 0x40, 0);
    }

    #[test]
    fn bus_errors_stop_the_cycle() {
        let mut i2c = MockI2c::default();
        let mut display = HT16K33::init(0x70, &mut i2c).unwrap();
        i2c.fail = true;
        let pages = boot_pages();
        assert!(show_pages(&pages, 0, &mut i2c, &mut display, &mut NoDelay).is_err());
    }
}
