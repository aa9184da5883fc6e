//! Levelled diagnostic output over any `ufmt` writer.
//!
//! On the board the writer is the USB serial port, in tests it's a `heapless::String`.

use ufmt::{uDisplay, uWrite, uwrite, uwriteln, Formatter};

use crate::battery::BatteryAnalysis;

/// How much the logger prints. Each level includes the ones below it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    /// Nothing at all
    None = 0,
    /// What's on the display
    Display = 1,
    /// Pack voltage and every value derived from it
    Calculated = 2,
    /// Raw ADC readings
    Raw = 3,
}

impl DebugLevel {
    /// Out of range levels are clamped to `Raw`
    pub fn from_u8(level: u8) -> DebugLevel {
        match level {
            0 => DebugLevel::None,
            1 => DebugLevel::Display,
            2 => DebugLevel::Calculated,
            _ => DebugLevel::Raw,
        }
    }
}

impl Default for DebugLevel {
    fn default() -> Self {
        DebugLevel::Display
    }
}

/// `f32` printed with a fixed number of decimals (at most 4), rounded half away from zero.
///
/// `ufmt` has no float support, so we print the integer and fractional parts ourselves.
pub struct Fixed(pub f32, pub u8);

impl uDisplay for Fixed {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        let Fixed(value, decimals) = *self;
        if value.is_nan() {
            return f.write_str("NaN");
        }
        if value < 0. {
            f.write_str("-")?;
        }
        let magnitude = if value < 0. { -value } else { value };
        if magnitude >= u32::MAX as f32 / 10_000. {
            return f.write_str("inf");
        }

        let decimals = decimals.min(4) as u32;
        let scale = 10_u32.pow(decimals);
        let scaled = (magnitude * scale as f32 + 0.5) as u32;
        uwrite!(f, "{}", scaled / scale)?;
        if decimals > 0 {
            f.write_str(".")?;
            let frac = scaled % scale;
            let mut divisor = scale / 10;
            while divisor > 0 {
                uwrite!(f, "{}", (frac / divisor) % 10)?;
                divisor /= 10;
            }
        }
        Ok(())
    }
}

/// Writes diagnostics to `W`, filtered by a runtime adjustable level.
pub struct DebugLogger<W> {
    writer: W,
    level: DebugLevel,
}

impl<W: uWrite> DebugLogger<W> {
    pub fn new(writer: W, level: DebugLevel) -> Self {
        DebugLogger { writer, level }
    }

    pub fn level(&self) -> DebugLevel {
        self.level
    }

    /// Startup banner. Silent at level `None`.
    pub fn begin(&mut self) -> Result<(), W::Error> {
        if self.level == DebugLevel::None {
            return Ok(());
        }
        uwriteln!(self.writer, "\r\n=== LiPo Battery Tester Debug Logger ===\r")?;
        uwriteln!(self.writer, "Debug Level: {}\r", self.level as u8)?;
        uwriteln!(self.writer, "========================================\r\n\r")
    }

    pub fn set_level(&mut self, level: DebugLevel) -> Result<(), W::Error> {
        self.level = level;
        if self.level > DebugLevel::None {
            uwriteln!(self.writer, "Debug level changed to: {}\r", self.level as u8)?;
        }
        Ok(())
    }

    /// Raw averaged ADC code and the voltage it maps to at the pin
    pub fn log_raw_adc(&mut self, raw: u16, adc_voltage: f32) -> Result<(), W::Error> {
        if self.level < DebugLevel::Raw {
            return Ok(());
        }
        uwriteln!(self.writer, "--- Raw ADC Reading ---\r")?;
        uwriteln!(self.writer, "Raw ADC Value: {}\r", raw)?;
        uwriteln!(self.writer, "ADC Pin Voltage: {} V\r", Fixed(adc_voltage, 4))?;
        uwriteln!(self.writer, "\r")
    }

    pub fn log_calculated(
        &mut self,
        battery_voltage: f32,
        analysis: &BatteryAnalysis,
    ) -> Result<(), W::Error> {
        if self.level < DebugLevel::Calculated {
            return Ok(());
        }
        uwriteln!(self.writer, "--- Calculated Values ---\r")?;
        uwriteln!(self.writer, "Battery Voltage: {} V\r", Fixed(battery_voltage, 3))?;
        uwriteln!(self.writer, "Detected Cells: {}\r", analysis.cell_count)?;
        if analysis.is_valid {
            uwriteln!(
                self.writer,
                "Average Cell Voltage: {} V\r",
                Fixed(analysis.average_cell_voltage, 3)
            )?;
            uwriteln!(self.writer, "Charge Percentage: {} %\r", analysis.charge_percentage)?;
        } else {
            uwriteln!(self.writer, "Invalid battery reading!\r")?;
        }
        uwriteln!(self.writer, "\r")
    }

    /// Mirrors what the display shows
    pub fn log_display(&mut self, analysis: &BatteryAnalysis) -> Result<(), W::Error> {
        if self.level < DebugLevel::Display {
            return Ok(());
        }
        uwriteln!(self.writer, "--- Display Output ---\r")?;
        if analysis.is_valid {
            uwriteln!(
                self.writer,
                "{}S {}V\r",
                analysis.cell_count,
                Fixed(analysis.total_voltage, 2)
            )?;
            if analysis.cell_count > 1 {
                uwriteln!(
                    self.writer,
                    "Avg: {}V/cell\r",
                    Fixed(analysis.average_cell_voltage, 2)
                )?;
            }
            uwriteln!(self.writer, "Charge: {}%\r", analysis.charge_percentage)?;
        } else {
            uwriteln!(self.writer, "Invalid Battery!\r")?;
        }
        uwriteln!(self.writer, "\r")
    }

    /// Free form message, printed at any level but `None`
    pub fn log(&mut self, message: &str) -> Result<(), W::Error> {
        if self.level == DebugLevel::None {
            return Ok(());
        }
        uwriteln!(self.writer, "{}\r", message)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

/// A writer that drops everything, for builds without a serial port
pub struct Discard;

impl uWrite for Discard {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, _s: &str) -> Result<(), Self::Error> {
        Ok(())
    }
}
