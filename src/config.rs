//! Board and battery configuration.
//!
//! Everything here is a plain value handed to the component that needs it. Voltages that
//! feed exact comparisons are kept as integer millivolts and converted on use, so that a
//! bound like `3 * 4.2 V` is the correctly rounded `f32` of 12.6 V.

/// Voltage window of a single LiPo cell.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CellLimits {
    /// Lowest safe cell voltage. Packs below this per cell are not recognized.
    pub min_mv: u16,
    /// Fully charged cell voltage.
    pub max_mv: u16,
    /// Cell voltage reported as 0% charge
    pub empty_mv: u16,
    /// Cell voltage reported as 100% charge
    pub full_mv: u16,
    /// Largest series cell count we try to detect (6S)
    pub max_cells: u8,
}

impl CellLimits {
    /// Standard LiPo chemistry. Note the percentage scale (3.3V - 4.2V) is narrower than
    /// the safe range (2.9V - 4.2V): a pack can be valid and still read 0%.
    pub const LIPO: CellLimits = CellLimits {
        min_mv: 2_900,
        max_mv: 4_200,
        empty_mv: 3_300,
        full_mv: 4_200,
        max_cells: 6,
    };

    pub fn cell_min(&self) -> f32 {
        millivolts(self.min_mv as u32)
    }

    pub fn cell_max(&self) -> f32 {
        millivolts(self.max_mv as u32)
    }

    pub fn cell_empty(&self) -> f32 {
        millivolts(self.empty_mv as u32)
    }

    pub fn cell_full(&self) -> f32 {
        millivolts(self.full_mv as u32)
    }

    /// Lowest pack voltage that is in range for `cells` series cells
    pub fn pack_min(&self, cells: u8) -> f32 {
        millivolts(self.min_mv as u32 * cells as u32)
    }

    /// Highest pack voltage that is in range for `cells` series cells
    pub fn pack_max(&self, cells: u8) -> f32 {
        millivolts(self.max_mv as u32 * cells as u32)
    }
}

impl Default for CellLimits {
    fn default() -> Self {
        CellLimits::LIPO
    }
}

/// Bands applied around the cell window while guessing the cell count.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectionGuards {
    /// Readings below `cell_min * low_factor` are treated as noise on an empty input
    pub low_factor: f32,
    /// Readings above `cell_max * max_cells * high_factor` are treated as out of range
    pub high_factor: f32,
    /// Slack on both ends of the per-cell window to absorb float rounding (1 mV)
    pub tolerance: f32,
}

impl DetectionGuards {
    pub const DEFAULT: DetectionGuards = DetectionGuards {
        low_factor: 0.8,
        high_factor: 1.1,
        tolerance: 0.001,
    };
}

impl Default for DetectionGuards {
    fn default() -> Self {
        DetectionGuards::DEFAULT
    }
}

/// Resistor divider between the pack and the ADC pin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DividerConfig {
    /// High side resistor, ohms
    pub r1: f32,
    /// Low side resistor (to ground), ohms
    pub r2: f32,
}

impl DividerConfig {
    /// Multiplier from pin voltage back to pack voltage: `(R1 + R2) / R2`
    pub fn ratio(&self) -> f32 {
        if self.r2 <= 0. {
            return 1.;
        }
        (self.r1 + self.r2) / self.r2
    }
}

/// ADC conversion parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AdcConfig {
    /// Highest raw code (4095 for 12 bit)
    pub full_scale: u16,
    /// Reference voltage, volts
    pub ref_voltage: f32,
    /// Conversions averaged per reading
    pub samples: u16,
    /// Pause between averaged conversions
    pub sample_delay_ms: u32,
}

/// Everything that differs between the boards we run on.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoardConfig {
    pub adc: AdcConfig,
    pub divider: DividerConfig,
    /// I2C address of the HT16K33 backpack
    pub display_addr: u8,
    /// Time between two analyses
    pub measurement_period_ms: u32,
}

impl BoardConfig {
    /// Feather M0: 12 bit ADC against VDDA, 68k/10k divider (good up to ~25.7V, 6S)
    pub const FEATHER_M0: BoardConfig = BoardConfig {
        adc: AdcConfig {
            full_scale: 4095,
            ref_voltage: 3.3,
            samples: 10,
            sample_delay_ms: 10,
        },
        divider: DividerConfig {
            r1: 68_000.,
            r2: 10_000.,
        },
        display_addr: 0x70,
        measurement_period_ms: 500,
    };

    /// Arduino Pro Mini style 10 bit ADC at 5V with measured divider resistors
    pub const PRO_MINI: BoardConfig = BoardConfig {
        adc: AdcConfig {
            full_scale: 1023,
            ref_voltage: 5.0,
            samples: 10,
            sample_delay_ms: 10,
        },
        divider: DividerConfig {
            r1: 67_200.,
            r2: 10_050.,
        },
        display_addr: 0x70,
        measurement_period_ms: 1_000,
    };
}

fn millivolts(mv: u32) -> f32 {
    mv as f32 / 1000.
}
