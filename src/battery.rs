//! Estimates LiPo pack state from a single pack voltage.
//!
//! The pipeline is: pack voltage -> series cell count -> average cell voltage -> charge
//! percentage. Nothing here does I/O or keeps state between calls, so it's fine to call
//! from the measurement loop or an interrupt handler alike.
//!
//! The percentage is a straight line between the empty and full cell voltages. Real LiPo
//! discharge curves are far from linear, so treat it as a rough gauge.

use crate::config::{CellLimits, DetectionGuards};

/// Result of analyzing one pack voltage reading.
///
/// When `is_valid` is false the derived fields are zeroed and must not be shown as if they
/// were measurements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BatteryAnalysis {
    /// The voltage that was analyzed
    pub total_voltage: f32,
    /// Detected series cells, 1 to 6, or 0 if undetectable
    pub cell_count: u8,
    /// `total_voltage / cell_count`, 0 when invalid
    pub average_cell_voltage: f32,
    /// 0 to 100
    pub charge_percentage: u8,
    /// `cell_count > 0`
    pub is_valid: bool,
}

impl BatteryAnalysis {
    fn invalid(total_voltage: f32) -> BatteryAnalysis {
        BatteryAnalysis {
            total_voltage,
            cell_count: 0,
            average_cell_voltage: 0.,
            charge_percentage: 0,
            is_valid: false,
        }
    }
}

/// A policy for guessing how many cells in series produce a given pack voltage.
///
/// Returns 0 when no cell count fits.
pub trait CellCountStrategy {
    fn detect(&self, voltage: f32, limits: &CellLimits) -> u8;
}

/// Tries 1S, 2S, ... and takes the first cell count whose per-cell voltage falls inside
/// the cell window.
///
/// Many voltages fit more than one topology (11.6V is a 3S pack at 3.87V/cell or a 4S pack
/// at 2.9V/cell). Scanning upwards prefers fewer cells at a higher per-cell voltage, on
/// the assumption that packs spend more time mid-range or full than sitting at their
/// floor. It is a tie-break rule, not a proof.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FirstMatchAscending {
    pub guards: DetectionGuards,
}

impl Default for FirstMatchAscending {
    fn default() -> Self {
        FirstMatchAscending {
            guards: DetectionGuards::DEFAULT,
        }
    }
}

impl CellCountStrategy for FirstMatchAscending {
    fn detect(&self, voltage: f32, limits: &CellLimits) -> u8 {
        let cell_min = limits.cell_min();
        let cell_max = limits.cell_max();

        // near-zero noise on a floating input would otherwise pass as a flat 1S pack
        if voltage < cell_min * self.guards.low_factor {
            return 0;
        }
        if voltage > cell_max * limits.max_cells as f32 * self.guards.high_factor {
            return 0;
        }

        let low = cell_min - self.guards.tolerance;
        let high = cell_max + self.guards.tolerance;
        for cells in 1..=limits.max_cells {
            let avg = voltage / cells as f32;
            if avg >= low && avg <= high {
                return cells;
            }
        }

        // also reached for NaN, every comparison above is false
        0
    }
}

/// Cell count detection and charge estimation against a set of cell limits.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BatteryAnalyzer<S = FirstMatchAscending> {
    limits: CellLimits,
    strategy: S,
}

impl BatteryAnalyzer<FirstMatchAscending> {
    /// Standard LiPo limits with first-match detection
    pub const fn lipo() -> Self {
        BatteryAnalyzer {
            limits: CellLimits::LIPO,
            strategy: FirstMatchAscending {
                guards: DetectionGuards::DEFAULT,
            },
        }
    }
}

impl Default for BatteryAnalyzer<FirstMatchAscending> {
    fn default() -> Self {
        BatteryAnalyzer::lipo()
    }
}

impl<S: CellCountStrategy> BatteryAnalyzer<S> {
    pub fn new(limits: CellLimits, strategy: S) -> Self {
        BatteryAnalyzer { limits, strategy }
    }

    pub fn limits(&self) -> &CellLimits {
        &self.limits
    }

    /// Number of series cells, 0 if the voltage doesn't fit any supported pack
    pub fn detect_cell_count(&self, voltage: f32) -> u8 {
        self.strategy.detect(voltage, &self.limits)
    }

    /// Average voltage per cell. 0 for a cell count of 0.
    pub fn average_cell_voltage(&self, total_voltage: f32, cell_count: u8) -> f32 {
        if cell_count == 0 {
            return 0.;
        }
        total_voltage / cell_count as f32
    }

    /// Maps an average cell voltage linearly onto 0-100% between the empty and full cell
    /// voltages, rounding half up.
    pub fn charge_percentage(&self, average_cell_voltage: f32) -> u8 {
        let empty = self.limits.cell_empty();
        let full = self.limits.cell_full();

        if average_cell_voltage.is_nan() || average_cell_voltage < empty {
            return 0;
        }
        // inclusive, so a full cell can't land on 99 through rounding
        if average_cell_voltage >= full {
            return 100;
        }

        let fraction = (average_cell_voltage - empty) / (full - empty);
        let percentage = (fraction * 100. + 0.5) as i32;
        if percentage < 0 {
            0
        } else if percentage > 100 {
            100
        } else {
            percentage as u8
        }
    }

    /// Runs the whole pipeline on one pack voltage
    pub fn analyze(&self, voltage: f32) -> BatteryAnalysis {
        let cell_count = self.detect_cell_count(voltage);
        if cell_count == 0 {
            return BatteryAnalysis::invalid(voltage);
        }

        let average_cell_voltage = self.average_cell_voltage(voltage, cell_count);
        BatteryAnalysis {
            total_voltage: voltage,
            cell_count,
            average_cell_voltage,
            charge_percentage: self.charge_percentage(average_cell_voltage),
            is_valid: true,
        }
    }

    /// Checks a pack voltage against one assumed cell count, with no tolerance.
    ///
    /// Unlike detection this doesn't search: it confirms or rejects a single hypothesis.
    pub fn is_voltage_valid(&self, voltage: f32, cell_count: u8) -> bool {
        if cell_count == 0 || cell_count > self.limits.max_cells {
            return false;
        }
        voltage >= self.limits.pack_min(cell_count) && voltage <= self.limits.pack_max(cell_count)
    }
}

const LIPO: BatteryAnalyzer = BatteryAnalyzer::lipo();

/// Detects the series cell count of a LiPo pack. See [`FirstMatchAscending`].
pub fn detect_cell_count(voltage: f32) -> u8 {
    LIPO.detect_cell_count(voltage)
}

pub fn average_cell_voltage(total_voltage: f32, cell_count: u8) -> f32 {
    LIPO.average_cell_voltage(total_voltage, cell_count)
}

/// Converts an average LiPo cell voltage to an estimated charge percentage
pub fn charge_percentage(average_cell_voltage: f32) -> u8 {
    LIPO.charge_percentage(average_cell_voltage)
}

/// Analyzes a LiPo pack voltage. This is what the display and logger consume.
pub fn analyze_battery(voltage: f32) -> BatteryAnalysis {
    LIPO.analyze(voltage)
}

pub fn is_voltage_valid(voltage: f32, cell_count: u8) -> bool {
    LIPO.is_voltage_valid(voltage, cell_count)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_full_packs() {
        assert_eq!(detect_cell_count(4.2), 1);
        assert_eq!(detect_cell_count(8.4), 2);
        assert_eq!(detect_cell_count(12.6), 3);
        assert_eq!(detect_cell_count(16.8), 4);
        assert_eq!(detect_cell_count(21.0), 5);
        assert_eq!(detect_cell_count(25.2), 6);
    }

    #[test]
    fn detects_nominal_packs() {
        assert_eq!(detect_cell_count(3.7), 1);
        assert_eq!(detect_cell_count(7.4), 2);
        assert_eq!(detect_cell_count(11.1), 3);
        assert_eq!(detect_cell_count(14.8), 4);
        assert_eq!(detect_cell_count(18.5), 5);
        assert_eq!(detect_cell_count(22.2), 6);
    }

    #[test]
    fn cell_window_edges_are_inclusive() {
        assert_eq!(detect_cell_count(2.9), 1);
        assert_eq!(detect_cell_count(3.3), 1);
        assert_eq!(detect_cell_count(5.8), 2);
        assert_eq!(detect_cell_count(8.7), 3);
    }

    #[test]
    fn ambiguous_voltages_prefer_fewer_cells() {
        // 4S at 2.9V/cell reads as 3S at 3.87V/cell
        assert_eq!(detect_cell_count(11.6), 3);
        // 5S at 3.3V/cell reads as 4S at 4.125V/cell
        assert_eq!(detect_cell_count(16.5), 4);
        // 4S at 3.3V/cell: 3S would be 4.4V/cell, too high
        assert_eq!(detect_cell_count(13.2), 4);
        assert_eq!(detect_cell_count(17.4), 5);
        assert_eq!(detect_cell_count(19.8), 5);
    }

    #[test]
    fn rejects_out_of_range() {
        for v in &[0.0, 1.0, 2.5, 26.0, 30.0] {
            assert_eq!(detect_cell_count(*v), 0, "{} V", v);
        }
    }

    #[test]
    fn rejects_pathological_input() {
        for v in &[-3.7, -100.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY, f32::MAX] {
            assert_eq!(detect_cell_count(*v), 0);
            let analysis = analyze_battery(*v);
            assert!(!analysis.is_valid);
            assert_eq!(analysis.average_cell_voltage, 0.);
            assert_eq!(analysis.charge_percentage, 0);
        }
    }

    #[test]
    fn first_match_is_never_above_the_true_cell_count() {
        let tolerance = DetectionGuards::DEFAULT.tolerance;
        for cells in 1..=6_u8 {
            for step in 0..=130 {
                let cell_voltage = 2.9 + step as f32 * 0.01;
                let voltage = cells as f32 * cell_voltage;
                let detected = detect_cell_count(voltage);
                assert!(detected >= 1 && detected <= cells, "{} V", voltage);

                let avg = voltage / detected as f32;
                assert!(avg >= 2.9 - tolerance && avg <= 4.2 + tolerance, "{} V", voltage);
            }
        }
    }

    #[test]
    fn average_cell_voltage_divides() {
        assert!((average_cell_voltage(4.2, 1) - 4.2).abs() < 0.01);
        assert!((average_cell_voltage(12.6, 3) - 4.2).abs() < 0.01);
        assert!((average_cell_voltage(14.8, 4) - 3.7).abs() < 0.01);
        assert!((average_cell_voltage(22.2, 6) - 3.7).abs() < 0.01);
        assert_eq!(average_cell_voltage(12.6, 0), 0.);
    }

    #[test]
    fn charge_percentage_points() {
        assert_eq!(charge_percentage(4.2), 100);
        assert_eq!(charge_percentage(3.3), 0);
        assert!((charge_percentage(3.75) as i32 - 50).abs() <= 5);
        assert!((charge_percentage(3.7) as i32 - 44).abs() <= 5);
        assert_eq!(charge_percentage(4.5), 100);
        assert_eq!(charge_percentage(3.0), 0);
        assert_eq!(charge_percentage(f32::NAN), 0);
    }

    #[test]
    fn charge_percentage_rounds_half_up() {
        // 3.3 + 0.9 * 0.006 = 0.6% -> 1
        assert_eq!(charge_percentage(3.3054), 1);
        // 0.4% -> 0
        assert_eq!(charge_percentage(3.3036), 0);
    }

    #[test]
    fn valid_but_empty_pack_reads_zero() {
        let analysis = analyze_battery(3.0);
        assert!(analysis.is_valid);
        assert_eq!(analysis.cell_count, 1);
        assert_eq!(analysis.charge_percentage, 0);
    }

    #[test]
    fn analyze_3s_nominal() {
        let analysis = analyze_battery(11.1);
        assert!(analysis.is_valid);
        assert_eq!(analysis.cell_count, 3);
        assert_eq!(analysis.total_voltage, 11.1);
        assert!((analysis.average_cell_voltage - 3.7).abs() < 0.01);
        assert!((analysis.charge_percentage as i32 - 44).abs() <= 5);
    }

    #[test]
    fn analyze_6s_full() {
        let analysis = analyze_battery(25.2);
        assert!(analysis.is_valid);
        assert_eq!(analysis.cell_count, 6);
        assert!((analysis.average_cell_voltage - 4.2).abs() < 0.01);
        assert_eq!(analysis.charge_percentage, 100);
    }

    #[test]
    fn analyze_invalid() {
        let analysis = analyze_battery(0.5);
        assert_eq!(
            analysis,
            BatteryAnalysis {
                total_voltage: 0.5,
                cell_count: 0,
                average_cell_voltage: 0.,
                charge_percentage: 0,
                is_valid: false,
            }
        );
    }

    #[test]
    fn analyze_is_repeatable() {
        for v in &[0.5, 3.7, 11.1, 11.6, 25.2, 27.0] {
            let first = analyze_battery(*v);
            let second = analyze_battery(*v);
            assert_eq!(first.total_voltage.to_bits(), second.total_voltage.to_bits());
            assert_eq!(
                first.average_cell_voltage.to_bits(),
                second.average_cell_voltage.to_bits()
            );
            assert_eq!(first.cell_count, second.cell_count);
            assert_eq!(first.charge_percentage, second.charge_percentage);
            assert_eq!(first.is_valid, second.is_valid);
        }
    }

    #[test]
    fn validity_check_is_exact() {
        assert!(is_voltage_valid(4.2, 1));
        assert!(is_voltage_valid(8.4, 2));
        assert!(is_voltage_valid(12.6, 3));
        assert!(is_voltage_valid(17.4, 6));
        assert!(!is_voltage_valid(5.0, 1));
        assert!(!is_voltage_valid(2.0, 1));
        // inside the detection tolerance, but not the exact window
        assert!(!is_voltage_valid(4.2005, 1));
    }

    #[test]
    fn validity_check_rejects_bad_cell_counts() {
        for v in &[0.0, 4.2, 12.6, 25.2] {
            assert!(!is_voltage_valid(*v, 0));
            assert!(!is_voltage_valid(*v, 7));
            assert!(!is_voltage_valid(*v, u8::MAX));
        }
    }

    struct AlwaysTwo;

    impl CellCountStrategy for AlwaysTwo {
        fn detect(&self, _voltage: f32, _limits: &CellLimits) -> u8 {
            2
        }
    }

    #[test]
    fn strategy_is_swappable() {
        let analyzer = BatteryAnalyzer::new(CellLimits::LIPO, AlwaysTwo);
        let analysis = analyzer.analyze(7.5);
        assert_eq!(analysis.cell_count, 2);
        assert!((analysis.average_cell_voltage - 3.75).abs() < 1e-6);
        assert!((analysis.charge_percentage as i32 - 50).abs() <= 1);
    }
}
