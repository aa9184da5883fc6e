//! PC-side simulator: runs the battery analyzer on voltages that went through a simulated
//! divider and ADC, and draws the result as a console box.

use std::io::{self, BufRead, Write};
use std::thread::sleep;
use std::time::Duration;

use argh::FromArgs;
use eyre::{eyre, Result, WrapErr};
use log::{debug, info, warn, LevelFilter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stderrlog::LogLevelNum;

use lipo_tester_rs::battery::{BatteryAnalysis, BatteryAnalyzer};
use lipo_tester_rs::config::BoardConfig;
use lipo_tester_rs::voltage::{raw_to_volts, volts_to_raw};

/// ADC noise, in codes either side of the ideal reading
const NOISE_LSB: i32 = 2;
const BAR_WIDTH: usize = 20;

#[derive(FromArgs)]
/// LiPo battery tester simulator.
struct SimulatorArgs {
    /// seed for the ADC noise, random if omitted
    #[argh(option)]
    seed: Option<u64>,

    /// simulate the 10 bit, 5V Pro Mini ADC instead of the Feather M0
    #[argh(switch)]
    pro_mini: bool,

    /// verbose output, repeat for more
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    mode: Mode,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Mode {
    Demo(DemoArgs),
    Interactive(InteractiveArgs),
    Monitor(MonitorArgs),
}

#[derive(FromArgs)]
/// Run the built in list of test packs.
#[argh(subcommand, name = "demo")]
struct DemoArgs {
    /// pause between cases, in milliseconds
    #[argh(option, default = "800")]
    pause_ms: u64,
}

#[derive(FromArgs)]
/// Read pack voltages from stdin until 0.
#[argh(subcommand, name = "interactive")]
struct InteractiveArgs {}

#[derive(FromArgs)]
/// Discharge a 3S pack from 12.6V to 9.9V.
#[argh(subcommand, name = "monitor")]
struct MonitorArgs {
    /// voltage drop per step
    #[argh(option, default = "0.05")]
    step: f32,

    /// pause between steps, in milliseconds
    #[argh(option, default = "500")]
    pause_ms: u64,
}

/// Divider + ADC of one board, with noise
struct SimulatedAdc {
    board: BoardConfig,
    rng: StdRng,
}

impl SimulatedAdc {
    fn new(board: BoardConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        SimulatedAdc { board, rng }
    }

    /// What the firmware would compute for a pack at `actual` volts
    fn measure(&mut self, actual: f32) -> f32 {
        let ideal = volts_to_raw(actual, &self.board.adc, &self.board.divider) as i32;
        let noise = self.rng.gen_range(-NOISE_LSB..=NOISE_LSB);
        let raw = (ideal + noise).clamp(0, self.board.adc.full_scale as i32) as u16;
        debug!("{:.3} V -> code {} (noise {})", actual, raw, noise);
        raw_to_volts(raw, &self.board.adc) * self.board.divider.ratio()
    }
}

fn render(analysis: &BatteryAnalysis) -> String {
    let mut out = String::new();
    out.push_str("+--------------------------------+\n");
    out.push_str("|   LiPo Battery Tester (SIM)    |\n");
    out.push_str("+--------------------------------+\n");
    if !analysis.is_valid {
        out.push_str("| ERROR: Invalid Voltage!        |\n");
        out.push_str(&format!("| Total: {:>7.2}V                |\n", analysis.total_voltage));
    } else {
        out.push_str(&format!("| Cells: {}S                      |\n", analysis.cell_count));
        out.push_str(&format!("| Total: {:>7.2}V                |\n", analysis.total_voltage));
        if analysis.cell_count > 1 {
            out.push_str(&format!(
                "| Average: {:>5.2}V/cell          |\n",
                analysis.average_cell_voltage
            ));
        }
        let bars = analysis.charge_percentage as usize * BAR_WIDTH / 100;
        out.push_str(&format!(
            "| Charge: {:>3}% [{}{}] |\n",
            analysis.charge_percentage,
            "#".repeat(bars),
            " ".repeat(BAR_WIDTH - bars)
        ));
    }
    out.push_str("+--------------------------------+\n");
    out
}

fn run_demo(analyzer: &BatteryAnalyzer, adc: &mut SimulatedAdc, args: &DemoArgs) {
    const CASES: [(f32, &str); 15] = [
        (3.7, "1S LiPo - Nominal voltage"),
        (4.2, "1S LiPo - Fully charged"),
        (3.3, "1S LiPo - Low battery"),
        (7.4, "2S LiPo - Nominal voltage"),
        (8.4, "2S LiPo - Fully charged"),
        (11.1, "3S LiPo - Nominal voltage"),
        (12.6, "3S LiPo - Fully charged"),
        (11.6, "3S LiPo - Ambiguous case (could be 4S @ 2.9V)"),
        (14.8, "4S LiPo - Nominal voltage"),
        (16.8, "4S LiPo - Fully charged"),
        (18.5, "5S LiPo - Nominal voltage"),
        (22.2, "6S LiPo - Nominal voltage"),
        (25.2, "6S LiPo - Fully charged"),
        (1.5, "Too low - Invalid"),
        (26.0, "Too high - Invalid"),
    ];

    println!("=== LiPo Battery Tester - Demo Mode ===");
    for (voltage, description) in CASES.iter() {
        println!("----------------------------------------");
        println!("Test: {}", description);
        println!("Input: {:.2}V", voltage);
        let measured = adc.measure(*voltage);
        print!("{}", render(&analyzer.analyze(measured)));
        sleep(Duration::from_millis(args.pause_ms));
    }
    println!("Demo completed!");
}

fn run_interactive(analyzer: &BatteryAnalyzer, adc: &mut SimulatedAdc) -> Result<()> {
    let stdin = io::stdin();
    println!("=== LiPo Battery Tester Simulator ===");
    loop {
        print!("Enter battery voltage (0 to quit): ");
        io::stdout().flush().wrap_err("Unable to flush stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).wrap_err("Unable to read stdin")? == 0 {
            return Ok(());
        }
        let voltage: f32 = match line.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                warn!("Not a voltage {:?}: {}", line.trim(), e);
                continue;
            }
        };
        if voltage <= 0. {
            return Ok(());
        }

        let measured = adc.measure(voltage);
        println!("Actual voltage: {:.3}V", voltage);
        println!("Measured voltage: {:.3}V (with ADC noise)", measured);
        print!("{}", render(&analyzer.analyze(measured)));
    }
}

fn run_monitor(analyzer: &BatteryAnalyzer, adc: &mut SimulatedAdc, args: &MonitorArgs) -> Result<()> {
    if !(args.step > 0.) {
        return Err(eyre!("Step must be positive, got {}", args.step));
    }

    println!("=== Battery Discharge Simulation ===");
    println!("Simulating 3S LiPo discharge from 12.6V to 9.9V");
    let mut voltage = 12.6_f32;
    while voltage >= 9.9 {
        let measured = adc.measure(voltage);
        let analysis = analyzer.analyze(measured);
        println!("Actual: {:.2}V  Measured: {:.2}V", voltage, measured);
        print!("{}", render(&analysis));
        if analysis.cell_count != 3 {
            info!("{:.2} V no longer reads as 3S", measured);
        }
        sleep(Duration::from_millis(args.pause_ms));
        voltage -= args.step;
    }
    println!("Discharge simulation complete (reached 3.3V/cell)");
    Ok(())
}

fn init_logger(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut log = stderrlog::new();
    log.module(module_path!());
    log.verbosity(LogLevelNum::from(level));
    log.init()
        .map_err(|e| eyre!("Failed to initialize logger: {}", e))
}

fn main() -> Result<()> {
    let args: SimulatorArgs = argh::from_env();
    init_logger(args.verbose)?;

    let board = if args.pro_mini {
        BoardConfig::PRO_MINI
    } else {
        BoardConfig::FEATHER_M0
    };
    let analyzer = BatteryAnalyzer::lipo();
    let mut adc = SimulatedAdc::new(board, args.seed);

    match &args.mode {
        Mode::Demo(demo) => {
            run_demo(&analyzer, &mut adc, demo);
            Ok(())
        }
        Mode::Interactive(_) => run_interactive(&analyzer, &mut adc),
        Mode::Monitor(monitor) => run_monitor(&analyzer, &mut adc, monitor),
    }
}
