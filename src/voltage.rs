//! Pack voltage measurement through a resistor divider on an ADC pin.

use core::marker::PhantomData;

use embedded_hal::adc::{Channel, OneShot};
use embedded_hal::blocking::delay::DelayMs;

use crate::config::{AdcConfig, DividerConfig};

/// Converts a raw ADC code into the voltage seen at the pin
pub fn raw_to_volts(raw: u16, adc: &AdcConfig) -> f32 {
    if adc.full_scale == 0 {
        return 0.;
    }
    (raw as f32 * adc.ref_voltage) / adc.full_scale as f32
}

/// The code an ideal ADC would report for the given pack voltage (truncating, like the
/// hardware), saturating at the ends of the range.
pub fn volts_to_raw(pack_voltage: f32, adc: &AdcConfig, divider: &DividerConfig) -> u16 {
    if adc.ref_voltage <= 0. {
        return 0;
    }
    let pin_voltage = pack_voltage / divider.ratio();
    let code = (pin_voltage / adc.ref_voltage) * adc.full_scale as f32;
    if code.is_nan() || code <= 0. {
        0
    } else if code >= adc.full_scale as f32 {
        adc.full_scale
    } else {
        code as u16
    }
}

#[derive(Debug, PartialEq)]
pub enum VoltageReaderError<E> {
    /// The ADC failed a conversion
    Adc(E),
}

impl<E> From<E> for VoltageReaderError<E> {
    fn from(e: E) -> Self {
        VoltageReaderError::Adc(e)
    }
}

/// Reads the divided-down pack voltage on one ADC channel.
///
/// Every reading averages `AdcConfig::samples` conversions.
pub struct VoltageReader<ADC, PIN> {
    pin: PIN,
    adc_config: AdcConfig,
    divider: DividerConfig,
    _adc: PhantomData<ADC>,
}

impl<ADC, PIN> VoltageReader<ADC, PIN>
where
    PIN: Channel<ADC>,
{
    pub fn new(pin: PIN, adc_config: AdcConfig, divider: DividerConfig) -> Self {
        VoltageReader {
            pin,
            adc_config,
            divider,
            _adc: PhantomData,
        }
    }

    /// Multiplier from pin voltage to pack voltage
    pub fn divider_ratio(&self) -> f32 {
        self.divider.ratio()
    }

    pub fn adc_config(&self) -> &AdcConfig {
        &self.adc_config
    }

    /// Averages `samples` raw conversions, pausing between them. 0 samples reads once.
    pub fn read_raw<A, D, E>(
        &mut self,
        adc: &mut A,
        delay: &mut D,
        samples: u16,
    ) -> Result<u16, VoltageReaderError<E>>
    where
        A: OneShot<ADC, u16, PIN, Error = E>,
        D: DelayMs<u32>,
    {
        let samples = samples.max(1);
        let mut sum: u32 = 0;
        for _ in 0..samples {
            let reading: u16 = nb::block!(adc.read(&mut self.pin))?;
            sum += reading as u32;
            delay.delay_ms(self.adc_config.sample_delay_ms);
        }
        Ok((sum / samples as u32) as u16)
    }

    /// Averaged voltage at the ADC pin
    pub fn read_adc_voltage<A, D, E>(
        &mut self,
        adc: &mut A,
        delay: &mut D,
    ) -> Result<f32, VoltageReaderError<E>>
    where
        A: OneShot<ADC, u16, PIN, Error = E>,
        D: DelayMs<u32>,
    {
        let raw = self.read_raw(adc, delay, self.adc_config.samples)?;
        Ok(raw_to_volts(raw, &self.adc_config))
    }

    /// Averaged pack voltage, compensated for the divider
    pub fn read_battery_voltage<A, D, E>(
        &mut self,
        adc: &mut A,
        delay: &mut D,
    ) -> Result<f32, VoltageReaderError<E>>
    where
        A: OneShot<ADC, u16, PIN, Error = E>,
        D: DelayMs<u32>,
    {
        let adc_voltage = self.read_adc_voltage(adc, delay)?;
        Ok(self.battery_voltage(adc_voltage))
    }

    /// Scales a pin voltage that was already measured up to the pack voltage
    pub fn battery_voltage(&self, adc_voltage: f32) -> f32 {
        adc_voltage * self.divider.ratio()
    }
}
