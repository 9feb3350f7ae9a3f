use wearlink_telemetry::{SourceConfig, SourceKey};
use wearlink_wire::modules::{accelerometer, gpio, switch, temperature};
use wearlink_wire::{modules, Address};

/// A raw on-board data source a route can be built from.
///
/// Scale and layout here are the source's power-on defaults; the decoder
/// reads the live values through a shared handle, so runtime
/// configuration changes take effect without rebuilding routes.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub name: &'static str,
    pub module: u8,
    pub register: u8,
    /// Instance id for multi-instance sources (GPIO pin).
    pub index: Option<u8>,
    pub components: u8,
    pub component_size: u8,
    pub signed: bool,
    pub scale: f64,
    /// Nominal sampling period; 0 for on-demand sources.
    pub period_us: u32,
    /// Most samples that fit one packed frame for this source.
    pub max_pack: u8,
}

impl DataSource {
    /// 3-axis acceleration, 16-bit per axis, ±16g default range.
    pub fn acceleration() -> Self {
        Self {
            name: "acceleration",
            module: modules::ACCELEROMETER,
            register: accelerometer::DATA,
            index: None,
            components: 3,
            component_size: 2,
            signed: true,
            scale: 1.0 / 2048.0,
            period_us: 10_000,
            max_pack: 4,
        }
    }

    /// On-die temperature, eighths of a degree.
    pub fn temperature() -> Self {
        Self {
            name: "temperature",
            module: modules::TEMPERATURE,
            register: temperature::VALUE,
            index: None,
            components: 1,
            component_size: 2,
            signed: true,
            scale: 0.125,
            period_us: 0,
            max_pack: 4,
        }
    }

    /// Push-button state, 1 = pressed.
    pub fn switch_state() -> Self {
        Self {
            name: "switch",
            module: modules::SWITCH,
            register: switch::STATE,
            index: None,
            components: 1,
            component_size: 1,
            signed: false,
            scale: 1.0,
            period_us: 0,
            max_pack: 4,
        }
    }

    /// Analog read of one GPIO pin, raw ADC counts.
    pub fn gpio_analog(pin: u8) -> Self {
        Self {
            name: "gpio",
            module: modules::GPIO,
            register: gpio::ANALOG,
            index: Some(pin),
            components: 1,
            component_size: 2,
            signed: false,
            scale: 1.0,
            period_us: 0,
            max_pack: 4,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.module, self.register)
    }

    /// Decoder key for frames from this source.
    pub fn key(&self) -> SourceKey {
        match self.index {
            Some(pin) => SourceKey::indexed(self.module, self.register, pin),
            None => SourceKey::new(self.module, self.register),
        }
    }

    pub fn config(&self) -> SourceConfig {
        SourceConfig {
            scale: self.scale,
            components: self.components,
            component_size: self.component_size,
            signed: self.signed,
            period_us: self.period_us,
        }
    }

    /// Identifier root for routes built from this source.
    pub fn identifier(&self) -> String {
        match self.index {
            Some(pin) => format!("{}[{pin}]", self.name),
            None => self.name.to_string(),
        }
    }
}

/// Resolve a device-reported source address back to its catalog entry.
/// Used by route reconstruction; `index` carries the instance id for
/// multi-instance sources.
pub fn resolve(module: u8, register: u8, index: Option<u8>) -> Option<DataSource> {
    let template = match (module, register) {
        (modules::ACCELEROMETER, accelerometer::DATA) => DataSource::acceleration(),
        (modules::TEMPERATURE, temperature::VALUE) => DataSource::temperature(),
        (modules::SWITCH, switch::STATE) => DataSource::switch_state(),
        (modules::GPIO, gpio::ANALOG) => DataSource::gpio_analog(index.unwrap_or(0)),
        _ => return None,
    };
    Some(template)
}
