use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use super::{Transport, TransportError};

/// Register transport over any `embedded-hal` I2C bus.
pub struct I2cTransport<B> {
    bus: B,
    addr: u8,
}

impl<B> I2cTransport<B> {
    pub fn new(bus: B, addr: u8) -> Self {
        I2cTransport { bus, addr }
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: I2c> Transport for I2cTransport<B> {
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), TransportError> {
        self.bus
            .write(self.addr, &[reg, value])
            .map_err(|e| convert(e.kind()))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, TransportError> {
        let mut value = [0u8; 1];
        self.bus
            .write_read(self.addr, &[reg], &mut value)
            .map_err(|e| convert(e.kind()))?;
        Ok(value[0])
    }
}

fn convert(kind: ErrorKind) -> TransportError {
    match kind {
        ErrorKind::NoAcknowledge(_) => TransportError::Nack,
        other => TransportError::Bus(other.to_string()),
    }
}
