//! Capabilities the engine is plugged into.
//!
//! The engine owns no radio and no consumers. It writes frames through a
//! [`Transport`] and hands readings to [`ReadingSink`]s registered per kind.

use crate::commands::CommandFrame;
use crate::error::TransportError;
use crate::readings::Reading;

/// Outbound link to the controller's write characteristic.
///
/// Writes are fire-and-forget: the engine logs and counts failures but never
/// retries, since the next poll cycle asks again anyway.
pub trait Transport {
    /// Writes one 20-byte command frame.
    ///
    /// # Errors
    /// - [`TransportError::NotReady`] - No connection or characteristic
    /// - [`TransportError::WriteFailed`] - The stack refused the write
    fn write(&mut self, frame: &CommandFrame) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        (**self).write(frame)
    }
}

/// Consumer of readings of one kind.
pub trait ReadingSink: Send {
    /// Receives a reading. Called synchronously from the engine.
    fn publish(&mut self, reading: &Reading);
}

impl<F> ReadingSink for F
where
    F: FnMut(&Reading) + Send,
{
    fn publish(&mut self, reading: &Reading) {
        self(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::ReadingKind;

    struct Collect(Vec<Reading>);

    impl ReadingSink for Collect {
        fn publish(&mut self, reading: &Reading) {
            self.0.push(reading.clone());
        }
    }

    #[test]
    fn closures_are_sinks() {
        let mut count = 0;
        {
            let mut sink = |_: &Reading| count += 1;
            sink.publish(&Reading::number(ReadingKind::Hardness, 18.0));
            sink.publish(&Reading::number(ReadingKind::Hardness, 19.0));
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn struct_sink_collects() {
        let mut sink = Collect(Vec::new());
        sink.publish(&Reading::flag(ReadingKind::RegenActive, false));
        assert_eq!(sink.0.len(), 1);
    }
}
