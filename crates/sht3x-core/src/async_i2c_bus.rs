//! Async I2C bus sharing with optional channel multiplexing
//!
//! SHT3x sensors only offer two addresses, so larger installations put them
//! behind a multiplexer. Every [`SharedI2cDevice`] remembers which mux
//! channel its sensor lives on and switches to it while it holds the bus
//! lock, so the channel select and the transfer can never be interleaved
//! with another device's traffic.

use core::convert::Infallible;
use core::fmt::Debug;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::trace;

/// Selects a downstream channel before a transaction.
pub trait ChannelSelect<T> {
    type Error: Debug;

    /// Number of downstream channels this selector can route to.
    const CHANNELS: u8;

    /// Route the bus to `channel`. Called with the bus lock held.
    fn select(
        &mut self,
        i2c: &mut T,
        channel: u8,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Plain bus without a multiplexer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMux;

impl<T> ChannelSelect<T> for NoMux {
    type Error = Infallible;

    // Every channel reaches the same wires
    const CHANNELS: u8 = 1;

    async fn select(&mut self, _i2c: &mut T, _channel: u8) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxError<E> {
    /// Driving the multiplexer failed
    Select(E),
    /// The channel does not exist on this multiplexer
    InvalidChannel(u8),
}

/// Analog multiplexer driven by two GPIO select lines (4 channels).
pub struct GpioMux<P> {
    sel0: P,
    sel1: P,
}

impl<P: OutputPin> GpioMux<P> {
    pub fn new(sel0: P, sel1: P) -> Self {
        Self { sel0, sel1 }
    }

    fn drive(pin: &mut P, high: bool) -> Result<(), MuxError<P::Error>> {
        if high {
            pin.set_high().map_err(MuxError::Select)
        } else {
            pin.set_low().map_err(MuxError::Select)
        }
    }
}

impl<T, P: OutputPin> ChannelSelect<T> for GpioMux<P> {
    type Error = MuxError<P::Error>;

    const CHANNELS: u8 = 4;

    async fn select(&mut self, _i2c: &mut T, channel: u8) -> Result<(), Self::Error> {
        if channel >= <Self as ChannelSelect<T>>::CHANNELS {
            return Err(MuxError::InvalidChannel(channel));
        }
        Self::drive(&mut self.sel0, channel & 0b01 != 0)?;
        Self::drive(&mut self.sel1, channel & 0b10 != 0)
    }
}

/// The bus peripheral together with its multiplexer and the cached
/// channel selection.
pub struct MuxedBus<T, M> {
    i2c: T,
    mux: M,
    selected: Option<u8>,
}

impl<T, M> MuxedBus<T, M> {
    pub const fn new(i2c: T, mux: M) -> Self {
        Self {
            i2c,
            mux,
            selected: None,
        }
    }

    /// Direct access to the underlying bus, bypassing channel selection.
    pub fn i2c_mut(&mut self) -> &mut T {
        &mut self.i2c
    }

    pub fn selected(&self) -> Option<u8> {
        self.selected
    }
}

impl<T> MuxedBus<T, NoMux> {
    pub const fn unmuxed(i2c: T) -> Self {
        Self::new(i2c, NoMux)
    }
}

/// A bus that can be shared between tasks.
pub type SharedBus<T, M> = Mutex<CriticalSectionRawMutex, MuxedBus<T, M>>;

/// Error from a [`SharedI2cDevice`]: either the transfer or the channel
/// select failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError<E, M> {
    I2c(E),
    Mux(M),
}

impl<E, M> embedded_hal::i2c::Error for BusError<E, M>
where
    E: embedded_hal::i2c::Error,
    M: Debug,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::I2c(e) => e.kind(),
            Self::Mux(_) => ErrorKind::Other,
        }
    }
}

/// Async I2C device on a shared, optionally multiplexed bus.
///
/// Each sensor gets its own instance. Embassy's `Mutex` is held across the
/// awaits of the channel select and the transfer, yielding to the executor
/// while the bus is busy.
///
/// # Example
///
/// ```ignore
/// static I2C_BUS: StaticCell<SharedBus<I2c<'static, Async>, GpioMux<Output<'static>>>> =
///     StaticCell::new();
///
/// let bus = I2C_BUS.init(Mutex::new(MuxedBus::new(i2c, GpioMux::new(sel0, sel1))));
///
/// let channel0 = SharedI2cDevice::new(bus, Some(0));
/// let channel1 = SharedI2cDevice::new(bus, Some(1));
/// ```
pub struct SharedI2cDevice<'a, T, M> {
    bus: &'a SharedBus<T, M>,
    channel: Option<u8>,
}

impl<'a, T, M> SharedI2cDevice<'a, T, M> {
    /// Create a device on `channel`, or outside any channel with `None`.
    #[inline]
    pub const fn new(bus: &'a SharedBus<T, M>, channel: Option<u8>) -> Self {
        Self { bus, channel }
    }

    pub const fn channel(&self) -> Option<u8> {
        self.channel
    }
}

impl<T, M> SharedI2cDevice<'_, T, M>
where
    T: I2c,
    M: ChannelSelect<T>,
{
    async fn run(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), BusError<T::Error, M::Error>> {
        let mut bus = self.bus.lock().await;
        let bus = &mut *bus;

        if let Some(channel) = self.channel {
            if bus.selected != Some(channel) {
                trace!("I2C mux: switching to channel {}", channel);
                // Forget the cached channel until the switch is confirmed
                bus.selected = None;
                bus.mux
                    .select(&mut bus.i2c, channel)
                    .await
                    .map_err(BusError::Mux)?;
                bus.selected = Some(channel);
            }
        }

        bus.i2c
            .transaction(address, operations)
            .await
            .map_err(BusError::I2c)
    }
}

impl<T, M> ErrorType for SharedI2cDevice<'_, T, M>
where
    T: I2c,
    M: ChannelSelect<T>,
{
    type Error = BusError<T::Error, M::Error>;
}

impl<T, M> I2c for SharedI2cDevice<'_, T, M>
where
    T: I2c,
    M: ChannelSelect<T>,
{
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.run(address, &mut [Operation::Read(read)]).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.run(address, &mut [Operation::Write(write)]).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.run(address, &mut [Operation::Write(write), Operation::Read(read)])
            .await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run(address, operations).await
    }
}

/// A bus that hands out one I2C device per downstream channel.
///
/// The monitor scans `0..CHANNELS` and talks to every sensor through the
/// device returned for its channel.
pub trait ChannelBus {
    type Device<'a>: I2c
    where
        Self: 'a;

    /// Number of distinct channels behind this bus (1 for a plain bus).
    const CHANNELS: u8;

    fn device(&self, channel: u8) -> Self::Device<'_>;
}

impl<T, M> ChannelBus for SharedBus<T, M>
where
    T: I2c,
    M: ChannelSelect<T>,
{
    type Device<'a>
        = SharedI2cDevice<'a, T, M>
    where
        Self: 'a;

    const CHANNELS: u8 = M::CHANNELS;

    fn device(&self, channel: u8) -> Self::Device<'_> {
        SharedI2cDevice::new(self, Some(channel))
    }
}

#[cfg(feature = "tca9548a")]
pub use tca9548a::{SharedTca9548a, TCA9548A_CHANNELS, Tca9548aDevice};

#[cfg(feature = "tca9548a")]
mod tca9548a {
    use embedded_hal::i2c::{Error as _, ErrorKind};
    use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
    use log::{error, trace};
    use tca9548a_embedded::r#async::Tca9548aAsync;

    use super::{ChannelBus, CriticalSectionRawMutex, Mutex};

    pub const TCA9548A_CHANNELS: u8 = 8;

    /// A TCA9548A switch and the bus behind it, shared between tasks.
    ///
    /// ```ignore
    /// let mux = Tca9548aAsync::new(i2c, 0x70);
    /// let bus: SharedTca9548a<_> = Mutex::new(mux);
    /// let sensor_i2c = bus.device(3);
    /// ```
    pub type SharedTca9548a<T> = Mutex<CriticalSectionRawMutex, Tca9548aAsync<T>>;

    /// I2C device on one TCA9548A channel.
    ///
    /// The switch stays locked from the channel select until the transfer
    /// completes.
    pub struct Tca9548aDevice<'a, T> {
        bus: &'a SharedTca9548a<T>,
        channel: u8,
    }

    impl<'a, T> Tca9548aDevice<'a, T> {
        pub const fn new(bus: &'a SharedTca9548a<T>, channel: u8) -> Self {
            Self { bus, channel }
        }

        pub const fn channel(&self) -> u8 {
            self.channel
        }
    }

    impl<T: I2c> ErrorType for Tca9548aDevice<'_, T> {
        type Error = ErrorKind;
    }

    impl<T: I2c> I2c for Tca9548aDevice<'_, T> {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut mux = self.bus.lock().await;
            trace!("TCA9548A: routing to channel {}", self.channel);

            let mut device = mux.channel(self.channel).map_err(|_| {
                error!("Failed to select TCA9548A channel {}", self.channel);
                ErrorKind::Other
            })?;

            device
                .transaction(address, operations)
                .await
                .map_err(|e| e.kind())
        }
    }

    impl<T: I2c> ChannelBus for SharedTca9548a<T> {
        type Device<'a>
            = Tca9548aDevice<'a, T>
        where
            Self: 'a;

        const CHANNELS: u8 = TCA9548A_CHANNELS;

        fn device(&self, channel: u8) -> Self::Device<'_> {
            Tca9548aDevice::new(self, channel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{I2cAddress, Sht3x};
    use crate::emulator::{EmulatedBus, EmulatedSht3x, NoopDelay};
    use core::cell::Cell;
    use embassy_futures::block_on;

    /// Records the select lines instead of driving hardware.
    struct FakePin<'a> {
        level: &'a Cell<bool>,
    }

    impl embedded_hal::digital::ErrorType for FakePin<'_> {
        type Error = Infallible;
    }

    impl OutputPin for FakePin<'_> {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.level.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.level.set(true);
            Ok(())
        }
    }

    fn gpio_bus<'a>(
        sel0: &'a Cell<bool>,
        sel1: &'a Cell<bool>,
    ) -> SharedBus<EmulatedBus, GpioMux<FakePin<'a>>> {
        let mut i2c = EmulatedBus::new();
        i2c.attach(EmulatedSht3x::new(0x44)).unwrap();
        Mutex::new(MuxedBus::new(
            i2c,
            GpioMux::new(FakePin { level: sel0 }, FakePin { level: sel1 }),
        ))
    }

    #[test]
    fn test_device_selects_its_channel_under_the_lock() {
        let sel0 = Cell::new(false);
        let sel1 = Cell::new(false);
        let bus = gpio_bus(&sel0, &sel1);

        let mut sht = Sht3x::new(bus.device(3), NoopDelay, I2cAddress::Default);
        assert!(block_on(sht.probe()).is_ok());

        assert!(sel0.get());
        assert!(sel1.get());
        assert_eq!(block_on(bus.lock()).selected(), Some(3));
    }

    #[test]
    fn test_cached_channel_is_not_reselected() {
        let sel0 = Cell::new(false);
        let sel1 = Cell::new(false);
        let bus = gpio_bus(&sel0, &sel1);

        let mut sht = Sht3x::new(bus.device(1), NoopDelay, I2cAddress::Default);
        block_on(sht.probe()).unwrap();
        assert!(sel0.get());

        // Any further select would drive line 0 back high
        sel0.set(false);
        block_on(sht.probe()).unwrap();
        assert!(!sel0.get());
    }

    #[test]
    fn test_invalid_channel_is_a_mux_error() {
        let sel0 = Cell::new(false);
        let sel1 = Cell::new(false);
        let bus = gpio_bus(&sel0, &sel1);

        let mut device = SharedI2cDevice::new(&bus, Some(9));
        let result = block_on(device.write(0x44, &[0xF3, 0x2D]));
        assert!(matches!(result, Err(BusError::Mux(MuxError::InvalidChannel(9)))));
        assert_eq!(
            embedded_hal::i2c::Error::kind(&result.unwrap_err()),
            ErrorKind::Other
        );
        assert_eq!(block_on(bus.lock()).selected(), None);
    }

    #[test]
    fn test_gpio_mux_drives_select_lines() {
        let sel0 = Cell::new(false);
        let sel1 = Cell::new(false);
        let mut mux = GpioMux::new(FakePin { level: &sel0 }, FakePin { level: &sel1 });
        let mut i2c = EmulatedBus::new();

        block_on(ChannelSelect::select(&mut mux, &mut i2c, 2)).unwrap();
        assert!(!sel0.get());
        assert!(sel1.get());

        block_on(ChannelSelect::select(&mut mux, &mut i2c, 1)).unwrap();
        assert!(sel0.get());
        assert!(!sel1.get());

        assert_eq!(
            block_on(ChannelSelect::select(&mut mux, &mut i2c, 4)),
            Err(MuxError::InvalidChannel(4))
        );
    }

    #[test]
    fn test_unmuxed_bus_never_selects() {
        let mut i2c = EmulatedBus::new();
        i2c.attach(EmulatedSht3x::new(0x45)).unwrap();
        let bus: SharedBus<EmulatedBus, NoMux> = Mutex::new(MuxedBus::unmuxed(i2c));

        let mut sht = Sht3x::new(
            SharedI2cDevice::new(&bus, None),
            NoopDelay,
            I2cAddress::Alternate,
        );
        assert!(block_on(sht.init()).is_ok());
        assert_eq!(block_on(bus.lock()).selected(), None);
    }

    #[test]
    fn test_channel_counts() {
        assert_eq!(<SharedBus<EmulatedBus, NoMux> as ChannelBus>::CHANNELS, 1);
        assert_eq!(
            <SharedBus<EmulatedBus, GpioMux<FakePin<'static>>> as ChannelBus>::CHANNELS,
            4
        );
    }

    #[cfg(feature = "tca9548a")]
    mod tca9548a {
        use super::*;
        use crate::emulator::TCA9548A_DEFAULT_ADDRESS;
        use tca9548a_embedded::r#async::Tca9548aAsync;

        fn switched_bus() -> SharedTca9548a<EmulatedBus> {
            let mut i2c = EmulatedBus::with_mux(TCA9548A_DEFAULT_ADDRESS);
            i2c.attach(EmulatedSht3x::new(0x44).on_channel(0).with_serial(0x1111_0000))
                .unwrap();
            i2c.attach(EmulatedSht3x::new(0x44).on_channel(3).with_serial(0x3333_0000))
                .unwrap();
            Mutex::new(Tca9548aAsync::new(i2c, TCA9548A_DEFAULT_ADDRESS))
        }

        #[test]
        fn test_devices_on_different_channels_share_an_address() {
            let bus = switched_bus();
            let mut first = Sht3x::new(bus.device(0), NoopDelay, I2cAddress::Default);
            let mut second = Sht3x::new(bus.device(3), NoopDelay, I2cAddress::Default);

            assert_eq!(block_on(first.read_serial()).unwrap(), 0x1111_0000);
            assert_eq!(block_on(second.read_serial()).unwrap(), 0x3333_0000);
            assert_eq!(block_on(first.read_serial()).unwrap(), 0x1111_0000);
        }

        #[test]
        fn test_empty_channel_reports_unknown_device() {
            let bus = switched_bus();
            let mut sht = Sht3x::new(bus.device(5), NoopDelay, I2cAddress::Default);
            assert!(matches!(
                block_on(sht.probe()),
                Err(crate::Sht3xError::UnknownDevice(0x44))
            ));
        }

        #[test]
        fn test_switch_has_eight_channels() {
            assert_eq!(<SharedTca9548a<EmulatedBus> as ChannelBus>::CHANNELS, 8);
            assert_eq!(switched_bus().device(6).channel(), 6);
        }
    }
}
