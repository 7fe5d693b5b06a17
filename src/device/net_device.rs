use bitflags::bitflags;
use log::{debug, error, info};
use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};

use super::{DeviceDriver, DeviceError};

/// Length of hardware address fields
pub const DEVICE_ADDR_LEN: usize = 16;

/// Device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Discards everything it is given
    Dummy,
    Loopback,
    Ethernet,
}

impl DeviceType {
    /// Numeric type tag
    pub fn as_u16(self) -> u16 {
        match self {
            DeviceType::Dummy => 0x0000,
            DeviceType::Loopback => 0x0001,
            DeviceType::Ethernet => 0x0002,
        }
    }
}

bitflags! {
    /// Device state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u16 {
        const UP = 0x0001;
        const LOOPBACK = 0x0010;
        const BROADCAST = 0x0020;
        const POINT_TO_POINT = 0x0040;
        const NEED_ARP = 0x0100;
    }
}

/// Second address slot of a device
///
/// Point-to-point links know their peer, broadcast media know their
/// broadcast address; a device never needs both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPeer {
    #[default]
    None,
    Broadcast([u8; DEVICE_ADDR_LEN]),
    PointToPoint([u8; DEVICE_ADDR_LEN]),
}

/// Unregistered device record
///
/// Every field starts zeroed except the driver. Registering the builder with
/// a [`DeviceRegistry`](super::DeviceRegistry) assigns index and name.
pub struct NetDeviceBuilder {
    kind: DeviceType,
    mtu: u16,
    flags: DeviceFlags,
    hlen: u16,
    alen: u16,
    addr: [u8; DEVICE_ADDR_LEN],
    peer: LinkPeer,
    driver: Box<dyn DeviceDriver>,
}

impl NetDeviceBuilder {
    pub fn with_type(mut self, kind: DeviceType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Initial flags; `UP` is always cleared, devices start closed
    pub fn with_flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags - DeviceFlags::UP;
        self
    }

    pub fn with_header_len(mut self, hlen: u16) -> Self {
        self.hlen = hlen;
        self
    }

    /// Hardware address; `alen` is taken from the slice length
    ///
    /// At most `DEVICE_ADDR_LEN` bytes are kept. Longer addresses are a bug
    /// in the caller and trip a debug assertion.
    pub fn with_address(mut self, addr: &[u8]) -> Self {
        debug_assert!(
            addr.len() <= DEVICE_ADDR_LEN,
            "hardware address longer than {} bytes",
            DEVICE_ADDR_LEN
        );
        let len = addr.len().min(DEVICE_ADDR_LEN);
        self.addr = [0; DEVICE_ADDR_LEN];
        self.addr[..len].copy_from_slice(&addr[..len]);
        self.alen = len as u16;
        self
    }

    pub fn with_peer(mut self, peer: LinkPeer) -> Self {
        self.peer = peer;
        self
    }

    pub(crate) fn build(self, index: u32) -> NetDevice {
        NetDevice {
            index,
            name: format!("net{}", index),
            kind: self.kind,
            mtu: self.mtu,
            flags: RwLock::new(self.flags),
            transition: Mutex::new(()),
            hlen: self.hlen,
            alen: self.alen,
            addr: self.addr,
            peer: self.peer,
            driver: self.driver,
        }
    }
}

/// Registered network device
pub struct NetDevice {
    index: u32,
    name: String,
    kind: DeviceType,
    mtu: u16,
    flags: RwLock<DeviceFlags>,
    /// Held for the whole of an open or close
    transition: Mutex<()>,
    hlen: u16,
    alen: u16,
    addr: [u8; DEVICE_ADDR_LEN],
    peer: LinkPeer,
    driver: Box<dyn DeviceDriver>,
}

impl NetDevice {
    /// Allocate a zeroed device record driven by `driver`
    pub fn builder(driver: impl DeviceDriver + 'static) -> NetDeviceBuilder {
        NetDeviceBuilder {
            kind: DeviceType::Dummy,
            mtu: 0,
            flags: DeviceFlags::empty(),
            hlen: 0,
            alen: 0,
            addr: [0; DEVICE_ADDR_LEN],
            peer: LinkPeer::None,
            driver: Box::new(driver),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeviceType {
        self.kind
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn header_len(&self) -> u16 {
        self.hlen
    }

    pub fn address_len(&self) -> u16 {
        self.alen
    }

    /// Hardware address, `address_len()` bytes long
    pub fn address(&self) -> &[u8] {
        &self.addr[..self.alen as usize]
    }

    pub fn peer(&self) -> LinkPeer {
        self.peer
    }

    pub fn flags(&self) -> DeviceFlags {
        *self.flags.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_up(&self) -> bool {
        self.flags().contains(DeviceFlags::UP)
    }

    /// "up" or "down"
    pub fn state(&self) -> &'static str {
        if self.is_up() {
            "up"
        } else {
            "down"
        }
    }

    /// Closed -> Open
    ///
    /// Open and close are serialized per device, so of two racing opens
    /// exactly one reaches the driver.
    pub fn open(&self) -> Result<(), DeviceError> {
        let _transition = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_up() {
            error!("already opened, dev={}", self.name);
            return Err(DeviceError::AlreadyOpened {
                name: self.name.clone(),
            });
        }
        if let Err(e) = self.driver.open(self) {
            error!("failure, dev={}: {}", self.name, e);
            return Err(e);
        }
        self.set_flag(DeviceFlags::UP, true);
        info!("dev={}, state={}", self.name, self.state());
        Ok(())
    }

    /// Open -> Closed
    pub fn close(&self) -> Result<(), DeviceError> {
        let _transition = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_up() {
            error!("not opened, dev={}", self.name);
            return Err(DeviceError::NotOpened {
                name: self.name.clone(),
            });
        }
        if let Err(e) = self.driver.close(self) {
            error!("failure, dev={}: {}", self.name, e);
            return Err(e);
        }
        self.set_flag(DeviceFlags::UP, false);
        info!("dev={}, state={}", self.name, self.state());
        Ok(())
    }

    /// Hand one frame to the driver
    ///
    /// The device must be open and `data` must fit in the MTU; the driver is
    /// not called otherwise.
    pub fn output(&self, ty: u16, data: &[u8], dst: Option<&[u8]>) -> Result<(), DeviceError> {
        if !self.is_up() {
            error!("not opened, dev={}", self.name);
            return Err(DeviceError::NotOpened {
                name: self.name.clone(),
            });
        }
        if data.len() > self.mtu as usize {
            error!(
                "too long, dev={}, mtu={}, len={}",
                self.name,
                self.mtu,
                data.len()
            );
            return Err(DeviceError::TooLong {
                name: self.name.clone(),
                mtu: self.mtu,
                len: data.len(),
            });
        }
        debug!("dev={}, type=0x{:04x}, len={}", self.name, ty, data.len());
        self.driver.transmit(self, ty, data, dst).map_err(|e| {
            error!(
                "device transmit failure, dev={}, len={}: {}",
                self.name,
                data.len(),
                e
            );
            e
        })
    }

    fn set_flag(&self, flag: DeviceFlags, value: bool) {
        let mut flags = self.flags.write().unwrap_or_else(PoisonError::into_inner);
        flags.set(flag, value);
    }
}

impl fmt::Debug for NetDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetDevice")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mtu", &self.mtu)
            .field("flags", &self.flags())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for NetDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDriver;

    fn build(driver: MockDriver, mtu: u16) -> NetDevice {
        NetDevice::builder(driver).with_mtu(mtu).build(7)
    }

    #[test]
    fn test_builder_starts_zeroed() {
        let dev = NetDevice::builder(MockDriver::new()).build(3);
        assert_eq!(dev.index(), 3);
        assert_eq!(dev.name(), "net3");
        assert_eq!(dev.kind(), DeviceType::Dummy);
        assert_eq!(dev.mtu(), 0);
        assert_eq!(dev.flags(), DeviceFlags::empty());
        assert_eq!(dev.header_len(), 0);
        assert_eq!(dev.address_len(), 0);
        assert!(dev.address().is_empty());
        assert_eq!(dev.peer(), LinkPeer::None);
    }

    #[test]
    fn test_builder_never_starts_up() {
        let dev = NetDevice::builder(MockDriver::new())
            .with_flags(DeviceFlags::UP | DeviceFlags::BROADCAST)
            .build(0);
        assert!(!dev.is_up());
        assert!(dev.flags().contains(DeviceFlags::BROADCAST));
    }

    #[test]
    fn test_builder_address() {
        let mac = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
        let dev = NetDevice::builder(MockDriver::new())
            .with_type(DeviceType::Ethernet)
            .with_header_len(14)
            .with_address(&mac)
            .with_peer(LinkPeer::Broadcast([0xff; DEVICE_ADDR_LEN]))
            .build(0);
        assert_eq!(dev.kind().as_u16(), 0x0002);
        assert_eq!(dev.header_len(), 14);
        assert_eq!(dev.address_len(), 6);
        assert_eq!(dev.address(), &mac);
        assert!(matches!(dev.peer(), LinkPeer::Broadcast(_)));
    }

    #[test]
    fn test_open_close_flip_up_only() {
        let driver = MockDriver::new();
        let dev = NetDevice::builder(driver.clone())
            .with_flags(DeviceFlags::LOOPBACK)
            .build(0);

        dev.open().unwrap();
        assert_eq!(dev.flags(), DeviceFlags::LOOPBACK | DeviceFlags::UP);
        assert_eq!(dev.state(), "up");

        dev.close().unwrap();
        assert_eq!(dev.flags(), DeviceFlags::LOOPBACK);
        assert_eq!(dev.state(), "down");

        assert_eq!(driver.open_count(), 1);
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn test_double_open_and_close_fail() {
        let dev = build(MockDriver::new(), 1500);

        assert!(matches!(dev.close(), Err(DeviceError::NotOpened { .. })));
        dev.open().unwrap();
        assert!(matches!(dev.open(), Err(DeviceError::AlreadyOpened { .. })));
        assert!(dev.is_up());
    }

    #[test]
    fn test_failed_open_stays_down() {
        let driver = MockDriver::new();
        driver.fail_open(true);
        let dev = build(driver, 1500);

        let err = dev.open().unwrap_err();
        assert!(matches!(err, DeviceError::Driver { .. }));
        assert!(!dev.is_up());
    }

    #[test]
    fn test_output_requires_open() {
        let driver = MockDriver::new();
        let dev = build(driver.clone(), 1500);

        let result = dev.output(0x0800, &[1, 2, 3], None);
        assert!(matches!(result, Err(DeviceError::NotOpened { .. })));
        assert_eq!(driver.transmit_count(), 0);
    }

    #[test]
    fn test_output_mtu_boundary() {
        let driver = MockDriver::new();
        let dev = build(driver.clone(), 8);
        dev.open().unwrap();

        let result = dev.output(0x0800, &[0u8; 9], None);
        assert!(matches!(result, Err(DeviceError::TooLong { mtu: 8, len: 9, .. })));
        assert_eq!(driver.transmit_count(), 0);

        dev.output(0x0800, &[0u8; 8], None).unwrap();
        assert_eq!(driver.transmit_count(), 1);
    }

    #[test]
    fn test_output_propagates_driver_failure() {
        let driver = MockDriver::new();
        driver.fail_transmit(true);
        let dev = build(driver.clone(), 1500);
        dev.open().unwrap();

        let result = dev.output(0x0806, &[0xaa], Some(&[0xff; 6]));
        assert!(matches!(result, Err(DeviceError::Driver { .. })));
        assert_eq!(driver.transmit_count(), 1);
    }

    /// Driver whose open takes long enough for callers to overlap
    struct SlowOpen {
        opens: std::sync::atomic::AtomicUsize,
    }

    impl DeviceDriver for SlowOpen {
        fn open(&self, _dev: &NetDevice) -> Result<(), DeviceError> {
            self.opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(())
        }

        fn transmit(
            &self,
            _dev: &NetDevice,
            _ty: u16,
            _data: &[u8],
            _dst: Option<&[u8]>,
        ) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_open_succeeds_once() {
        use std::sync::{Arc, Barrier};

        let dev = Arc::new(
            NetDevice::builder(SlowOpen {
                opens: Default::default(),
            })
            .build(0),
        );
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let dev = Arc::clone(&dev);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    dev.open()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let oks = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(DeviceError::AlreadyOpened { .. }))));
        assert!(dev.is_up());
    }

    #[test]
    fn test_driver_may_read_flags_during_open() {
        struct ReadsFlags;

        impl DeviceDriver for ReadsFlags {
            fn open(&self, dev: &NetDevice) -> Result<(), DeviceError> {
                assert!(!dev.is_up());
                Ok(())
            }

            fn transmit(
                &self,
                _dev: &NetDevice,
                _ty: u16,
                _data: &[u8],
                _dst: Option<&[u8]>,
            ) -> Result<(), DeviceError> {
                Ok(())
            }
        }

        let dev = NetDevice::builder(ReadsFlags).build(0);
        dev.open().unwrap();
        assert!(dev.is_up());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "hardware address longer than")]
    fn test_oversize_address_rejected() {
        let _ = NetDevice::builder(MockDriver::new()).with_address(&[0u8; DEVICE_ADDR_LEN + 1]);
    }
}
