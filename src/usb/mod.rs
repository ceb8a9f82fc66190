//! `UsbPort`: the abstract USB transport contract (§4.2).
//!
//! Kept as a `dyn`-compatible trait (no generics) so `DeviceManager`/
//! `DeviceSession` can hold `Arc<dyn UsbPort>` without committing to a
//! backend, preferring trait objects over generic device storage.

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
#[cfg(feature = "usb")]
pub mod rusb_backend;

use std::time::Duration;

use crate::error::UsbError;

/// Opaque handle returned by [`UsbPort::open`]. Backends map this to
/// their real handle type internally.
pub type PortHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub transfer_type: TransferType,
    pub direction: TransferDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDescriptor {
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl ConfigDescriptor {
    /// First interrupt endpoint matching `direction` across every
    /// interface, if any (§4.3 step 4: "scan the active configuration
    /// for the first interrupt endpoint in each direction").
    pub fn first_endpoint(&self, direction: TransferDirection) -> Option<u8> {
        self.interfaces
            .iter()
            .flat_map(|iface| iface.endpoints.iter())
            .find(|ep| ep.direction == direction && ep.transfer_type == TransferType::Interrupt)
            .map(|ep| ep.address)
    }

    /// First interrupt endpoint matching `direction` on `interface_number`
    /// specifically, if any.
    pub fn first_endpoint_on_interface(
        &self,
        interface_number: u8,
        direction: TransferDirection,
    ) -> Option<u8> {
        self.interfaces
            .iter()
            .find(|iface| iface.number == interface_number)
            .into_iter()
            .flat_map(|iface| iface.endpoints.iter())
            .find(|ep| ep.direction == direction && ep.transfer_type == TransferType::Interrupt)
            .map(|ep| ep.address)
    }

    /// GIP OUT endpoint selection: interface 0's interrupt-OUT specifically,
    /// falling back to the cross-interface scan only if interface 0 has none
    /// (§4.3 step 4).
    pub fn gip_out_endpoint(&self) -> Option<u8> {
        self.first_endpoint_on_interface(0, TransferDirection::Out)
            .or_else(|| self.first_endpoint(TransferDirection::Out))
    }
}

/// A USB control transfer's fixed fields. `value`/`index` are the
/// standard `wValue`/`wIndex`; direction is inferred from bit 7 of
/// `request_type` (USB convention: device-to-host when set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceRef {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Raw endpoint-level USB contract. All operations are synchronous;
/// callers running on an async runtime dispatch them via
/// `spawn_blocking` (§4.9).
pub trait UsbPort: Send + Sync {
    fn list(&self) -> Vec<UsbDeviceRef>;
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<PortHandle, UsbError>;
    fn set_configuration(&self, handle: PortHandle, config: u8) -> Result<(), UsbError>;
    fn auto_detach_kernel_driver(&self, handle: PortHandle, enable: bool) -> Result<(), UsbError>;
    fn kernel_driver_active(&self, handle: PortHandle, iface: u8) -> Result<bool, UsbError>;
    fn detach_kernel_driver(&self, handle: PortHandle, iface: u8) -> Result<(), UsbError>;
    fn claim_interface(&self, handle: PortHandle, iface: u8) -> Result<(), UsbError>;
    fn release_interface(&self, handle: PortHandle, iface: u8) -> Result<(), UsbError>;
    fn active_config_descriptor(&self, handle: PortHandle) -> Result<ConfigDescriptor, UsbError>;
    fn control_transfer(
        &self,
        handle: PortHandle,
        request: ControlRequest,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
    fn interrupt_transfer(
        &self,
        handle: PortHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
    fn bulk_transfer(
        &self,
        handle: PortHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
    fn close(&self, handle: PortHandle);
}
