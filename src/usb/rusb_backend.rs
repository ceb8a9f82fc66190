//! `rusb`-backed [`UsbPort`] — the real transport. `rusb` is used
//! because explicit configuration selection, kernel-driver detach, and
//! raw interrupt/control transfers on arbitrary endpoints sit below
//! what a whole-report HID API exposes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};
use rusb::{Context, DeviceHandle, UsbContext};

use crate::error::UsbError;
use crate::usb::{
    ConfigDescriptor, ControlRequest, EndpointDescriptor, InterfaceDescriptor, PortHandle,
    TransferDirection, TransferType, UsbDeviceRef, UsbPort,
};

fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Access => UsbError::AccessDenied,
        rusb::Error::NoDevice | rusb::Error::NotFound => UsbError::DeviceDisconnected,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NotSupported => UsbError::NotSupported,
        other => UsbError::Io(other.to_string()),
    }
}

fn map_transfer_type(kind: rusb::TransferType) -> TransferType {
    match kind {
        rusb::TransferType::Control => TransferType::Control,
        rusb::TransferType::Isochronous => TransferType::Isochronous,
        rusb::TransferType::Bulk => TransferType::Bulk,
        rusb::TransferType::Interrupt => TransferType::Interrupt,
    }
}

/// Real `UsbPort` wrapping a `rusb::Context`. Open handles are tracked
/// behind an opaque [`PortHandle`] counter so the trait stays free of
/// `rusb` types at the call site.
pub struct RusbPort {
    context: Context,
    handles: Mutex<HashMap<PortHandle, DeviceHandle<Context>>>,
    next_handle: Mutex<PortHandle>,
}

impl RusbPort {
    pub fn new() -> Result<Self, UsbError> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self {
            context,
            handles: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(0),
        })
    }

    fn with_handle<T>(
        &self,
        handle: PortHandle,
        f: impl FnOnce(&DeviceHandle<Context>) -> Result<T, rusb::Error>,
    ) -> Result<T, UsbError> {
        let handles = self.handles.lock().unwrap();
        let device = handles.get(&handle).ok_or(UsbError::DeviceDisconnected)?;
        f(device).map_err(map_rusb_error)
    }
}

impl UsbPort for RusbPort {
    fn list(&self) -> Vec<UsbDeviceRef> {
        let devices = match self.context.devices() {
            Ok(devices) => devices,
            Err(err) => {
                warn!("failed to enumerate USB devices: {err}");
                return Vec::new();
            }
        };
        devices
            .iter()
            .filter_map(|device| {
                let descriptor = device.device_descriptor().ok()?;
                Some(UsbDeviceRef {
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                })
            })
            .collect()
    }

    fn open(&self, vendor_id: u16, product_id: u16) -> Result<PortHandle, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }
            let handle = device.open().map_err(map_rusb_error)?;
            let mut next = self.next_handle.lock().unwrap();
            let port_handle = *next;
            *next += 1;
            self.handles.lock().unwrap().insert(port_handle, handle);
            debug!("opened {vendor_id:04x}:{product_id:04x} as handle {port_handle}");
            return Ok(port_handle);
        }
        Err(UsbError::DeviceDisconnected)
    }

    fn set_configuration(&self, handle: PortHandle, config: u8) -> Result<(), UsbError> {
        self.with_handle(handle, |device| device.set_active_configuration(config))
    }

    fn auto_detach_kernel_driver(&self, handle: PortHandle, enable: bool) -> Result<(), UsbError> {
        self.with_handle(handle, |device| device.set_auto_detach_kernel_driver(enable))
    }

    fn kernel_driver_active(&self, handle: PortHandle, iface: u8) -> Result<bool, UsbError> {
        self.with_handle(handle, |device| device.kernel_driver_active(iface))
    }

    fn detach_kernel_driver(&self, handle: PortHandle, iface: u8) -> Result<(), UsbError> {
        self.with_handle(handle, |device| device.detach_kernel_driver(iface))
    }

    fn claim_interface(&self, handle: PortHandle, iface: u8) -> Result<(), UsbError> {
        self.with_handle(handle, |device| device.claim_interface(iface))
    }

    fn release_interface(&self, handle: PortHandle, iface: u8) -> Result<(), UsbError> {
        self.with_handle(handle, |device| device.release_interface(iface))
    }

    fn active_config_descriptor(&self, handle: PortHandle) -> Result<ConfigDescriptor, UsbError> {
        let handles = self.handles.lock().unwrap();
        let device_handle = handles.get(&handle).ok_or(UsbError::DeviceDisconnected)?;
        let config = device_handle
            .device()
            .active_config_descriptor()
            .map_err(map_rusb_error)?;

        let interfaces = config
            .interfaces()
            .map(|interface| {
                let endpoints = interface
                    .descriptors()
                    .flat_map(|descriptor| descriptor.endpoint_descriptors())
                    .map(|endpoint| EndpointDescriptor {
                        address: endpoint.address(),
                        transfer_type: map_transfer_type(endpoint.transfer_type()),
                        direction: match endpoint.direction() {
                            rusb::Direction::In => TransferDirection::In,
                            rusb::Direction::Out => TransferDirection::Out,
                        },
                    })
                    .collect();
                InterfaceDescriptor {
                    number: interface.number(),
                    endpoints,
                }
            })
            .collect();

        Ok(ConfigDescriptor { interfaces })
    }

    fn control_transfer(
        &self,
        handle: PortHandle,
        request: ControlRequest,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.with_handle(handle, |device| {
            if request.is_device_to_host() {
                device.read_control(
                    request.request_type,
                    request.request,
                    request.value,
                    request.index,
                    data,
                    timeout,
                )
            } else {
                device.write_control(
                    request.request_type,
                    request.request,
                    request.value,
                    request.index,
                    data,
                    timeout,
                )
            }
        })
    }

    fn interrupt_transfer(
        &self,
        handle: PortHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.with_handle(handle, |device| {
            if endpoint & 0x80 != 0 {
                device.read_interrupt(endpoint, buf, timeout)
            } else {
                device.write_interrupt(endpoint, buf, timeout)
            }
        })
    }

    fn bulk_transfer(
        &self,
        handle: PortHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.with_handle(handle, |device| {
            if endpoint & 0x80 != 0 {
                device.read_bulk(endpoint, buf, timeout)
            } else {
                device.write_bulk(endpoint, buf, timeout)
            }
        })
    }

    fn close(&self, handle: PortHandle) {
        self.handles.lock().unwrap().remove(&handle);
    }
}
