//! Deterministic, scriptable in-memory `UsbPort`, standing in for real
//! hardware in lifecycle/session tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::UsbError;
use crate::usb::{ConfigDescriptor, ControlRequest, PortHandle, UsbDeviceRef, UsbPort};

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<UsbDeviceRef>,
    next_handle: PortHandle,
    config_descriptor: ConfigDescriptor,
    kernel_driver_active: bool,
    open_result: Option<Result<(), UsbError>>,
    claim_result: Option<Result<(), UsbError>>,
    interrupt_in_queue: VecDeque<Result<Vec<u8>, UsbError>>,
    sent_interrupt_out: Vec<Vec<u8>>,
    sent_control: Vec<(ControlRequest, Vec<u8>)>,
    closed_handles: Vec<PortHandle>,
}

/// A scripted fake `UsbPort`. Configure expectations with the `with_*`
/// builders and `queue_*` methods, then hand an `Arc<MockUsbPort>` to a
/// `DeviceSession`/`DeviceManager` under test.
#[derive(Debug, Default)]
pub struct MockUsbPort {
    state: Mutex<MockState>,
}

impl MockUsbPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: UsbDeviceRef) -> Self {
        self.state.lock().unwrap().devices.push(device);
        self
    }

    pub fn with_config_descriptor(self, descriptor: ConfigDescriptor) -> Self {
        self.state.lock().unwrap().config_descriptor = descriptor;
        self
    }

    pub fn with_kernel_driver_active(self, active: bool) -> Self {
        self.state.lock().unwrap().kernel_driver_active = active;
        self
    }

    pub fn fail_open_with(self, err: UsbError) -> Self {
        self.state.lock().unwrap().open_result = Some(Err(err));
        self
    }

    pub fn fail_claim_with(self, err: UsbError) -> Self {
        self.state.lock().unwrap().claim_result = Some(Err(err));
        self
    }

    /// Queue one successful interrupt-IN response.
    pub fn queue_report(&self, bytes: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .interrupt_in_queue
            .push_back(Ok(bytes.into()));
    }

    /// Queue one interrupt-IN error (e.g. repeated `Timeout` to exercise
    /// the read loop's consecutive-error counter).
    pub fn queue_error(&self, err: UsbError) {
        self.state.lock().unwrap().interrupt_in_queue.push_back(Err(err));
    }

    pub fn sent_interrupt_out(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent_interrupt_out.clone()
    }

    pub fn sent_control(&self) -> Vec<(ControlRequest, Vec<u8>)> {
        self.state.lock().unwrap().sent_control.clone()
    }

    pub fn closed_handles(&self) -> Vec<PortHandle> {
        self.state.lock().unwrap().closed_handles.clone()
    }
}

impl UsbPort for MockUsbPort {
    fn list(&self) -> Vec<UsbDeviceRef> {
        self.state.lock().unwrap().devices.clone()
    }

    fn open(&self, _vendor_id: u16, _product_id: u16) -> Result<PortHandle, UsbError> {
        let mut state = self.state.lock().unwrap();
        if let Some(result) = state.open_result.clone() {
            return result.map(|_| 0);
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        Ok(handle)
    }

    fn set_configuration(&self, _handle: PortHandle, _config: u8) -> Result<(), UsbError> {
        Ok(())
    }

    fn auto_detach_kernel_driver(&self, _handle: PortHandle, _enable: bool) -> Result<(), UsbError> {
        Ok(())
    }

    fn kernel_driver_active(&self, _handle: PortHandle, _iface: u8) -> Result<bool, UsbError> {
        Ok(self.state.lock().unwrap().kernel_driver_active)
    }

    fn detach_kernel_driver(&self, _handle: PortHandle, _iface: u8) -> Result<(), UsbError> {
        Ok(())
    }

    fn claim_interface(&self, _handle: PortHandle, _iface: u8) -> Result<(), UsbError> {
        self.state
            .lock()
            .unwrap()
            .claim_result
            .clone()
            .unwrap_or(Ok(()))
    }

    fn release_interface(&self, _handle: PortHandle, _iface: u8) -> Result<(), UsbError> {
        Ok(())
    }

    fn active_config_descriptor(&self, _handle: PortHandle) -> Result<ConfigDescriptor, UsbError> {
        Ok(self.state.lock().unwrap().config_descriptor.clone())
    }

    fn control_transfer(
        &self,
        _handle: PortHandle,
        request: ControlRequest,
        data: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        let mut state = self.state.lock().unwrap();
        state.sent_control.push((request, data.to_vec()));
        Ok(data.len())
    }

    fn interrupt_transfer(
        &self,
        _handle: PortHandle,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        let mut state = self.state.lock().unwrap();
        // IN endpoints have the high bit set; anything else is treated as OUT.
        if endpoint & 0x80 == 0 {
            state.sent_interrupt_out.push(buf.to_vec());
            return Ok(buf.len());
        }
        match state.interrupt_in_queue.pop_front() {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => Err(UsbError::Timeout),
        }
    }

    fn bulk_transfer(
        &self,
        handle: PortHandle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.interrupt_transfer(handle, endpoint, buf, timeout)
    }

    fn close(&self, handle: PortHandle) {
        self.state.lock().unwrap().closed_handles.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_reports_are_consumed_in_order() {
        let port = MockUsbPort::new();
        port.queue_report(vec![1, 2, 3]);
        port.queue_error(UsbError::Timeout);

        let handle = port.open(0x045e, 0x02ea).unwrap();
        let mut buf = [0u8; 8];
        let n = port.interrupt_transfer(handle, 0x81, &mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        let err = port
            .interrupt_transfer(handle, 0x81, &mut buf, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, UsbError::Timeout);

        let err = port
            .interrupt_transfer(handle, 0x81, &mut buf, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, UsbError::Timeout);
    }

    #[test]
    fn open_and_claim_failures_are_injectable() {
        let port = MockUsbPort::new().fail_open_with(UsbError::AccessDenied);
        assert_eq!(port.open(1, 2).unwrap_err(), UsbError::AccessDenied);

        let port = MockUsbPort::new().fail_claim_with(UsbError::Busy);
        let handle = port.open(1, 2).unwrap();
        assert_eq!(port.claim_interface(handle, 0).unwrap_err(), UsbError::Busy);
    }
}
