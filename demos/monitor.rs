//! Console monitor: discovers matched devices and prints every
//! synthesized key/mouse call as it happens, using a
//! `RecordingEventSink` in place of a real OS input sink since this
//! crate ships none.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use padbridge::config::ConfigStore;
use padbridge::manager::DeviceManager;
use padbridge::output_mapper::{RecordingEventSink, SinkCall};
use padbridge::profile::Profile;

#[cfg(feature = "usb")]
use padbridge::usb::rusb_backend::RusbPort;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./configs"));
    let config_store = Arc::new(
        ConfigStore::load_all(&config_dir).unwrap_or_else(|err| {
            eprintln!("warning: failed to load configurations from {config_dir:?}: {err}");
            ConfigStore::new(Vec::new())
        }),
    );

    #[cfg(feature = "usb")]
    let port = Arc::new(RusbPort::new().expect("initialize USB context"));
    #[cfg(not(feature = "usb"))]
    let port = {
        eprintln!("built without the `usb` feature; nothing to monitor");
        std::process::exit(1);
    };

    let sink = Arc::new(RecordingEventSink::new());
    let manager = DeviceManager::new(port, config_store, sink.clone(), Profile::default());
    manager.run().await;

    println!("watching for matched devices (ctrl-c to exit)...");
    let mut last_len = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = sink.calls();
        for call in &calls[last_len..] {
            print_call(call);
        }
        last_len = calls.len();
    }
}

fn print_call(call: &SinkCall) {
    match call {
        SinkCall::KeyDown(code, modifier) => println!("key down  {code} {modifier:?}"),
        SinkCall::KeyUp(code, modifier) => println!("key up    {code} {modifier:?}"),
        SinkCall::MouseMove(dx, dy) => println!("mouse move dx={dx:.3} dy={dy:.3}"),
        SinkCall::MouseClick(button) => println!("mouse click {button:?}"),
        SinkCall::MouseScroll(dx, dy) => println!("mouse scroll dx={dx:.3} dy={dy:.3}"),
    }
}
