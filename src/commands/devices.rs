//! List matching HID interfaces.

use hidapi::HidApi;
use hidlink::config::HostConfig;
use hidlink_transport::list_devices;

use super::CommandResult;

pub fn run(config: &HostConfig) -> CommandResult {
    let api = HidApi::new()?;
    let devices = list_devices(&api, config.vid, config.pid);
    if devices.is_empty() {
        println!("No devices found for {:04X}:{:04X}", config.vid, config.pid);
        return Ok(());
    }

    println!("Devices for {:04X}:{:04X}:", config.vid, config.pid);
    for device in &devices {
        let info = &device.info;
        println!(
            "  if={} {} serial={} path={}",
            info.interface_number,
            info.product_name.as_deref().unwrap_or("?"),
            info.serial.as_deref().unwrap_or("-"),
            info.device_path
        );
    }
    Ok(())
}
