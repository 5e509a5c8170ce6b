use colored::Colorize;
use farecard_apdu_transport_pcsc::PcscDeviceManager;
use farecard_apdu_transport_pn533::UsbBulk;

/// List PC/SC readers and PN533 USB devices
pub(crate) fn list_command() -> anyhow::Result<()> {
    println!("{}", "PC/SC readers:".bold());
    match PcscDeviceManager::new().and_then(|manager| manager.list_readers()) {
        Ok(readers) if readers.is_empty() => println!("  none"),
        Ok(readers) => {
            for (i, reader) in readers.iter().enumerate() {
                let status = match reader.atr() {
                    Some(atr) => format!("card present, ATR {}", hex::encode(atr)).green(),
                    None => "no card".normal(),
                };
                println!("  {}. {} ({status})", i + 1, reader.name());
            }
        }
        Err(e) => println!("  {}", format!("unavailable: {e}").yellow()),
    }

    println!("{}", "PN533 USB devices:".bold());
    match UsbBulk::list() {
        Ok(devices) if devices.is_empty() => println!("  none"),
        Ok(devices) => {
            for (i, device) in devices.iter().enumerate() {
                println!("  {}. {device}", i + 1);
            }
        }
        Err(e) => println!("  {}", format!("unavailable: {e}").yellow()),
    }

    Ok(())
}
