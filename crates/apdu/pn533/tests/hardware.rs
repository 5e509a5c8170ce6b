//! Tests against a real PN533-family device; each one skips when none is plugged in

use farecard_apdu_transport_pn533::{Pn533, Pn533Config, UsbBulk};

fn open() -> Option<Pn533<UsbBulk>> {
    match UsbBulk::open_first() {
        Ok(bulk) => Some(Pn533::new(bulk, Pn533Config::default())),
        Err(e) => {
            println!("Skipping test, no PN533 device: {e}");
            None
        }
    }
}

#[test]
fn test_initialize_and_poll() {
    let Some(mut pn533) = open() else { return };
    pn533.flush().unwrap();

    let firmware = pn533.initialize_device().unwrap();
    println!("{} {firmware}", pn533.io().info());

    if let Some(target) = pn533.poll().unwrap() {
        println!("Target {}", hex::encode(target.id()));
        pn533.in_release(target.tg()).unwrap();
    }
}
