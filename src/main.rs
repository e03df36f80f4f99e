use crownview::{SlotSources, ViewerApp};

fn main() -> eframe::Result<()> {
    env_logger::init();

    // Native builds take the three slot sources as filesystem paths.
    let mut args = std::env::args().skip(1);
    let sources = SlotSources {
        upper_jaw: args.next(),
        lower_jaw: args.next(),
        restoration: args.next(),
    };

    let options = eframe::NativeOptions {
        depth_buffer: 24,
        ..Default::default()
    };
    eframe::run_native(
        "crownview",
        options,
        Box::new(move |cc| Ok(Box::new(ViewerApp::new(cc, sources)))),
    )
}
