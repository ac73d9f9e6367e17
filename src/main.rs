use eframe::egui;
use photodust::app::PhotoDustApp;
use photodust::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    // Initialize session log (overwrites previous session log)
    logger::init();

    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 400.0])
            .with_title("PhotoDust")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "PhotoDust",
        options,
        Box::new(|cc| Box::new(PhotoDustApp::new(cc))),
    )
}
