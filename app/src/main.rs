//! The `mapview` executable.

use mapview_app::ViewerConfig;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    mapview_core::init();
    mapview_graphics::init();
    mapview_app::init();

    let config = ViewerConfig::parse();
    if let Err(error) = mapview_app::run(config) {
        log::error!("{error}");
        std::process::exit(1);
    }
}
