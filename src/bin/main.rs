use clap::{App, Arg};
use config::Config;
use log::warn;

use deep_zoom::renderer::DeepZoomRenderer;

fn main() {
    env_logger::init();

    let matches = App::new("deep_zoom")
        .version("0.1.0")
        .about("Precision-adaptive deep zoom fractal calculation engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .help("Location of the settings file"),
        )
        .get_matches();

    let mut settings = Config::new();
    if let Some(location) = matches.value_of("config") {
        if let Err(error) = settings.merge(config::File::with_name(location)) {
            warn!("could not read {}: {}, using defaults", location, error);
        }
    }

    let mut renderer = DeepZoomRenderer::new(settings);
    renderer.render();
}
