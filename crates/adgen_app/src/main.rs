mod console;

fn main() -> anyhow::Result<()> {
    let config = console::config::AppConfig::load()?;
    console::logging::initialize(&config);
    console::app::run_app(config)
}
