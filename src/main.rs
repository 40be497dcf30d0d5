mod app;
mod assets;
mod canvas;
mod config;
mod driver;
mod input;
mod melody;
mod occupancy;
mod particle;
mod phase;
mod source;
mod term;

fn main() -> anyhow::Result<()> {
    app::run()
}
