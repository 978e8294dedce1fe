mod api;
mod background;
mod config;
mod server;
mod telemetry;

fn main() {
    server::run();
}
