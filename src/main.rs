use procon_bridge::cli_app::{CliApp, init_logging};

fn main() -> anyhow::Result<()> {
    init_logging();
    CliApp::new().run()
}
