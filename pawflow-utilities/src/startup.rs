use std::{env, path::Path};

use log::info;

use crate::logger::{self, print_env};

pub fn startup(name: &str, log_file: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    unsafe {
        env::set_var("RUST_BACKTRACE", "1");
    }
    logger::setup_logger(log_file)?;
    log_panics::init();

    info!("--- {} ---", name);
    print_env()?;

    Ok(())
}
