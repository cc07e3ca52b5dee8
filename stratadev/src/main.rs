mod application;
mod presentation;

use strata_core::error::Result;

fn main() -> Result<()> {
    application::run()
}
