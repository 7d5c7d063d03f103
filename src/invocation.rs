//! Builds the R expression that starts an application on a given port
//!
//! The option names and the `app.R` entry point are read literally by the
//! ambiorix framework, so the script layout must stay exactly as produced here.

use crate::port::get_free_port;
use std::io;
use std::path::Path;

/// Entry point sourced from the working directory
pub const ENTRY_POINT: &str = "app.R";

/// A script ready to hand to the interpreter, plus the port it binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub script: String,
    pub port: u16,
}

/// Format the startup script for `working_dir` bound to `port`.
pub fn format_script(working_dir: &Path, port: u16) -> String {
    format!(
        "setwd('{}');options(ambiorix.host = '0.0.0.0', ambiorix.port.force = {port}, \
         shiny.port = {port}, ambiorix.logger = TRUE);source('{ENTRY_POINT}')",
        working_dir.display(),
    )
}

/// Allocate a free port and build the startup script for it.
pub fn build_invocation(working_dir: &Path) -> io::Result<Invocation> {
    let port = get_free_port()?;
    Ok(Invocation {
        script: format_script(working_dir, port),
        port,
    })
}
