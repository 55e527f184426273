mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_payload, write_json};
pub use progress::PhaseProgress;
pub use styling::{accent, muted, pass};
use styling::{paint, Tone};
pub use summary::{print_changes, print_summary};

/// Prints the SQUASH banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        paint("📉 SQUASH", Tone::Brand),
        muted(env!("CARGO_PKG_VERSION")),
        muted("Science Quality Analysis Harness")
    );
}
