use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{heading, pass, warn};

/// Spinner for the three monitor phases. Hidden spinners draw nothing.
pub struct PhaseProgress {
    pb: ProgressBar,
    visible: bool,
}

impl PhaseProgress {
    pub fn start_phase_1(visible: bool) -> Self {
        if visible {
            eprintln!("{}  {}", heading("⚙️"), heading("Phases").underlined());
        }
        let pb = create_spinner(
            warn("Phase 1/3: Resolving metric specification").to_string(),
            visible,
        );
        Self { pb, visible }
    }

    pub fn finish_phase_1_start_phase_2(self) -> Self {
        self.pb.finish_with_message(
            pass("Phase 1/3: Resolved metric specification ✓").to_string(),
        );
        let pb = create_spinner(
            warn("Phase 2/3: Fetching measurement history").to_string(),
            self.visible,
        );
        Self { pb, ..self }
    }

    pub fn finish_phase_2_start_phase_3(self, measurements: usize) -> Self {
        self.pb.finish_with_message(
            pass(format!("Phase 2/3: Fetched {measurements} measurements ✓")).to_string(),
        );
        let pb = create_spinner(
            warn("Phase 3/3: Checking job continuity").to_string(),
            self.visible,
        );
        Self { pb, ..self }
    }

    pub fn finish_phase_3(self, gaps: usize) {
        self.pb.finish_with_message(
            pass(format!("Phase 3/3: Found {gaps} gap(s) in CI ids ✓")).to_string(),
        );
        if self.visible {
            eprintln!("\n");
        }
    }
}

fn create_spinner(message: String, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }

    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
