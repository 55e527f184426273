use std::fmt;

use serde::{Deserialize, Serialize};

/// Default estimate of wall-clock hours between two CI runs.
pub const CI_INTERVAL_HOURS: u64 = 8;

const HOURS_PER_DAY: u64 = 24;

/// How much measurement history a dashboard request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Window {
    Weeks,
    /// Capped at three months.
    #[default]
    Months,
    /// Capped at one year.
    Years,
    All,
}

impl Window {
    /// Parses a window name. Anything unrecognised means the whole history.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "weeks" => Self::Weeks,
            "months" => Self::Months,
            "years" => Self::Years,
            _ => Self::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
            Self::All => "all",
        }
    }

    /// Most recent span of history kept, in hours. `None` keeps everything.
    pub fn span_hours(self) -> Option<u64> {
        match self {
            Self::Weeks => Some(7 * HOURS_PER_DAY),
            Self::Months => Some(90 * HOURS_PER_DAY),
            Self::Years => Some(365 * HOURS_PER_DAY),
            Self::All => None,
        }
    }
}

impl From<String> for Window {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Window> for String {
    fn from(window: Window) -> Self {
        window.as_str().to_string()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of pages needed for `count` items. Assumes every page but the last is full.
pub fn num_pages(count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        count.div_ceil(page_size)
    }
}

/// First page (1-based) to fetch so the fetched pages cover `window`.
///
/// Each page is assumed to span `page_size * ci_interval_hours` hours of history.
pub fn start_page(
    page_size: usize,
    num_pages: usize,
    window: Window,
    ci_interval_hours: u64,
) -> usize {
    let Some(hours) = window.span_hours() else {
        return 1;
    };

    let page_span = page_size as u64 * ci_interval_hours;
    if page_span == 0 {
        return 1;
    }

    let pages_in_window = hours.div_ceil(page_span);
    let start = (num_pages as u64).saturating_sub(pages_in_window);

    // start never exceeds num_pages, so it fits in usize
    #[allow(clippy::cast_possible_truncation)]
    let start = start.max(1) as usize;
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weeks_window_starts_three_pages_back() {
        // 10 items per page, 8h per run: 80h per page, 168h needs 3 pages
        assert_eq!(start_page(10, 20, Window::Weeks, 8), 17);
    }

    #[test]
    fn test_unrecognised_window_fetches_everything() {
        let window = Window::parse("decades");
        assert_eq!(window, Window::All);
        assert_eq!(start_page(10, 20, window, 8), 1);
    }

    #[test]
    fn test_months_and_years_clamp_to_first_page() {
        // 2160h / 80h = 27 pages > 20
        assert_eq!(start_page(10, 20, Window::Months, 8), 1);
        assert_eq!(start_page(10, 20, Window::Years, 8), 1);
    }

    #[test]
    fn test_large_history_keeps_only_recent_pages() {
        // 100 per page, 8h: 800h per page; a year needs 11 pages
        assert_eq!(start_page(100, 50, Window::Years, 8), 39);
        // three months need 3 pages
        assert_eq!(start_page(100, 50, Window::Months, 8), 47);
    }

    #[test]
    fn test_degenerate_inputs_start_at_first_page() {
        assert_eq!(start_page(0, 20, Window::Weeks, 8), 1);
        assert_eq!(start_page(10, 20, Window::Weeks, 0), 1);
        assert_eq!(start_page(10, 0, Window::Weeks, 8), 1);
    }

    #[test]
    fn test_num_pages_rounds_up() {
        assert_eq!(num_pages(0, 10), 0);
        assert_eq!(num_pages(10, 10), 1);
        assert_eq!(num_pages(11, 10), 2);
        assert_eq!(num_pages(5, 0), 0);
    }

    #[test]
    fn test_window_parse_is_case_insensitive() {
        assert_eq!(Window::parse("Weeks"), Window::Weeks);
        assert_eq!(Window::parse(" months "), Window::Months);
        assert_eq!(Window::parse("YEARS"), Window::Years);
        assert_eq!(Window::parse("all"), Window::All);
    }

    #[test]
    fn test_window_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Window::Weeks).unwrap(), r#""weeks""#);
        let window: Window = serde_json::from_str(r#""forever""#).unwrap();
        assert_eq!(window, Window::All);
    }
}
