use std::fmt::Display;

use console::{style, StyledObject};

use crate::dashboard::Grade;

/// Terminal tones used by the report. Grades map onto the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Pass,
    Warn,
    Fail,
    Accent,
    Muted,
    Heading,
    Brand,
}

impl From<Grade> for Tone {
    fn from(grade: Grade) -> Self {
        match grade {
            Grade::Stretch | Grade::Design => Self::Pass,
            Grade::Minimum => Self::Warn,
            Grade::Failing => Self::Fail,
        }
    }
}

pub fn paint(text: impl Display, tone: Tone) -> StyledObject<String> {
    let styled = style(text.to_string());
    match tone {
        Tone::Pass => styled.bright().green(),
        Tone::Warn => styled.bright().yellow(),
        Tone::Fail => styled.bright().red(),
        Tone::Accent => styled.cyan(),
        Tone::Muted => styled.dim(),
        Tone::Heading => styled.bright(),
        Tone::Brand => styled.magenta().bold(),
    }
}

/// Text coloured by its grade; ungraded text is left plain.
pub fn graded(text: impl Display, grade: Option<Grade>) -> String {
    match grade {
        Some(grade) => paint(text, grade.into()).to_string(),
        None => text.to_string(),
    }
}

pub fn pass(text: impl Display) -> StyledObject<String> {
    paint(text, Tone::Pass)
}

pub fn warn(text: impl Display) -> StyledObject<String> {
    paint(text, Tone::Warn)
}

pub fn accent(text: impl Display) -> StyledObject<String> {
    paint(text, Tone::Accent)
}

pub fn muted(text: impl Display) -> StyledObject<String> {
    paint(text, Tone::Muted)
}

pub fn heading(text: impl Display) -> StyledObject<String> {
    paint(text, Tone::Heading)
}
