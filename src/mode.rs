//! Output modes and their substitution rules
//!
//! Modes are data: [`POLICIES`] maps each [`Mode`] to the function applied to
//! interpolated values. Literal template text is never transformed.

use std::borrow::Cow;

/// Output dialect selected per render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    Html,
    Css,
    Xquery,
    #[default]
    XmlDefault,
}

impl Mode {
    /// Resolve a caller-supplied mode name, case-insensitively.
    ///
    /// Unrecognised names (including "xml") select [`Mode::XmlDefault`].
    pub fn from_name(name: &str) -> Self {
        POLICIES
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.mode)
            .unwrap_or_default()
    }

    /// Resolve an optional mode name; absence selects the default
    pub fn from_optional(name: Option<&str>) -> Self {
        name.map(Self::from_name).unwrap_or_default()
    }

    pub fn policy(self) -> &'static ModePolicy {
        match self {
            Mode::Html => &POLICIES[0],
            Mode::Css => &POLICIES[1],
            Mode::Xquery => &POLICIES[2],
            Mode::XmlDefault => &POLICIES[3],
        }
    }

    /// Apply this mode's substitution rule to a raw parameter value
    pub fn substitute(self, raw: &str) -> Cow<'_, str> {
        (self.policy().substitute)(raw)
    }

    pub fn as_str(self) -> &'static str {
        self.policy().name
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the mode strategy table
pub struct ModePolicy {
    pub mode: Mode,
    /// Name matched against caller input
    pub name: &'static str,
    pub substitute: fn(&str) -> Cow<'_, str>,
}

pub static POLICIES: [ModePolicy; 4] = [
    ModePolicy {
        mode: Mode::Html,
        name: "html",
        substitute: escape_html,
    },
    ModePolicy {
        mode: Mode::Css,
        name: "css",
        substitute: verbatim,
    },
    ModePolicy {
        mode: Mode::Xquery,
        name: "xquery",
        substitute: verbatim,
    },
    ModePolicy {
        mode: Mode::XmlDefault,
        name: "xml",
        substitute: verbatim,
    },
];

fn verbatim(raw: &str) -> Cow<'_, str> {
    Cow::Borrowed(raw)
}

/// Escape the five HTML metacharacters
pub fn escape_html(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 16);
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
