//! Channel-role classification.
//!
//! Lookup order:
//! 1. exact name table (`ECG`, `UPPT001`, `UPPT002`)
//! 2. prefix table, longest prefix first (`UADC005` → eyegaze, …).
//!    CTF appends a `-NNNN` sensor suffix to analog channels, hence prefixes.
//! 3. anything else is [`ChannelRole::Unclassified`]
//!
//! There is no generic `UADC` fallback: unrelated analog
//! inputs stay unclassified.  EOG and respiration are not recorded in this
//! study and are never mapped, even if a channel with such a name shows up.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelRole {
    Ecg,
    Eyegaze,
    Pupil,
    Stim,
    Unclassified,
}

impl ChannelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelRole::Ecg => "ecg",
            ChannelRole::Eyegaze => "eyegaze",
            ChannelRole::Pupil => "pupil",
            ChannelRole::Stim => "stim",
            ChannelRole::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact channel name → role.
pub const EXACT_ROLES: &[(&str, ChannelRole)] = &[
    ("ECG", ChannelRole::Ecg),
    ("UPPT001", ChannelRole::Stim),
    ("UPPT002", ChannelRole::Stim),
];

/// Channel name prefix → role (eye tracker on the ADC inputs).
pub const PREFIX_ROLES: &[(&str, ChannelRole)] = &[
    ("UADC005", ChannelRole::Eyegaze), // x position
    ("UADC006", ChannelRole::Eyegaze), // y position
    ("UADC007", ChannelRole::Pupil),
];

/// A physical channel with its assigned role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub name: String,
    pub role: ChannelRole,
}

/// Classify one channel name.  Pure and total.
pub fn classify(name: &str) -> ChannelRole {
    if let Some(&(_, role)) = EXACT_ROLES.iter().find(|(n, _)| *n == name) {
        return role;
    }
    PREFIX_ROLES
        .iter()
        .filter(|(p, _)| name.starts_with(p))
        .max_by_key(|(p, _)| p.len())
        .map(|&(_, role)| role)
        .unwrap_or(ChannelRole::Unclassified)
}

/// Classify a channel list, preserving input order.
pub fn classify_all<S: AsRef<str>>(names: &[S]) -> Vec<ChannelEntry> {
    names
        .iter()
        .map(|n| ChannelEntry {
            name: n.as_ref().to_string(),
            role: classify(n.as_ref()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_entries() {
        assert_eq!(classify("ECG"), ChannelRole::Ecg);
        assert_eq!(classify("UPPT001"), ChannelRole::Stim);
        assert_eq!(classify("UPPT002"), ChannelRole::Stim);
    }

    #[test]
    fn prefix_entries_with_ctf_suffix() {
        assert_eq!(classify("UADC005"), ChannelRole::Eyegaze);
        assert_eq!(classify("UADC006-2104"), ChannelRole::Eyegaze);
        assert_eq!(classify("UADC007-2104"), ChannelRole::Pupil);
    }

    #[test]
    fn unknown_and_absent_roles_stay_unclassified() {
        for name in ["EOGvert", "EOGhor", "UADC001", "UADC004", "MLC11-4408", "", "ecg"] {
            assert_eq!(classify(name), ChannelRole::Unclassified, "{name:?}");
        }
    }

    #[test]
    fn exact_match_is_not_a_prefix_match() {
        assert_eq!(classify("ECG-01"), ChannelRole::Unclassified);
        assert_eq!(classify("UPPT0011"), ChannelRole::Unclassified);
    }

    #[test]
    fn classify_all_keeps_order() {
        let out = classify_all(&["UPPT001", "MRT11-4408", "UADC007"]);
        let roles: Vec<_> = out.iter().map(|c| c.role).collect();
        assert_eq!(roles, [ChannelRole::Stim, ChannelRole::Unclassified, ChannelRole::Pupil]);
        assert_eq!(out[1].name, "MRT11-4408");
    }
}
